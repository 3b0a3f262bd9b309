//! Node states and the journey transition table.
//!
//! The table is pure data; the engine evaluates gates and preconditions
//! against stored state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const STATE_ACTIVE: &str = "active";
pub const STATE_SUBMITTED: &str = "submitted";
pub const STATE_WAITING: &str = "waiting";
pub const STATE_NEEDS_FIXES: &str = "needs_fixes";
pub const STATE_DONE: &str = "done";
pub const STATE_LOCKED: &str = "locked";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Active,
    Submitted,
    Waiting,
    NeedsFixes,
    Done,
    Locked,
}

impl NodeState {
    pub const ALL: [NodeState; 6] = [
        NodeState::Active,
        NodeState::Submitted,
        NodeState::Waiting,
        NodeState::NeedsFixes,
        NodeState::Done,
        NodeState::Locked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => STATE_ACTIVE,
            Self::Submitted => STATE_SUBMITTED,
            Self::Waiting => STATE_WAITING,
            Self::NeedsFixes => STATE_NEEDS_FIXES,
            Self::Done => STATE_DONE,
            Self::Locked => STATE_LOCKED,
        }
    }

    /// States in which form revisions and uploads are accepted.
    pub fn is_editable(self) -> bool {
        matches!(self, Self::Active | Self::NeedsFixes)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            STATE_ACTIVE => Ok(Self::Active),
            STATE_SUBMITTED => Ok(Self::Submitted),
            STATE_WAITING => Ok(Self::Waiting),
            STATE_NEEDS_FIXES => Ok(Self::NeedsFixes),
            STATE_DONE => Ok(Self::Done),
            STATE_LOCKED => Ok(Self::Locked),
            other => Err(format!("Unknown node state '{other}'")),
        }
    }
}

/// Who may request a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The student who owns the journey.
    Owner,
    /// Advisor, admin or superadmin.
    Reviewer,
    /// Admin or superadmin.
    Admin,
    /// Integration hooks only.
    System,
}

/// What must hold before the transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Required uploads present and, for form nodes, at least one revision.
    SubmissionComplete,
    /// A revision was saved after the node entered `needs_fixes`.
    RevisedSinceFixes,
    /// The node declares an external check.
    ExternalCheckDeclared,
    /// A non-empty reviewer note accompanies the rejection.
    FeedbackProvided,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: NodeState,
    pub to: NodeState,
    pub gate: Gate,
    pub precondition: Precondition,
    /// The prerequisite gate applies (every prerequisite must be `done`).
    pub prereq_gate: bool,
    /// Recorded with `override: true` in the event payload.
    pub is_override: bool,
}

const fn rule(from: NodeState, to: NodeState, gate: Gate, precondition: Precondition) -> TransitionRule {
    TransitionRule {
        from,
        to,
        gate,
        precondition,
        prereq_gate: false,
        is_override: false,
    }
}

/// Look up the rule for `from -> to`, or `None` when the edge is illegal.
pub fn rule_for(from: NodeState, to: NodeState) -> Option<TransitionRule> {
    use NodeState::*;

    if from == to {
        return None;
    }
    let r = match (from, to) {
        (Active, Submitted) => TransitionRule {
            prereq_gate: true,
            ..rule(from, to, Gate::Owner, Precondition::SubmissionComplete)
        },
        (Submitted, Waiting) => rule(from, to, Gate::System, Precondition::ExternalCheckDeclared),
        (Submitted, Done) => rule(from, to, Gate::Reviewer, Precondition::None),
        (Submitted, NeedsFixes) => rule(from, to, Gate::Reviewer, Precondition::FeedbackProvided),
        (NeedsFixes, Submitted) => TransitionRule {
            prereq_gate: true,
            ..rule(from, to, Gate::Owner, Precondition::RevisedSinceFixes)
        },
        (Waiting, Submitted) => rule(from, to, Gate::System, Precondition::None),
        (Locked, Active) => rule(from, to, Gate::Admin, Precondition::None),
        (Active, Done) => TransitionRule {
            is_override: true,
            ..rule(from, to, Gate::Admin, Precondition::None)
        },
        (_, Locked) => rule(from, to, Gate::Admin, Precondition::None),
        _ => return None,
    };
    Some(r)
}

/// Every rule leaving `from`, in the order of [`NodeState::ALL`].
pub fn rules_from(from: NodeState) -> Vec<TransitionRule> {
    NodeState::ALL
        .iter()
        .filter_map(|&to| rule_for(from, to))
        .collect()
}

/// Check whether a transition from `from` to `to` exists at all.
pub fn can_transition(from: NodeState, to: NodeState) -> bool {
    rule_for(from, to).is_some()
}

#[cfg(test)]
mod tests {
    use super::NodeState::*;
    use super::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn active_to_submitted_by_owner_with_prereq_gate() {
        let r = rule_for(Active, Submitted).unwrap();
        assert_eq!(r.gate, Gate::Owner);
        assert_eq!(r.precondition, Precondition::SubmissionComplete);
        assert!(r.prereq_gate);
    }

    #[test]
    fn submitted_to_waiting_by_system() {
        assert_eq!(rule_for(Submitted, Waiting).unwrap().gate, Gate::System);
    }

    #[test]
    fn submitted_to_done_by_reviewer() {
        assert_eq!(rule_for(Submitted, Done).unwrap().gate, Gate::Reviewer);
    }

    #[test]
    fn submitted_to_needs_fixes_requires_feedback() {
        let r = rule_for(Submitted, NeedsFixes).unwrap();
        assert_eq!(r.gate, Gate::Reviewer);
        assert_eq!(r.precondition, Precondition::FeedbackProvided);
    }

    #[test]
    fn needs_fixes_to_submitted_requires_revision() {
        let r = rule_for(NeedsFixes, Submitted).unwrap();
        assert_eq!(r.precondition, Precondition::RevisedSinceFixes);
        assert!(r.prereq_gate);
    }

    #[test]
    fn waiting_to_submitted_by_system() {
        assert_eq!(rule_for(Waiting, Submitted).unwrap().gate, Gate::System);
    }

    #[test]
    fn any_unlocked_state_can_be_locked_by_admin() {
        for from in [Active, Submitted, Waiting, NeedsFixes, Done] {
            assert_eq!(rule_for(from, Locked).unwrap().gate, Gate::Admin, "{from}");
        }
    }

    #[test]
    fn locked_to_active_by_admin() {
        assert_eq!(rule_for(Locked, Active).unwrap().gate, Gate::Admin);
    }

    #[test]
    fn active_to_done_is_admin_override() {
        let r = rule_for(Active, Done).unwrap();
        assert_eq!(r.gate, Gate::Admin);
        assert!(r.is_override);
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn locked_only_leaves_to_active() {
        assert_eq!(rules_from(Locked).iter().map(|r| r.to).collect::<Vec<_>>(), [Active]);
    }

    #[test]
    fn same_state_is_illegal() {
        for s in NodeState::ALL {
            assert!(!can_transition(s, s), "{s}");
        }
    }

    #[test]
    fn done_only_leaves_to_locked() {
        assert_eq!(rules_from(Done).iter().map(|r| r.to).collect::<Vec<_>>(), [Locked]);
    }

    #[test]
    fn active_to_needs_fixes_invalid() {
        assert!(!can_transition(Active, NeedsFixes));
    }

    #[test]
    fn waiting_to_done_invalid() {
        assert!(!can_transition(Waiting, Done));
    }

    #[test]
    fn needs_fixes_to_done_invalid() {
        assert!(!can_transition(NeedsFixes, Done));
    }

    // -----------------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------------

    #[test]
    fn state_names_round_trip() {
        for s in NodeState::ALL {
            assert_eq!(s.as_str().parse::<NodeState>(), Ok(s));
        }
        assert!("archived".parse::<NodeState>().is_err());
    }

    #[test]
    fn only_active_and_needs_fixes_are_editable() {
        let editable: Vec<NodeState> = NodeState::ALL.into_iter().filter(|s| s.is_editable()).collect();
        assert_eq!(editable, [Active, NeedsFixes]);
    }
}
