//! Auto-scheduler.
//!
//! A domain-scoped backtracking search. Each variable is one weekly meeting
//! `(offering, k)`; a value is a weekly candidate slot plus a room. Placing
//! a value materializes the meeting on every term date with that weekday,
//! and [`detect`] is the feasibility oracle on each of those dates.
//!
//! The search is deterministic for a fixed input and seed: slot order is a
//! seeded shuffle, and every other ordering has an explicit tie-breaker.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::scheduling::conflict::{detect, instructor_blocked, ConflictKind, WarningKind};
use crate::scheduling::model::{
    AcademicTerm, AvailabilityWindow, NewSession, OfferingProfile, Room, ScheduledSession,
    SessionType,
};
use crate::scheduling::time::{self, hhmm};
use crate::types::DbId;

pub const DEFAULT_SLOT_MINUTES: u32 = 90;
pub const DEFAULT_TIME_BUDGET_MS: u64 = 5_000;
pub const DEFAULT_MAX_BACKTRACK: u64 = 10_000;
/// The greedy fill may run past the search budget by `1 / GREEDY_FILL_SHARE`
/// of it, so a timed-out search still gets its partial completed.
const GREEDY_FILL_SHARE: u32 = 4;
const DAY_START: (u32, u32) = (9, 0);
const DAY_END: (u32, u32) = (17, 0);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub weekday: Weekday,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub slot_duration_minutes: u32,
    pub candidate_slots: Vec<CandidateSlot>,
    pub room_pool: Vec<DbId>,
    pub time_budget_ms: u64,
    pub max_backtrack: u64,
    pub seed: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            slot_duration_minutes: DEFAULT_SLOT_MINUTES,
            candidate_slots: Vec::new(),
            room_pool: Vec::new(),
            time_budget_ms: DEFAULT_TIME_BUDGET_MS,
            max_backtrack: DEFAULT_MAX_BACKTRACK,
            seed: 0,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(15..=480).contains(&self.slot_duration_minutes) {
            return Err(CoreError::BadInput(
                "slot_duration_minutes must be between 15 and 480".into(),
            ));
        }
        if self.time_budget_ms == 0 {
            return Err(CoreError::BadInput("time_budget_ms must be positive".into()));
        }
        if let Some(bad) = self.candidate_slots.iter().find(|s| s.end <= s.start) {
            return Err(CoreError::BadInput(format!(
                "Candidate slot {} {} must end after it starts",
                bad.weekday,
                bad.start.format("%H:%M")
            )));
        }
        Ok(())
    }

    /// Longest a run may take: the search budget plus the greedy fill's share.
    pub fn wall_clock_limit(&self) -> Duration {
        let search = Duration::from_millis(self.time_budget_ms);
        search.saturating_add(search / GREEDY_FILL_SHARE)
    }

    /// The configured slots, or Mon-Fri 09:00-17:00 in `slot_duration`
    /// blocks when none are given.
    pub fn effective_slots(&self) -> Vec<CandidateSlot> {
        if !self.candidate_slots.is_empty() {
            return self.candidate_slots.clone();
        }
        let (Some(day_start), Some(day_end)) = (
            NaiveTime::from_hms_opt(DAY_START.0, DAY_START.1, 0),
            NaiveTime::from_hms_opt(DAY_END.0, DAY_END.1, 0),
        ) else {
            return Vec::new();
        };
        let step = chrono::Duration::minutes(i64::from(self.slot_duration_minutes));
        let mut slots = Vec::new();
        for weekday in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            let mut start = day_start;
            loop {
                let (end, wrapped) = start.overflowing_add_signed(step);
                if wrapped != 0 || end > day_end {
                    break;
                }
                slots.push(CandidateSlot { weekday, start, end });
                start = end;
            }
        }
        slots
    }
}

// ---------------------------------------------------------------------------
// Problem and result
// ---------------------------------------------------------------------------

/// Everything the solver reads. Built by the scheduler service from a
/// store snapshot; the solver itself performs no I/O.
#[derive(Debug, Clone)]
pub struct ProblemInstance {
    pub term: AcademicTerm,
    pub offerings: Vec<OfferingProfile>,
    pub rooms: Vec<Room>,
    pub existing: Vec<ScheduledSession>,
    pub availability: Vec<AvailabilityWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Complete,
    Partial,
    Timeout,
    BacktrackLimit,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignedReason {
    NoRoomFitsCapacity,
    InstructorSaturated,
    CohortConflictOnAllSlots,
    RoomConflictOnAllSlots,
    NoCandidateSlots,
    SearchBudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub room_id: Option<DbId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub offering_id: DbId,
    pub meetings: Vec<Meeting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unassigned {
    pub offering_id: DbId,
    /// Index of the weekly meeting that could not be placed.
    pub meeting_index: u32,
    pub reason: UnassignedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverWarning {
    pub offering_id: DbId,
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverStatistics {
    pub variables: usize,
    pub assigned: usize,
    pub backtracks: u64,
    pub nodes_explored: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverResult {
    pub status: SolverStatus,
    pub assignments: Vec<Assignment>,
    pub unassigned: Vec<Unassigned>,
    pub warnings: Vec<SolverWarning>,
    pub statistics: SolverStatistics,
}

impl SolverResult {
    /// All meetings as session proposals, in assignment order.
    pub fn proposals(&self) -> Vec<NewSession> {
        self.assignments
            .iter()
            .flat_map(|a| {
                a.meetings.iter().map(move |m| NewSession {
                    offering_id: a.offering_id,
                    date: m.date,
                    start_time: m.start,
                    end_time: m.end,
                    room_id: m.room_id,
                    session_type: SessionType::Lecture,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Internal search state
// ---------------------------------------------------------------------------

struct Slot {
    weekday: Weekday,
    start: NaiveTime,
    end: NaiveTime,
    dates: Vec<NaiveDate>,
}

struct Variable {
    offering: usize,
    k: u32,
    /// Indices into `rooms` that fit the headcount; `None` for online.
    rooms: Option<Vec<usize>>,
}

#[derive(Clone, Copy)]
struct Placement {
    var: usize,
    slot: usize,
    room: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocker {
    Instructor,
    Cohort,
    Room,
}

impl From<ConflictKind> for Blocker {
    fn from(kind: ConflictKind) -> Self {
        match kind {
            ConflictKind::Instructor => Blocker::Instructor,
            ConflictKind::Cohort => Blocker::Cohort,
            ConflictKind::Room => Blocker::Room,
        }
    }
}

struct Frame {
    candidates: Vec<(usize, Option<usize>)>,
    next: usize,
    placed: bool,
}

struct Search<'a> {
    problem: &'a ProblemInstance,
    slots: Vec<Slot>,
    vars: Vec<Variable>,
    /// Existing plus tentatively placed sessions, by date.
    by_date: HashMap<NaiveDate, Vec<ScheduledSession>>,
    room_usage: Vec<usize>,
    placements: Vec<Placement>,
}

impl<'a> Search<'a> {
    fn room(&self, idx: Option<usize>) -> Option<&'a Room> {
        idx.map(|i| &self.problem.rooms[i])
    }

    fn proposal(&self, var: &Variable, slot: &Slot, date: NaiveDate, room: Option<usize>) -> NewSession {
        NewSession {
            offering_id: self.problem.offerings[var.offering].offering_id,
            date,
            start_time: slot.start,
            end_time: slot.end,
            room_id: self.room(room).map(|r| r.id),
            session_type: SessionType::Lecture,
        }
    }

    /// Whether `var` fits at `(slot, room)` on top of the current state.
    fn check(&self, var_idx: usize, slot_idx: usize, room: Option<usize>) -> bool {
        self.blockers(var_idx, slot_idx, room, false).is_empty()
    }

    /// Constraints that reject placing `var` at `(slot, room)`. Stops at the
    /// first one unless `exhaustive` is set.
    fn blockers(&self, var_idx: usize, slot_idx: usize, room: Option<usize>, exhaustive: bool) -> Vec<Blocker> {
        let var = &self.vars[var_idx];
        let slot = &self.slots[slot_idx];
        let profile = &self.problem.offerings[var.offering];
        let mut found: Vec<Blocker> = Vec::new();
        let add = |b: Blocker, found: &mut Vec<Blocker>| {
            if !found.contains(&b) {
                found.push(b);
            }
        };

        if let Some(first) = slot.dates.first() {
            let blocked = profile.primary_instructors.iter().any(|i| {
                instructor_blocked(&self.problem.availability, *i, *first, slot.start, slot.end)
            });
            if blocked {
                add(Blocker::Instructor, &mut found);
                if !exhaustive {
                    return found;
                }
            }
        }

        let room_ref = self.room(room);
        for date in &slot.dates {
            let existing = self.by_date.get(date).map(Vec::as_slice).unwrap_or(&[]);
            let same_offering_clash = existing.iter().any(|s| {
                s.offering_id == profile.offering_id
                    && time::overlaps(slot.start, slot.end, s.start_time, s.end_time)
            });
            if same_offering_clash {
                add(Blocker::Instructor, &mut found);
            }
            let proposal = self.proposal(var, slot, *date, room);
            let report = detect(&proposal, profile, room_ref, existing, &[]);
            for conflict in &report.hard {
                add(conflict.kind.into(), &mut found);
            }
            if !exhaustive && !found.is_empty() {
                return found;
            }
        }
        found
    }

    fn place(&mut self, p: Placement) {
        let var = &self.vars[p.var];
        let slot = &self.slots[p.slot];
        let profile = &self.problem.offerings[var.offering];
        for date in &slot.dates {
            let proposal = self.proposal(var, slot, *date, p.room);
            let tentative = ScheduledSession::tentative(&proposal, profile);
            self.by_date.entry(*date).or_default().push(tentative);
        }
        if let Some(r) = p.room {
            self.room_usage[r] += 1;
        }
        self.placements.push(p);
    }

    fn unplace(&mut self) {
        let Some(p) = self.placements.pop() else {
            return;
        };
        let offering_id = self.problem.offerings[self.vars[p.var].offering].offering_id;
        let slot = &self.slots[p.slot];
        for date in &slot.dates {
            if let Some(day) = self.by_date.get_mut(date) {
                if let Some(pos) = day.iter().rposition(|s| {
                    s.session_id.is_none()
                        && s.offering_id == offering_id
                        && s.start_time == slot.start
                        && s.end_time == slot.end
                }) {
                    day.remove(pos);
                }
            }
        }
        if let Some(r) = p.room {
            self.room_usage[r] -= 1;
        }
    }

    /// Value order for a variable: slots in seeded order, then rooms by
    /// preferred room, smallest fit, least used this pass, room id.
    fn candidates(&self, var_idx: usize, slot_order: &[usize]) -> Vec<(usize, Option<usize>)> {
        let var = &self.vars[var_idx];
        let profile = &self.problem.offerings[var.offering];
        let rooms: Vec<Option<usize>> = match &var.rooms {
            None => vec![None],
            Some(fit) => {
                let mut fit = fit.clone();
                fit.sort_by(|&a, &b| {
                    let (ra, rb) = (&self.problem.rooms[a], &self.problem.rooms[b]);
                    let pa = profile.preferred_room_id == Some(ra.id);
                    let pb = profile.preferred_room_id == Some(rb.id);
                    pb.cmp(&pa)
                        .then(ra.capacity.cmp(&rb.capacity))
                        .then(self.room_usage[a].cmp(&self.room_usage[b]))
                        .then(ra.id.cmp(&rb.id))
                });
                fit.into_iter().map(Some).collect()
            }
        };
        slot_order
            .iter()
            .flat_map(|&s| rooms.iter().map(move |&r| (s, r)))
            .collect()
    }

    /// Why no value of `var` fits on top of the current placements.
    fn diagnose(&self, var_idx: usize, slot_order: &[usize]) -> UnassignedReason {
        let candidates = self.candidates(var_idx, slot_order);
        if candidates.is_empty() {
            return UnassignedReason::NoCandidateSlots;
        }
        let blockers: Vec<Vec<Blocker>> = candidates
            .iter()
            .map(|&(s, r)| self.blockers(var_idx, s, r, true))
            .collect();
        let all = |b: Blocker| blockers.iter().all(|set| set.contains(&b));
        if all(Blocker::Instructor) {
            UnassignedReason::InstructorSaturated
        } else if all(Blocker::Cohort) {
            UnassignedReason::CohortConflictOnAllSlots
        } else if all(Blocker::Room) {
            UnassignedReason::RoomConflictOnAllSlots
        } else {
            UnassignedReason::SearchBudgetExhausted
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the auto-scheduler over `problem`.
///
/// Never returns an assignment that hard-conflicts with an existing session
/// or with another assignment. Stops on completion, on the time budget, on
/// the backtrack bound or on cancellation, and then greedily places what
/// it can on top of the deepest partial solution found.
pub fn solve(problem: &ProblemInstance, config: &SolverConfig, cancel: &CancellationToken) -> SolverResult {
    let budgets = Budgets {
        search: Duration::from_millis(config.time_budget_ms),
        fill: config.wall_clock_limit(),
    };
    solve_within(problem, config, cancel, budgets)
}

/// Time limits measured from the start of a run.
#[derive(Debug, Clone, Copy)]
struct Budgets {
    search: Duration,
    fill: Duration,
}

fn solve_within(
    problem: &ProblemInstance,
    config: &SolverConfig,
    cancel: &CancellationToken,
    budgets: Budgets,
) -> SolverResult {
    let started = Instant::now();
    let budget = budgets.search;

    // (1) Materialize candidate slots over the term.
    let term_dates: Vec<NaiveDate> = problem.term.dates().collect();
    let slots: Vec<Slot> = config
        .effective_slots()
        .into_iter()
        .map(|c| Slot {
            weekday: c.weekday,
            start: c.start,
            end: c.end,
            dates: term_dates.iter().copied().filter(|d| d.weekday() == c.weekday).collect(),
        })
        .filter(|s| !s.dates.is_empty())
        .collect();

    let mut slot_order: Vec<usize> = (0..slots.len()).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    slot_order.shuffle(&mut rng);

    // Room pool: configured ids, else every active room; sorted by id.
    let mut rooms_sorted: Vec<usize> = (0..problem.rooms.len())
        .filter(|&i| {
            let r = &problem.rooms[i];
            r.active && (config.room_pool.is_empty() || config.room_pool.contains(&r.id))
        })
        .collect();
    rooms_sorted.sort_by_key(|&i| problem.rooms[i].id);

    // (2) Variables, ordered by constraint tightness.
    let mut instructor_load: HashMap<DbId, i64> = HashMap::new();
    for o in &problem.offerings {
        for i in &o.primary_instructors {
            *instructor_load.entry(*i).or_default() += i64::from(o.weekly_sessions.max(1));
        }
    }
    let load = |o: &OfferingProfile| -> i64 {
        o.primary_instructors
            .iter()
            .map(|i| instructor_load.get(i).copied().unwrap_or(0))
            .max()
            .unwrap_or(0)
    };
    let mut offering_order: Vec<usize> = (0..problem.offerings.len()).collect();
    offering_order.sort_by(|&a, &b| {
        let (oa, ob) = (&problem.offerings[a], &problem.offerings[b]);
        load(ob)
            .cmp(&load(oa))
            .then(ob.cohorts.len().cmp(&oa.cohorts.len()))
            .then(ob.preferred_room_id.is_some().cmp(&oa.preferred_room_id.is_some()))
            .then(oa.offering_id.cmp(&ob.offering_id))
    });

    let mut unassigned: Vec<Unassigned> = Vec::new();
    let mut vars: Vec<Variable> = Vec::new();
    for &o in &offering_order {
        let profile = &problem.offerings[o];
        let rooms = if profile.delivery_format.needs_room() {
            Some(
                rooms_sorted
                    .iter()
                    .copied()
                    .filter(|&r| problem.rooms[r].capacity >= profile.headcount)
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };
        for k in 0..profile.weekly_sessions.max(1) as u32 {
            let early_reason = if slots.is_empty() {
                Some(UnassignedReason::NoCandidateSlots)
            } else if rooms.as_ref().is_some_and(Vec::is_empty) {
                Some(UnassignedReason::NoRoomFitsCapacity)
            } else {
                None
            };
            match early_reason {
                Some(reason) => unassigned.push(Unassigned {
                    offering_id: profile.offering_id,
                    meeting_index: k,
                    reason,
                }),
                None => vars.push(Variable {
                    offering: o,
                    k,
                    rooms: rooms.clone(),
                }),
            }
        }
    }

    let mut by_date: HashMap<NaiveDate, Vec<ScheduledSession>> = HashMap::new();
    for s in &problem.existing {
        by_date.entry(s.date).or_default().push(s.clone());
    }

    let mut search = Search {
        problem,
        slots,
        vars,
        by_date,
        room_usage: vec![0; problem.rooms.len()],
        placements: Vec::new(),
    };
    let mut stats = SolverStatistics {
        variables: search.vars.len() + unassigned.len(),
        ..Default::default()
    };

    // Variables with no feasible value even against existing sessions alone
    // are excluded from the search up front.
    let mut active: Vec<usize> = Vec::new();
    for v in 0..search.vars.len() {
        let any = search
            .candidates(v, &slot_order)
            .iter()
            .any(|&(s, r)| search.check(v, s, r));
        if any {
            active.push(v);
        } else {
            let var = &search.vars[v];
            unassigned.push(Unassigned {
                offering_id: problem.offerings[var.offering].offering_id,
                meeting_index: var.k,
                reason: search.diagnose(v, &slot_order),
            });
        }
    }

    // (4) Depth-first backtracking over the active variables.
    let mut status = SolverStatus::Partial;
    let mut best: Vec<Placement> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut depth = 0usize;
    loop {
        if depth == active.len() {
            status = SolverStatus::Complete;
            break;
        }
        if cancel.is_cancelled() {
            status = SolverStatus::Cancelled;
            break;
        }
        if started.elapsed() >= budget {
            status = SolverStatus::Timeout;
            break;
        }

        if frames.len() == depth {
            frames.push(Frame {
                candidates: search.candidates(active[depth], &slot_order),
                next: 0,
                placed: false,
            });
        }
        let frame = &mut frames[depth];
        if frame.placed {
            search.unplace();
            frame.placed = false;
        }

        let var = active[depth];
        let mut found = None;
        while frame.next < frame.candidates.len() {
            let (s, r) = frame.candidates[frame.next];
            frame.next += 1;
            stats.nodes_explored += 1;
            if search.check(var, s, r) {
                found = Some(Placement { var, slot: s, room: r });
                break;
            }
        }

        match found {
            Some(p) => {
                frame.placed = true;
                search.place(p);
                depth += 1;
                if search.placements.len() > best.len() {
                    best = search.placements.clone();
                }
            }
            None => {
                frames.pop();
                if depth == 0 {
                    // Exhausted: no complete assignment exists.
                    break;
                }
                depth -= 1;
                stats.backtracks += 1;
                if stats.backtracks >= config.max_backtrack {
                    status = SolverStatus::BacktrackLimit;
                    break;
                }
            }
        }
    }

    // (5) Resume from the deepest partial and greedily place the rest.
    // A cancelled run only reports what the search had placed.
    if status != SolverStatus::Complete {
        while !search.placements.is_empty() {
            search.unplace();
        }
        let placed_vars: HashSet<usize> = best.iter().map(|p| p.var).collect();
        for p in &best {
            search.place(*p);
        }
        let mut stopped = status == SolverStatus::Cancelled;
        for &v in &active {
            if placed_vars.contains(&v) {
                continue;
            }
            if !stopped && (cancel.is_cancelled() || started.elapsed() >= budgets.fill) {
                tracing::debug!(term_id = %problem.term.id, "Greedy fill stopped by budget");
                stopped = true;
            }
            let fit = if stopped {
                None
            } else {
                search
                    .candidates(v, &slot_order)
                    .into_iter()
                    .find(|&(s, r)| search.check(v, s, r))
            };
            match fit {
                Some((s, r)) => search.place(Placement { var: v, slot: s, room: r }),
                None => {
                    let var = &search.vars[v];
                    let reason = if stopped {
                        UnassignedReason::SearchBudgetExhausted
                    } else {
                        search.diagnose(v, &slot_order)
                    };
                    unassigned.push(Unassigned {
                        offering_id: problem.offerings[var.offering].offering_id,
                        meeting_index: var.k,
                        reason,
                    });
                }
            }
        }
    }

    let result = finish(&search, status, unassigned, stats, started);
    tracing::info!(
        term_id = %problem.term.id,
        status = ?result.status,
        assigned = result.statistics.assigned,
        unassigned = result.unassigned.len(),
        backtracks = result.statistics.backtracks,
        elapsed_ms = result.statistics.elapsed_ms,
        "Auto-scheduler finished",
    );
    result
}

fn finish(
    search: &Search<'_>,
    status: SolverStatus,
    mut unassigned: Vec<Unassigned>,
    mut stats: SolverStatistics,
    started: Instant,
) -> SolverResult {
    let problem = search.problem;
    let mut by_offering: HashMap<DbId, Vec<Meeting>> = HashMap::new();
    let mut warnings: Vec<SolverWarning> = Vec::new();
    let mut seen_warnings: HashSet<(DbId, WarningKind)> = HashSet::new();

    for p in &search.placements {
        let var = &search.vars[p.var];
        let slot = &search.slots[p.slot];
        let profile = &problem.offerings[var.offering];
        let room = search.room(p.room);
        for date in &slot.dates {
            by_offering.entry(profile.offering_id).or_default().push(Meeting {
                date: *date,
                start: slot.start,
                end: slot.end,
                room_id: room.map(|r| r.id),
            });
        }
        // Soft findings against everything except this meeting itself.
        if let Some(date) = slot.dates.first() {
            let proposal = search.proposal(var, slot, *date, p.room);
            let others: Vec<ScheduledSession> = search
                .by_date
                .get(date)
                .map(|day| {
                    day.iter()
                        .filter(|s| {
                            !(s.session_id.is_none()
                                && s.offering_id == profile.offering_id
                                && s.start_time == slot.start)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            let report = detect(&proposal, profile, room, &others, &problem.availability);
            for w in report.warnings {
                if seen_warnings.insert((profile.offering_id, w.kind)) {
                    warnings.push(SolverWarning {
                        offering_id: profile.offering_id,
                        kind: w.kind,
                        message: w.message,
                    });
                }
            }
        }
    }

    let mut assignments: Vec<Assignment> = by_offering
        .into_iter()
        .map(|(offering_id, mut meetings)| {
            meetings.sort_by(|a, b| (a.date, a.start).cmp(&(b.date, b.start)));
            Assignment { offering_id, meetings }
        })
        .collect();
    assignments.sort_by_key(|a| a.offering_id);
    unassigned.sort_by_key(|u| (u.offering_id, u.meeting_index));
    warnings.sort_by_key(|w| (w.offering_id, w.kind));

    stats.assigned = search.placements.len();
    stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let status = if status == SolverStatus::Cancelled {
        status
    } else if unassigned.is_empty() {
        SolverStatus::Complete
    } else if status == SolverStatus::Complete {
        SolverStatus::Partial
    } else {
        status
    };

    SolverResult {
        status,
        assignments,
        unassigned,
        warnings,
        statistics: stats,
    }
}
