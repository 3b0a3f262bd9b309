//! Well-known role names.
//!
//! These must match the `CHECK` constraint on `tenant_memberships.role`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_ADVISOR: &str = "advisor";
pub const ROLE_INSTRUCTOR: &str = "instructor";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPERADMIN: &str = "superadmin";

/// Internal actor for integrations such as external checks. Never issued
/// in a token and never stored in a membership row.
pub const ROLE_SYSTEM: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Advisor,
    Instructor,
    Admin,
    Superadmin,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => ROLE_STUDENT,
            Self::Advisor => ROLE_ADVISOR,
            Self::Instructor => ROLE_INSTRUCTOR,
            Self::Admin => ROLE_ADMIN,
            Self::Superadmin => ROLE_SUPERADMIN,
            Self::System => ROLE_SYSTEM,
        }
    }

    /// Admin capabilities. Superadmin is a superset of admin.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Superadmin)
    }

    /// Roles allowed to review student submissions.
    pub fn is_reviewer(self) -> bool {
        matches!(self, Self::Advisor) || self.is_admin()
    }

    /// Roles with read access to other users' journeys and grades.
    pub fn is_staff(self) -> bool {
        matches!(self, Self::Advisor | Self::Instructor) || self.is_admin()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Parses a persisted or token role. `system` is rejected because it is
    /// never granted to a user.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_STUDENT => Ok(Self::Student),
            ROLE_ADVISOR => Ok(Self::Advisor),
            ROLE_INSTRUCTOR => Ok(Self::Instructor),
            ROLE_ADMIN => Ok(Self::Admin),
            ROLE_SUPERADMIN => Ok(Self::Superadmin),
            other => Err(format!("Unknown role '{other}'")),
        }
    }
}
