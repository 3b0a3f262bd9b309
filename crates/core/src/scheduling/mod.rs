//! Class-session scheduling: data model, conflict detection, the
//! auto-scheduler and the service that ties them to a store.

pub mod conflict;
pub mod model;
pub mod service;
pub mod solver;
pub mod time;

pub use conflict::{detect, ConflictKind, ConflictReport, HardConflict, Warning, WarningKind};
pub use model::*;
pub use service::{AutoScheduleOutcome, AutoScheduleRequest, CreatedSession, Scheduler};
pub use solver::{solve, SolverConfig, SolverResult, SolverStatus};
