//! Request handlers.
//!
//! Each submodule provides async handler functions for one area of the
//! portal. Handlers resolve a [`crate::middleware::auth::Ctx`], delegate to
//! the matching engine in `campus_core` and map errors via
//! [`crate::error::AppError`].

pub mod auth;
pub mod curriculum;
pub mod gradebook;
pub mod journey;
pub mod scheduling;
