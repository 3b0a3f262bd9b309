//! HTTP surface of the campus portal.
//!
//! The binary and the integration tests build the same [`router`] over an
//! [`state::AppState`]; handlers stay thin and delegate to the engines in
//! `campus_core`.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notifications;
pub mod query;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
