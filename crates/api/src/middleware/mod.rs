//! Request extractors shared by every handler.
//!
//! - [`auth::AuthUser`] -- Validates the JWT Bearer token.
//! - [`auth::Ctx`] -- Resolves tenant, role and cancellation for the request.
//! - [`rate_limit::RateLimiter`] -- Token bucket per `(tenant, user)`.

pub mod auth;
pub mod rate_limit;
