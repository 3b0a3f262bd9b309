//! Route definitions for authentication and the caller's profile.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /login    -> login
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(auth::login))
}

/// Routes mounted at `/users`.
///
/// ```text
/// GET  /me       -> me
/// ```
pub fn users_router() -> Router<AppState> {
    Router::new().route("/me", get(auth::me))
}
