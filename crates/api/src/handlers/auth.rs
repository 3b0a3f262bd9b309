//! Handlers for the `/auth` resource and the caller's own profile.

use axum::extract::State;
use axum::Json;
use campus_core::error::CoreError;
use campus_core::roles::Role;
use campus_core::tenancy::{Tenant, User};
use campus_core::types::DbId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::jwt::{sign, Claims};
use crate::auth::password::check_credentials;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{resolve_context, Ctx};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    /// Tenant the session acts on until another is chosen per request.
    pub tenant_id: DbId,
}

/// Successful authentication response.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserInfo,
}

/// Public user info embedded in [`AuthResponse`].
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: DbId,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub tenant_id: DbId,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub tenant: Tenant,
    pub role: Role,
}

fn invalid_credentials() -> AppError {
    AppError::Core(CoreError::Unauthorized("Invalid username or password".into()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
///
/// Authenticate with username + password for one tenant. Returns an access
/// token carrying the tenant and the role held there.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    input.validate()?;

    // 1. Check credentials; unknown users cost the same as wrong passwords.
    let user = state.store.user_by_username(&input.username).await?;
    let stored_hash = user.as_ref().map(|u| u.password_hash.as_str());
    let password_valid = check_credentials(&input.password, stored_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    let user = match user {
        Some(user) if password_valid => user,
        _ => {
            tracing::info!(username = %input.username, "Login rejected");
            return Err(invalid_credentials());
        }
    };

    // 2. Same checks every authenticated request goes through.
    let claims = Claims::issue(user.id, input.tenant_id, Role::Student, &state.config.jwt);
    let (tenant_id, role) = resolve_context(state.store.as_ref(), &claims, None).await?;

    // 3. Stamp the membership role and sign.
    let access_token = sign(&claims.with_role(role), &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation failed: {e}")))?;

    tracing::info!(user_id = %user.id, tenant_id = %tenant_id, role = %role, "User logged in");

    Ok(Json(AuthResponse {
        access_token,
        expires_in: state.config.jwt.access_token_expiry_mins * 60,
        user: UserInfo {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            tenant_id,
            role,
        },
    }))
}

/// GET /api/v1/users/me
pub async fn me(State(state): State<AppState>, ctx: Ctx) -> AppResult<Json<DataResponse<MeResponse>>> {
    let user = state
        .store
        .user(ctx.user_id)
        .await?
        .ok_or_else(|| CoreError::not_found("user", ctx.user_id))?;
    let tenant = state
        .store
        .tenant(ctx.tenant_id)
        .await?
        .ok_or_else(|| CoreError::not_found("tenant", ctx.tenant_id))?;
    Ok(Json(DataResponse {
        data: MeResponse {
            user,
            tenant,
            role: ctx.role,
        },
    }))
}
