//! Bearer-token authentication and tenant resolution.
//!
//! [`AuthUser`] only proves who is calling. [`Ctx`] additionally resolves
//! which tenant the request acts on and the role held there, applies the
//! rate limit to writes and carries the request's cancellation token.

use std::ops::Deref;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::Method;
use campus_core::context::RequestContext;
use campus_core::error::CoreError;
use campus_core::roles::Role;
use campus_core::store::Store;
use campus_core::types::DbId;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::auth::jwt::{validate_token, Claims};
use crate::error::AppError;
use crate::state::AppState;

/// Header selecting a tenant other than the one in the token.
pub const TENANT_HEADER: &str = "x-tenant-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authenticated caller extracted from a JWT Bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CoreError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            CoreError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let claims = validate_token(token, &state.config.jwt)
            .map_err(|_| CoreError::Unauthorized("Invalid or expired token".into()))?;

        Ok(AuthUser { claims })
    }
}

/// Resolve the tenant a request acts on and the caller's role there.
///
/// The tenant is the `X-Tenant-ID` header when present, else the token's
/// `tid`. The role always comes from the membership row, so revoked or
/// changed memberships take effect before the token expires.
pub async fn resolve_context(
    store: &dyn Store,
    claims: &Claims,
    tenant_header: Option<DbId>,
) -> Result<(DbId, Role), CoreError> {
    let tenant_id = tenant_header.unwrap_or(claims.tid);
    let tenant = store
        .tenant(tenant_id)
        .await?
        .ok_or_else(|| CoreError::Forbidden("Unknown tenant".into()))?;
    if !tenant.active {
        return Err(CoreError::Forbidden("Tenant is inactive".into()));
    }
    let user = store
        .user(claims.sub)
        .await?
        .ok_or_else(|| CoreError::Unauthorized("Unknown user".into()))?;
    if !user.active {
        return Err(CoreError::Forbidden("Account is deactivated".into()));
    }
    let membership = store
        .membership(tenant_id, claims.sub)
        .await?
        .ok_or_else(|| CoreError::Forbidden("No membership in this tenant".into()))?;
    Ok((tenant_id, membership.role))
}

fn tenant_header(parts: &Parts) -> Result<Option<DbId>, AppError> {
    match parts.headers.get(TENANT_HEADER) {
        None => Ok(None),
        Some(raw) => raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("X-Tenant-ID must be a UUID".into())),
    }
}

/// Request-scoped context for handlers.
///
/// Dereferences to [`RequestContext`]. The cancellation token fires when the
/// handler future is dropped, so a client disconnect or request timeout
/// also stops a running auto-scheduler.
pub struct Ctx {
    ctx: RequestContext,
    _cancel_on_drop: DropGuard,
}

impl Deref for Ctx {
    type Target = RequestContext;

    fn deref(&self) -> &RequestContext {
        &self.ctx
    }
}

impl FromRequestParts<AppState> for Ctx {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser { claims } = AuthUser::from_request_parts(parts, state).await?;
        let (tenant_id, role) = resolve_context(state.store.as_ref(), &claims, tenant_header(parts)?).await?;

        if !matches!(parts.method, Method::GET | Method::HEAD | Method::OPTIONS) {
            state.rate_limiter.check(tenant_id, claims.sub).await?;
        }

        let correlation_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let cancel = CancellationToken::new();
        let ctx = RequestContext::new(tenant_id, claims.sub, role)
            .with_correlation_id(correlation_id)
            .with_cancel(cancel.clone());

        Ok(Ctx {
            ctx,
            _cancel_on_drop: cancel.drop_guard(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use campus_core::store::{IdentityStore, MemoryStore};
    use campus_core::tenancy::{Membership, NewTenant, NewUser, TenantType};
    use campus_core::types::new_id;

    struct Fixture {
        store: MemoryStore,
        home: DbId,
        other: DbId,
        user: DbId,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for slug in ["north", "south"] {
            let tenant = store
                .create_tenant(&NewTenant {
                    slug: slug.into(),
                    name: slug.into(),
                    tenant_type: TenantType::University,
                    enabled_services: vec![],
                })
                .await
                .unwrap();
            ids.push(tenant.id);
        }
        let user = store
            .create_user(&NewUser {
                username: "ada".into(),
                email: "ada@example.edu".into(),
                password_hash: String::new(),
                display_name: "Ada".into(),
                program_id: None,
                cohort_id: None,
            })
            .await
            .unwrap();
        store
            .upsert_membership(&Membership {
                tenant_id: ids[0],
                user_id: user.id,
                role: Role::Advisor,
            })
            .await
            .unwrap();
        Fixture {
            store,
            home: ids[0],
            other: ids[1],
            user: user.id,
        }
    }

    fn claims(user: DbId, tenant: DbId, role: Role) -> Claims {
        Claims {
            sub: user,
            tid: tenant,
            role,
            exp: 0,
            iat: 0,
            iss: crate::auth::jwt::ISSUER.to_string(),
            jti: String::new(),
        }
    }

    #[tokio::test]
    async fn role_comes_from_membership_not_token() {
        let f = fixture().await;
        let c = claims(f.user, f.home, Role::Admin);
        let (tenant, role) = resolve_context(&f.store, &c, None).await.unwrap();
        assert_eq!(tenant, f.home);
        assert_eq!(role, Role::Advisor);
    }

    #[tokio::test]
    async fn header_tenant_without_membership_is_forbidden() {
        let f = fixture().await;
        let c = claims(f.user, f.home, Role::Advisor);
        assert_matches!(
            resolve_context(&f.store, &c, Some(f.other)).await,
            Err(CoreError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn unknown_tenant_is_forbidden() {
        let f = fixture().await;
        let c = claims(f.user, new_id(), Role::Advisor);
        assert_matches!(resolve_context(&f.store, &c, None).await, Err(CoreError::Forbidden(_)));
    }
}
