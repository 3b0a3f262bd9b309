//! Application router: `/health`, the `/api/v1` tree and the middleware
//! stack shared by the binary and the integration tests.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use campus_core::journey::model::MAX_FORM_BYTES;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::{ConfigError, ServerConfig};
use crate::middleware::auth::{REQUEST_ID_HEADER, TENANT_HEADER};
use crate::routes;
use crate::state::AppState;

/// Request bodies carry at most one form plus envelope.
const MAX_BODY_BYTES: usize = 4 * MAX_FORM_BYTES;

/// Slack on top of the solver budget before a request is cut off.
const SOLVER_HEADROOM: Duration = Duration::from_secs(5);

/// Build the application [`Router`].
///
/// Layers, outermost first: CORS, request id, tracing, request id
/// propagation, timeout, panic recovery, body limit.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Result<Router, ConfigError> {
    let cors = build_cors_layer(config)?;
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Ok(Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout(config),
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors)
        .with_state(state))
}

/// The configured timeout, stretched so an auto-scheduler run can use its
/// whole time budget.
fn request_timeout(config: &ServerConfig) -> Duration {
    let configured = Duration::from_secs(config.request_timeout_secs);
    let solver = config.solver.wall_clock_limit().saturating_add(SOLVER_HEADROOM);
    configured.max(solver)
}

/// CORS for the configured origins. An origin that is not a valid header
/// value is a configuration error.
pub fn build_cors_layer(config: &ServerConfig) -> Result<CorsLayer, ConfigError> {
    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| ConfigError::Invalid {
                name: "CORS_ORIGINS",
                message: format!("'{origin}': {e}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, HeaderName::from_static(TENANT_HEADER)])
        .expose_headers([RETRY_AFTER, HeaderName::from_static(REQUEST_ID_HEADER)])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NotifyConfig, RateLimitConfig};
    use crate::auth::jwt::JwtConfig;
    use campus_core::scheduling::SolverConfig;

    fn config(timeout_secs: u64, budget_ms: u64) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: timeout_secs,
            shutdown_timeout_secs: 5,
            database_url: "memory://".into(),
            jwt: JwtConfig {
                secret: "unit".into(),
                access_token_expiry_mins: 15,
            },
            rate_limit: RateLimitConfig {
                capacity: 10.0,
                refill_per_sec: 1.0,
            },
            solver: SolverConfig {
                time_budget_ms: budget_ms,
                ..SolverConfig::default()
            },
            notify: NotifyConfig::default(),
        }
    }

    #[test]
    fn timeout_covers_the_solver_budget() {
        assert_eq!(request_timeout(&config(30, 5_000)), Duration::from_secs(30));
        assert_eq!(request_timeout(&config(10, 60_000)), Duration::from_secs(80));
    }

    #[test]
    fn invalid_origin_is_a_config_error() {
        let mut bad = config(30, 5_000);
        bad.cors_origins = vec!["http://bad\norigin".into()];
        assert!(matches!(
            build_cors_layer(&bad),
            Err(ConfigError::Invalid { name: "CORS_ORIGINS", .. })
        ));
    }
}
