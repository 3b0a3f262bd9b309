use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use campus_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

const INTERNAL_MESSAGE: &str = "An internal error occurred";

impl AppError {
    /// Status, code, message and extra body fields.
    fn parts(&self) -> (StatusCode, &'static str, String, serde_json::Value) {
        let none = serde_json::Value::Null;
        match self {
            AppError::Core(core) => {
                let code = core.code();
                match core {
                    CoreError::BadInput(msg) => (StatusCode::BAD_REQUEST, code, msg.clone(), none),
                    CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, code, msg.clone(), none),
                    CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, code, msg.clone(), none),
                    CoreError::NotFound { entity, id } => (
                        StatusCode::NOT_FOUND,
                        code,
                        format!("{entity} with id {id} not found"),
                        none,
                    ),
                    CoreError::IllegalTransition { from, to, .. } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        code,
                        core.to_string(),
                        json!({ "from": from, "to": to }),
                    ),
                    CoreError::PrereqNotSatisfied { blocking } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        code,
                        core.to_string(),
                        json!({ "blocking": blocking }),
                    ),
                    CoreError::StateImmutable { state } => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        code,
                        core.to_string(),
                        json!({ "state": state }),
                    ),
                    CoreError::BadCatalogue(msg) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, code, msg.clone(), none)
                    }
                    CoreError::Conflict {
                        message,
                        reason,
                        offenders,
                    } => (
                        StatusCode::CONFLICT,
                        code,
                        message.clone(),
                        json!({ "reason": reason, "offenders": offenders }),
                    ),
                    CoreError::RateLimited { retry_after_secs } => (
                        StatusCode::TOO_MANY_REQUESTS,
                        code,
                        core.to_string(),
                        json!({ "retry_after_secs": retry_after_secs }),
                    ),
                    CoreError::Cancelled => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        code,
                        "Request was cancelled".to_string(),
                        none,
                    ),
                    CoreError::Storage(msg) => {
                        tracing::error!(error = %msg, "Storage error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", INTERNAL_MESSAGE.into(), none)
                    }
                }
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), none),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", INTERNAL_MESSAGE.into(), none)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let (Some(body), serde_json::Value::Object(extra)) = (body.as_object_mut(), details) {
            body.extend(extra);
        }

        let mut response = (status, axum::Json(body)).into_response();
        if let AppError::Core(CoreError::RateLimited { retry_after_secs }) = &self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::journey::NodeState;

    fn status_of(err: CoreError) -> StatusCode {
        AppError::Core(err).into_response().status()
    }

    #[test]
    fn state_machine_errors_are_unprocessable() {
        assert_eq!(
            status_of(CoreError::IllegalTransition {
                from: NodeState::Done,
                to: NodeState::Submitted,
                reason: "transition not allowed".into(),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CoreError::PrereqNotSatisfied { blocking: vec!["A".into()] }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(CoreError::StateImmutable { state: NodeState::Submitted }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn access_errors_map_to_auth_statuses() {
        assert_eq!(status_of(CoreError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(CoreError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_of(CoreError::not_found("room", "r1")), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AppError::Core(CoreError::RateLimited { retry_after_secs: 3 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap().to_str().unwrap(), "3");
    }

    #[test]
    fn storage_and_cancel_statuses() {
        assert_eq!(
            status_of(CoreError::Storage("connection reset".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(CoreError::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn conflict_body_carries_offenders() {
        let (status, code, _, details) = AppError::Core(CoreError::Conflict {
            message: "Session conflicts on instructor".into(),
            reason: Some("instructor".into()),
            offenders: vec!["s1".into()],
        })
        .parts();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "CONFLICT");
        assert_eq!(details["reason"], "instructor");
        assert_eq!(details["offenders"][0], "s1");
    }
}
