use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bookstore_core::{FieldError, ServiceError};
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    message: String,
    status: StatusCode,
    errors: Vec<FieldError>,
}

impl ApiError {
    pub fn new(code: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new("Unauthorized", StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn unauthorized_with_message(message: impl Into<String>) -> Self {
        Self::new("Unauthorized", StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("Forbidden", StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NotFound", StatusCode::NOT_FOUND, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new("TooManyRequests", StatusCode::TOO_MANY_REQUESTS, message)
    }

    /// Details stay in the log; they can name files on the server.
    fn storage_failure() -> Self {
        Self::new(
            "StorageError",
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage unavailable",
        )
    }
}

/// Field named by serde's "missing field `x`" message, if any.
fn missing_field(text: &str) -> Option<&str> {
    let rest = text.split_once("missing field `")?.1;
    rest.split_once('`').map(|(field, _)| field)
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        let field = missing_field(&text).unwrap_or("body").to_string();
        let mut api = ApiError::new(
            "ValidationFailed",
            StatusCode::BAD_REQUEST,
            "request body is not valid JSON for this endpoint",
        );
        api.errors = vec![FieldError::new(field, text)];
        api
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(errors) => {
                let mut api = ApiError::new(
                    "ValidationFailed",
                    StatusCode::BAD_REQUEST,
                    "one or more fields are invalid",
                );
                api.errors = errors;
                api
            }
            ServiceError::Unauthorized(msg) => {
                ApiError::new("Unauthorized", StatusCode::UNAUTHORIZED, msg)
            }
            ServiceError::LockedOut(until) => ApiError::new(
                "LockedOut",
                StatusCode::UNAUTHORIZED,
                format!("account locked until {}", until.to_rfc3339()),
            ),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            ServiceError::AlreadyExists(what) => ApiError::new(
                "AlreadyExists",
                StatusCode::CONFLICT,
                format!("{what} already exists"),
            ),
            ServiceError::Configuration(msg) => {
                tracing::error!(error = %msg, "configuration error while serving request");
                ApiError::new(
                    "ConfigurationError",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server misconfigured",
                )
            }
            ServiceError::Provisioning(msg) => {
                ApiError::new("ProvisioningFailed", StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ServiceError::Io(e) => {
                tracing::error!(error = %e, "store I/O failed");
                ApiError::storage_failure()
            }
            ServiceError::Serde(e) => {
                tracing::error!(error = %e, "store snapshot (de)serialization failed");
                ApiError::storage_failure()
            }
            ServiceError::Other(msg) => {
                ApiError::new("Error", StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = if self.errors.is_empty() {
            json!({
                "code": self.code,
                "message": self.message,
            })
        } else {
            json!({
                "code": self.code,
                "message": self.message,
                "errors": self.errors,
            })
        };
        (self.status, Json(body)).into_response()
    }
}
