use http::StatusCode;
use spin_sdk::http::Response;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn validation(field: &str, message: &str) -> Self {
        ApiError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::Conflict(msg) => {
                serde_json::json!({ "error": msg })
            }
            ApiError::Validation { field, message } => {
                serde_json::json!({ "error": message, "field": field })
            }
            ApiError::Unauthorized => serde_json::json!({ "error": "Unauthorized" }),
            ApiError::Forbidden => serde_json::json!({ "error": "User is not authorized" }),
            // Store details stay in the logs.
            ApiError::InternalError(_) => serde_json::json!({ "error": "Something went wrong" }),
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        if let ApiError::InternalError(detail) = &err {
            error!(%detail, "request failed");
        }
        Response::builder()
            .status(err.status().as_u16())
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&err.body()).unwrap_or_default())
            .build()
    }
}

// Domain errors raised inside store closures travel as anyhow::Error and are
// recovered here; everything else is a persistence or serialization failure.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api) => api,
            Err(other) => ApiError::InternalError(format!("{:#}", other)),
        }
    }
}
