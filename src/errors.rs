use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};

/// Error handling shared by every module of the portal
pub type GproResult<T> = Result<T, GproError>;

/// Main error type for all GPRO operations
#[derive(Debug, thiserror::Error)]
pub enum GproError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Deployment error: {0}")]
    Deploy(String),

    #[error("Blocking task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl GproError {
    /// Message safe to hand to a browser. Storage failures are collapsed into
    /// a generic service error; the detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            GproError::Database(_)
            | GproError::Pool(_)
            | GproError::Io(_)
            | GproError::Blocking(_) => "Service error".to_string(),
            GproError::Serialization(e) => format!("Invalid payload: {}", e),
            GproError::Http(e) => format!("Provider request failed: {}", e),
            GproError::Validation(msg)
            | GproError::NotFound(msg)
            | GproError::Upstream(msg)
            | GproError::Timeout(msg)
            | GproError::Config(msg)
            | GproError::Deploy(msg) => msg.clone(),
            GproError::Unauthorized => "Unauthorized".to_string(),
        }
    }
}

/// JSON error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ResponseError for GproError {
    fn status_code(&self) -> StatusCode {
        match self {
            GproError::Validation(_) | GproError::Serialization(_) => StatusCode::BAD_REQUEST,
            GproError::NotFound(_) => StatusCode::NOT_FOUND,
            GproError::Unauthorized => StatusCode::FORBIDDEN,
            GproError::Upstream(_) | GproError::Http(_) | GproError::Deploy(_) => {
                StatusCode::BAD_GATEWAY
            }
            GproError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            GproError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GproError::Database(_)
            | GproError::Pool(_)
            | GproError::Io(_)
            | GproError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        HttpResponse::build(status).json(ErrorBody {
            error: self.public_message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GproError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GproError::Unauthorized.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            GproError::Config("API key not configured".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GproError::NotFound("persona".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_storage_errors_are_generic() {
        let err = GproError::Database(rusqlite::Error::InvalidQuery);
        assert_eq!(err.public_message(), "Service error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
