//! API error types and error handling

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use metrics_core::{CodecError, CryptoError, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::storage::StorageError;

/// API Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

/// API error response structure
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed metric in the path or body
    #[error("Invalid metric: {0}")]
    Validation(#[from] ValidationError),

    /// Signature did not match the body
    #[error("Integrity check failed")]
    Integrity,

    /// Body could not be decrypted
    #[error("Decryption failed")]
    Crypto(String),

    /// Body is not valid gzip or JSON
    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Metric not found: {0}")]
    NotFound(String),

    /// Backend failure; details stay in the log
    #[error("internal server error")]
    Storage(StorageError),

    /// Backend did not answer the liveness probe
    #[error("No connection with Database")]
    Unavailable,
}

impl ApiError {
    fn log(&self) {
        match self {
            ApiError::Validation(e) => debug!("Rejected request: {}", e),
            ApiError::Payload(e) => debug!("Rejected payload: {}", e),
            ApiError::NotFound(name) => debug!("Metric not found: {}", name),
            ApiError::Integrity => warn!("SECURITY: request signature mismatch"),
            ApiError::Crypto(e) => warn!("SECURITY: request decryption failed: {}", e),
            ApiError::Storage(e) => error!("Storage failure: {}", e),
            ApiError::Unavailable => error!("Storage ping failed"),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        self.log();
        let status_code = self.status_code();
        HttpResponse::build(status_code).json(ErrorResponse {
            code: status_code.as_u16(),
            message: self.to_string(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(ValidationError::EmptyName) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Integrity => StatusCode::BAD_REQUEST,
            ApiError::Crypto(_) => StatusCode::BAD_REQUEST,
            ApiError::Payload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Conversion from storage errors
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => ApiError::NotFound(name),
            other => ApiError::Storage(other),
        }
    }
}

/// Conversion from payload protection errors
impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::BadSignature => ApiError::Integrity,
            other => ApiError::Crypto(other.to_string()),
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        ApiError::Payload(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Payload(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::Validation(ValidationError::UnknownKind("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Validation(ValidationError::EmptyName).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Integrity.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::NotFound("cpu".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::Closed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_is_lifted_from_storage() {
        assert!(matches!(
            ApiError::from(StorageError::NotFound("cpu".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(CryptoError::BadSignature),
            ApiError::Integrity
        ));
    }

    #[actix_web::test]
    async fn test_storage_errors_do_not_leak() {
        let err = ApiError::from(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk /var/lib/secret failed",
        )));
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("internal server error"));
        assert!(!text.contains("secret"));
    }
}
