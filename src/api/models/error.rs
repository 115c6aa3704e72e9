// API error envelope
//
// Engine errors carry a stable kind string; the API maps each kind to an
// HTTP status and serializes {success: false, kind, message}.

use crate::error::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    /// Engine error kind, e.g. "NotFound" or "PassphraseRequired"
    pub kind: String,
    pub message: String,
}

/// Wrapper giving EngineError an HTTP rendering
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0.kind() {
            "NotFound" => StatusCode::NOT_FOUND,
            "Conflict" => StatusCode::CONFLICT,
            "InvalidInput" | "PassphraseRequired" => StatusCode::BAD_REQUEST,
            "SignerUnavailable" => StatusCode::UNPROCESSABLE_ENTITY,
            "VaultSealed" | "Transient" => StatusCode::SERVICE_UNAVAILABLE,
            "Timeout" => StatusCode::GATEWAY_TIMEOUT,
            "AdapterUnreachable" | "AdapterAuth" | "AdapterRemote" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }
        let body = ApiErrorResponse {
            success: false,
            kind: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Route handler result alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(EngineError::not_found("x")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(EngineError::conflict("x")).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(EngineError::PassphraseRequired {
                fingerprint: "ab".into()
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(EngineError::SignerUnavailable {
                fingerprint: "cd".into(),
                reason: "x".into()
            })
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError(EngineError::VaultSealed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(EngineError::AdapterUnreachable {
                adapter: "ssh".into(),
                details: "x".into()
            })
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
