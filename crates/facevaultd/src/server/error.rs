use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facevault_core::{ErrorKind, PipelineError};
use serde_json::json;

use crate::service::ServiceError;

/// API error type. Every failure is rendered as `{"error": "<message>"}`.
pub struct AppError(pub ServiceError);

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self.0.kind() {
            ErrorKind::Validation => {
                let message = match &self.0 {
                    ServiceError::Pipeline(PipelineError::Validation(msg)) => msg.clone(),
                    other => other.to_string(),
                };
                (StatusCode::BAD_REQUEST, message)
            }
            ErrorKind::NoFaceDetected => (StatusCode::BAD_REQUEST, "no_face_detected".into()),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not found".into()),
            ErrorKind::ModelNotInitialized | ErrorKind::Decode | ErrorKind::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }
        error_body(status, message)
    }
}

/// `{"error": message}` with the given status.
pub(super) fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl<E> From<E> for AppError
where
    E: Into<ServiceError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: impl Into<ServiceError>) -> (StatusCode, String) {
        AppError::from(err).status_and_message()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(PipelineError::Validation("Missing params".into())),
            (StatusCode::BAD_REQUEST, "Missing params".to_string())
        );
        assert_eq!(
            status_of(PipelineError::NoFaceDetected),
            (StatusCode::BAD_REQUEST, "no_face_detected".to_string())
        );
        assert_eq!(
            status_of(PipelineError::NotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PipelineError::ModelNotInitialized("SCRFD")),
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        );
        assert_eq!(
            status_of(std::io::Error::from(std::io::ErrorKind::NotFound)).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::from(PipelineError::NoFaceDetected).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "error": "no_face_detected" }));
    }
}
