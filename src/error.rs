use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failure talking to the hosted vision/translation model.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{provider} request failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned no text")]
    EmptyResponse { provider: &'static str },
}

/// Failure of the local OCR fallback. Never recovered.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} timed out after {secs}s")]
    TimedOut { command: String, secs: u64 },

    #[error("temporary image file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// HTTP-facing errors with status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn no_image() -> Self {
        ApiError::InvalidRequest("no image".to_string())
    }

    pub fn invalid_languages() -> Self {
        ApiError::InvalidRequest("invalid languages".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::InvalidRequest(detail) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", detail.clone())
            }
            ApiError::Upstream(err) => {
                tracing::error!(error = %err, "upstream model call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "The text recognition service is unavailable".to_string(),
                )
            }
            ApiError::Extraction(err) => {
                tracing::error!(error = %err, "fallback OCR failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "EXTRACTION_ERROR",
                    "Could not read text from the image".to_string(),
                )
            }
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::PayloadTooLarge(detail) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", detail.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::InvalidRequest(err.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!("upload exceeds the size limit: {}", err))
        } else {
            ApiError::InvalidRequest(format!("malformed multipart body: {}", err))
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::InvalidRequest(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn invalid_request_returns_400_with_message() {
        let response = ApiError::invalid_languages().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
        assert_eq!(json["error"]["message"], "invalid languages");
    }

    #[tokio::test]
    async fn upstream_returns_502() {
        let err = UpstreamError::Status {
            provider: "openai",
            status: 429,
            body: "quota".to_string(),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["error"]["code"], "UPSTREAM_ERROR");
    }

    #[tokio::test]
    async fn extraction_returns_500() {
        let err = ExtractionError::TimedOut {
            command: "tesseract".to_string(),
            secs: 30,
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"]["code"], "EXTRACTION_ERROR");
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let response = ApiError::NotFound("image scan.jpg".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn payload_too_large_returns_413() {
        let response = ApiError::PayloadTooLarge("length limit exceeded".into()).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn internal_hides_detail() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "An internal error occurred"
        );
    }
}
