use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

/// Failures of the answer pipeline (validation, routing, search, synthesis)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnswerError {
    #[error("{0}")]
    Validation(String),

    #[error("Inappropriate content detected")]
    InappropriateContent,

    #[error("{stage} timeout")]
    UpstreamTimeout { stage: &'static str },

    #[error("No search results found")]
    NoSearchResults,

    #[error("No usable content found in search results")]
    NoUsableContent,

    #[error("Search failed: {0}")]
    Search(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),
}

impl AnswerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnswerError::Validation(_) | AnswerError::InappropriateContent => StatusCode::BAD_REQUEST,
            AnswerError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AnswerError::NoSearchResults | AnswerError::NoUsableContent | AnswerError::Search(_) => {
                StatusCode::BAD_GATEWAY
            }
            AnswerError::Llm(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnswerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AnswerError::Validation(_) => "VALIDATION_ERROR",
            AnswerError::InappropriateContent => "CONTENT_POLICY",
            AnswerError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            AnswerError::NoSearchResults => "NO_SEARCH_RESULTS",
            AnswerError::NoUsableContent => "NO_USABLE_CONTENT",
            AnswerError::Search(_) => "SEARCH_FAILED",
            AnswerError::Llm(_) => "LLM_ERROR",
            AnswerError::Persistence(_) => "PERSISTENCE_FAILED",
        }
    }

    /// Message safe to hand back to the caller
    pub fn public_message(&self) -> String {
        match self {
            AnswerError::Validation(msg) => msg.clone(),
            AnswerError::InappropriateContent => {
                "Request cannot be processed due to content policy".to_string()
            }
            AnswerError::UpstreamTimeout { .. } => "Request timeout - please try again".to_string(),
            AnswerError::NoSearchResults => {
                "Search returned no results - please try again or rephrase".to_string()
            }
            AnswerError::NoUsableContent => {
                "Search results had no usable content - please try again".to_string()
            }
            AnswerError::Search(_) => "Web search failed - please try again".to_string(),
            AnswerError::Llm(_) => "Model is unavailable - please try again".to_string(),
            AnswerError::Persistence(_) => "Internal server error".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AnswerError::Validation(_) | AnswerError::InappropriateContent
        )
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            timestamp: Utc::now().to_rfc3339(),
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_failures_are_not_generic_500() {
        for err in [AnswerError::NoSearchResults, AnswerError::NoUsableContent] {
            assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
            assert!(err.is_retryable());
        }
        assert_eq!(AnswerError::NoSearchResults.code(), "NO_SEARCH_RESULTS");
    }

    #[test]
    fn test_content_policy_message_hides_details() {
        let err = AnswerError::InappropriateContent;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            "Request cannot be processed due to content policy"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let err = AnswerError::UpstreamTimeout { stage: "Synthesis" };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.to_string(), "Synthesis timeout");
    }
}
