use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/**
 * \brief Startup configuration failures. All of them are fatal.
 */
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set. Please set it before running the backend.")]
    MissingToken(&'static str),
    #[error("invalid bind address {addr}: {reason}")]
    InvalidAddr { addr: String, reason: String },
}

/**
 * \brief Failures of the provider call.
 */
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request failed: {status} -> {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected response payload: {0}")]
    Decode(String),
    #[error("response contained no choices")]
    EmptyChoices,
}

/**
 * \brief Errors surfaced by the HTTP handlers as `{"error": ...}` bodies.
 */
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No prompt provided")]
    MissingPrompt,
    #[error("{0}")]
    Internal(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Upstream(#[from] GenerationError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingPrompt => StatusCode::BAD_REQUEST,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prompt_message_is_stable() {
        assert_eq!(RelayError::MissingPrompt.to_string(), "No prompt provided");
        assert_eq!(RelayError::MissingPrompt.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_maps_to_bad_gateway() {
        let err = RelayError::from(GenerationError::EmptyChoices);
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "response contained no choices");
    }

    #[test]
    fn missing_token_names_variable() {
        let err = ConfigError::MissingToken("GITHUB_TOKEN");
        assert!(err.to_string().starts_with("GITHUB_TOKEN environment variable"));
    }
}
