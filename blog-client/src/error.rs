use miette::Diagnostic;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`ApiClient`](crate::ApiClient).
#[derive(Error, Diagnostic, Debug)]
pub enum ApiError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status. `message` is the response
    /// body, or `HTTP <code>` when the body was empty.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Response had no body")]
    EmptyBody,
}

impl ApiError {
    /// Build the error for a non-success response.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            body.to_owned()
        };
        Self::Status { status, message }
    }

    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}

/// A specialized result type for API calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;
