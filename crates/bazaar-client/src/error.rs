use bazaar_core::AppError;
use thiserror::Error;

/// Errors returned by the bazaar API client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-2xx status and an error envelope.
    #[error("API error {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    /// The fetch did not complete within the session's deadline.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("token file {path}: {source}")]
    TokenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Timeouts, connect failures and 5xx responses are worth retrying.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            ClientError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            ClientError::Status { status, .. } => *status >= 500,
            ClientError::Timeout => true,
            ClientError::Deserialize { .. }
            | ClientError::InvalidBaseUrl { .. }
            | ClientError::TokenFile { .. } => false,
        }
    }

    /// Caller-facing classification shown by listing views.
    #[must_use]
    pub fn to_app_error(&self) -> AppError {
        match self {
            ClientError::Status {
                status, message, ..
            } => match status {
                400 | 422 => AppError::Validation(message.clone()),
                401 | 403 => AppError::Auth(message.clone()),
                404 => AppError::NotFound(message.clone()),
                409 => AppError::Conflict(message.clone()),
                _ => AppError::Transient(message.clone()),
            },
            ClientError::InvalidBaseUrl { .. } => AppError::Validation(self.to_string()),
            _ => AppError::Transient(self.to_string()),
        }
    }
}
