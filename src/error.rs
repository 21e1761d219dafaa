//! Error types for entity operations.
//!
//! Distinguishes connectivity failures (logged and propagated), vendor errors
//! (the only kind the attachment upload retries), and local validation/type
//! failures that are raised immediately.

use thiserror::Error;

/// Result alias used across the crate.
pub type SgResult<T> = Result<T, SgError>;

/// Error from entity and transport operations.
#[derive(Debug, Error)]
pub enum SgError {
    /// Name resolution, connect or timeout failure talking to the site.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error reported by the remote service.
    #[error("{}", format_api_error(.status, .message))]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// Domain validation failure (double save, ambiguous match, unsupported type).
    #[error("{0}")]
    Validation(String),

    /// A value had the wrong container or scalar type.
    #[error("Type error: {0}")]
    Type(String),

    /// The requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_api_error(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("API error (HTTP {}): {}", code, message),
        None => format!("API error: {}", message),
    }
}

impl SgError {
    /// Create a vendor error without an HTTP status.
    pub fn api(message: impl Into<String>) -> Self {
        SgError::Api {
            status: None,
            message: message.into(),
        }
    }

    /// Create a vendor error carrying the HTTP status.
    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        SgError::Api {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SgError::Validation(message.into())
    }

    /// Whether this is a connectivity failure.
    pub fn is_connection(&self) -> bool {
        matches!(self, SgError::Connection(_))
    }

    /// Whether this error was reported by the remote service.
    pub fn is_vendor(&self) -> bool {
        matches!(self, SgError::Api { .. })
    }
}

/// Log connectivity failures before handing the result back to the caller.
pub(crate) fn log_connection<T>(result: SgResult<T>, action: &str) -> SgResult<T> {
    result.inspect_err(|e| {
        if e.is_connection() {
            tracing::error!("Connection failed during {}: {}", action, e);
        }
    })
}

impl From<reqwest::Error> for SgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            SgError::Connection(format!("Connection failed: {}", e))
        } else if e.is_timeout() {
            SgError::Connection(format!("Request timeout: {}", e))
        } else if e.is_decode() {
            SgError::api(format!("Failed to decode response: {}", e))
        } else if let Some(status) = e.status() {
            SgError::api_status(status.as_u16(), e.to_string())
        } else {
            SgError::Connection(format!("Request failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SgError::Connection("dns".into()).is_connection());
        assert!(!SgError::Connection("dns".into()).is_vendor());
        assert!(SgError::api("boom").is_vendor());
        assert!(!SgError::validation("dup").is_vendor());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SgError::api_status(404, "missing").to_string(),
            "API error (HTTP 404): missing"
        );
        assert_eq!(SgError::api("boom").to_string(), "API error: boom");
        assert_eq!(
            SgError::validation("Multiple Shot found").to_string(),
            "Multiple Shot found"
        );
    }
}
