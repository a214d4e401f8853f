//! Error types for the click-link client library.

use thiserror::Error;

/// Result type for click-link operations.
pub type Result<T> = std::result::Result<T, ClickLinkError>;

/// Errors that can occur in the click-link client.
#[derive(Error, Debug)]
pub enum ClickLinkError {
    /// Network-level failure (connection refused, timeout, socket error)
    #[error("network error: {0}")]
    Network(String),

    /// The store answered with a non-success HTTP status
    #[error("server error ({status_code}): {message}")]
    Server { status_code: u16, message: String },

    /// Invalid client configuration (missing base URL, bad parameter count, ...)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed wire body: missing header rows, unterminated quoted array
    /// element, unparseable value text, or a non-UTF-8 response
    #[error("malformed response: {0}")]
    Decode(String),

    /// A value that cannot be rendered under its column type, or an empty batch
    #[error("cannot encode: {0}")]
    Encode(String),

    /// Type inference failed for a field (null value, empty array, or array
    /// elements of contradicting types)
    #[error("cannot infer column type of '{field}': {message}")]
    TypeInference { field: String, message: String },

    /// Concurrent schema modification detected and not resolved within the
    /// retry bound
    #[error("schema conflict on '{table}' after {attempts} attempts: {message}")]
    SchemaConflict {
        table: String,
        attempts: u32,
        message: String,
    },

    /// Table identifier with more than one `.` separator or an empty part
    #[error("invalid table identifier '{0}'")]
    InvalidIdentifier(String),

    /// Cached-select filter referencing an unindexed field or using an
    /// unsupported condition value
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl ClickLinkError {
    /// Whether this error signals a concurrent schema change.
    ///
    /// The store reports the race either as stale replica metadata (the
    /// losing ALTER) or as a column that already exists (another writer
    /// added it first). Both resolve by re-reading the schema and retrying
    /// the reconcile-and-insert cycle.
    pub fn is_schema_conflict(&self) -> bool {
        match self {
            ClickLinkError::Server { message, .. } => {
                message.contains("is not up to date") || message.contains("already exists")
            }
            ClickLinkError::SchemaConflict { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClickLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClickLinkError::Network(format!("request timed out: {err}"))
        } else {
            ClickLinkError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let conflict = ClickLinkError::Server {
            status_code: 500,
            message: "Metadata on replica is not up to date with common metadata".to_string(),
        };
        assert!(conflict.is_schema_conflict());

        let duplicate = ClickLinkError::Server {
            status_code: 500,
            message: "Cannot add column price: column with this name already exists".to_string(),
        };
        assert!(duplicate.is_schema_conflict());

        let other = ClickLinkError::Server {
            status_code: 404,
            message: "Table default.missing does not exist".to_string(),
        };
        assert!(!other.is_schema_conflict());

        let decode = ClickLinkError::Decode("no result".to_string());
        assert!(!decode.is_schema_conflict());
    }
}
