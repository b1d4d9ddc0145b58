//! Error types for the catalog registry

use thiserror::Error;

/// Catalog registry error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request, body or field value
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Record or owning patient not found
    #[error("{0} not found")]
    NotFound(String),

    /// Record with the same ID already exists
    #[error("{0} already exists")]
    Conflict(String),

    /// Network failure talking to the registry or to a collaborator
    #[error("Transport error: {0}")]
    Transport(String),

    /// Persisted catalog document could not be read back
    #[error("Corrupt catalog state: {0}")]
    CorruptState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether the error reports a missing record or owner
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the error reports a duplicate ID
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Whether the error is a connectivity failure worth retrying
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(Error::NotFound("Device 3".into()).is_not_found());
        assert!(Error::Conflict("Service 1".into()).is_conflict());
        assert!(Error::Transport("connection refused".into()).is_transport());
        assert!(!Error::Validation("missing ID".into()).is_transport());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(Error::NotFound("Patient 5".into()).to_string(), "Patient 5 not found");
        assert_eq!(
            Error::Conflict("Device with ID 2".into()).to_string(),
            "Device with ID 2 already exists"
        );
    }
}
