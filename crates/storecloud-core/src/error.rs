//! Error types module
//!
//! Every driver translates its backend-native failures into `StorageError`
//! before returning, so callers only ever branch on `ErrorKind`.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected outcomes like a key that does not resolve
    Debug,
    /// Warning level - for caller mistakes like invalid arguments
    Warn,
    /// Error level - for unexpected backend failures
    Error,
}

/// Coarse error taxonomy shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    AlreadyExists,
    BackendFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Property {name} is {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Storage backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend {
            message: message.into(),
            source: None,
        }
    }

    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StorageError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::InvalidArgument(_) | StorageError::TypeMismatch { .. } => {
                ErrorKind::InvalidArgument
            }
            StorageError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound => ErrorKind::NotFound,
            StorageError::Backend { .. } | StorageError::Io(_) | StorageError::Config(_) => {
                ErrorKind::BackendFailure
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Machine-readable error code (e.g., "NOT_FOUND")
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::NotFound(_) => "NOT_FOUND",
            StorageError::InvalidArgument(_) => "INVALID_ARGUMENT",
            StorageError::AlreadyExists(_) => "ALREADY_EXISTS",
            StorageError::TypeMismatch { .. } => "PROPERTY_TYPE_MISMATCH",
            StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound => "NOT_FOUND",
            StorageError::Backend { .. } | StorageError::Io(_) => "BACKEND_FAILURE",
            StorageError::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    pub fn log_level(&self) -> LogLevel {
        match self.kind() {
            ErrorKind::NotFound => LogLevel::Debug,
            ErrorKind::InvalidArgument | ErrorKind::AlreadyExists => LogLevel::Warn,
            ErrorKind::BackendFailure => LogLevel::Error,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::backend_with_source(format!("Metadata serialization error: {}", err), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_debug_level() {
        let err = StorageError::NotFound("/missing".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.log_level(), LogLevel::Debug);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_not_found_maps_to_not_found_kind() {
        let err = StorageError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = StorageError::from(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert_eq!(err.kind(), ErrorKind::BackendFailure);
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_type_mismatch_is_invalid_argument() {
        let err = StorageError::TypeMismatch {
            name: "cm:title".to_string(),
            expected: "integer",
            found: "string",
        };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "Property cm:title is string, expected integer");
    }

    #[test]
    fn test_backend_error_keeps_source() {
        let io = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let err = StorageError::backend_with_source("write failed", io);
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "disk on fire");
        assert_eq!(err.error_code(), "BACKEND_FAILURE");
    }
}
