//! Error types and handling for Galvani
//!
//! This module defines the error types used throughout the crate,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Galvani operations
pub type Result<T> = std::result::Result<T, GalvaniError>;

/// Main error type for Galvani
#[derive(Debug, Error)]
pub enum GalvaniError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Telemetry subscription/delivery errors
    #[error("Telemetry error: {message}")]
    Telemetry { message: String },

    /// Internal channel errors (closed or rejected hand-offs)
    #[error("Channel error: {message}")]
    Channel { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl GalvaniError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GalvaniError::Config {
            message: message.into(),
        }
    }

    /// Create a new telemetry error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        GalvaniError::Telemetry {
            message: message.into(),
        }
    }

    /// Create a new channel error
    pub fn channel<S: Into<String>>(message: S) -> Self {
        GalvaniError::Channel {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        GalvaniError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        GalvaniError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        GalvaniError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for GalvaniError {
    fn from(err: std::io::Error) -> Self {
        GalvaniError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for GalvaniError {
    fn from(err: serde_yaml::Error) -> Self {
        GalvaniError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GalvaniError {
    fn from(err: serde_json::Error) -> Self {
        GalvaniError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GalvaniError::config("test config error");
        assert!(matches!(err, GalvaniError::Config { .. }));

        let err = GalvaniError::telemetry("test telemetry error");
        assert!(matches!(err, GalvaniError::Telemetry { .. }));

        let err = GalvaniError::validation("field", "test validation error");
        assert!(matches!(err, GalvaniError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = GalvaniError::config("test error");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Configuration error: test error");

        let err = GalvaniError::validation("max_data_age_sec", "must be positive");
        let error_string = format!("{}", err);
        assert_eq!(
            error_string,
            "Validation error: max_data_age_sec - must be positive"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GalvaniError = io_err.into();
        assert!(matches!(err, GalvaniError::Io { .. }));
    }
}
