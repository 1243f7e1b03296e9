//! Error handling for the Discharge Service
//!
//! Each layer owns a narrow error enum; `DischSrvError` wraps them for the
//! service boundary.

use thiserror::Error;

use crate::core::measurement::ReadError;
use crate::core::profile::ProfileError;
use crate::core::protocol::ParseError;
use crate::core::session::{PersistenceError, ReportError};
use crate::core::transport::TransportError;

/// Discharge Service Error Type
#[derive(Error, Debug, Clone)]
pub enum DischSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Link to the instrument failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Instrument reply could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Measurement acquisition failed
    #[error("Measurement error: {0}")]
    Measurement(#[from] ReadError),

    /// Profile rejected or missing
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Session store failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Report generation failed
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Operation not allowed in the controller's current state
    #[error("State error: {0}")]
    StateError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type alias for the Discharge Service
pub type Result<T> = std::result::Result<T, DischSrvError>;

impl DischSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        DischSrvError::ConfigError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        DischSrvError::StateError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        DischSrvError::IoError(msg.into())
    }
}

impl From<std::io::Error> for DischSrvError {
    fn from(err: std::io::Error) -> Self {
        DischSrvError::IoError(err.to_string())
    }
}

impl From<figment::Error> for DischSrvError {
    fn from(err: figment::Error) -> Self {
        DischSrvError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_errors_convert() {
        let err: DischSrvError = TransportError::Timeout("no reply".to_string()).into();
        assert!(matches!(err, DischSrvError::Transport(_)));
        assert!(err.to_string().contains("no reply"));

        let err: DischSrvError = ProfileError::NotFound("Default CC".to_string()).into();
        assert_eq!(err.to_string(), "Profile error: Profile 'Default CC' not found");
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(
            DischSrvError::state("already running"),
            DischSrvError::StateError(_)
        ));
        assert!(DischSrvError::config("port").to_string().starts_with("Configuration error"));
    }
}
