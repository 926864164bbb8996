//! Error handling module for srvupgrade
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Scriptlet hooks return `anyhow::Result` and are wrapped into
//! [`UpgradeError::StepFailed`] by the upgrader.

use std::path::PathBuf;

use thiserror::Error;

use crate::version::Position;

/// Main error type for srvupgrade
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// IO errors (tracker file, backups, discovery)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed version string
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// Tracker file could not be read or updated
    #[error("Tracker error: {0}")]
    Tracker(String),

    /// Scriptlet catalog errors (duplicate positions, bad scriptlet files)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Upgrade state machine transition errors
    #[error("Upgrade transition error: {0}")]
    Transition(String),

    /// A single upgrade step failed; the tracker still points before it
    #[error("Upgrade failed in {instance} at {position}: {source}")]
    StepFailed {
        instance: String,
        position: Position,
        #[source]
        source: anyhow::Error,
    },

    /// Post-run validation found steps that were not applied
    #[error("Upgrade incomplete: see {}", log_file.display())]
    Incomplete { log_file: PathBuf },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for srvupgrade operations
pub type Result<T> = std::result::Result<T, UpgradeError>;

// Convenient error constructors
impl UpgradeError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid version error
    pub fn invalid_version(msg: impl Into<String>) -> Self {
        Self::InvalidVersion(msg.into())
    }

    /// Create a tracker error
    pub fn tracker(msg: impl Into<String>) -> Self {
        Self::Tracker(msg.into())
    }

    /// Create a catalog error
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Create a transition error
    pub fn transition(msg: impl Into<String>) -> Self {
        Self::Transition(msg.into())
    }

    /// Returns true if this error came from a failed upgrade step
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::StepFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    #[test]
    fn test_error_display() {
        let err = UpgradeError::config("missing upgrade_dir");
        assert_eq!(err.to_string(), "Configuration error: missing upgrade_dir");

        let err = UpgradeError::invalid_version("1..2");
        assert_eq!(err.to_string(), "Invalid version: 1..2");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: UpgradeError = io_err.into();
        assert!(matches!(err, UpgradeError::Io(_)));
    }

    #[test]
    fn test_step_failed_names_instance_and_cause() {
        let err = UpgradeError::StepFailed {
            instance: "pki-tomcat".to_string(),
            position: Position::new(Version::parse("1.0").unwrap(), 3),
            source: anyhow::anyhow!("disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("pki-tomcat"));
        assert!(msg.contains("1.0/3"));
        assert!(msg.contains("disk full"));
        assert!(err.is_step_failure());
    }

    #[test]
    fn test_incomplete_names_log_file() {
        let err = UpgradeError::Incomplete {
            log_file: PathBuf::from("/var/log/srvupgrade/server-upgrade-1.1.log"),
        };
        assert_eq!(
            err.to_string(),
            "Upgrade incomplete: see /var/log/srvupgrade/server-upgrade-1.1.log"
        );
        assert!(!err.is_step_failure());
    }
}
