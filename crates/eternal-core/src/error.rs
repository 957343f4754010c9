// ABOUTME: Error types for the eternal configuration layer.
// ABOUTME: Covers file IO, YAML parsing, and definition validation failures.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while reading or writing eternal's on-disk state.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Filesystem operation failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File contents were not valid YAML for the expected shape.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Serializing a value back to YAML failed.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// A service definition has no command line.
    #[error("exec field is required")]
    MissingExec,

    /// Service names end up as file names, so they are restricted.
    #[error("invalid service name '{0}'")]
    InvalidName(String),

    /// A definition file for this service already exists.
    #[error("service '{0}' already exists")]
    AlreadyExists(String),

    /// No definition file for this service.
    #[error("service '{0}' does not exist")]
    NotFound(String),

    /// Neither $ETERNAL_HOME nor a home directory is available.
    #[error("could not determine home directory")]
    HomeDirUnavailable,
}

impl ConfigError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = ConfigError::io(
            "read",
            "/tmp/missing.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let display = err.to_string();
        assert!(display.contains("failed to read"));
        assert!(display.contains("/tmp/missing.yaml"));
        assert!(display.contains("gone"));
    }

    #[test]
    fn test_validation_error_display() {
        assert_eq!(ConfigError::MissingExec.to_string(), "exec field is required");
        assert_eq!(
            ConfigError::InvalidName("../etc".to_string()).to_string(),
            "invalid service name '../etc'"
        );
        assert_eq!(
            ConfigError::AlreadyExists("web".to_string()).to_string(),
            "service 'web' already exists"
        );
    }
}
