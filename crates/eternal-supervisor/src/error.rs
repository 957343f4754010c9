// ABOUTME: Error types for the supervisor.
// ABOUTME: SupervisorError is the failure taxonomy reported to every front-end.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Failures reported by supervisor operations. All are recoverable and none
/// are retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// No service registered under this name.
    #[error("service {0} not found")]
    NotFound(String),

    /// Start requested while the service is running or being launched.
    #[error("service {0} is already running")]
    AlreadyRunning(String),

    /// Stop requested while the service is not running.
    #[error("service {0} is not running")]
    NotRunning(String),

    /// The command line could not be turned into a program and arguments.
    #[error("service {name} has an invalid definition: {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// The OS refused or did not complete the launch.
    #[error("service {name} failed to start: {reason}")]
    LaunchFailed { name: String, reason: String },

    /// Deregistration requested while the service is running.
    #[error("service {0} is still running")]
    StillRunning(String),
}

impl SupervisorError {
    /// Stable machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            SupervisorError::NotFound(_) => "not_found",
            SupervisorError::AlreadyRunning(_) => "already_running",
            SupervisorError::NotRunning(_) => "not_running",
            SupervisorError::InvalidDefinition { .. } => "invalid_definition",
            SupervisorError::LaunchFailed { .. } => "launch_failed",
            SupervisorError::StillRunning(_) => "still_running",
        }
    }
}

/// Why a command line could not be split.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty exec command")]
    Empty,

    #[error("unbalanced quotes or trailing backslash in exec command")]
    Unbalanced,
}
