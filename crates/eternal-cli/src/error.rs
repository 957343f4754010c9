// ABOUTME: Error types for the eternal CLI.
// ABOUTME: Separates "daemon unreachable" from "daemon said no" from local config failures.

use eternal_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("cannot reach eternal daemon at {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("control socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed daemon response: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("daemon closed the connection without replying")]
    NoResponse,

    /// The daemon processed the request and refused it
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
