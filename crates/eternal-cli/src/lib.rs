// ABOUTME: eternal CLI library: control socket client and subcommand implementations.
// ABOUTME: The binary in main.rs only parses arguments and prints results.

pub mod client;
pub mod commands;
pub mod error;

pub use client::Client;
pub use error::{CliError, Result};
