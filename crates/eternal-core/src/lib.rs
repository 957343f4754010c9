// ABOUTME: Shared types and configuration for the eternal supervisor.
// ABOUTME: Contains definition loading, the enabled list, system config, and protocol types.

pub mod enabled;
pub mod error;
pub mod ipc;
pub mod paths;
pub mod service;
pub mod system;

pub use error::{ConfigError, Result};
pub use paths::Paths;
pub use service::{ServiceConfig, ServiceDefinition};
pub use system::SystemConfig;
