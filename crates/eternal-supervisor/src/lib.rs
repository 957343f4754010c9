// ABOUTME: Process lifecycle supervisor: the table of services and their OS processes.
// ABOUTME: Linearizes start/stop/restart per service and reconciles exits by epoch.

pub mod command;
pub mod error;
mod process;
mod supervisor;
mod watcher;

pub use command::CommandLine;
pub use error::{CommandError, Result, SupervisorError};
pub use process::{ProcessStatus, Snapshot};
pub use supervisor::{Supervisor, SupervisorOptions};
