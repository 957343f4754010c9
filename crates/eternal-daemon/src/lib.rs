// ABOUTME: eternal-daemon library: boot sequence, control socket, and HTTP API.
// ABOUTME: Both front-ends are thin callers into one shared Supervisor.

pub mod api;
pub mod boot;
pub mod server;
pub mod socket;

pub use server::{run, run_until};
