// ABOUTME: Per-service records held in the process table.
// ABOUTME: ManagedProcess owns the optional live handle; Snapshot is the copy handed to callers.

use chrono::{DateTime, Utc};
use eternal_core::ServiceDefinition;
use serde::Serialize;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Stopped,
    Running,
    Errored,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Running => "running",
            ProcessStatus::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of one table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub status: ProcessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Requests delivered to the exit watcher that owns the child.
pub(crate) enum Control {
    /// SIGTERM, falling back to SIGKILL if delivery fails
    Terminate { reply: oneshot::Sender<()> },
    /// SIGKILL
    Kill { reply: oneshot::Sender<()> },
}

/// How a watched process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitOutcome {
    Clean,
    Failed(String),
}

impl ExitOutcome {
    pub(crate) fn from_wait(result: std::io::Result<ExitStatus>) -> Self {
        match result {
            Ok(status) if status.success() => ExitOutcome::Clean,
            Ok(status) => ExitOutcome::Failed(status.to_string()),
            Err(e) => ExitOutcome::Failed(format!("failed to wait for process: {e}")),
        }
    }
}

/// The live half of a running service. The child itself is owned by its
/// watcher task; the table only keeps the means to reach it.
pub(crate) struct ProcessHandle {
    /// Epoch of the start that created this handle
    pub epoch: u64,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub stop_requested: bool,
    pub control: mpsc::UnboundedSender<Control>,
    /// Flips to true once the watcher has reconciled this handle's exit
    pub reconciled: watch::Receiver<bool>,
}

impl ProcessHandle {
    pub(crate) fn ticket(&self) -> StopTicket {
        StopTicket {
            control: self.control.clone(),
            reconciled: self.reconciled.clone(),
        }
    }
}

/// What a caller needs to signal a process and wait for its reconciliation
/// without holding the table lock.
pub(crate) struct StopTicket {
    control: mpsc::UnboundedSender<Control>,
    reconciled: watch::Receiver<bool>,
}

impl StopTicket {
    /// Deliver SIGTERM. Returns once the signal has been sent, or at once if
    /// the watcher has already finished.
    pub(crate) async fn terminate(&self) {
        let (reply, rx) = oneshot::channel();
        if self.control.send(Control::Terminate { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    pub(crate) async fn kill(&self) {
        let (reply, rx) = oneshot::channel();
        if self.control.send(Control::Kill { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Wait until the watcher has applied its reconciliation. A dropped
    /// watcher counts as done.
    pub(crate) async fn reconciled(&mut self) {
        let _ = self.reconciled.wait_for(|done| *done).await;
    }

    /// Like `reconciled` but bounded; returns false on timeout.
    pub(crate) async fn reconciled_within(&mut self, timeout: std::time::Duration) -> bool {
        tokio::time::timeout(timeout, self.reconciled()).await.is_ok()
    }
}

/// One service's slot in the table.
pub(crate) struct ManagedProcess {
    pub definition: Arc<ServiceDefinition>,
    pub status: ProcessStatus,
    pub error: Option<String>,
    /// Bumped by every start; watchers compare against the handle's epoch
    pub epoch: u64,
    /// A start has reserved this slot and is spawning outside the lock
    pub launching: bool,
    pub handle: Option<ProcessHandle>,
}

impl ManagedProcess {
    pub(crate) fn new(definition: ServiceDefinition) -> Self {
        Self {
            definition: Arc::new(definition),
            status: ProcessStatus::Stopped,
            error: None,
            epoch: 0,
            launching: false,
            handle: None,
        }
    }

    /// Running, or about to be: neither may be started again nor removed.
    pub(crate) fn is_active(&self) -> bool {
        self.launching || self.status == ProcessStatus::Running
    }

    pub(crate) fn snapshot(&self, name: &str) -> Snapshot {
        Snapshot {
            name: name.to_string(),
            status: self.status,
            error: self.error.clone(),
            pid: self.handle.as_ref().and_then(|h| h.pid),
            started_at: self.handle.as_ref().map(|h| h.started_at),
        }
    }
}
