// ABOUTME: The Supervisor: owner of the process table and its mutation protocol.
// ABOUTME: Every table access happens under one short-lived lock; spawning and waiting happen outside it.

use crate::command::CommandLine;
use crate::error::{Result, SupervisorError};
use crate::process::{ExitOutcome, ManagedProcess, ProcessHandle, ProcessStatus, Snapshot, StopTicket};
use crate::watcher;
use chrono::Utc;
use eternal_core::ServiceDefinition;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, RwLock};

/// Timeouts applied by the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// A launch that has not produced a process by then fails with `LaunchFailed`
    pub launch_timeout: Duration,
    /// Restart waits this long for the old process before killing it
    pub stop_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

struct Inner {
    table: RwLock<HashMap<String, ManagedProcess>>,
    options: SupervisorOptions,
}

/// Cheap to clone; all clones share one table. Construct once at startup and
/// hand a clone to each front-end.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorOptions::default())
    }
}

impl Supervisor {
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: RwLock::new(HashMap::new()),
                options,
            }),
        }
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.inner.options
    }

    /// Add a service in `stopped` state. Returns false (and changes nothing)
    /// if the name is already registered.
    pub async fn register(&self, definition: ServiceDefinition) -> bool {
        let mut table = self.inner.table.write().await;
        if table.contains_key(&definition.name) {
            return false;
        }
        tracing::debug!(service = %definition.name, "Registered service");
        table.insert(definition.name.clone(), ManagedProcess::new(definition));
        true
    }

    /// Register many definitions, returning how many were new.
    pub async fn register_all(&self, definitions: impl IntoIterator<Item = ServiceDefinition>) -> usize {
        let mut added = 0;
        for definition in definitions {
            if self.register(definition).await {
                added += 1;
            }
        }
        added
    }

    /// Remove a service that is not running.
    pub async fn deregister(&self, name: &str) -> Result<()> {
        let mut table = self.inner.table.write().await;
        let record = table
            .get(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        if record.is_active() {
            return Err(SupervisorError::StillRunning(name.to_string()));
        }
        table.remove(name);
        tracing::info!(service = %name, "Deregistered service");
        Ok(())
    }

    /// Launch the service's process. Returns once the OS has accepted the
    /// launch; the process is then watched in the background.
    pub async fn start(&self, name: &str) -> Result<Snapshot> {
        // Reserve the slot so concurrent starts fail fast while we spawn unlocked
        let (command, dir, epoch) = {
            let mut table = self.inner.table.write().await;
            let record = table
                .get_mut(name)
                .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
            if record.is_active() {
                return Err(SupervisorError::AlreadyRunning(name.to_string()));
            }
            let command = CommandLine::parse(&record.definition.exec).map_err(|e| {
                SupervisorError::InvalidDefinition {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            record.epoch += 1;
            record.launching = true;
            (command, record.definition.dir.clone(), record.epoch)
        };

        // Launch and install outlive this future; dropping it must not leave
        // `launching` set
        let supervisor = self.clone();
        let owned_name = name.to_string();
        let task = tokio::spawn(async move {
            supervisor
                .launch_and_install(&owned_name, command, dir, epoch)
                .await
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                let reason = format!("launch task failed: {e}");
                self.abandon_launch(name, epoch, &reason).await;
                Err(SupervisorError::LaunchFailed {
                    name: name.to_string(),
                    reason,
                })
            }
        }
    }

    async fn launch_and_install(
        &self,
        name: &str,
        command: CommandLine,
        dir: Option<PathBuf>,
        epoch: u64,
    ) -> Result<Snapshot> {
        let launched = launch(command, dir, self.inner.options.launch_timeout).await;

        let mut table = self.inner.table.write().await;
        // launching blocks deregister, so the slot is still here
        let Some(record) = table.get_mut(name) else {
            return Err(SupervisorError::NotFound(name.to_string()));
        };
        record.launching = false;

        let child = match launched {
            Ok(child) => child,
            Err(reason) => {
                tracing::warn!(service = %name, error = %reason, "Failed to start service");
                record.status = ProcessStatus::Errored;
                record.error = Some(reason.clone());
                return Err(SupervisorError::LaunchFailed {
                    name: name.to_string(),
                    reason,
                });
            }
        };

        let pid = child.id();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (reconciled_tx, reconciled_rx) = watch::channel(false);
        record.handle = Some(ProcessHandle {
            epoch,
            pid,
            started_at: Utc::now(),
            stop_requested: false,
            control: control_tx,
            reconciled: reconciled_rx,
        });
        record.status = ProcessStatus::Running;
        record.error = None;
        let snapshot = record.snapshot(name);
        drop(table);

        tracing::info!(service = %name, pid = ?pid, epoch, "Started service");
        watcher::arm(self.clone(), name.to_string(), epoch, child, control_rx, reconciled_tx);
        Ok(snapshot)
    }

    /// Release a reservation whose launch task died before installing.
    async fn abandon_launch(&self, name: &str, epoch: u64, reason: &str) {
        let mut table = self.inner.table.write().await;
        if let Some(record) = table.get_mut(name) {
            if record.launching && record.epoch == epoch {
                tracing::warn!(service = %name, error = %reason, "Failed to start service");
                record.launching = false;
                record.status = ProcessStatus::Errored;
                record.error = Some(reason.to_string());
            }
        }
    }

    /// Ask the service's process to terminate. Returns after the signal is
    /// delivered; the status changes once the exit is reconciled.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let ticket = self.request_stop(name).await?;
        ticket.terminate().await;
        tracing::info!(service = %name, "Stop requested");
        Ok(())
    }

    /// Stop (waiting for the old process to be reconciled) and start again.
    /// A service that is not running is simply started.
    pub async fn restart(&self, name: &str) -> Result<Snapshot> {
        match self.request_stop(name).await {
            Ok(mut ticket) => {
                ticket.terminate().await;
                if !ticket.reconciled_within(self.inner.options.stop_timeout).await {
                    tracing::warn!(
                        service = %name,
                        timeout = ?self.inner.options.stop_timeout,
                        "Service did not exit in time, killing"
                    );
                    ticket.kill().await;
                    ticket.reconciled().await;
                }
            }
            Err(SupervisorError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }
        self.start(name).await
    }

    /// Current status of one service.
    pub async fn status(&self, name: &str) -> Result<Snapshot> {
        let table = self.inner.table.read().await;
        table
            .get(name)
            .map(|record| record.snapshot(name))
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))
    }

    /// Status of every service, taken under a single lock acquisition.
    pub async fn list(&self) -> Vec<Snapshot> {
        let table = self.inner.table.read().await;
        let mut snapshots: Vec<Snapshot> = table
            .iter()
            .map(|(name, record)| record.snapshot(name))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub async fn names(&self) -> Vec<String> {
        let table = self.inner.table.read().await;
        let mut names: Vec<String> = table.keys().cloned().collect();
        names.sort();
        names
    }

    /// Wait (bounded) for a running service's exit to be reconciled, then
    /// return its status. Returns immediately if it is not running.
    pub async fn wait_settled(&self, name: &str, timeout: Duration) -> Result<Snapshot> {
        let ticket = {
            let table = self.inner.table.read().await;
            let record = table
                .get(name)
                .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
            record.handle.as_ref().map(ProcessHandle::ticket)
        };
        if let Some(mut ticket) = ticket {
            ticket.reconciled_within(timeout).await;
        }
        self.status(name).await
    }

    /// Best-effort teardown: stop everything that is running, wait up to
    /// `timeout` for the exits, then kill whatever remains.
    pub async fn shutdown(&self, timeout: Duration) {
        let tickets: Vec<(String, StopTicket)> = {
            let mut table = self.inner.table.write().await;
            table
                .iter_mut()
                .filter_map(|(name, record)| {
                    let handle = record.handle.as_mut()?;
                    handle.stop_requested = true;
                    Some((name.clone(), handle.ticket()))
                })
                .collect()
        };
        if tickets.is_empty() {
            return;
        }
        tracing::info!(count = tickets.len(), "Stopping services");

        futures::future::join_all(tickets.into_iter().map(|(name, mut ticket)| async move {
            ticket.terminate().await;
            if !ticket.reconciled_within(timeout).await {
                tracing::warn!(service = %name, "Service did not exit in time, killing");
                ticket.kill().await;
                ticket.reconciled_within(timeout).await;
            }
        }))
        .await;
    }

    /// Mark the running handle as deliberately stopped and hand back what is
    /// needed to signal it outside the lock.
    async fn request_stop(&self, name: &str) -> Result<StopTicket> {
        let mut table = self.inner.table.write().await;
        let record = table
            .get_mut(name)
            .ok_or_else(|| SupervisorError::NotFound(name.to_string()))?;
        match record.handle.as_mut() {
            Some(handle) if record.status == ProcessStatus::Running => {
                handle.stop_requested = true;
                Ok(handle.ticket())
            }
            _ => Err(SupervisorError::NotRunning(name.to_string())),
        }
    }

    /// Apply a watcher's result. Only the watcher whose epoch matches the
    /// installed handle may touch the record; anything else is stale and is
    /// dropped. Returns whether the record was updated.
    pub(crate) async fn reconcile(&self, name: &str, epoch: u64, outcome: ExitOutcome) -> bool {
        let mut table = self.inner.table.write().await;
        let Some(record) = table.get_mut(name) else {
            tracing::debug!(service = %name, epoch, "Discarding exit of removed service");
            return false;
        };
        let stop_requested = match record.handle.as_ref() {
            Some(handle) if handle.epoch == epoch => handle.stop_requested,
            _ => {
                tracing::debug!(service = %name, epoch, current = record.epoch, "Discarding stale exit");
                return false;
            }
        };
        record.handle = None;

        match outcome {
            ExitOutcome::Clean => {
                record.status = ProcessStatus::Stopped;
                record.error = None;
                tracing::info!(service = %name, "Service exited");
            }
            // A deliberate stop is not a failure, whatever signal it took
            ExitOutcome::Failed(_) if stop_requested => {
                record.status = ProcessStatus::Stopped;
                record.error = None;
                tracing::info!(service = %name, "Service stopped");
            }
            ExitOutcome::Failed(reason) => {
                tracing::warn!(service = %name, reason = %reason, "Service failed");
                record.status = ProcessStatus::Errored;
                record.error = Some(reason);
            }
        }
        true
    }
}

/// Spawn the process off the async threads, bounded by `timeout`. On timeout
/// the late child, if any, is dropped and killed (`kill_on_drop`).
async fn launch(command: CommandLine, dir: Option<PathBuf>, timeout: Duration) -> std::result::Result<Child, String> {
    let task = tokio::task::spawn_blocking(move || {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &dir {
            cmd.current_dir(dir);
        }
        cmd.spawn()
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(child))) => Ok(child),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Err(e)) => Err(format!("launch task failed: {e}")),
        Err(_) => Err(format!("launch timed out after {}s", timeout.as_secs_f32())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, exec: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            exec: exec.to_string(),
            dir: None,
        }
    }

    async fn current_epoch(supervisor: &Supervisor, name: &str) -> u64 {
        supervisor.inner.table.read().await[name].epoch
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let supervisor = Supervisor::default();
        assert!(supervisor.register(definition("a", "sleep 1")).await);
        assert!(!supervisor.register(definition("a", "sleep 2")).await);

        let table = supervisor.inner.table.read().await;
        assert_eq!(table.len(), 1);
        assert_eq!(table["a"].definition.exec, "sleep 1");
    }

    #[tokio::test]
    async fn test_epoch_increments_per_start() {
        let supervisor = Supervisor::default();
        supervisor.register(definition("a", "sleep 30")).await;

        supervisor.start("a").await.unwrap();
        assert_eq!(current_epoch(&supervisor, "a").await, 1);

        supervisor.restart("a").await.unwrap();
        assert_eq!(current_epoch(&supervisor, "a").await, 2);

        supervisor.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_reconcile_with_wrong_epoch_is_ignored() {
        let supervisor = Supervisor::default();
        supervisor.register(definition("a", "sleep 30")).await;
        supervisor.start("a").await.unwrap();

        let applied = supervisor
            .reconcile("a", 0, ExitOutcome::Failed("stale".to_string()))
            .await;
        assert!(!applied);

        let snap = supervisor.status("a").await.unwrap();
        assert_eq!(snap.status, ProcessStatus::Running);
        assert_eq!(snap.error, None);

        supervisor.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_late_watcher_does_not_clobber_new_handle() {
        let supervisor = Supervisor::default();
        supervisor.register(definition("a", "sleep 30")).await;

        // H1 is detached from the table as if its exit had already been
        // reconciled, but its process (and real watcher) are still alive
        let first = supervisor.start("a").await.unwrap();
        let first_pid = first.pid.unwrap();
        assert!(supervisor.reconcile("a", 1, ExitOutcome::Clean).await);
        assert_eq!(supervisor.status("a").await.unwrap().status, ProcessStatus::Stopped);

        let second = supervisor.start("a").await.unwrap();
        assert_ne!(second.pid, first.pid);

        // Now H1 dies and its watcher fires late
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(first_pid as i32),
            nix::sys::signal::Signal::SIGKILL,
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let snap = supervisor.status("a").await.unwrap();
        assert_eq!(snap.status, ProcessStatus::Running);
        assert_eq!(snap.pid, second.pid);
        assert_eq!(snap.error, None);

        supervisor.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_dropped_start_still_completes_launch() {
        let supervisor = Supervisor::default();
        supervisor.register(definition("a", "sleep 30")).await;

        let mut fut = Box::pin(supervisor.start("a"));
        let _ = futures::poll!(fut.as_mut());
        drop(fut);

        let mut snap = supervisor.status("a").await.unwrap();
        for _ in 0..50 {
            if snap.status == ProcessStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            snap = supervisor.status("a").await.unwrap();
        }
        assert_eq!(snap.status, ProcessStatus::Running);
        assert!(snap.pid.is_some());
        assert!(!supervisor.inner.table.read().await["a"].launching);

        // The slot behaves normally afterwards
        assert_eq!(
            supervisor.start("a").await,
            Err(SupervisorError::AlreadyRunning("a".to_string()))
        );
        supervisor.stop("a").await.unwrap();
        let snap = supervisor
            .wait_settled("a", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(snap.status, ProcessStatus::Stopped);
        supervisor.start("a").await.unwrap();

        supervisor.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_abandoned_launch_releases_slot() {
        let supervisor = Supervisor::default();
        supervisor.register(definition("a", "sleep 30")).await;
        {
            let mut table = supervisor.inner.table.write().await;
            let record = table.get_mut("a").unwrap();
            record.epoch = 1;
            record.launching = true;
        }

        // A different epoch is not ours to release
        supervisor.abandon_launch("a", 2, "lost").await;
        assert!(supervisor.inner.table.read().await["a"].launching);

        supervisor.abandon_launch("a", 1, "lost").await;
        let snap = supervisor.status("a").await.unwrap();
        assert_eq!(snap.status, ProcessStatus::Errored);
        assert_eq!(snap.error.as_deref(), Some("lost"));
        supervisor.deregister("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_after_deregister_is_ignored() {
        let supervisor = Supervisor::default();
        supervisor.register(definition("a", "true")).await;
        supervisor.deregister("a").await.unwrap();
        assert!(!supervisor.reconcile("a", 1, ExitOutcome::Clean).await);
    }

    #[tokio::test]
    async fn test_failure_after_stop_request_counts_as_stopped() {
        let supervisor = Supervisor::default();
        supervisor.register(definition("a", "sleep 30")).await;
        supervisor.start("a").await.unwrap();
        supervisor.request_stop("a").await.unwrap();

        let applied = supervisor
            .reconcile("a", 1, ExitOutcome::Failed("signal: 15 (SIGTERM)".to_string()))
            .await;
        assert!(applied);
        let snap = supervisor.status("a").await.unwrap();
        assert_eq!(snap.status, ProcessStatus::Stopped);
        assert_eq!(snap.error, None);
        assert_eq!(snap.pid, None);
    }

    #[tokio::test]
    async fn test_launch_timeout_reports_failure() {
        let err = launch(
            CommandLine::parse("sleep 1").unwrap(),
            None,
            Duration::from_nanos(1),
        )
        .await;
        // Either the spawn won the race or the timeout fired; a timeout must
        // read as a launch failure
        if let Err(reason) = err {
            assert!(reason.contains("timed out"), "{reason}");
        }
    }
}
