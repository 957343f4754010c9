// ABOUTME: Exit watcher: one background task per launched process.
// ABOUTME: Owns the child, applies signals on request, and reconciles the table on exit.

use crate::process::{Control, ExitOutcome};
use crate::supervisor::Supervisor;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};

/// Spawn the watcher for the process started at `epoch`. The table lock is
/// never held while waiting; it is only taken to apply the outcome.
pub(crate) fn arm(
    supervisor: Supervisor,
    name: String,
    epoch: u64,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<Control>,
    reconciled: watch::Sender<bool>,
) {
    tokio::spawn(async move {
        let result = loop {
            tokio::select! {
                result = child.wait() => break result,
                Some(request) = control.recv() => handle_control(&name, &mut child, request),
            }
        };

        let outcome = ExitOutcome::from_wait(result);
        tracing::debug!(service = %name, epoch, ?outcome, "Process exited");
        supervisor.reconcile(&name, epoch, outcome).await;
        let _ = reconciled.send(true);
    });
}

fn handle_control(name: &str, child: &mut Child, request: Control) {
    match request {
        Control::Terminate { reply } => {
            if let Err(e) = terminate(child) {
                tracing::warn!(service = %name, error = %e, "SIGTERM failed, killing");
                force_kill(name, child);
            }
            let _ = reply.send(());
        }
        Control::Kill { reply } => {
            force_kill(name, child);
            let _ = reply.send(());
        }
    }
}

fn terminate(child: &Child) -> nix::Result<()> {
    // id() is None once the child has been reaped, so a recycled pid is never signalled
    let pid = child.id().ok_or(nix::errno::Errno::ESRCH)?;
    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
}

fn force_kill(name: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        // Already exited; the pending wait will pick it up
        tracing::debug!(service = %name, error = %e, "Kill not delivered");
    }
}
