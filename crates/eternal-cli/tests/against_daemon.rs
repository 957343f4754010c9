// ABOUTME: CLI commands exercised against a live control socket.
// ABOUTME: Runs the daemon's socket server in-process over a temp state directory.

use eternal_cli::{commands, CliError, Client};
use eternal_core::ipc::Action;
use eternal_core::{enabled, Paths};
use eternal_daemon::socket::{self, ControlState};
use eternal_supervisor::{ProcessStatus, Supervisor};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    _tmp: tempfile::TempDir,
    paths: Paths,
    client: Client,
    supervisor: Supervisor,
    shutdown: CancellationToken,
}

impl Harness {
    fn start() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::at(tmp.path());
        paths.ensure().unwrap();
        let socket_path = tmp.path().join("eternal.sock");

        let supervisor = Supervisor::default();
        let listener = socket::bind(&socket_path).unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(socket::serve(
            listener,
            socket_path.clone(),
            Arc::new(ControlState {
                supervisor: supervisor.clone(),
                paths: paths.clone(),
            }),
            shutdown.clone(),
        ));

        Self {
            _tmp: tmp,
            paths,
            client: Client::new(socket_path),
            supervisor,
            shutdown,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.supervisor.shutdown(Duration::from_secs(5)).await;
    }
}

#[tokio::test]
async fn test_new_registers_with_running_daemon() {
    let h = Harness::start();

    commands::create(&h.paths, &h.client, "web", "sleep 100".into(), None)
        .await
        .unwrap();
    assert_eq!(h.supervisor.names().await, vec!["web".to_string()]);

    let msg = commands::control(&h.client, Action::Start, "web").await.unwrap();
    assert_eq!(msg, "Service web started");
    let msg = commands::control(&h.client, Action::Status, "web").await.unwrap();
    assert_eq!(msg, "running");

    h.stop().await;
}

#[tokio::test]
async fn test_refusal_surfaces_daemon_message() {
    let h = Harness::start();

    let err = commands::control(&h.client, Action::Stop, "ghost")
        .await
        .unwrap_err();
    match err {
        CliError::Rejected(message) => assert_eq!(message, "service ghost not found"),
        other => panic!("unexpected error: {other}"),
    }

    h.stop().await;
}

#[tokio::test]
async fn test_delete_stops_and_forgets_running_service() {
    let h = Harness::start();

    commands::create(&h.paths, &h.client, "web", "sleep 100".into(), None)
        .await
        .unwrap();
    commands::enable(&h.paths, "web").unwrap();
    commands::control(&h.client, Action::Start, "web").await.unwrap();

    let msg = commands::delete(&h.paths, &h.client, "web").await.unwrap();
    assert_eq!(msg, "Service web deleted");

    assert!(h.supervisor.names().await.is_empty());
    assert!(!h.paths.service_file("web").exists());
    assert!(enabled::load_enabled(&h.paths.enabled_file).unwrap().is_empty());

    h.stop().await;
}

#[tokio::test]
async fn test_restart_over_socket_replaces_process() {
    let h = Harness::start();

    commands::create(&h.paths, &h.client, "web", "sleep 100".into(), None)
        .await
        .unwrap();
    commands::control(&h.client, Action::Start, "web").await.unwrap();
    let first = h.supervisor.status("web").await.unwrap().pid;

    let msg = commands::control(&h.client, Action::Restart, "web").await.unwrap();
    assert_eq!(msg, "Service web restarted");

    let snapshot = h.supervisor.status("web").await.unwrap();
    assert_eq!(snapshot.status, ProcessStatus::Running);
    assert_ne!(snapshot.pid, first);

    h.stop().await;
}
