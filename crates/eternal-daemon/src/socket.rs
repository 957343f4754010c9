// ABOUTME: Unix socket control channel for the eternal CLI.
// ABOUTME: Reads one JSON request per connection, dispatches it to the supervisor, writes one response.

use crate::boot;
use anyhow::{bail, Context, Result};
use eternal_core::ipc::{Action, Request, Response};
use eternal_core::Paths;
use eternal_supervisor::{ProcessStatus, Supervisor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Requests larger than this are rejected unread
const MAX_REQUEST_LEN: u64 = 64 * 1024;

/// What the control handlers need
pub struct ControlState {
    pub supervisor: Supervisor,
    pub paths: Paths,
}

/// Bind the control socket, replacing a stale one. Only the owner may connect.
/// Fails if another process is still accepting on `path`.
pub fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {}", parent.display()))?;
    }

    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => bail!("Another daemon is already listening on {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            tracing::debug!(path = %path.display(), "Removing stale control socket");
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to probe socket {}", path.display()))
        }
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to listen on socket {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict socket {}", path.display()))?;
    }
    Ok(listener)
}

/// Accept connections until `shutdown` fires, then remove the socket file.
pub async fn serve(
    listener: UnixListener,
    path: PathBuf,
    state: Arc<ControlState>,
    shutdown: CancellationToken,
) -> Result<()> {
    tracing::info!(path = %path.display(), "Control socket listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept error");
                        continue;
                    }
                };
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &state).await {
                        tracing::warn!(error = %e, "Control connection error");
                    }
                });
            }
        }
    }

    let _ = std::fs::remove_file(&path);
    tracing::info!("Control socket closed");
    Ok(())
}

async fn handle_connection(stream: UnixStream, state: &ControlState) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader).take(MAX_REQUEST_LEN);
    let mut line = String::new();

    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    let response = match serde_json::from_str::<Request>(&line) {
        Ok(request) => handle_request(request, state).await,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected malformed request");
            Response::error(format!("invalid request: {e}"))
        }
    };

    let response_json = serde_json::to_string(&response)? + "\n";
    writer.write_all(response_json.as_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}

/// Dispatch one control request.
pub async fn handle_request(request: Request, state: &ControlState) -> Response {
    let Request { action, service } = request;
    tracing::debug!(%action, service = %service, "Control request");

    if action != Action::Reload && service.is_empty() {
        return Response::error("service name is required");
    }

    let supervisor = &state.supervisor;
    match action {
        Action::Start => match supervisor.start(&service).await {
            Ok(_) => Response::ok(format!("Service {service} started")),
            Err(e) => Response::error(e.to_string()),
        },
        Action::Stop => match supervisor.stop(&service).await {
            Ok(()) => Response::ok(format!("Service {service} stopped")),
            Err(e) => Response::error(e.to_string()),
        },
        Action::Restart => match supervisor.restart(&service).await {
            Ok(_) => Response::ok(format!("Service {service} restarted")),
            Err(e) => Response::error(e.to_string()),
        },
        Action::Status => match supervisor.status(&service).await {
            Ok(snapshot) => match (snapshot.status, snapshot.error) {
                (ProcessStatus::Errored, Some(reason)) => {
                    Response::ok(format!("{}: {reason}", snapshot.status))
                }
                (status, _) => Response::ok(status.to_string()),
            },
            Err(e) => Response::error(e.to_string()),
        },
        Action::Reload => match boot::reload(supervisor, &state.paths).await {
            Ok(added) => Response::ok(format!("Loaded {added} new service(s)")),
            Err(e) => Response::error(e.to_string()),
        },
        Action::Remove => match supervisor.deregister(&service).await {
            Ok(()) => Response::ok(format!("Service {service} removed")),
            Err(e) => Response::error(e.to_string()),
        },
    }
}
