// ABOUTME: Control socket client.
// ABOUTME: One connection per request: write a JSON line, read a JSON line back.

use crate::error::{CliError, Result};
use eternal_core::ipc::{Action, Request, Response};
use eternal_core::system::DEFAULT_SOCKET_PATH;
use eternal_core::{Paths, SystemConfig};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Socket path from config.yaml, or the default when there is no usable config
pub fn socket_path(paths: &Paths) -> PathBuf {
    match SystemConfig::load(&paths.config_file) {
        Ok(config) => config.socket_path,
        Err(e) => {
            tracing::debug!(error = %e, "Using default socket path");
            PathBuf::from(DEFAULT_SOCKET_PATH)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    socket: PathBuf,
}

impl Client {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send a request and return the raw response
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| CliError::Connect {
                path: self.socket.clone(),
                source: e,
            })?;
        let (reader, mut writer) = stream.into_split();

        let request_json = serde_json::to_string(request)? + "\n";
        writer.write_all(request_json.as_bytes()).await?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(CliError::NoResponse);
        }

        Ok(serde_json::from_str(&line)?)
    }

    /// Send a request; a refusal from the daemon becomes `CliError::Rejected`
    pub async fn call(&self, action: Action, service: &str) -> Result<String> {
        let response = self.send(&Request::new(action, service)).await?;
        if response.success {
            Ok(response.message)
        } else {
            Err(CliError::Rejected(response.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_socket_is_connect_error() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Client::new(tmp.path().join("nope.sock"));
        let err = client.call(Action::Status, "web").await.unwrap_err();
        assert!(matches!(err, CliError::Connect { .. }));
    }

    #[test]
    fn test_socket_path_from_config() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::at(tmp.path());
        assert_eq!(socket_path(&paths), PathBuf::from(DEFAULT_SOCKET_PATH));

        let mut config = SystemConfig::generate();
        config.socket_path = tmp.path().join("custom.sock");
        config.save(&paths.config_file).unwrap();
        assert_eq!(socket_path(&paths), tmp.path().join("custom.sock"));
    }
}
