// ABOUTME: Implementations of the eternal subcommands.
// ABOUTME: Each returns the line to print on success.

use crate::client::Client;
use crate::error::Result;
use eternal_core::ipc::Action;
use eternal_core::{enabled, service, ConfigError, Paths, ServiceConfig};
use std::time::Duration;

/// How long `delete` waits for a stopped service to exit before removing it
const DELETE_SETTLE_TIMEOUT: Duration = Duration::from_secs(10);
const DELETE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// start / stop / restart / status: forwarded to the daemon as-is
pub async fn control(client: &Client, action: Action, name: &str) -> Result<String> {
    client.call(action, name).await
}

pub fn enable(paths: &Paths, name: &str) -> Result<String> {
    service::validate_name(name)?;
    if !paths.service_file(name).exists() {
        return Err(ConfigError::NotFound(name.to_string()).into());
    }
    enabled::enable(&paths.enabled_file, name)?;
    Ok(format!("Service {name} enabled"))
}

pub fn disable(paths: &Paths, name: &str) -> Result<String> {
    enabled::disable(&paths.enabled_file, name)?;
    Ok(format!("Service {name} disabled"))
}

/// Write a definition and ask a running daemon to pick it up
pub async fn create(
    paths: &Paths,
    client: &Client,
    name: &str,
    exec: String,
    dir: Option<String>,
) -> Result<String> {
    service::create_definition(&paths.services_dir, name, &ServiceConfig { exec, dir })?;

    if let Err(e) = client.call(Action::Reload, "").await {
        tracing::debug!(error = %e, "Daemon not notified of new service");
    }
    Ok(format!("Service {name} created"))
}

/// Stop and forget the service in the daemon if it is up, then remove it from disk
pub async fn delete(paths: &Paths, client: &Client, name: &str) -> Result<String> {
    service::validate_name(name)?;

    match client.call(Action::Stop, name).await {
        Ok(_) => wait_until_not_running(client, name).await,
        Err(e) => tracing::debug!(service = %name, error = %e, "Stop skipped"),
    }
    if let Err(e) = client.call(Action::Remove, name).await {
        tracing::debug!(service = %name, error = %e, "Remove skipped");
    }

    enabled::disable(&paths.enabled_file, name)?;
    service::delete_definition(&paths.services_dir, name)?;
    Ok(format!("Service {name} deleted"))
}

async fn wait_until_not_running(client: &Client, name: &str) {
    let deadline = tokio::time::Instant::now() + DELETE_SETTLE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        match client.call(Action::Status, name).await {
            Ok(status) if status == "running" => {
                tokio::time::sleep(DELETE_POLL_INTERVAL).await;
            }
            _ => return,
        }
    }
    tracing::warn!(service = %name, "Service still running after stop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    fn setup() -> (tempfile::TempDir, Paths, Client) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::at(tmp.path());
        paths.ensure().unwrap();
        // nothing listens here, so every daemon call is skipped
        let client = Client::new(tmp.path().join("absent.sock"));
        (tmp, paths, client)
    }

    #[test]
    fn test_enable_requires_definition() {
        let (_tmp, paths, _client) = setup();
        let err = enable(&paths, "web").unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::NotFound(_))));

        std::fs::write(paths.service_file("web"), "exec: sleep 1\n").unwrap();
        assert_eq!(enable(&paths, "web").unwrap(), "Service web enabled");
        assert_eq!(enabled::load_enabled(&paths.enabled_file).unwrap(), vec!["web"]);

        disable(&paths, "web").unwrap();
        assert!(enabled::load_enabled(&paths.enabled_file).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_delete_without_daemon() {
        let (_tmp, paths, client) = setup();

        let msg = create(&paths, &client, "web", "sleep 100".into(), Some("/tmp".into()))
            .await
            .unwrap();
        assert_eq!(msg, "Service web created");
        assert!(paths.service_file("web").exists());

        let err = create(&paths, &client, "web", "sleep 100".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::AlreadyExists(_))));

        enable(&paths, "web").unwrap();
        let msg = delete(&paths, &client, "web").await.unwrap();
        assert_eq!(msg, "Service web deleted");
        assert!(!paths.service_file("web").exists());
        assert!(enabled::load_enabled(&paths.enabled_file).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (_tmp, paths, client) = setup();
        let err = create(&paths, &client, "a/b", "true".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::InvalidName(_))));

        let err = create(&paths, &client, "web", "  ".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::MissingExec)));
    }
}
