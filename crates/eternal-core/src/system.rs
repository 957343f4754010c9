// ABOUTME: Daemon-wide settings stored in config.yaml.
// ABOUTME: Generates the HTTP API token on first run and fills defaults for missing fields.

use crate::error::{ConfigError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Length of a generated API token
pub const TOKEN_LEN: usize = 20;

/// Default control socket location
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/eternal.sock";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemConfig {
    /// Shared secret for the HTTP API
    pub token: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// HTTP API bind address
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Control socket path
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Upper bound on how long a launch may take before it counts as failed
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,

    /// How long restart/shutdown wait for a graceful exit before killing
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_api_port() -> u16 {
    9093
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_launch_timeout_secs() -> u64 {
    10
}

fn default_stop_timeout_secs() -> u64 {
    10
}

impl SystemConfig {
    /// Fresh config with a newly generated token
    pub fn generate() -> Self {
        Self {
            token: generate_token(TOKEN_LEN),
            api_port: default_api_port(),
            api_host: default_api_host(),
            socket_path: default_socket_path(),
            launch_timeout_secs: default_launch_timeout_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }

    /// Read the system config, or generate and persist one if the file is missing.
    /// An existing but unreadable file is an error; it is never overwritten.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: SystemConfig =
                    serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                if config.token.trim().is_empty() {
                    let mut config = config;
                    config.token = generate_token(TOKEN_LEN);
                    config.save(path)?;
                    return Ok(config);
                }
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::generate();
                config.save(path)?;
                tracing::info!(path = %path.display(), "Generated system config");
                Ok(config)
            }
            Err(e) => Err(ConfigError::io("read", path, e)),
        }
    }

    /// Load without generating; used by the CLI to find the socket.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::io("read", path, e))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize {
            what: "system config",
            source: e,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::io("create directory", parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::io("write", path, e))?;

        // The token is a credential
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ConfigError::io("set permissions on", path, e))?;
        }
        Ok(())
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// host:port for the HTTP listener
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Random alphanumeric token of length `n`
pub fn generate_token(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_on_first_run_then_reuse() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");

        let first = SystemConfig::load_or_generate(&path).unwrap();
        assert_eq!(first.token.len(), TOKEN_LEN);
        assert!(first.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(first.api_port, 9093);
        assert!(path.exists());

        let second = SystemConfig::load_or_generate(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "token: abc123\napi_port: 8080\n").unwrap();

        let config = SystemConfig::load_or_generate(&path).unwrap();
        assert_eq!(config.token, "abc123");
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.api_host, "127.0.0.1");
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(config.launch_timeout(), Duration::from_secs(10));
        assert_eq!(config.api_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_blank_token_is_regenerated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "token: \"\"\n").unwrap();

        let config = SystemConfig::load_or_generate(&path).unwrap();
        assert_eq!(config.token.len(), TOKEN_LEN);
        assert_eq!(SystemConfig::load(&path).unwrap().token, config.token);
    }

    #[test]
    fn test_corrupt_file_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "token: [unterminated\n").unwrap();

        assert!(SystemConfig::load_or_generate(&path).is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "token: [unterminated\n"
        );
    }

    #[test]
    fn test_tokens_differ() {
        assert_ne!(generate_token(TOKEN_LEN), generate_token(TOKEN_LEN));
    }
}
