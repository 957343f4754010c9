// ABOUTME: Service definitions and their YAML files under services/.
// ABOUTME: One <name>.yaml per service holding the command line and working directory.

use crate::error::{ConfigError, Result};
use crate::paths::service_file;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk shape of a service definition file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Command line, split on whitespace with single/double quote grouping
    pub exec: String,

    /// Working directory; `~` is expanded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

/// A loaded service: immutable, replaced wholesale on reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub exec: String,
    pub dir: Option<PathBuf>,
}

impl ServiceDefinition {
    /// Build a definition from its file contents, validating both parts.
    pub fn new(name: &str, config: ServiceConfig) -> Result<Self> {
        validate_name(name)?;
        if config.exec.trim().is_empty() {
            return Err(ConfigError::MissingExec);
        }
        let dir = config
            .dir
            .filter(|d| !d.trim().is_empty())
            .map(|d| PathBuf::from(shellexpand::tilde(&d).into_owned()));
        Ok(Self {
            name: name.to_string(),
            exec: config.exec,
            dir,
        })
    }
}

/// Service names become file names; keep them to a portable character set.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidName(name.to_string()))
    }
}

/// Load one definition; the service name is the file stem.
pub fn load_definition(path: &Path) -> Result<ServiceDefinition> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConfigError::InvalidName(path.display().to_string()))?;
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::io("read", path, e))?;
    let config: ServiceConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    ServiceDefinition::new(name, config)
}

/// Scan `dir` for `*.yaml` definitions. A missing directory yields nothing;
/// files that fail to load are logged and skipped.
pub fn load_definitions(dir: &Path) -> Result<Vec<ServiceDefinition>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::io("read directory", dir, e)),
    };

    let mut definitions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::io("read directory", dir, e))?;
        let path = entry.path();

        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }

        match load_definition(&path) {
            Ok(definition) => definitions.push(definition),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping service definition");
            }
        }
    }

    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(definitions)
}

/// Write a new definition file. Refuses to overwrite an existing one.
pub fn create_definition(dir: &Path, name: &str, config: &ServiceConfig) -> Result<ServiceDefinition> {
    let definition = ServiceDefinition::new(name, config.clone())?;

    std::fs::create_dir_all(dir).map_err(|e| ConfigError::io("create directory", dir, e))?;
    let content = serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize {
        what: "service config",
        source: e,
    })?;

    // create_new checks for an existing file and creates it in one step
    let path = service_file(dir, name);
    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ConfigError::AlreadyExists(name.to_string()));
        }
        Err(e) => return Err(ConfigError::io("create", &path, e)),
    };
    if let Err(e) = file.write_all(content.as_bytes()) {
        let _ = std::fs::remove_file(&path);
        return Err(ConfigError::io("write", &path, e));
    }

    Ok(definition)
}

/// Remove a definition file.
pub fn delete_definition(dir: &Path, name: &str) -> Result<()> {
    validate_name(name)?;
    let path = service_file(dir, name);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConfigError::NotFound(name.to_string()))
        }
        Err(e) => Err(ConfigError::io("remove", &path, e)),
    }
}
