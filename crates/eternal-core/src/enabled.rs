// ABOUTME: The list of services auto-started when the daemon boots.
// ABOUTME: Stored as a YAML sequence of names in enabled.yaml.

use crate::error::{ConfigError, Result};
use std::path::Path;

/// Load enabled service names. A missing file means nothing is enabled.
pub fn load_enabled(path: &Path) -> Result<Vec<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::io("read", path, e)),
    };

    // An empty file deserializes to null, not an empty sequence
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Add `name` to the enabled list. No-op if already present.
pub fn enable(path: &Path, name: &str) -> Result<()> {
    let mut names = load_enabled(path)?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    names.push(name.to_string());
    save_enabled(path, &names)
}

/// Remove `name` from the enabled list. No-op if absent.
pub fn disable(path: &Path, name: &str) -> Result<()> {
    let names = load_enabled(path)?;
    let remaining: Vec<String> = names.iter().filter(|n| *n != name).cloned().collect();
    if remaining.len() == names.len() {
        return Ok(());
    }
    save_enabled(path, &remaining)
}

fn save_enabled(path: &Path, names: &[String]) -> Result<()> {
    let content = serde_yaml::to_string(names).map_err(|e| ConfigError::Serialize {
        what: "enabled services",
        source: e,
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::io("create directory", parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| ConfigError::io("write", path, e))
}
