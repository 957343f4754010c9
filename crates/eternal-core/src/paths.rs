// ABOUTME: File layout of eternal's state directory.
// ABOUTME: Resolves ~/.eternal (or $ETERNAL_HOME) and the files kept inside it.

use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the state directory.
pub const HOME_ENV: &str = "ETERNAL_HOME";

/// Locations of everything eternal persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root state directory (default ~/.eternal)
    pub base: PathBuf,
    /// One `<name>.yaml` definition per service
    pub services_dir: PathBuf,
    /// YAML list of services started at daemon boot
    pub enabled_file: PathBuf,
    /// System config holding the API token and ports
    pub config_file: PathBuf,
}

impl Paths {
    /// Resolve from $ETERNAL_HOME, falling back to ~/.eternal
    pub fn resolve() -> Result<Self> {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::at(PathBuf::from(home)));
        }
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirUnavailable)?;
        Ok(Self::at(home.join(".eternal")))
    }

    /// Layout rooted at an explicit directory
    pub fn at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            services_dir: base.join("services"),
            enabled_file: base.join("enabled.yaml"),
            config_file: base.join("config.yaml"),
            base,
        }
    }

    /// Create the state and services directories if missing
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.services_dir)
            .map_err(|e| ConfigError::io("create directory", &self.services_dir, e))
    }

    /// Path of the definition file for `name`
    pub fn service_file(&self, name: &str) -> PathBuf {
        service_file(&self.services_dir, name)
    }
}

pub(crate) fn service_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base() {
        let paths = Paths::at("/srv/eternal");
        assert_eq!(paths.services_dir, PathBuf::from("/srv/eternal/services"));
        assert_eq!(paths.enabled_file, PathBuf::from("/srv/eternal/enabled.yaml"));
        assert_eq!(paths.config_file, PathBuf::from("/srv/eternal/config.yaml"));
        assert_eq!(
            paths.service_file("web"),
            PathBuf::from("/srv/eternal/services/web.yaml")
        );
    }

    #[test]
    fn test_ensure_creates_services_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::at(tmp.path().join("state"));
        paths.ensure().unwrap();
        assert!(paths.services_dir.is_dir());
        // idempotent
        paths.ensure().unwrap();
    }
}
