// ABOUTME: Loads service definitions into the supervisor and auto-starts enabled ones.
// ABOUTME: Individual failures are logged and never abort the boot.

use eternal_core::{enabled, service, ConfigError, Paths};
use eternal_supervisor::Supervisor;

/// What happened during boot
#[derive(Debug, Default)]
pub struct BootReport {
    pub registered: usize,
    pub started: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Register every definition under services/. Already-known names are left
/// alone. Returns the number of new services.
pub async fn reload(supervisor: &Supervisor, paths: &Paths) -> Result<usize, ConfigError> {
    let definitions = service::load_definitions(&paths.services_dir)?;
    Ok(supervisor.register_all(definitions).await)
}

/// Register definitions and start the enabled services.
pub async fn boot(supervisor: &Supervisor, paths: &Paths) -> Result<BootReport, ConfigError> {
    let mut report = BootReport {
        registered: reload(supervisor, paths).await?,
        ..BootReport::default()
    };
    tracing::info!(count = report.registered, "Loaded services");

    let names = match enabled::load_enabled(&paths.enabled_file) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load enabled services");
            return Ok(report);
        }
    };

    for name in names {
        match supervisor.start(&name).await {
            Ok(snapshot) => {
                tracing::info!(service = %name, pid = ?snapshot.pid, "Auto-started service");
                report.started.push(name);
            }
            Err(e) => {
                tracing::warn!(service = %name, error = %e, "Failed to auto-start service");
                report.failed.push((name, e.to_string()));
            }
        }
    }

    Ok(report)
}
