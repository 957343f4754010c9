// ABOUTME: Shared logging setup for the eternal daemon and CLI
// ABOUTME: Three functions: init() for stderr, init_file() for the daemon log, init_for() for the CLI

use std::path::Path;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Checked before RUST_LOG so eternal's verbosity can be set on its own.
pub const LOG_ENV: &str = "ETERNAL_LOG";

/// Foreground daemon logging to stderr. Default: INFO level.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(daemon_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// File-based logging for the detached daemon. Default: INFO level.
/// Appends to {dir}/{app_name}.log.
/// If setup fails, prints a warning to stderr and falls back to stderr logging.
pub fn init_file(dir: &Path, app_name: &str) {
    let log_file = match open_log_file(dir, app_name) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: failed to set up file logging: {e}");
            init();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(daemon_filter())
        .with_ansi(false)
        .init();
}

/// CLI logging: INFO for the named crate, WARN for everything else.
/// Goes to stderr without timestamps or targets so stdout stays the
/// command's result.
pub fn init_for(crate_name: &str) {
    let filter = base_filter()
        .add_directive(Level::WARN.into())
        .add_directive(crate_directive(crate_name));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn open_log_file(dir: &Path, app_name: &str) -> std::io::Result<std::fs::File> {
    std::fs::create_dir_all(dir)?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{app_name}.log")))
}

/// $ETERNAL_LOG if it holds a valid filter, otherwise RUST_LOG.
fn base_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(&spec).unwrap_or_else(|e| {
            eprintln!("Warning: ignoring invalid {LOG_ENV}: {e}");
            EnvFilter::from_default_env()
        }),
        _ => EnvFilter::from_default_env(),
    }
}

fn daemon_filter() -> EnvFilter {
    base_filter().add_directive(Level::INFO.into())
}

/// `<crate>=info`, or plain INFO if the name does not form a valid directive
fn crate_directive(crate_name: &str) -> Directive {
    format!("{crate_name}=info")
        .parse()
        .unwrap_or_else(|_| Level::INFO.into())
}

#[cfg(test)]
mod tests {
    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_file() {
        let _ = super::init_file as fn(&std::path::Path, &str);
    }

    #[test]
    fn exports_init_for() {
        let _ = super::init_for as fn(&str);
    }

    #[test]
    fn open_log_file_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        super::open_log_file(&dir, "eternal").unwrap();
        assert!(dir.join("eternal.log").exists());
    }

    #[test]
    fn open_log_file_appends() {
        use std::io::Write;

        let tmp = tempfile::tempdir().unwrap();
        writeln!(super::open_log_file(tmp.path(), "eternal").unwrap(), "first").unwrap();
        writeln!(super::open_log_file(tmp.path(), "eternal").unwrap(), "second").unwrap();
        let content = std::fs::read_to_string(tmp.path().join("eternal.log")).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn crate_directive_targets_named_crate() {
        assert_eq!(super::crate_directive("eternal_cli").to_string(), "eternal_cli=info");
    }
}
