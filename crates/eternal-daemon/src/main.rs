// ABOUTME: eternal-daemon entry point.
// ABOUTME: Resolves the state directory, sets up logging, and runs the daemon.

use anyhow::Context;
use clap::Parser;
use eternal_core::Paths;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "eternal-daemon")]
#[command(about = "Keeps local services running")]
struct Cli {
    /// State directory (defaults to $ETERNAL_HOME or ~/.eternal)
    #[arg(long, env = "ETERNAL_HOME")]
    home: Option<PathBuf>,

    /// Write logs to <home>/eternal.log instead of stderr
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let paths = match cli.home {
        Some(home) => Paths::at(home),
        None => Paths::resolve().context("resolving state directory")?,
    };

    if cli.log_file {
        eternal_log::init_file(&paths.base, "eternal");
    } else {
        eternal_log::init();
    }

    eternal_daemon::run(paths).await
}
