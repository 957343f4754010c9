// ABOUTME: eternal CLI entry point.
// ABOUTME: Dispatches start/stop/restart/status/enable/disable/new/delete subcommands.

use clap::{Parser, Subcommand};
use eternal_cli::{client, commands, Client};
use eternal_core::ipc::Action;
use eternal_core::Paths;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "eternal")]
#[command(about = "Control services kept alive by eternal-daemon")]
#[command(version)]
struct Cli {
    /// State directory (defaults to $ETERNAL_HOME or ~/.eternal)
    #[arg(long, global = true, env = "ETERNAL_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a service
    Start { name: String },

    /// Stop a service
    Stop { name: String },

    /// Restart a service
    Restart { name: String },

    /// Show a service's status
    Status { name: String },

    /// Start a service whenever the daemon boots
    Enable { name: String },

    /// Stop starting a service at boot
    Disable { name: String },

    /// Create a service definition
    New {
        name: String,

        /// Command line to run
        #[arg(long, short = 'e')]
        exec: String,

        /// Working directory
        #[arg(long, short = 'd')]
        dir: Option<String>,
    },

    /// Stop a service and delete its definition
    Delete { name: String },
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let paths = match cli.home {
        Some(home) => Paths::at(home),
        None => Paths::resolve()?,
    };
    let client = Client::new(client::socket_path(&paths));

    let message = match cli.command {
        Commands::Start { name } => commands::control(&client, Action::Start, &name).await?,
        Commands::Stop { name } => commands::control(&client, Action::Stop, &name).await?,
        Commands::Restart { name } => commands::control(&client, Action::Restart, &name).await?,
        Commands::Status { name } => commands::control(&client, Action::Status, &name).await?,
        Commands::Enable { name } => commands::enable(&paths, &name)?,
        Commands::Disable { name } => commands::disable(&paths, &name)?,
        Commands::New { name, exec, dir } => {
            commands::create(&paths, &client, &name, exec, dir).await?
        }
        Commands::Delete { name } => commands::delete(&paths, &client, &name).await?,
    };
    Ok(message)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    eternal_log::init_for("eternal_cli");

    let cli = Cli::parse();

    match run(cli).await {
        Ok(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
