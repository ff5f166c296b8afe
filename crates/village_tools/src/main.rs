//! Village simulation - headless command-line driver.
//!
//! Every invocation opens the village in the save directory, runs one
//! command against it at the session clock, prints a JSON response on stdout
//! and saves. Logs go to stderr, filtered by `RUST_LOG`.
//!
//! ```bash
//! village-cli new --seed 42
//! village-cli advance --minutes 90
//! village-cli upgrade 2
//! village-cli raid 3
//! village-cli status
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use village_core::clock::{Clock, SystemClock, MS_PER_MINUTE};
use village_core::config::GameConfig;
use village_core::economy::ResourceKind;
use village_core::error::{CommandResult, Result};
use village_core::response::CommandResponse;
use village_tools::session::Session;
use village_tools::validate::{validate_config_file, validate_path};

#[derive(Parser)]
#[command(name = "village-cli")]
#[command(about = "Drive a village simulation from the command line")]
#[command(version)]
struct Cli {
    /// Directory holding the save
    #[arg(short, long, global = true, default_value = ".village")]
    dir: PathBuf,

    /// RON config file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new village, replacing any existing one
    New {
        /// Session seed (defaults to the wall clock)
        #[arg(long)]
        seed: Option<u64>,

        /// Session start time in epoch milliseconds (defaults to now)
        #[arg(long)]
        start: Option<u64>,
    },

    /// Print the village summary
    Status,

    /// Move the session clock forward
    Advance {
        /// Minutes to advance
        #[arg(short, long, default_value = "1")]
        minutes: u64,
    },

    /// Raid a neighbor
    Raid {
        /// Neighbor id
        neighbor: u32,
    },

    /// Start a structure upgrade
    Upgrade {
        /// Structure id
        structure: u32,
    },

    /// Train one unit instantly
    Train {
        /// Unit id
        unit: u32,
    },

    /// Gift currency to a neighbor
    Gift {
        /// Neighbor id
        neighbor: u32,

        /// Currency: gold, elixir, dark or gems
        resource: ResourceKind,

        /// Amount to give
        amount: u64,
    },

    /// Switch between the light and dark UI schemes
    Theme,

    /// Validate a RON config file or a directory of them
    ValidateConfig {
        /// File or directory
        path: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<GameConfig> {
    match path {
        Some(path) => validate_config_file(path),
        None => Ok(GameConfig::default()),
    }
}

/// Print a response. Returns whether the command succeeded.
fn respond<T: Serialize>(result: &CommandResult<T>, success_message: &str) -> Result<bool> {
    let response = CommandResponse::from_result(result, success_message);
    println!("{}", response.to_json()?);
    Ok(response.success)
}

fn run(cli: Cli) -> Result<bool> {
    if let Commands::ValidateConfig { path } = &cli.command {
        let checked = validate_path(path)?;
        tracing::info!(checked, "Validation passed");
        return Ok(true);
    }

    let config = load_config(cli.config.as_deref())?;

    if let Commands::New { seed, start } = cli.command {
        let wall = SystemClock.now();
        let session = Session::create(&cli.dir, config, seed.unwrap_or(wall), start.unwrap_or(wall))?;
        let status = session.status();
        session.close()?;
        return respond(&Ok(status), "Village created");
    }

    let mut session = Session::open(&cli.dir, config)?;
    let now = session.now();
    let succeeded = match cli.command {
        Commands::Status => respond(&Ok(session.status()), "Village status")?,
        Commands::Advance { minutes } => {
            let events = session.advance_by(minutes.saturating_mul(MS_PER_MINUTE));
            tracing::info!(minutes, events = events.len(), "Advanced");
            respond(&Ok(session.status()), &format!("Advanced {minutes} min"))?
        }
        Commands::Raid { neighbor } => {
            respond(&session.engine_mut().raid(neighbor, now), "Raid finished")?
        }
        Commands::Upgrade { structure } => respond(
            &session.engine_mut().start_upgrade(structure, now),
            "Upgrade started",
        )?,
        Commands::Train { unit } => respond(&session.engine_mut().train_unit(unit), "Unit trained")?,
        Commands::Gift {
            neighbor,
            resource,
            amount,
        } => respond(
            &session
                .engine_mut()
                .gift_resource(neighbor, resource, amount, now),
            "Gift delivered",
        )?,
        Commands::Theme => {
            let mode = session.engine_mut().toggle_theme();
            respond(&Ok(mode), "Theme changed")?
        }
        Commands::New { .. } | Commands::ValidateConfig { .. } => true,
    };
    session.close()?;
    Ok(succeeded)
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
