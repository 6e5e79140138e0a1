//! SquadRun - Weekly Squad Goals and Scoring
//!
//! Command-line entry point: manual closeout trigger, weekly scheduler and
//! read-only views.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use squadrun::closeout::{CloseoutOrchestrator, CloseoutScheduler, WeekMode};
use squadrun::squads::{squad_standings, weekly_summary};
use squadrun::storage::config::{load_config, load_config_from};
use squadrun::storage::{AppConfig, Database};

#[derive(Parser, Debug)]
#[command(
    name = "squadrun",
    about = "Close out squad weeks and inspect squad progress",
    version
)]
struct Cli {
    /// Path to config.toml (defaults to the platform data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Close out a week for every squad once
    Closeout(CloseoutArgs),
    /// Run the weekly closeout scheduler until Ctrl-C
    Schedule,
    /// Show a member's weekly summary across their squads
    Summary {
        #[arg(long)]
        member: Uuid,
    },
    /// Show a squad's streak standings
    Standings {
        #[arg(long)]
        squad: Uuid,
    },
}

#[derive(Args, Debug)]
struct CloseoutArgs {
    /// Close out the week in progress instead of the last completed week
    #[arg(long)]
    current_week: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("failed to load configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database_path().display(),
        "Starting SquadRun"
    );

    match cli.command {
        Command::Closeout(args) => run_closeout(&config, args).await,
        Command::Schedule => run_scheduler(&config).await,
        Command::Summary { member } => {
            let db = open_database(&config)?;
            let summary = weekly_summary(db.connection(), member, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Standings { squad } => {
            let db = open_database(&config)?;
            let standings = squad_standings(db.connection(), squad)?;
            println!("{}", serde_json::to_string_pretty(&standings)?);
            Ok(())
        }
    }
}

fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    let path = config.database_path();
    Database::open(&path, config.database.busy_timeout())
        .with_context(|| format!("failed to open database at {}", path.display()))
}

fn orchestrator(config: &AppConfig) -> anyhow::Result<CloseoutOrchestrator> {
    let db = Arc::new(Mutex::new(open_database(config)?));
    Ok(CloseoutOrchestrator::new(db, config.scoring.clone())?
        .with_squad_timeout(config.closeout.squad_timeout()))
}

async fn run_closeout(config: &AppConfig, args: CloseoutArgs) -> anyhow::Result<()> {
    let mode = if args.current_week {
        WeekMode::Current
    } else {
        WeekMode::Previous
    };

    let report = orchestrator(config)?.run_closeout(mode, Utc::now()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
        for failure in &report.failed {
            println!("  failed {}: {}", failure.squad_id, failure.error);
        }
    }

    if !report.is_success() {
        bail!("{} squad(s) failed to close out", report.failed.len());
    }
    Ok(())
}

async fn run_scheduler(config: &AppConfig) -> anyhow::Result<()> {
    let scheduler = CloseoutScheduler::new(Arc::new(orchestrator(config)?), &config.closeout);
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        shutdown.cancel();
    });

    scheduler.run(cancel).await;
    Ok(())
}
