//! courierd - Courier scenario runner
//!
//! Boots the shops and vehicles of a scenario file and runs the delivery
//! negotiation to completion.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use courierd::{scenario, RunOptions, ScenarioConfig, DEFAULT_START_JITTER};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "courierd")]
#[command(about = "Courier delivery negotiation runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run {
        /// Path to scenario file
        #[arg(short, long, default_value = "scenario.json", env = "COURIER_CONFIG")]
        config: PathBuf,

        /// Emit logs as JSON
        #[arg(long)]
        json: bool,

        /// Start every shop at once instead of staggering them
        #[arg(long)]
        no_jitter: bool,
    },

    /// Validate a scenario file and print a summary
    Check {
        /// Path to scenario file
        #[arg(short, long, default_value = "scenario.json", env = "COURIER_CONFIG")]
        config: PathBuf,
    },

    /// Write the reference scenario
    InitConfig {
        /// Path to write scenario
        #[arg(short, long, default_value = "scenario.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let json = matches!(cli.command, Commands::Run { json: true, .. });
    init_tracing(json)?;

    match cli.command {
        Commands::Run {
            config, no_jitter, ..
        } => {
            run_scenario(config, no_jitter).await?;
        }

        Commands::Check { config } => {
            check_config(&config)?;
        }

        Commands::InitConfig { output } => {
            init_config(&output)?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("courierd=info".parse()?)
        .add_directive("courier_agent=info".parse()?);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
    Ok(())
}

async fn run_scenario(config_path: PathBuf, no_jitter: bool) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "starting courierd");

    let config = ScenarioConfig::from_file(&config_path)?;
    info!(
        vehicles = config.vehicles.len(),
        shops = config.shops.len(),
        collection_window_secs = config.protocol.collection_window_secs,
        "loaded scenario"
    );

    let options = RunOptions {
        start_jitter: (!no_jitter).then_some(DEFAULT_START_JITTER),
    };
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let summary = scenario::run(&config, options, interrupt).await?;
    scenario::log_summary(&summary);
    Ok(())
}

fn check_config(config_path: &Path) -> anyhow::Result<()> {
    let config = ScenarioConfig::from_file(config_path)?;

    println!("Scenario {} is valid", config_path.display());
    println!();
    println!("Vehicles:");
    for v in &config.vehicles {
        println!(
            "  {:<12} {:<12} capacity={:<5} speed={:<6} position={}",
            v.id,
            v.display_name(),
            v.capacity,
            v.speed,
            v.position
        );
    }
    println!();
    println!("Shops:");
    for s in &config.shops {
        println!(
            "  {:<12} location={:<12} window=[{}, {}] demand={}",
            s.id,
            s.location.to_string(),
            s.time_window.open,
            s.time_window.close,
            s.needs.total()
        );
    }
    Ok(())
}

fn init_config(output: &Path) -> anyhow::Result<()> {
    ScenarioConfig::default().save(output)?;

    println!("Scenario written to {}", output.display());
    println!();
    println!("Edit the fleet and shops, then run:");
    println!("  courierd run --config {}", output.display());

    Ok(())
}
