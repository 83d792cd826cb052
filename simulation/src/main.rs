//! Ferry - contact-trace replay
//!
//! Replays a scenario through the forwarding engine and prints what got
//! delivered.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ferry_logging::{FerrySubscriberBuilder, FileConfig, LogConfig, RotationStrategy};
use ferry_routing::ForwardingStrategy;

use ferry_simulation::{Scenario, Simulation};

#[derive(Parser)]
#[command(
    name = "ferry-sim",
    about = "Replay contact traces through opportunistic forwarding strategies",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write a JSONL trace of the run into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print every node's delivery predictabilities after the run
    #[arg(long, global = true)]
    tables: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file
    Run {
        /// Path to the scenario JSON
        scenario: PathBuf,

        /// Override the strategy every node runs
        #[arg(short, long)]
        strategy: Option<ForwardingStrategy>,

        /// Print run statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay the built-in six node scenario
    Demo {
        /// Override the strategy every node runs
        #[arg(short, long)]
        strategy: Option<ForwardingStrategy>,

        /// Replay once per strategy and compare
        #[arg(long, conflicts_with = "strategy")]
        compare: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut builder = FerrySubscriberBuilder::new()
        .with_config(LogConfig::development())
        .with_level(if cli.verbose { "debug" } else { "info" });
    if let Some(dir) = &cli.log_dir {
        builder = builder.with_file_output(FileConfig {
            directory: dir.clone(),
            prefix: "ferry".to_string(),
            rotation: RotationStrategy::Never,
        });
    }
    let _log_guard = builder.init().context("installing logging")?;

    match cli.command {
        Commands::Run {
            scenario,
            strategy,
            json,
        } => {
            let loaded = Scenario::from_path(&scenario)
                .with_context(|| format!("loading {}", scenario.display()))?;
            let loaded = match strategy {
                Some(strategy) => loaded.with_strategy(strategy),
                None => loaded,
            };
            replay(loaded, cli.tables, json)?;
        }
        Commands::Demo { strategy, compare } => {
            if compare {
                compare_strategies()?;
            } else {
                let demo = match strategy {
                    Some(strategy) => Scenario::demo().with_strategy(strategy),
                    None => Scenario::demo(),
                };
                replay(demo, cli.tables, false)?;
            }
        }
    }

    Ok(())
}

fn replay(scenario: Scenario, tables: bool, json: bool) -> anyhow::Result<()> {
    let strategy = scenario.forwarding.strategy;
    let nodes = scenario.node_count();
    let mut sim = Simulation::new(scenario)?;
    let stats = sim.run()?.clone();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("\n=== {} ({} nodes, {}) ===", sim.name(), nodes, strategy);
        println!("{stats}");
    }

    if tables {
        let snapshots = sim.snapshots();
        if json {
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        } else {
            for snapshot in snapshots {
                println!("\n{snapshot}");
            }
        }
    }
    Ok(())
}

fn compare_strategies() -> anyhow::Result<()> {
    println!("\n{:<20} {:>9} {:>8} {:>9} {:>6}", "strategy", "delivered", "relayed", "offered", "gated");
    for strategy in ForwardingStrategy::ALL {
        let mut sim = Simulation::new(Scenario::demo().with_strategy(strategy))?;
        let stats = sim.run()?;
        println!(
            "{:<20} {:>9} {:>8} {:>9} {:>6}",
            strategy.as_str(),
            stats.delivered,
            stats.relayed,
            stats.offered,
            stats.gated_ticks
        );
    }
    Ok(())
}
