//! scm - statechart interpreter
//!
//! Loads a chart document, validates it and runs it scripted or from an
//! interactive shell.

mod commands;
mod config;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::RunOptions;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scm")]
#[command(about = "Run hierarchical and parallel statecharts")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file (YAML). Falls back to SCM_CONFIG.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Chart to open in the REPL when no subcommand is given
    chart: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a chart and print its checksum
    Validate {
        /// Chart document (JSON or YAML)
        chart: PathBuf,
    },

    /// Print the state hierarchy of a chart
    States {
        /// Chart document (JSON or YAML)
        chart: PathBuf,
    },

    /// Run a chart with a scripted event sequence
    Run {
        /// Chart document (JSON or YAML)
        chart: PathBuf,

        /// Events to post, one tick after each
        #[arg(short, long, value_delimiter = ',')]
        events: Vec<String>,

        /// Extra ticks after the last event
        #[arg(short, long, default_value = "0")]
        ticks: u32,

        /// Seconds per tick (overrides runtime.tick_seconds)
        #[arg(long)]
        dt: Option<f64>,

        /// Guard flags, e.g. --set ready=true
        #[arg(long = "set", value_parser = commands::parse_flag)]
        flags: Vec<(String, bool)>,

        /// Random seed (overrides runtime.seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Start the interactive REPL
    Repl {
        /// Chart document (JSON or YAML)
        chart: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            return Err(e.into());
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Validate { chart }) => commands::validate(&chart).map(|out| println!("{}", out)),
        Some(Commands::States { chart }) => commands::states(&chart).map(|out| print!("{}", out)),
        Some(Commands::Run {
            chart,
            events,
            ticks,
            dt,
            flags,
            seed,
        }) => {
            if let Some(dt) = dt {
                config.runtime.tick_seconds = dt;
            }
            if seed.is_some() {
                config.runtime.seed = seed;
            }
            config.validate()?;
            let options = RunOptions {
                events,
                ticks,
                flags,
            };
            commands::run(&chart, &config.runtime, &options).map(|out| println!("{}", out))
        }
        Some(Commands::Repl { chart }) => open_repl(&chart, &config),
        None => match cli.chart {
            Some(chart) => open_repl(&chart, &config),
            None => {
                eprintln!("{}: no chart given. See 'scm --help'.", "Error".red());
                std::process::exit(2);
            }
        },
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn open_repl(chart: &std::path::Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("opening {}", chart.display());
    let session = commands::open_session(chart, &config.runtime)?;
    repl::run(session, config)
}
