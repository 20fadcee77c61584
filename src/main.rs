//! Forecast trader - main entry point
//!
//! This binary provides four subcommands:
//! - cycle: Run one full automation cycle (signal, execute, monitor)
//! - monitor: Sweep open positions for stop-loss/take-profit exits
//! - performance: Show the realized performance snapshot
//! - trades: List or export recently closed trades

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "forecast-trader")]
#[command(about = "Forecast-driven paper trading engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one automation cycle for the configured symbols
    Cycle {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/engine.json")]
        config: String,

        /// Symbols to process (comma-separated, overrides config)
        #[arg(short, long)]
        symbols: Option<String>,
    },

    /// Check stop-loss/take-profit exits across open positions
    Monitor {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/engine.json")]
        config: String,

        /// Symbols to monitor (comma-separated, overrides config)
        #[arg(short, long)]
        symbols: Option<String>,
    },

    /// Show the performance snapshot over a trailing window
    Performance {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/engine.json")]
        config: String,

        /// Window length in days
        #[arg(short, long, default_value = "30")]
        window: i64,

        /// Restrict to one symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// List recently closed trades
    Trades {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/engine.json")]
        config: String,

        /// Number of trades to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Restrict to one symbol
        #[arg(short, long)]
        symbol: Option<String>,

        /// Export the trades to a CSV file
        #[arg(long)]
        csv: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Cycle { .. } => "cycle",
        Commands::Monitor { .. } => "monitor",
        Commands::Performance { .. } => "performance",
        Commands::Trades { .. } => "trades",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Cycle { config, symbols } => commands::cycle::run(config, symbols),

        Commands::Monitor { config, symbols } => commands::monitor::run(config, symbols),

        Commands::Performance {
            config,
            window,
            symbol,
        } => commands::performance::run(config, window, symbol),

        Commands::Trades {
            config,
            limit,
            symbol,
            csv,
        } => commands::trades::run(config, limit, symbol, csv),
    }
}
