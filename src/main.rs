//! Q-learning crypto agent - main entry point
//!
//! This binary provides two subcommands:
//! - train: Train the agent on each symbol and report the evaluation pass
//! - sweep: Run a parallel hyperparameter sweep

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crypto-qlearning")]
#[command(about = "Q-learning trading agent with backtest simulation and hyperparameter sweeps", long_about = None)]
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
    /// Train the agent and evaluate the learned policy
    Train {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/qlearning_btc_eth_1h.json")]
        config: String,

        /// Symbols to run (comma-separated, overrides config). E.g., "BTCUSDT,ETHUSDT"
        #[arg(long)]
        symbols: Option<String>,

        /// Number of training episodes (overrides config)
        #[arg(short, long)]
        episodes: Option<usize>,

        /// RNG seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Write the learned Q-table as JSON (into DIR, or the config's results_dir)
        #[arg(long, value_name = "DIR", num_args = 0..=1)]
        export_qtable: Option<Option<PathBuf>>,

        /// Write the evaluation trades as CSV (into DIR, or the config's results_dir)
        #[arg(long, value_name = "DIR", num_args = 0..=1)]
        export_trades: Option<Option<PathBuf>>,
    },

    /// Sweep agent hyperparameters
    Sweep {
        /// Path to base configuration file
        #[arg(short, long, default_value = "configs/qlearning_btc_eth_1h.json")]
        config: String,

        /// Sweep mode (quick, full, or config to use the file's `sweep` grid)
        #[arg(short, long, default_value = "quick")]
        mode: String,

        /// Sort results by metric (sharpe, sortino, calmar, return, win_rate, profit_factor)
        #[arg(long, default_value = "sharpe")]
        sort_by: String,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Symbols to run (comma-separated, overrides config)
        #[arg(long)]
        symbols: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Sweep: only log to file, keep console clean for progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

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
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Train { .. } => ("train", false),
        Commands::Sweep { .. } => ("sweep", true),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Train {
            config,
            symbols,
            episodes,
            seed,
            start,
            end,
            export_qtable,
            export_trades,
        } => commands::train::run(commands::train::TrainArgs {
            config_path: config,
            symbols,
            episodes,
            seed,
            start,
            end,
            export_qtable,
            export_trades,
        }),

        Commands::Sweep {
            config,
            mode,
            sort_by,
            top,
            symbols,
        } => commands::sweep::run(config, mode, sort_by, top, symbols),
    }
}
