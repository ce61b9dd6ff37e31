//! Sweep command implementation

use anyhow::Result;
use crypto_qlearning::optimizer::{self, SweepGrid};
use crypto_qlearning::{data, Config, MarketBar, Symbol};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

pub fn run(
    config_path: String,
    mode: String,
    sort_by: String,
    top: usize,
    symbols_override: Option<String>,
) -> Result<()> {
    info!("Starting hyperparameter sweep");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded base configuration from: {}", config_path);

    if let Some(symbols) = symbols_override {
        config.data.symbols = symbols.split(',').map(|s| s.trim().to_string()).collect();
    }
    config.features.validate()?;
    config.encoder.validate()?;

    let grid = match mode.as_str() {
        "quick" => SweepGrid::quick(),
        "full" => SweepGrid::full(),
        "config" => config
            .sweep
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Config has no `sweep` section"))?,
        other => anyhow::bail!("Unknown sweep mode: {}. Use quick, full or config", other),
    };

    let configs = grid.generate_configs(&config.agent);
    info!(
        "Grid: {} combinations, {} valid",
        grid.total_combinations(),
        configs.len()
    );

    // Load every symbol once up front; runs only read the bars
    let mut market_data: Vec<(Symbol, Vec<MarketBar>)> = Vec::new();
    for symbol in config.data.symbols() {
        match data::load_symbol_bars(&config.data, &config.features, &symbol) {
            Ok(bars) => market_data.push((symbol, bars)),
            Err(e) => warn!("Skipping {}: {:#}", symbol, e),
        }
    }
    if market_data.is_empty() {
        anyhow::bail!("No data loaded for any symbol");
    }

    let total_runs = market_data.len() * configs.len();
    if total_runs == 0 {
        info!("No valid runs found. Check the sweep grid.");
        return Ok(());
    }

    println!("\n{}", "=".repeat(70));
    println!("SWEEP SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Symbols:       {}", market_data.len());
    println!("  Parameters:    {} combinations", configs.len());
    println!("  Total runs:    {}", total_runs);
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(total_runs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")?
            .progress_chars("█░ "),
    );

    let mut results = optimizer::run_sweep(&market_data, &configs, &config.encoder, Some(&pb));
    pb.finish();
    println!();

    if results.is_empty() {
        info!("No valid results found.");
        return Ok(());
    }

    optimizer::sort_results(&mut results, &sort_by);
    info!("Total results: {}, sorted by: {}", results.len(), sort_by);

    let display_count = top.min(results.len());
    println!("\n{}", "=".repeat(110));
    println!("TOP {} SWEEP RESULTS (sorted by {})", display_count, sort_by);
    println!("{}", "=".repeat(110));
    println!(
        "{:<4} {:>7} {:>8} {:>9} {:>8} {:>8} {:>6} | {:<9} | Parameters",
        "Rank", "Sharpe", "Sortino", "Return%", "MaxDD%", "WinR%", "Trades", "Symbol"
    );
    println!("{}", "-".repeat(110));

    for (i, result) in results.iter().take(top).enumerate() {
        println!(
            "{:<4} {:>7.2} {:>8.2} {:>9.2} {:>8.2} {:>8.2} {:>6} | {:<9} | {}",
            i + 1,
            result.sharpe_ratio,
            result.sortino_ratio,
            result.total_return,
            result.max_drawdown,
            result.win_rate,
            result.total_trades,
            result.symbol,
            result.params
        );
    }
    println!("{}", "=".repeat(110));

    if let Some(best) = results.first() {
        info!("Best: {} {} (sharpe {:.2})", best.symbol, best.params, best.sharpe_ratio);
    }

    Ok(())
}
