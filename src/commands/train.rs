//! Train command implementation

use anyhow::{Context, Result};
use crypto_qlearning::metrics::calculate_metrics;
use crypto_qlearning::{data, Config, QLearningTrainer, Symbol, TrainingRun};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Command-line overrides for a training run
#[derive(Debug)]
pub struct TrainArgs {
    pub config_path: String,
    pub symbols: Option<String>,
    pub episodes: Option<usize>,
    pub seed: Option<u64>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// `Some(None)` exports into the config's `results_dir`
    pub export_qtable: Option<Option<PathBuf>>,
    pub export_trades: Option<Option<PathBuf>>,
}

pub fn run(args: TrainArgs) -> Result<()> {
    info!("Starting training");

    let mut config = Config::from_file(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    if let Some(symbols) = &args.symbols {
        info!("Overriding symbols to: {}", symbols);
        config.data.symbols = symbols.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(episodes) = args.episodes {
        info!("Overriding training episodes to: {}", episodes);
        config.agent.num_training_episodes = episodes;
    }
    if let Some(seed) = args.seed {
        info!("Overriding seed to: {}", seed);
        config.agent.seed = seed;
    }
    if let Some(start) = args.start {
        info!("Overriding start date to: {}", start);
        config.data.start = Some(start);
    }
    if let Some(end) = args.end {
        info!("Overriding end date to: {}", end);
        config.data.end = Some(end);
    }

    config.validate().context("Invalid configuration")?;
    debug!("Agent config: {:?}", config.agent);

    for symbol in config.data.symbols() {
        let bars = data::load_symbol_bars(&config.data, &config.features, &symbol)?;

        let mut trainer = QLearningTrainer::from_config(&config)?;
        info!(
            "Training {} for {} episodes on {} bars",
            symbol,
            config.agent.num_training_episodes,
            bars.len()
        );
        let run = trainer
            .run(&bars)
            .with_context(|| format!("Training failed for {}", symbol))?;

        print_results(&symbol, &run, trainer.qtable().len());

        if let Some(dir) = &args.export_qtable {
            let dir = config.data.export_dir(dir.as_deref());
            export_qtable(&dir, &symbol, &trainer)?;
        }
        if let Some(dir) = &args.export_trades {
            let dir = config.data.export_dir(dir.as_deref());
            export_trades(&dir, &symbol, &run)?;
        }
    }

    info!("Training completed successfully");
    Ok(())
}

fn print_results(symbol: &Symbol, run: &TrainingRun, q_table_size: usize) {
    let metrics = calculate_metrics(&run.evaluation);
    let last_training = run.training.last();

    println!("\n{}", "=".repeat(60));
    println!("EVALUATION RESULTS: {}", symbol);
    println!("{}", "=".repeat(60));
    println!("Training Episodes:  {}", run.training.len());
    if let Some(last) = last_training {
        println!("Final Epsilon:      {:.3}", last.epsilon);
        println!("Last Train Return:  {:.2}%", last.total_return * 100.0);
    }
    println!("Q-Table Entries:    {}", q_table_size);
    println!("Total Reward:       {:.4}", run.evaluation.total_reward());
    println!("Total Return:       {:.2}%", metrics.total_return);
    println!("Buy & Hold Return:  {:.2}%", metrics.benchmark_return);
    println!("Sharpe Ratio:       {:.2}", metrics.sharpe_ratio);
    println!("Sortino Ratio:      {:.2}", metrics.sortino_ratio);
    println!("Calmar Ratio:       {:.2}", metrics.calmar_ratio);
    println!("Max Drawdown:       {:.2}%", metrics.max_drawdown);
    match metrics.time_to_recover {
        Some(bars) => println!("Time to Recover:    {} bars", bars),
        None => println!("Time to Recover:    n/a"),
    }
    println!("Win Rate:           {:.2}%", metrics.win_rate);
    println!("Profit Factor:      {:.2}", metrics.profit_factor);
    println!("Expectancy:         {:.2}%", metrics.expectancy);
    println!("Total Trades:       {}", metrics.total_trades);
    println!("Winning Trades:     {}", metrics.winning_trades);
    println!("Losing Trades:      {}", metrics.losing_trades);
    println!("Stop-Loss Exits:    {}", metrics.stop_loss_exits);
    println!("Take-Profit Exits:  {}", metrics.take_profit_exits);
    println!("Average Win:        {:.2}%", metrics.avg_win);
    println!("Average Loss:       {:.2}%", metrics.avg_loss);
    println!("Largest Win:        {:.2}%", metrics.largest_win);
    println!("Largest Loss:       {:.2}%", metrics.largest_loss);
    println!("{}", "=".repeat(60));
}

fn export_qtable(dir: &Path, symbol: &Symbol, trainer: &QLearningTrainer) -> Result<()> {
    fs::create_dir_all(dir).context("Failed to create export directory")?;
    let path = dir.join(format!("{}_qtable.json", symbol));
    let json = serde_json::to_string_pretty(&trainer.qtable().entries())
        .context("Failed to serialize Q-table")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Q-table written to {}", path.display());
    Ok(())
}

fn export_trades(dir: &Path, symbol: &Symbol, run: &TrainingRun) -> Result<()> {
    fs::create_dir_all(dir).context("Failed to create export directory")?;
    let path = dir.join(format!("{}_trades.csv", symbol));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for trade in &run.evaluation.trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;
    info!(
        "{} evaluation trades written to {}",
        run.evaluation.trades.len(),
        path.display()
    );
    Ok(())
}
