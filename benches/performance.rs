//! Performance benchmarks for crypto-qlearning
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crypto_qlearning::config::AgentConfig;
use crypto_qlearning::encoder::EncoderConfig;
use crypto_qlearning::features::{build_market_bars, FeatureConfig};
use crypto_qlearning::{Candle, MarketBar, QLearningTrainer, StateEncoder};

fn synthetic_candles(n: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let t = i as f64;
            let close = 30_000.0 + (t * 0.05).sin() * 1_500.0 + (t * 0.31).cos() * 200.0;
            Candle {
                datetime: start + Duration::hours(i as i64),
                open: close - 20.0,
                high: close + 150.0,
                low: close - 150.0,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

fn synthetic_bars(n: usize) -> Vec<MarketBar> {
    build_market_bars(&synthetic_candles(n), &FeatureConfig::default())
}

fn benchmark_features(c: &mut Criterion) {
    let candles = synthetic_candles(5_000);
    let config = FeatureConfig::default();
    c.bench_function("build_market_bars_5k", |b| {
        b.iter(|| build_market_bars(black_box(&candles), &config))
    });
}

fn benchmark_encoder(c: &mut Criterion) {
    let bars = synthetic_bars(1_000);
    let encoder = StateEncoder::default();
    c.bench_function("encode_1k_bars", |b| {
        b.iter(|| {
            for bar in &bars {
                black_box(encoder.encode(bar, &[]));
            }
        })
    });
}

fn benchmark_training(c: &mut Criterion) {
    let bars = synthetic_bars(2_000);
    let agent = AgentConfig {
        num_training_episodes: 10,
        ..Default::default()
    };
    c.bench_function("train_10_episodes_2k_bars", |b| {
        b.iter(|| {
            let mut trainer = QLearningTrainer::new(agent.clone(), EncoderConfig::default()).unwrap();
            black_box(trainer.run(&bars).unwrap())
        })
    });
}

criterion_group!(benches, benchmark_features, benchmark_encoder, benchmark_training);
criterion_main!(benches);
