//! Score a batch of synthetic records against a running prediction server.
//!
//! Usage: `bulk_runner <config.toml> [count]`
//!
//! The schema is pulled from `GET /info`, `count` records (default 2000) are
//! synthesized from it, and the whole set goes through `bulk_predict` using the
//! batch size and concurrency from the config file. Set `RUST_LOG` to adjust
//! logging (default `info`).

use std::env;
use std::time::Instant;

use serde_json::Value;
use tower_predict::{config, FeatureSchema, PredictError, PredictionClient, Sample};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_COUNT: usize = 2000;

const CATEGORIES: [&str; 8] = [
    "LOW",
    "MEDIUM",
    "HIGH",
    "NEVER",
    "FORMER",
    "CURRENT",
    "NORMAL",
    "OVERWEIGHT",
];

fn synthesize(schema: &FeatureSchema, count: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let mut s = Sample::new();
            for name in &schema.numeric {
                let v = (50.0 + 15.0 * (i as f64 / 17.0 + name.len() as f64).sin()).round();
                s.insert(name.clone(), Value::from(v));
            }
            for name in &schema.categorical {
                let pick = CATEGORIES[(i + name.len()) % CATEGORIES.len()];
                s.insert(name.clone(), Value::from(pick));
            }
            s
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), PredictError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: bulk_runner <config.toml> [count]");
        std::process::exit(2);
    };
    let count = match args.next() {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|e| PredictError::config(format!("invalid count '{raw}': {e}")))?,
        None => DEFAULT_COUNT,
    };

    let cfg = config::from_file(&path)?;
    let client = PredictionClient::new(cfg)?;

    let info = client.info().await?;
    info!(
        model = info.model.as_deref().unwrap_or("unknown"),
        numeric = info.features.numeric.len(),
        categorical = info.features.categorical.len(),
        "fetched model info"
    );

    let samples = synthesize(&info.features, count);
    let opts = client.bulk_options().with_schema(info.features);

    let started = Instant::now();
    let predictions = client.bulk_predict(&samples, &opts).await?;
    let elapsed = started.elapsed();

    println!(
        "Got {} predictions in {:?}. Example: {:?}",
        predictions.len(),
        elapsed,
        &predictions[..predictions.len().min(5)]
    );
    Ok(())
}
