//! `linewatch` -- machine telemetry pipeline daemon.
//!
//! Wires the five pipeline stages to an in-process message bus, feeds them
//! from a telemetry source, and runs until interrupted.
//!
//! # Environment variables
//!
//! | Variable                       | Required | Default     | Description                                  |
//! |--------------------------------|----------|-------------|----------------------------------------------|
//! | `LINEWATCH_SOURCE`             | no       | `synthetic` | Telemetry source: `synthetic` or `csv`       |
//! | `LINEWATCH_CSV_PATH`           | if csv   | --          | Path to the CSV telemetry file               |
//! | `LINEWATCH_SAMPLE_COUNT`       | no       | `10`        | Synthetic samples to generate                |
//! | `LINEWATCH_MACHINE_COUNT`      | no       | `3`         | Machines to spread synthetic samples across  |
//! | `LINEWATCH_WINDOW_SIZE`        | no       | `10`        | Samples per aggregation window               |
//! | `LINEWATCH_DOWNTIME_THRESHOLD` | no       | `20`        | Downtime minutes above which a record alerts |
//! | `LINEWATCH_RUNTIME_THRESHOLD`  | no       | `30`        | Runtime minutes below which a record alerts  |
//! | `LINEWATCH_RATIO_THRESHOLD`    | no       | `0.8`       | avg/max ratio above which a window alerts    |
//! | `LINEWATCH_SCORE_THRESHOLD`    | no       | `1.0`       | avg/100 score above which a window alerts    |
//! | `LINEWATCH_RETRY_BUDGET`       | no       | `3`         | Alert publish attempts before giving up      |
//! | `LINEWATCH_EXPORT_PATH`        | no       | --          | JSONL file for aggregate rows on shutdown    |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linewatch_bus::MessageBus;
use linewatch_core::config::env_or;
use linewatch_core::topics::TOPIC_AGGREGATES;
use linewatch_core::{AggregateStats, ConfigError, PipelineConfig};
use linewatch_export::{AggregateRow, JsonlWriter};
use linewatch_pipeline::{
    AggregatorStage, DetectorStage, DispatcherStage, IngestStage, NotifierStage,
};

/// Default synthetic batch size when `LINEWATCH_SAMPLE_COUNT` is unset.
const DEFAULT_SAMPLE_COUNT: usize = linewatch_collector::synth::DEFAULT_SAMPLE_COUNT;

/// Bus queue depth per subscription.
const BUS_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linewatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;

    tracing::info!(
        window_size = config.window_size,
        retry_budget = config.retry_budget,
        "Starting linewatch",
    );

    let bus = Arc::new(MessageBus::new(BUS_CAPACITY));
    let cancel = CancellationToken::new();

    // Constructors subscribe, so every stage must exist before the first
    // payload is published.
    let ingest = IngestStage::new(bus.clone());
    let aggregator = AggregatorStage::new(bus.clone(), config);
    let detector = DetectorStage::new(bus.clone(), config.thresholds);
    let dispatcher = DispatcherStage::new(bus.clone(), config.retry_budget);
    let notifier = NotifierStage::new(bus.clone());

    let export_path: Option<PathBuf> = std::env::var("LINEWATCH_EXPORT_PATH").ok().map(Into::into);
    let export_sub = export_path.as_ref().map(|_| bus.subscribe(TOPIC_AGGREGATES));

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(ingest.run(cancel.clone()));
    tasks.spawn(aggregator.run(cancel.clone()));
    tasks.spawn(detector.run(cancel.clone()));
    tasks.spawn(dispatcher.run(cancel.clone()));
    tasks.spawn(notifier.run(cancel.clone()));

    if let (Some(path), Some(sub)) = (export_path, export_sub) {
        tasks.spawn(export_sink(sub, path, cancel.clone()));
    }

    let payloads = load_payloads()?;
    linewatch_collector::publish_all(&bus, payloads)
        .await
        .context("failed to publish telemetry batch")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, draining pipeline");

    cancel.cancel();
    while tasks.join_next().await.is_some() {}

    tracing::info!("Pipeline stopped");
    Ok(())
}

/// Stream aggregate rows to a JSONL file until shutdown.
///
/// Rows are flushed as they arrive, so an abort loses at most the row in
/// flight.
async fn export_sink(
    mut sub: linewatch_bus::Subscription,
    path: PathBuf,
    cancel: CancellationToken,
) {
    let mut writer = match JsonlWriter::create(&path) {
        Ok(writer) => writer,
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "Failed to open aggregate export file");
            return;
        }
    };

    while let Some(envelope) = sub.recv(&cancel).await {
        match serde_json::from_value::<AggregateStats>(envelope.payload) {
            Ok(stats) => {
                if let Err(e) = writer.append(&AggregateRow::from(&stats)) {
                    tracing::error!(error = %e, path = %path.display(), "Failed to append aggregate row");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Dropping undecodable aggregate from export"),
        }
    }

    if let Err(e) = writer.finish() {
        tracing::error!(error = %e, path = %path.display(), "Failed to finish aggregate export");
    }
}

/// Load the telemetry batch selected by `LINEWATCH_SOURCE`.
fn load_payloads() -> anyhow::Result<Vec<serde_json::Value>> {
    let source = std::env::var("LINEWATCH_SOURCE").unwrap_or_else(|_| "synthetic".into());

    match source.as_str() {
        "csv" => {
            let path: PathBuf = std::env::var("LINEWATCH_CSV_PATH")
                .map_err(|_| ConfigError::Missing("LINEWATCH_CSV_PATH"))?
                .into();
            let payloads = linewatch_collector::csv_source::read_csv_payloads(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(payloads)
        }
        "synthetic" => {
            let count: usize = env_or("LINEWATCH_SAMPLE_COUNT", DEFAULT_SAMPLE_COUNT)?;
            let machines: usize = env_or(
                "LINEWATCH_MACHINE_COUNT",
                linewatch_collector::synth::DEFAULT_MACHINE_COUNT,
            )?;
            Ok(linewatch_collector::synth::generate(count, machines))
        }
        other => Err(ConfigError::Invalid {
            var: "LINEWATCH_SOURCE",
            value: other.to_string(),
        }
        .into()),
    }
}
