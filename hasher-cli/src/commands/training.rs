//! Seed-training command handlers.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::time::timeout;
use tracing::{info, warn};

use frame_store::{
    codec_for_path, CheckpointStore, DualFormatWriter, JitterOracle, SeedWriter,
    TrainingRecord,
};

use crate::config::AppPaths;
use crate::host_client::HostClient;
use crate::supervisor;
use crate::training::{HashMethod, Trainer, TrainerConfig};

/// Hard cap on loading a frame file.
const FRAME_READ_CAP: Duration = Duration::from_secs(30);

/// Run the evolutionary seed search over every pending frame.
pub async fn run_training(
    paths: &AppPaths,
    method: HashMethod,
    epochs: u32,
    verbose: bool,
) -> Result<()> {
    let mut writers = Vec::new();
    let mut source = None;
    let arrow_source = paths.frames_source();
    if arrow_source.exists() {
        writers.push(SeedWriter::new(arrow_source.clone(), paths.frames_sink())?);
        source.get_or_insert(arrow_source);
    }
    let json_source = paths.frames_source_json();
    if json_source.exists() {
        writers.push(SeedWriter::new(
            json_source.clone(),
            paths.frames_sink_json(),
        )?);
        source.get_or_insert(json_source);
    }
    let Some(source) = source else {
        bail!(
            "no training frames found under {}; run the pipeline first",
            paths.frames_dir.display()
        );
    };

    info!(source = %source.display(), "loading training frames");
    let read_path = source.clone();
    let all_records: Vec<TrainingRecord> = timeout(
        FRAME_READ_CAP,
        tokio::task::spawn_blocking(move || codec_for_path(&read_path)?.read_records(&read_path)),
    )
    .await
    .context("frame read exceeded the 30s cap")??
    .context("frame read failed")?;

    let pending: Vec<TrainingRecord> = all_records
        .iter()
        .filter(|record| !record.has_best_seed())
        .cloned()
        .collect();
    if pending.is_empty() {
        println!("all {} frames already carry a best seed", all_records.len());
        return Ok(());
    }
    println!(
        "{} of {} frames pending, method {}, {} epoch(s)",
        pending.len(),
        all_records.len(),
        method.as_str(),
        epochs
    );

    let oracle = JitterOracle::from_records(&all_records);
    let writer = DualFormatWriter::from_writers(writers);
    let checkpoints = CheckpointStore::open(&paths.checkpoint_dir())?;
    let trainer = Trainer::new(TrainerConfig {
        hash_method: method,
        epochs,
        verbose,
        ..TrainerConfig::default()
    });

    let report = tokio::task::spawn_blocking(move || {
        trainer.train(&pending, &oracle, &writer, Some(&checkpoints))
    })
    .await
    .context("training task panicked")??;

    println!(
        "training finished: {} wins over {} records ({} skipped), {} generations, {} flushes",
        report.wins,
        report.records_seen,
        report.records_skipped,
        report.generations,
        report.flushes
    );
    Ok(())
}

/// Hybrid run: report the host service state first, then train with the
/// conformance-checked accelerated backend.
pub async fn run_hybrid(paths: &AppPaths, epochs: u32, verbose: bool) -> Result<()> {
    match supervisor::read_port_file() {
        Some(port) => {
            let client = HostClient::new(port);
            match client.get_health().await {
                Ok(health) => info!(
                    port,
                    status = %health.status,
                    using_asic = health.using_asic,
                    chip_count = health.chip_count,
                    "host service available"
                ),
                Err(error) => {
                    warn!("host service unreachable, falling back to local hashing: {error:#}")
                }
            }
        }
        None => warn!("no host port advertised, using local hashing"),
    }
    run_training(paths, HashMethod::Hybrid, epochs, verbose).await
}
