//! Headless workflow execution and validation.

use anyhow::{bail, Result};
use tracing::info;

use crate::config::{self, AppPaths};
use crate::pipeline::{stage_plan, PipelineRunner, PipelineType, DRAIN_INTERVAL};

/// Resolve the requested pipeline type: explicit flag first, then the
/// `DATAMINER_MODE` environment override, then the default.
pub fn resolve_pipeline_type(requested: Option<String>) -> Result<PipelineType> {
    let raw = requested.or_else(config::dataminer_mode);
    match raw {
        Some(raw) => PipelineType::parse(&raw)
            .ok_or_else(|| anyhow::anyhow!("invalid pipeline mode '{raw}' (expected goat, arxiv or demo)")),
        None => Ok(PipelineType::Goat),
    }
}

/// Run the full pipeline without the TUI, printing drained stage logs.
pub async fn run_workflow(paths: &AppPaths, requested: Option<String>) -> Result<()> {
    let pipeline_type = resolve_pipeline_type(requested)?;
    let run_id = uuid::Uuid::new_v4();
    info!(pipeline = pipeline_type.as_str(), run_id = %run_id, "running workflow");

    let mut runner = PipelineRunner::new(paths.clone(), pipeline_type);
    if let Some(outcome) = runner.start().await? {
        if !outcome.success {
            bail!("pipeline failed: {}", outcome.message);
        }
        println!("{}", outcome.message);
        return Ok(());
    }

    let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
    loop {
        ticker.tick().await;
        let report = runner.tick().await;
        for stage_event in &report.events {
            println!("[stage {}] {}", stage_event.stage_index.max(0), stage_event.log);
        }
        if let Some(outcome) = report.outcome {
            if outcome.success {
                println!("{}", outcome.message);
                return Ok(());
            }
            bail!("pipeline failed: {}", outcome.message);
        }
        if !runner.state.running {
            return Ok(());
        }
    }
}

/// Validate a workflow without launching anything: stage binaries resolve
/// and the frame files are readable.
pub async fn test_workflow(paths: &AppPaths) -> Result<()> {
    let mut missing = 0usize;
    for pipeline_type in [PipelineType::Goat, PipelineType::Arxiv, PipelineType::Demo] {
        println!("pipeline '{}':", pipeline_type.as_str());
        for stage in stage_plan(pipeline_type) {
            match config::resolve_stage_binary(paths, &stage.bin_name) {
                Some(path) => println!("  {} -> {}", stage.bin_name, path.display()),
                None => {
                    println!("  {} -> MISSING", stage.bin_name);
                    missing += 1;
                }
            }
        }
    }

    let mut frames_found = false;
    for source in [paths.frames_source(), paths.frames_source_json()] {
        if source.exists() {
            frames_found = true;
            let pending = frame_store::read_training_records(&source)?;
            println!(
                "frames: {} ({} records pending)",
                source.display(),
                pending.len()
            );
        }
    }
    if !frames_found {
        println!("frames: none found under {}", paths.frames_dir.display());
    }

    if missing > 0 {
        bail!("{missing} stage binaries missing; run 'hasher build' first");
    }
    println!("workflow configuration OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pipeline_type() {
        assert_eq!(
            resolve_pipeline_type(Some("demo".to_string())).unwrap(),
            PipelineType::Demo
        );
        assert!(resolve_pipeline_type(Some("bogus".to_string())).is_err());
    }
}
