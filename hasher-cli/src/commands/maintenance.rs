//! Build, dependency, cleanup and shutdown helpers.

use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::config::{self, AppPaths, HOST_PORT_FILE};
use crate::pipeline::{stage_plan, PipelineType};
use crate::supervisor::{self, HOST_BIN_NAME};

/// Binaries the workflow expects to find staged.
pub const STAGE_BINARIES: [&str; 4] =
    ["data-miner", "data-encoder", "data-trainer", HOST_BIN_NAME];

/// Stage workflow binaries from the working directory into app-data bin.
pub fn build(paths: &AppPaths) -> Result<()> {
    fs::create_dir_all(&paths.bin_dir)?;
    let mut staged = 0usize;
    for name in STAGE_BINARIES {
        let local = Path::new("bin").join(name);
        if !local.exists() {
            println!("{name}: no local copy under ./bin, skipped");
            continue;
        }
        let destination = paths.bin_dir.join(name);
        fs::copy(&local, &destination)?;
        println!("{name}: staged to {}", destination.display());
        staged += 1;
    }
    info!(staged, "build finished");
    Ok(())
}

/// Report the presence of every dependency the workflow needs.
pub fn deps(paths: &AppPaths) -> Result<()> {
    println!("stage binaries:");
    let mut missing = 0usize;
    for name in STAGE_BINARIES {
        match config::resolve_stage_binary(paths, name) {
            Some(path) => println!("  {name}: {}", path.display()),
            None => {
                println!("  {name}: MISSING");
                missing += 1;
            }
        }
    }

    println!("native libraries:");
    for stage in stage_plan(PipelineType::Goat) {
        for lib in &stage.native_libs {
            let staged = paths.bin_dir.join(lib);
            let status = if staged.exists() { "staged" } else { "not staged" };
            println!("  {lib}: {status}");
        }
    }

    println!("frames:");
    for source in [paths.frames_source(), paths.frames_source_json()] {
        let status = if source.exists() { "present" } else { "absent" };
        println!("  {}: {status}", source.display());
    }

    println!("external providers:");
    println!(
        "  embeddings url: {}",
        config::embeddings_url().unwrap_or_else(|| "not configured".to_string())
    );
    println!(
        "  embeddings daily limit: {}",
        config::embeddings_daily_limit()
    );
    println!("  ollama host: {}", config::ollama_host());

    if missing > 0 {
        bail!("{missing} binaries missing");
    }
    Ok(())
}

/// Remove logs, staged binaries and the port advertisement.
pub fn clean(paths: &AppPaths) -> Result<()> {
    for dir in [&paths.logs_dir, &paths.bin_dir] {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        println!("cleaned {}", dir.display());
    }
    if Path::new(HOST_PORT_FILE).exists() {
        fs::remove_file(HOST_PORT_FILE)?;
        println!("removed {HOST_PORT_FILE}");
    }
    Ok(())
}

/// Terminate the host service and any stage processes still running.
pub fn kill() -> Result<()> {
    if let Some(port) = supervisor::read_port_file() {
        println!("host service advertised on port {port}, terminating");
    }
    for name in STAGE_BINARIES {
        match std::process::Command::new("pkill")
            .args(["-f", name])
            .status()
        {
            Ok(status) if status.success() => println!("terminated {name}"),
            Ok(_) => {}
            Err(error) => warn!("pkill {name} failed: {error}"),
        }
    }
    if Path::new(HOST_PORT_FILE).exists() {
        let _ = fs::remove_file(HOST_PORT_FILE);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(dir: &Path) -> AppPaths {
        AppPaths {
            data_dir: dir.to_path_buf(),
            logs_dir: dir.join("logs"),
            bin_dir: dir.join("bin"),
            frames_dir: dir.join("frames"),
        }
    }

    #[test]
    fn test_clean_recreates_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        paths.ensure().unwrap();
        fs::write(paths.logs_dir.join("old.log"), b"x").unwrap();
        fs::write(paths.bin_dir.join("data-miner"), b"x").unwrap();

        clean(&paths).unwrap();
        assert!(paths.logs_dir.is_dir());
        assert_eq!(fs::read_dir(&paths.logs_dir).unwrap().count(), 0);
        assert_eq!(fs::read_dir(&paths.bin_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_deps_fails_when_binaries_missing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        paths.ensure().unwrap();
        assert!(deps(&paths).is_err());
    }
}
