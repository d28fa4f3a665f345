//! Application paths, environment overrides, and stage-binary resolution.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub const APP_NAME: &str = "hasher";

/// Port advertisement file written by the host service once it binds.
pub const HOST_PORT_FILE: &str = "/tmp/hasher-host.port";
/// Health endpoint exposed by the host service.
pub const HOST_HEALTH_PATH: &str = "/api/v1/health";
/// Ports scanned at startup for an already-running host service.
pub const HOST_SCAN_PORTS: [u16; 8] = [8080, 8081, 8082, 8083, 8084, 8085, 8008, 9000];

/// Resolved application directories. Environment overrides win over the
/// platform defaults.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub frames_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve() -> Result<Self> {
        let data_dir = match env::var_os("HASHER_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("could not determine platform app-data directory")?
                .join(APP_NAME),
        };
        let frames_dir = match env::var_os("HASHER_FRAMES_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => data_dir.join("frames"),
        };
        Ok(Self {
            logs_dir: data_dir.join("logs"),
            bin_dir: data_dir.join("bin"),
            data_dir,
            frames_dir,
        })
    }

    /// Create every directory this run may write into.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.logs_dir, &self.bin_dir, &self.frames_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Timestamped session log file for this CLI invocation.
    pub fn session_log_file(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.logs_dir.join(format!("{APP_NAME}-cli_{stamp}.log"))
    }

    pub fn host_log_file(&self) -> PathBuf {
        self.logs_dir.join(format!("{APP_NAME}-host.log"))
    }

    pub fn device_config_file(&self) -> PathBuf {
        self.data_dir.join("device.toml")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    pub fn frames_source(&self) -> PathBuf {
        self.frames_dir.join("training_frames.arrow")
    }

    pub fn frames_sink(&self) -> PathBuf {
        self.frames_dir.join("training_frames_with_seeds.arrow")
    }

    pub fn frames_source_json(&self) -> PathBuf {
        self.frames_dir.join("training_frames.json")
    }

    pub fn frames_sink_json(&self) -> PathBuf {
        self.frames_dir.join("training_frames_with_seeds.json")
    }
}

/// Resolve a stage binary: the working-directory `bin/` copy wins, then the
/// app-data `bin/` directory.
pub fn resolve_stage_binary(paths: &AppPaths, bin_name: &str) -> Option<PathBuf> {
    let local = Path::new("bin").join(bin_name);
    if local.exists() {
        return Some(local);
    }
    let staged = paths.bin_dir.join(bin_name);
    if staged.exists() {
        return Some(staged);
    }
    None
}

/// ASIC device connection settings, from `device.toml` with environment
/// overrides (`DEVICE_IP`, `DEVICE_USERNAME`, `DEVICE_PASSWORD`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DeviceConfig {
    pub fn load(paths: &AppPaths) -> Self {
        let mut config = fs::read_to_string(paths.device_config_file())
            .ok()
            .and_then(|text| toml::from_str::<DeviceConfig>(&text).ok())
            .unwrap_or_default();
        if let Ok(address) = env::var("DEVICE_IP") {
            if !address.is_empty() {
                config.address = Some(address);
            }
        }
        if let Ok(username) = env::var("DEVICE_USERNAME") {
            if !username.is_empty() {
                config.username = Some(username);
            }
        }
        if let Ok(password) = env::var("DEVICE_PASSWORD") {
            if !password.is_empty() {
                config.password = Some(password);
            }
        }
        config
    }

    pub fn save(&self, paths: &AppPaths) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        fs::write(paths.device_config_file(), text)?;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.address.as_ref().map(|a| !a.is_empty()).unwrap_or(false)
    }
}

/// Miner mode override (`DATAMINER_MODE`), normalized to lowercase.
pub fn dataminer_mode() -> Option<String> {
    env::var("DATAMINER_MODE")
        .ok()
        .map(|mode| mode.to_lowercase())
        .filter(|mode| !mode.is_empty())
}

/// Daily request cap for external embedders (`CLOUDFLARE_DAILY_LIMIT`).
pub fn embeddings_daily_limit() -> u32 {
    env::var("CLOUDFLARE_DAILY_LIMIT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(100)
}

pub fn embeddings_url() -> Option<String> {
    env::var("CLOUDFLARE_EMBEDDINGS_URL").ok().filter(|u| !u.is_empty())
}

pub fn ollama_host() -> String {
    env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

pub fn term_emulator() -> Option<String> {
    env::var("TERM_EMULATOR").ok().filter(|t| !t.is_empty())
}

/// Initialize tracing. TUI sessions log to the session file so the
/// subscriber never writes to the terminal the UI owns.
pub fn init_logging(paths: &AppPaths, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if to_file {
        let file = fs::File::create(paths.session_log_file())?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
