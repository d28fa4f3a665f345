//! Host service supervision: adoption, launch, log streaming, readiness.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{AppPaths, DeviceConfig, HOST_HEALTH_PATH, HOST_PORT_FILE, HOST_SCAN_PORTS};

/// Bounded host log channel; enqueues drop when full.
pub const HOST_LOG_CAPACITY: usize = 50;
/// Name of the supervised helper binary.
pub const HOST_BIN_NAME: &str = "hasher-host";

const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(2);
const READINESS_CAP: Duration = Duration::from_secs(300);

/// Events published to the message loop.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    Log(String),
    Ready {
        ready: bool,
        starting: bool,
        port: u16,
    },
    Stopped {
        message: String,
    },
}

/// Supervises the one long-lived host service process.
pub struct HostSupervisor {
    paths: AppPaths,
    device: DeviceConfig,
    events_tx: mpsc::Sender<SupervisorEvent>,
    child: Arc<Mutex<Option<Child>>>,
}

impl HostSupervisor {
    pub fn new(
        paths: AppPaths,
        device: DeviceConfig,
    ) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (events_tx, events_rx) = mpsc::channel(HOST_LOG_CAPACITY);
        (
            Self {
                paths,
                device,
                events_tx,
                child: Arc::new(Mutex::new(None)),
            },
            events_rx,
        )
    }

    /// Scan the known ports for an already-running host service.
    pub async fn find_running_host() -> Option<u16> {
        let client = reqwest::Client::new();
        for port in HOST_SCAN_PORTS {
            let url = format!("http://localhost:{port}{HOST_HEALTH_PATH}");
            let probe = client
                .get(&url)
                .timeout(Duration::from_secs(2))
                .send()
                .await;
            if let Ok(response) = probe {
                if response.status().is_success() {
                    return Some(port);
                }
            }
        }
        None
    }

    /// Start the host service, or adopt one that is already answering.
    pub async fn start(&self) -> Result<()> {
        if let Some(port) = Self::find_running_host().await {
            info!(port, "adopting already-running host service");
            let _ = self
                .events_tx
                .send(SupervisorEvent::Ready {
                    ready: true,
                    starting: false,
                    port,
                })
                .await;
            return Ok(());
        }

        let _ = self
            .events_tx
            .send(SupervisorEvent::Ready {
                ready: false,
                starting: true,
                port: 0,
            })
            .await;

        let binary = self.ensure_host_binary()?;
        let mut command = Command::new(&binary);
        if self.device.is_configured() {
            if let Some(address) = &self.device.address {
                command.arg(format!("--device-ip={address}"));
            }
            if let Some(username) = &self.device.username {
                command.arg(format!("--device-user={username}"));
            }
        } else {
            command.arg("--discover=true").arg("--auto-deploy=true");
        }
        // credentials travel via environment as well as argv
        if let Some(username) = &self.device.username {
            command.env("DEVICE_USERNAME", username);
        }
        if let Some(password) = &self.device.password {
            command.env("DEVICE_PASSWORD", password);
        }
        if let Some(address) = &self.device.address {
            command.env("DEVICE_IP", address);
        }
        command
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        info!(binary = %binary.display(), "launching host service");
        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", binary.display()))?;

        let log_file = self.open_host_log();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_host_stream(
                stdout,
                false,
                self.events_tx.clone(),
                log_file.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_host_stream(
                stderr,
                true,
                self.events_tx.clone(),
                log_file,
            ));
        }

        *self.child.lock().await = Some(child);
        self.spawn_readiness_poller();
        Ok(())
    }

    /// Terminate the supervised process. Shutdown is not graceful.
    pub async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(error) = child.kill().await {
                warn!("failed to kill host service: {error}");
            }
            let _ = self
                .events_tx
                .send(SupervisorEvent::Stopped {
                    message: "host service stopped".to_string(),
                })
                .await;
        }
    }

    pub async fn is_supervising(&self) -> bool {
        self.child.lock().await.is_some()
    }

    /// Stage a fresh helper binary into app-data. The working-directory copy
    /// is the extraction source; an already-staged copy is refreshed from it
    /// when present.
    fn ensure_host_binary(&self) -> Result<PathBuf> {
        let staged = self.paths.bin_dir.join(HOST_BIN_NAME);
        let local = PathBuf::from("bin").join(HOST_BIN_NAME);
        if local.exists() {
            fs::create_dir_all(&self.paths.bin_dir)?;
            fs::copy(&local, &staged)
                .with_context(|| format!("staging {} into app-data", local.display()))?;
            return Ok(staged);
        }
        if staged.exists() {
            return Ok(staged);
        }
        anyhow::bail!("host binary '{HOST_BIN_NAME}' not found in ./bin or app-data bin")
    }

    /// The single process-wide host log file, mutex guarded. Failure to open
    /// warns and disables file logging rather than aborting.
    fn open_host_log(&self) -> Option<Arc<StdMutex<fs::File>>> {
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.paths.host_log_file())
        {
            Ok(file) => Some(Arc::new(StdMutex::new(file))),
            Err(error) => {
                eprintln!("warning: host log file unavailable: {error}");
                None
            }
        }
    }

    /// Background poll: read the advertised port, probe health, report the
    /// first success. Gives up after the five-minute cap, leaving the state
    /// as "starting".
    fn spawn_readiness_poller(&self) {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let deadline = Instant::now() + READINESS_CAP;
            loop {
                if Instant::now() >= deadline {
                    debug!("host readiness poll gave up after cap");
                    return;
                }
                if let Some(port) = read_port_file() {
                    let url = format!("http://localhost:{port}{HOST_HEALTH_PATH}");
                    let probe = client
                        .get(&url)
                        .timeout(Duration::from_secs(5))
                        .send()
                        .await;
                    if let Ok(response) = probe {
                        if response.status().is_success() {
                            info!(port, "host service ready");
                            let _ = events_tx
                                .send(SupervisorEvent::Ready {
                                    ready: true,
                                    starting: false,
                                    port,
                                })
                                .await;
                            return;
                        }
                    }
                }
                tokio::time::sleep(READINESS_POLL_INTERVAL).await;
            }
        });
    }
}

/// Parse the helper's port advertisement.
pub fn parse_port(text: &str) -> Option<u16> {
    text.trim().parse().ok().filter(|port| *port != 0)
}

/// Read the advertised helper port from the well-known file.
pub fn read_port_file() -> Option<u16> {
    fs::read_to_string(HOST_PORT_FILE)
        .ok()
        .and_then(|text| parse_port(&text))
}

async fn pump_host_stream<R: AsyncRead + Unpin>(
    stream: R,
    is_stderr: bool,
    events_tx: mpsc::Sender<SupervisorEvent>,
    log_file: Option<Arc<StdMutex<fs::File>>>,
) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = if is_stderr {
            format!("[stderr] {line}")
        } else {
            line
        };
        if let Some(file) = &log_file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
        if events_tx.try_send(SupervisorEvent::Log(line)).is_err() {
            debug!("host log channel full, dropping line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("8080"), Some(8080));
        assert_eq!(parse_port("  9000\n"), Some(9000));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("not-a-port"), None);
        assert_eq!(parse_port(""), None);
    }

    #[test]
    fn test_scan_port_list_is_closed() {
        assert_eq!(
            HOST_SCAN_PORTS,
            [8080, 8081, 8082, 8083, 8084, 8085, 8008, 9000]
        );
    }

    #[tokio::test]
    async fn test_stop_without_child_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths {
            data_dir: dir.path().to_path_buf(),
            logs_dir: dir.path().join("logs"),
            bin_dir: dir.path().join("bin"),
            frames_dir: dir.path().join("frames"),
        };
        let (supervisor, mut events_rx) = HostSupervisor::new(paths, DeviceConfig::default());
        supervisor.stop().await;
        assert!(!supervisor.is_supervising().await);
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_host_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths {
            data_dir: dir.path().to_path_buf(),
            logs_dir: dir.path().join("logs"),
            bin_dir: dir.path().join("bin"),
            frames_dir: dir.path().join("frames"),
        };
        let (supervisor, _events_rx) = HostSupervisor::new(paths, DeviceConfig::default());
        assert!(supervisor.ensure_host_binary().is_err());
    }
}
