//! Sequential child-process pipeline stages with streamed log capture.
//!
//! The state machine (`PipelineState`) is pure and owns no processes; the
//! runner (`PipelineRunner`) owns the child handles and the bounded log
//! channel, and is driven by periodic drain ticks from the caller.

use std::collections::VecDeque;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{self, AppPaths};

/// Bounded log channel capacity; enqueues drop when full.
pub const LOG_CHANNEL_CAPACITY: usize = 100;
/// Most recent log lines retained for display.
pub const LOG_RING_CAPACITY: usize = 100;
/// Log lines longer than this are truncated with an ellipsis.
pub const MAX_LOG_LINE: usize = 150;
/// Events drained from the channel per tick.
pub const DRAIN_BATCH: usize = 20;
/// Drain tick cadence.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Which stage list a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineType {
    Goat,
    Arxiv,
    Demo,
}

impl PipelineType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "goat" => Some(PipelineType::Goat),
            "arxiv" => Some(PipelineType::Arxiv),
            "demo" => Some(PipelineType::Demo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineType::Goat => "goat",
            PipelineType::Arxiv => "arxiv",
            PipelineType::Demo => "demo",
        }
    }
}

/// One externally-launched pipeline stage.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub name: String,
    pub bin_name: String,
    pub args: Vec<String>,
    pub description: String,
    /// Native libraries the stage expects next to its binary.
    pub native_libs: Vec<String>,
}

impl StageDescriptor {
    fn new(name: &str, bin_name: &str, args: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            bin_name: bin_name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            description: description.to_string(),
            native_libs: Vec::new(),
        }
    }

    fn with_native_libs(mut self, libs: &[&str]) -> Self {
        self.native_libs = libs.iter().map(|l| l.to_string()).collect();
        self
    }
}

/// Stage list for a pipeline type. The demo pipeline omits the encoder and
/// feeds miner output directly to the trainer.
pub fn stage_plan(pipeline_type: PipelineType) -> Vec<StageDescriptor> {
    let miner_flag = match pipeline_type {
        PipelineType::Goat => "-goat",
        PipelineType::Arxiv => "-arxiv-enable",
        PipelineType::Demo => "-demo",
    };
    let miner = StageDescriptor::new(
        "mining",
        "data-miner",
        &[miner_flag],
        "Extract text chunks from source documents",
    );
    let encoder = StageDescriptor::new(
        "encoding",
        "data-encoder",
        &["-workers", "4"],
        "Tokenize chunks into training frames",
    );
    let trainer = StageDescriptor::new(
        "training",
        "data-trainer",
        &[
            "-verbose",
            "-epochs",
            "3",
            "-sequential",
            "-hash-method",
            "optimized",
        ],
        "Search golden seeds for each training frame",
    )
    .with_native_libs(&["libhasher_kernel.so"]);

    match pipeline_type {
        PipelineType::Demo => vec![miner, trainer],
        _ => vec![miner, encoder, trainer],
    }
}

/// Log or terminal event produced by a running stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineLogEvent {
    pub log: String,
    pub stage_index: i32,
    pub complete: bool,
    pub error: bool,
}

/// Final result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub success: bool,
    pub message: String,
}

/// What the state machine asks the runner to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum StageAction {
    LaunchStage(usize),
    Finished { success: bool, message: String },
    None,
}

/// Pure pipeline run state: advancement, progress, and the log ring.
#[derive(Debug)]
pub struct PipelineState {
    pub pipeline_type: PipelineType,
    pub stages: Vec<StageDescriptor>,
    pub stage_index: i32,
    pub running: bool,
    pub progress: f64,
    pub logs: VecDeque<String>,
}

impl PipelineState {
    pub fn new(pipeline_type: PipelineType) -> Self {
        Self::with_stages(pipeline_type, stage_plan(pipeline_type))
    }

    pub fn with_stages(pipeline_type: PipelineType, stages: Vec<StageDescriptor>) -> Self {
        Self {
            pipeline_type,
            stages,
            stage_index: -1,
            running: false,
            progress: 0.0,
            logs: VecDeque::with_capacity(LOG_RING_CAPACITY),
        }
    }

    /// Begin a run: emits the initializing log and asks for stage 0.
    pub fn begin(&mut self) -> StageAction {
        if self.stages.is_empty() {
            return StageAction::Finished {
                success: false,
                message: "pipeline has no stages".to_string(),
            };
        }
        self.running = true;
        self.stage_index = -1;
        self.progress = 0.0;
        self.push_log("starting pipeline...".to_string());
        StageAction::LaunchStage(0)
    }

    /// Append to the bounded log ring, dropping the oldest line when full.
    pub fn push_log(&mut self, line: String) {
        if self.logs.len() >= LOG_RING_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    /// Integrate one drained event. Cancelled runs abandon pending events.
    pub fn on_event(&mut self, event: &PipelineLogEvent) -> StageAction {
        if !self.running {
            return StageAction::None;
        }
        if !event.log.is_empty() {
            self.push_log(event.log.clone());
        }
        if event.stage_index > self.stage_index {
            self.stage_index = event.stage_index;
        }
        if event.error {
            self.running = false;
            return StageAction::Finished {
                success: false,
                message: event.log.clone(),
            };
        }
        if event.complete {
            let finished = event.stage_index.max(0) as usize;
            self.progress = (finished + 1) as f64 / self.stages.len() as f64;
            let next = finished + 1;
            if next < self.stages.len() {
                self.stage_index = next as i32;
                return StageAction::LaunchStage(next);
            }
            self.running = false;
            self.progress = 1.0;
            return StageAction::Finished {
                success: true,
                message: "pipeline complete".to_string(),
            };
        }
        StageAction::None
    }

    /// Stop advancement; pending channel events are abandoned.
    pub fn cancel(&mut self) {
        self.running = false;
    }

    pub fn fail(&mut self, message: String) {
        self.push_log(message);
        self.running = false;
    }

    pub fn stage_name(&self) -> String {
        if !self.running && (self.progress - 1.0).abs() < f64::EPSILON {
            return "complete".to_string();
        }
        if self.stage_index < 0 {
            return "initializing".to_string();
        }
        self.stages
            .get(self.stage_index as usize)
            .map(|stage| stage.name.clone())
            .unwrap_or_else(|| "initializing".to_string())
    }
}

/// Truncate a raw child log line for display.
pub fn truncate_log_line(line: &str) -> String {
    let count = line.chars().count();
    if count <= MAX_LOG_LINE {
        return line.to_string();
    }
    let mut truncated: String = line.chars().take(MAX_LOG_LINE).collect();
    truncated.push_str("...");
    truncated
}

/// Result of one drain tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub events: Vec<PipelineLogEvent>,
    pub outcome: Option<PipelineOutcome>,
}

/// Owns the stage processes and the bounded event channel.
pub struct PipelineRunner {
    paths: AppPaths,
    pub state: PipelineState,
    events_tx: mpsc::Sender<PipelineLogEvent>,
    events_rx: mpsc::Receiver<PipelineLogEvent>,
    current_child: Arc<Mutex<Option<Child>>>,
}

impl PipelineRunner {
    pub fn new(paths: AppPaths, pipeline_type: PipelineType) -> Self {
        let (events_tx, events_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        Self {
            paths,
            state: PipelineState::new(pipeline_type),
            events_tx,
            events_rx,
            current_child: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the run by launching stage 0.
    pub async fn start(&mut self) -> Result<Option<PipelineOutcome>> {
        info!(
            pipeline = self.state.pipeline_type.as_str(),
            stages = self.state.stages.len(),
            "starting pipeline"
        );
        match self.state.begin() {
            StageAction::LaunchStage(index) => {
                if let Err(error) = self.launch_stage(index).await {
                    let message = format!("stage failed to start: {error:#}");
                    self.state.fail(message.clone());
                    return Ok(Some(PipelineOutcome {
                        success: false,
                        message,
                    }));
                }
                Ok(None)
            }
            StageAction::Finished { success, message } => {
                Ok(Some(PipelineOutcome { success, message }))
            }
            StageAction::None => Ok(None),
        }
    }

    /// Drain up to [`DRAIN_BATCH`] events, advancing stages as terminal
    /// events arrive. Never blocks.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if !self.state.running {
            return report;
        }
        for _ in 0..DRAIN_BATCH {
            let event = match self.events_rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            let action = self.state.on_event(&event);
            report.events.push(event);
            match action {
                StageAction::LaunchStage(index) => {
                    if let Err(error) = self.launch_stage(index).await {
                        let message = format!("stage failed to start: {error:#}");
                        self.state.fail(message.clone());
                        report.outcome = Some(PipelineOutcome {
                            success: false,
                            message,
                        });
                        return report;
                    }
                }
                StageAction::Finished { success, message } => {
                    report.outcome = Some(PipelineOutcome { success, message });
                    return report;
                }
                StageAction::None => {}
            }
        }
        report
    }

    /// Flip the run off and terminate the current stage process.
    pub async fn cancel(&mut self) {
        self.state.cancel();
        if let Some(mut child) = self.current_child.lock().await.take() {
            if let Err(error) = child.kill().await {
                warn!("failed to kill pipeline stage: {error}");
            }
        }
    }

    async fn launch_stage(&self, index: usize) -> Result<()> {
        let stage = self
            .state
            .stages
            .get(index)
            .with_context(|| format!("no stage at index {index}"))?
            .clone();
        let binary = config::resolve_stage_binary(&self.paths, &stage.bin_name)
            .with_context(|| format!("stage binary '{}' not found", stage.bin_name))?;
        let bin_dir = binary
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Path::new(".").to_path_buf());

        ensure_native_libs(&stage, &bin_dir);

        let mut command = Command::new(&binary);
        command
            .args(&stage.args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if !stage.native_libs.is_empty() {
            command.env("LD_LIBRARY_PATH", library_path_with(&bin_dir));
        }

        info!(stage = %stage.name, binary = %binary.display(), "launching pipeline stage");
        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", binary.display()))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_stream(stdout, index as i32, self.events_tx.clone(), false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_stream(stderr, index as i32, self.events_tx.clone(), true));
        }

        *self.current_child.lock().await = Some(child);
        self.spawn_waiter(index as i32, stage.name.clone());
        Ok(())
    }

    /// Poll the stage process until it exits, then enqueue the terminal
    /// event. Polling (rather than an owned `wait`) keeps the handle
    /// reachable for cancellation.
    fn spawn_waiter(&self, stage_index: i32, stage_name: String) {
        let handle = Arc::clone(&self.current_child);
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            loop {
                let status = {
                    let mut guard = handle.lock().await;
                    match guard.as_mut() {
                        Some(child) => child.try_wait(),
                        None => return, // cancelled and reaped
                    }
                };
                match status {
                    Ok(Some(status)) => {
                        handle.lock().await.take();
                        let event = if status.success() {
                            PipelineLogEvent {
                                log: format!("stage '{stage_name}' complete"),
                                stage_index,
                                complete: true,
                                ..Default::default()
                            }
                        } else {
                            PipelineLogEvent {
                                log: format!("stage '{stage_name}' failed: {status}"),
                                stage_index,
                                error: true,
                                ..Default::default()
                            }
                        };
                        // terminal events must arrive; block this task, not
                        // the producer loop
                        let _ = events_tx.send(event).await;
                        return;
                    }
                    Ok(None) => tokio::time::sleep(Duration::from_millis(100)).await,
                    Err(error) => {
                        let _ = events_tx
                            .send(PipelineLogEvent {
                                log: format!("stage '{stage_name}' wait failed: {error}"),
                                stage_index,
                                error: true,
                                ..Default::default()
                            })
                            .await;
                        return;
                    }
                }
            }
        });
    }
}

async fn pump_stream<R: AsyncRead + Unpin>(
    stream: R,
    stage_index: i32,
    events_tx: mpsc::Sender<PipelineLogEvent>,
    is_stderr: bool,
) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut log = truncate_log_line(&line);
        if is_stderr {
            log = format!("[stderr] {log}");
        }
        let event = PipelineLogEvent {
            log,
            stage_index,
            ..Default::default()
        };
        if events_tx.try_send(event).is_err() {
            // channel full: the line is dropped, never block the reader
            debug!("pipeline log channel full, dropping line");
        }
    }
}

/// Copy declared native libraries next to the stage binary when missing.
/// One-shot and best-effort; absence never fails the stage.
fn ensure_native_libs(stage: &StageDescriptor, bin_dir: &Path) {
    for lib in &stage.native_libs {
        let destination = bin_dir.join(lib);
        if destination.exists() {
            continue;
        }
        let candidates = [Path::new("lib").join(lib), Path::new(".").join(lib)];
        for candidate in &candidates {
            if candidate.exists() {
                match fs::copy(candidate, &destination) {
                    Ok(_) => {
                        info!(lib = %lib, "staged native library");
                        break;
                    }
                    Err(error) => warn!(lib = %lib, "native library copy failed: {error}"),
                }
            }
        }
    }
}

fn library_path_with(bin_dir: &Path) -> std::ffi::OsString {
    let mut entries = vec![bin_dir.to_path_buf()];
    if let Some(existing) = env::var_os("LD_LIBRARY_PATH") {
        entries.extend(env::split_paths(&existing));
    }
    env::join_paths(entries).unwrap_or_else(|_| bin_dir.as_os_str().to_os_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_stages() -> Vec<StageDescriptor> {
        ["a", "b", "c"]
            .iter()
            .map(|name| StageDescriptor::new(name, name, &[], ""))
            .collect()
    }

    fn complete_event(stage_index: i32) -> PipelineLogEvent {
        PipelineLogEvent {
            log: format!("stage {stage_index} complete"),
            stage_index,
            complete: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_sequential_advancement() {
        let mut state = PipelineState::with_stages(PipelineType::Goat, synthetic_stages());
        let mut launches = Vec::new();

        if let StageAction::LaunchStage(i) = state.begin() {
            launches.push(i);
        }
        assert_eq!(state.stage_name(), "initializing");
        for stage in 0..3 {
            match state.on_event(&complete_event(stage)) {
                StageAction::LaunchStage(i) => launches.push(i),
                StageAction::Finished { success, .. } => assert!(success),
                StageAction::None => panic!("expected advancement"),
            }
        }

        assert_eq!(launches, vec![0, 1, 2]);
        assert!((state.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(state.stage_name(), "complete");
        assert!(!state.running);
    }

    #[test]
    fn test_error_event_stops_run() {
        let mut state = PipelineState::with_stages(PipelineType::Goat, synthetic_stages());
        state.begin();
        let action = state.on_event(&PipelineLogEvent {
            log: "boom".to_string(),
            stage_index: 0,
            error: true,
            ..Default::default()
        });
        assert!(matches!(action, StageAction::Finished { success: false, .. }));
        assert!(!state.running);
    }

    #[test]
    fn test_cancel_abandons_pending_events() {
        let mut state = PipelineState::with_stages(PipelineType::Goat, synthetic_stages());
        state.begin();
        state.cancel();
        assert_eq!(state.on_event(&complete_event(0)), StageAction::None);
        assert_eq!(state.progress, 0.0);
    }

    #[test]
    fn test_progress_fractions() {
        let mut state = PipelineState::with_stages(PipelineType::Goat, synthetic_stages());
        state.begin();
        state.on_event(&complete_event(0));
        assert!((state.progress - 1.0 / 3.0).abs() < 1e-9);
        state.on_event(&complete_event(1));
        assert!((state.progress - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_demo_plan_omits_encoder() {
        let demo = stage_plan(PipelineType::Demo);
        assert_eq!(demo.len(), 2);
        assert_eq!(demo[0].bin_name, "data-miner");
        assert_eq!(demo[0].args, vec!["-demo"]);
        assert_eq!(demo[1].bin_name, "data-trainer");

        let goat = stage_plan(PipelineType::Goat);
        assert_eq!(goat.len(), 3);
        assert_eq!(goat[1].bin_name, "data-encoder");
        assert_eq!(goat[1].args, vec!["-workers", "4"]);
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let mut state = PipelineState::with_stages(PipelineType::Goat, synthetic_stages());
        for i in 0..(LOG_RING_CAPACITY + 25) {
            state.push_log(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), LOG_RING_CAPACITY);
        assert_eq!(state.logs.front().map(String::as_str), Some("line 25"));
    }

    #[test]
    fn test_log_truncation() {
        let long = "x".repeat(400);
        let truncated = truncate_log_line(&long);
        assert_eq!(truncated.chars().count(), MAX_LOG_LINE + 3);
        assert!(truncated.ends_with("..."));

        let short = "short line";
        assert_eq!(truncate_log_line(short), short);
    }

    #[test]
    fn test_pipeline_type_parsing() {
        assert_eq!(PipelineType::parse("GOAT"), Some(PipelineType::Goat));
        assert_eq!(PipelineType::parse("arxiv"), Some(PipelineType::Arxiv));
        assert_eq!(PipelineType::parse("demo"), Some(PipelineType::Demo));
        assert_eq!(PipelineType::parse("other"), None);
    }
}
