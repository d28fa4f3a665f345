//! Terminal UI runtime: one cooperative update loop, effects outside it.
//!
//! Input, telemetry, pipeline stages and the host supervisor all feed typed
//! events into one bounded channel; `AppState::update` is the only mutator
//! of view state, and every redraw renders from pure state.

pub mod event;
pub mod state;
pub mod view;

use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event as TerminalEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::config::{self, AppPaths, DeviceConfig};
use crate::counters::DailyCounter;
use crate::host_client::{HostClient, InferenceRequest};
use crate::pipeline::{PipelineRunner, DRAIN_INTERVAL};
use crate::supervisor::{HostSupervisor, SupervisorEvent};

use self::event::{AppEvent, Command};
use self::state::AppState;

const EVENT_QUEUE_CAPACITY: usize = 256;
const TELEMETRY_INTERVAL: Duration = Duration::from_secs(2);
const COPY_NOTICE_DURATION: Duration = Duration::from_secs(2);
const HOST_DRAIN_BATCH: usize = 20;

/// Run the interactive terminal session until the user quits.
pub async fn run_tui(paths: AppPaths) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, paths).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    paths: AppPaths,
) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::channel::<AppEvent>(EVENT_QUEUE_CAPACITY);
    let input_alive = Arc::new(AtomicBool::new(true));
    spawn_input_thread(events_tx.clone(), Arc::clone(&input_alive));
    spawn_telemetry(events_tx.clone());

    let mut state = AppState::new();
    let mut effects = Effects::new(paths, events_tx);

    let mut drain = tokio::time::interval(DRAIN_INTERVAL);
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal.draw(|frame| view::render(&state, frame))?;

        tokio::select! {
            received = events_rx.recv() => {
                let Some(incoming) = received else { break };
                let commands = state.update(incoming);
                effects.execute(commands, &mut state).await;
            }
            _ = drain.tick() => {
                effects.drain(&mut state).await;
            }
        }

        if state.should_quit {
            break;
        }
    }

    input_alive.store(false, Ordering::Relaxed);
    effects.shutdown().await;
    Ok(())
}

/// Blocking terminal-input reader on its own thread.
fn spawn_input_thread(events_tx: mpsc::Sender<AppEvent>, alive: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        while alive.load(Ordering::Relaxed) {
            let ready = crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false);
            if !ready {
                continue;
            }
            match crossterm::event::read() {
                Ok(TerminalEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                    if events_tx.blocking_send(AppEvent::Key(key)).is_err() {
                        return;
                    }
                }
                Ok(TerminalEvent::Mouse(mouse)) => {
                    let _ = events_tx.blocking_send(AppEvent::Mouse(mouse));
                }
                Ok(TerminalEvent::Resize(width, height)) => {
                    let _ = events_tx.blocking_send(AppEvent::Resize(width, height));
                }
                _ => {}
            }
        }
    });
}

/// CPU/memory sampling on a fixed cadence.
fn spawn_telemetry(events_tx: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let mut system = System::new();
        let mut ticker = tokio::time::interval(TELEMETRY_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            system.refresh_cpu();
            system.refresh_memory();
            let cpu_percent = system.global_cpu_info().cpu_usage();
            let memory_percent = if system.total_memory() == 0 {
                0.0
            } else {
                system.used_memory() as f32 * 100.0 / system.total_memory() as f32
            };
            let event = AppEvent::TelemetryTick {
                cpu_percent,
                memory_percent,
            };
            if events_tx.send(event).await.is_err() {
                return;
            }
        }
    });
}

/// Owns every effectful collaborator so the update loop never blocks on one.
struct Effects {
    paths: AppPaths,
    events_tx: mpsc::Sender<AppEvent>,
    pipeline: Option<PipelineRunner>,
    supervisor: Option<HostSupervisor>,
    supervisor_rx: Option<mpsc::Receiver<SupervisorEvent>>,
    request_meter: DailyCounter,
}

impl Effects {
    fn new(paths: AppPaths, events_tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            paths,
            events_tx,
            pipeline: None,
            supervisor: None,
            supervisor_rx: None,
            request_meter: DailyCounter::new(config::embeddings_daily_limit()),
        }
    }

    async fn execute(&mut self, commands: Vec<Command>, state: &mut AppState) {
        for command in commands {
            match command {
                Command::StartPipeline(pipeline_type) => {
                    let already_running = self
                        .pipeline
                        .as_ref()
                        .map(|runner| runner.state.running)
                        .unwrap_or(false);
                    if already_running {
                        apply(state, AppEvent::AppendLog("pipeline already running".into()));
                        continue;
                    }
                    let mut runner = PipelineRunner::new(self.paths.clone(), pipeline_type);
                    match runner.start().await {
                        Ok(Some(outcome)) => apply(
                            state,
                            AppEvent::PipelineComplete {
                                success: outcome.success,
                                message: outcome.message,
                            },
                        ),
                        Ok(None) => {}
                        Err(error) => apply(
                            state,
                            AppEvent::PipelineComplete {
                                success: false,
                                message: format!("pipeline start failed: {error:#}"),
                            },
                        ),
                    }
                    self.pipeline = Some(runner);
                }
                Command::CancelPipeline => {
                    if let Some(runner) = self.pipeline.as_mut() {
                        runner.cancel().await;
                    }
                }
                Command::SendInference(text) => self.send_inference(text, state),
                Command::StartHost => {
                    if self.supervisor.is_none() {
                        let device = DeviceConfig::load(&self.paths);
                        let (supervisor, events) =
                            HostSupervisor::new(self.paths.clone(), device);
                        self.supervisor = Some(supervisor);
                        self.supervisor_rx = Some(events);
                    }
                    if let Some(supervisor) = &self.supervisor {
                        if let Err(error) = supervisor.start().await {
                            apply(
                                state,
                                AppEvent::AppendLog(format!("host start failed: {error:#}")),
                            );
                        }
                    }
                }
                Command::StopHost => {
                    if let Some(supervisor) = &self.supervisor {
                        supervisor.stop().await;
                    }
                }
                Command::ScheduleCopyNoticeHide => {
                    let events_tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(COPY_NOTICE_DURATION).await;
                        let _ = events_tx.send(AppEvent::CopyNoticeHide).await;
                    });
                }
                Command::Quit => {}
            }
        }
    }

    fn send_inference(&mut self, text: String, state: &mut AppState) {
        let Some(port) = state.host_port.filter(|_| state.host_ready) else {
            apply(
                state,
                AppEvent::AppendChat("host service is not ready".to_string()),
            );
            return;
        };
        if !self.request_meter.can_make_request() {
            apply(
                state,
                AppEvent::AppendChat("daily request limit reached".to_string()),
            );
            return;
        }
        self.request_meter.increment();
        let events_tx = self.events_tx.clone();
        let client = HostClient::new(port);
        tokio::spawn(async move {
            let request = InferenceRequest {
                text,
                options: None,
            };
            let outcome = match client.crypto_transformer(&request).await {
                Ok(reply) => AppEvent::AppendChat(format!("model: {}", reply.response)),
                Err(error) => AppEvent::LogAndChat {
                    log: format!("inference failed: {error:#}"),
                    chat: format!("error: {error:#}"),
                },
            };
            let _ = events_tx.send(outcome).await;
        });
    }

    /// One drain tick: bounded pipeline drain plus host event integration.
    async fn drain(&mut self, state: &mut AppState) {
        if let Some(runner) = self.pipeline.as_mut() {
            let report = runner.tick().await;
            for stage_event in &report.events {
                apply(
                    state,
                    AppEvent::PipelineLog {
                        log: stage_event.log.clone(),
                        stage_index: stage_event.stage_index,
                    },
                );
            }
            if !report.events.is_empty() || report.outcome.is_some() {
                apply(
                    state,
                    AppEvent::PipelineProgress {
                        stage_index: runner.state.stage_index,
                        stage: runner.state.stage_name(),
                        progress: runner.state.progress,
                    },
                );
            }
            if let Some(outcome) = report.outcome {
                apply(
                    state,
                    AppEvent::PipelineComplete {
                        success: outcome.success,
                        message: outcome.message,
                    },
                );
            }
        }

        if let Some(events) = self.supervisor_rx.as_mut() {
            let mut lines = Vec::new();
            for _ in 0..HOST_DRAIN_BATCH {
                match events.try_recv() {
                    Ok(SupervisorEvent::Log(line)) => lines.push(line),
                    Ok(SupervisorEvent::Ready {
                        ready,
                        starting,
                        port,
                    }) => apply(
                        state,
                        AppEvent::ServerReady {
                            ready,
                            starting,
                            port,
                        },
                    ),
                    Ok(SupervisorEvent::Stopped { message }) => {
                        apply(state, AppEvent::ServerCmd { message })
                    }
                    Err(_) => break,
                }
            }
            if !lines.is_empty() {
                apply(state, AppEvent::HostLogPoll(lines));
            }
        }
    }

    async fn shutdown(&mut self) {
        // quit does not await in-flight external calls; the pipeline stage
        // is terminated, an adopted host keeps running
        if let Some(runner) = self.pipeline.as_mut() {
            if runner.state.running {
                runner.cancel().await;
            }
        }
        if self.supervisor.is_some() {
            warn!("leaving host service running for later adoption");
        }
    }
}

/// Feed a follow-up event straight through the update cycle.
fn apply(state: &mut AppState, event: AppEvent) {
    let _ = state.update(event);
}
