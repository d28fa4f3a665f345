//! View state and the single-threaded update cycle.

use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::pipeline::{PipelineType, LOG_RING_CAPACITY};
use crate::supervisor::HOST_LOG_CAPACITY;

use super::event::{AppEvent, Command};

/// The active screen. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    MainMenu,
    AsicConfig,
    Chat,
    Progress,
    Pipeline,
    PipelineTypeSelect,
}

pub const MAIN_MENU_ITEMS: [&str; 7] = [
    "Run Training Pipeline",
    "Chat with Model",
    "Training Progress",
    "ASIC Configuration",
    "Start Host Service",
    "Stop Host Service",
    "Quit",
];

pub const PIPELINE_TYPE_ITEMS: [&str; 3] = ["goat", "arxiv", "demo"];

const CHAT_LOG_CAPACITY: usize = 200;
const ACTIVITY_LOG_CAPACITY: usize = 100;

/// Pipeline run facts mirrored into the view.
#[derive(Debug, Default)]
pub struct PipelineViewState {
    pub running: bool,
    pub stage_index: i32,
    pub stage_name: String,
    pub progress: f64,
    pub logs: VecDeque<String>,
    pub pipeline_type: Option<PipelineType>,
}

/// All mutable view state. Only `update` touches it.
#[derive(Debug)]
pub struct AppState {
    pub view: View,
    pub menu_index: usize,
    pub type_menu_index: usize,
    pub device_index: usize,
    pub chat_input: String,
    pub chat_log: VecDeque<String>,
    pub logs: VecDeque<String>,
    pub host_logs: VecDeque<String>,
    pub pipeline: PipelineViewState,
    pub progress: f64,
    pub progress_message: String,
    pub host_ready: bool,
    pub host_starting: bool,
    pub host_port: Option<u16>,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub devices: Vec<String>,
    pub selected_device: Option<String>,
    pub copy_notice: Option<String>,
    pub should_quit: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            view: View::MainMenu,
            menu_index: 0,
            type_menu_index: 0,
            device_index: 0,
            chat_input: String::new(),
            chat_log: VecDeque::new(),
            logs: VecDeque::new(),
            host_logs: VecDeque::new(),
            pipeline: PipelineViewState::default(),
            progress: 0.0,
            progress_message: String::new(),
            host_ready: false,
            host_starting: false,
            host_port: None,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            devices: Vec::new(),
            selected_device: None,
            copy_notice: None,
            should_quit: false,
        }
    }

    /// Integrate one event and return the effects to run afterwards.
    pub fn update(&mut self, event: AppEvent) -> Vec<Command> {
        match event {
            AppEvent::Key(key) => self.on_key(key),
            AppEvent::Mouse(_) | AppEvent::Resize(_, _) => Vec::new(),
            AppEvent::TelemetryTick {
                cpu_percent,
                memory_percent,
            } => {
                self.cpu_percent = cpu_percent;
                self.memory_percent = memory_percent;
                Vec::new()
            }
            AppEvent::AppendLog(line) => {
                self.push_log(line);
                Vec::new()
            }
            AppEvent::AppendChat(line) => {
                self.push_chat(line);
                Vec::new()
            }
            AppEvent::LogAndChat { log, chat } => {
                self.push_log(log);
                self.push_chat(chat);
                Vec::new()
            }
            AppEvent::ProgressUpdate { progress, message } => {
                self.progress = progress.clamp(0.0, 1.0);
                self.progress_message = message;
                Vec::new()
            }
            AppEvent::PipelineProgress {
                stage_index,
                stage,
                progress,
            } => {
                self.pipeline.stage_index = stage_index;
                self.pipeline.stage_name = stage;
                self.pipeline.progress = progress.clamp(0.0, 1.0);
                Vec::new()
            }
            AppEvent::PipelineLog { log, .. } => {
                push_bounded(&mut self.pipeline.logs, log, LOG_RING_CAPACITY);
                Vec::new()
            }
            AppEvent::PipelineComplete { success, message } => {
                self.pipeline.running = false;
                if success {
                    self.pipeline.progress = 1.0;
                    self.pipeline.stage_name = "complete".to_string();
                }
                self.push_log(message);
                Vec::new()
            }
            AppEvent::HostLogPoll(lines) => {
                for line in lines {
                    push_bounded(&mut self.host_logs, line, HOST_LOG_CAPACITY);
                }
                Vec::new()
            }
            AppEvent::ServerReady {
                ready,
                starting,
                port,
            } => {
                self.host_ready = ready;
                self.host_starting = starting;
                self.host_port = if port > 0 { Some(port) } else { None };
                if ready {
                    self.push_log(format!("host service ready on port {port}"));
                } else if starting {
                    self.push_log("host service starting...".to_string());
                }
                Vec::new()
            }
            AppEvent::ServerCmd { message } => {
                if message.contains("stopped") {
                    self.host_ready = false;
                    self.host_starting = false;
                    self.host_port = None;
                }
                self.push_log(message);
                Vec::new()
            }
            AppEvent::DeviceSelected(device) => {
                self.selected_device = Some(device.clone());
                self.push_log(format!("device selected: {device}"));
                Vec::new()
            }
            AppEvent::DiscoveryResult(devices) => {
                self.devices = devices;
                self.device_index = 0;
                Vec::new()
            }
            AppEvent::CopyNoticeHide => {
                self.copy_notice = None;
                Vec::new()
            }
            AppEvent::TextSelected(_text) => {
                self.copy_notice = Some("copied to clipboard".to_string());
                vec![Command::ScheduleCopyNoticeHide]
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<Command> {
        // one quit handler, active in every view
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return vec![Command::Quit];
        }
        match self.view {
            View::MainMenu => self.on_main_menu_key(key),
            View::PipelineTypeSelect => self.on_type_select_key(key),
            View::Chat => self.on_chat_key(key),
            View::AsicConfig => self.on_config_key(key),
            View::Progress | View::Pipeline => self.on_passive_view_key(key),
        }
    }

    fn on_main_menu_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Up => {
                self.menu_index = self.menu_index.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Down => {
                self.menu_index = (self.menu_index + 1).min(MAIN_MENU_ITEMS.len() - 1);
                Vec::new()
            }
            KeyCode::Enter => self.activate_menu_item(),
            _ => Vec::new(),
        }
    }

    fn activate_menu_item(&mut self) -> Vec<Command> {
        match self.menu_index {
            0 => {
                self.view = View::PipelineTypeSelect;
                Vec::new()
            }
            1 => {
                self.view = View::Chat;
                Vec::new()
            }
            2 => {
                self.view = View::Progress;
                Vec::new()
            }
            3 => {
                self.view = View::AsicConfig;
                Vec::new()
            }
            4 => {
                self.push_log("starting host service".to_string());
                vec![Command::StartHost]
            }
            5 => {
                self.push_log("stopping host service".to_string());
                vec![Command::StopHost]
            }
            _ => {
                self.should_quit = true;
                vec![Command::Quit]
            }
        }
    }

    fn on_type_select_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Up => {
                self.type_menu_index = self.type_menu_index.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Down => {
                self.type_menu_index =
                    (self.type_menu_index + 1).min(PIPELINE_TYPE_ITEMS.len() - 1);
                Vec::new()
            }
            KeyCode::Enter => {
                let Some(pipeline_type) =
                    PipelineType::parse(PIPELINE_TYPE_ITEMS[self.type_menu_index])
                else {
                    return Vec::new();
                };
                self.view = View::Pipeline;
                self.pipeline = PipelineViewState {
                    running: true,
                    stage_index: -1,
                    stage_name: "initializing".to_string(),
                    pipeline_type: Some(pipeline_type),
                    ..PipelineViewState::default()
                };
                vec![Command::StartPipeline(pipeline_type)]
            }
            KeyCode::Esc => {
                self.view = View::MainMenu;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_chat_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Esc => {
                self.view = View::MainMenu;
                Vec::new()
            }
            KeyCode::Enter => {
                let text = self.chat_input.trim().to_string();
                self.chat_input.clear();
                if text.is_empty() {
                    return Vec::new();
                }
                self.push_chat(format!("you: {text}"));
                vec![Command::SendInference(text)]
            }
            KeyCode::Backspace => {
                self.chat_input.pop();
                Vec::new()
            }
            KeyCode::Char(c) => {
                self.chat_input.push(c);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_config_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Esc => {
                self.view = View::MainMenu;
                Vec::new()
            }
            KeyCode::Up => {
                self.device_index = self.device_index.saturating_sub(1);
                Vec::new()
            }
            KeyCode::Down => {
                if !self.devices.is_empty() {
                    self.device_index = (self.device_index + 1).min(self.devices.len() - 1);
                }
                Vec::new()
            }
            KeyCode::Enter => {
                if let Some(device) = self.devices.get(self.device_index).cloned() {
                    self.selected_device = Some(device.clone());
                    self.push_log(format!("device selected: {device}"));
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_passive_view_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Esc => {
                // the run keeps going; only the view goes back
                self.view = View::MainMenu;
                Vec::new()
            }
            KeyCode::Char('x') if self.view == View::Pipeline && self.pipeline.running => {
                self.pipeline.running = false;
                self.push_log("pipeline cancelled".to_string());
                vec![Command::CancelPipeline]
            }
            _ => Vec::new(),
        }
    }

    fn push_log(&mut self, line: String) {
        push_bounded(&mut self.logs, line, ACTIVITY_LOG_CAPACITY);
    }

    fn push_chat(&mut self, line: String) {
        push_bounded(&mut self.chat_log, line, CHAT_LOG_CAPACITY);
    }
}

fn push_bounded(ring: &mut VecDeque<String>, line: String, capacity: usize) {
    if ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(line);
}
