//! The closed event and command sets of the message loop.

use crossterm::event::{KeyEvent, MouseEvent};

use crate::pipeline::PipelineType;

/// Everything that can reach the update loop. External work completes by
/// enqueueing one of these; handlers never block.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
    TelemetryTick {
        cpu_percent: f32,
        memory_percent: f32,
    },
    AppendLog(String),
    AppendChat(String),
    LogAndChat {
        log: String,
        chat: String,
    },
    ProgressUpdate {
        progress: f64,
        message: String,
    },
    PipelineProgress {
        stage_index: i32,
        stage: String,
        progress: f64,
    },
    PipelineLog {
        log: String,
        stage_index: i32,
    },
    PipelineComplete {
        success: bool,
        message: String,
    },
    HostLogPoll(Vec<String>),
    ServerReady {
        ready: bool,
        starting: bool,
        port: u16,
    },
    ServerCmd {
        message: String,
    },
    DeviceSelected(String),
    DiscoveryResult(Vec<String>),
    CopyNoticeHide,
    TextSelected(String),
}

/// Effects requested by the update loop, executed outside it. Results come
/// back as future [`AppEvent`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartPipeline(PipelineType),
    CancelPipeline,
    SendInference(String),
    StartHost,
    StopHost,
    ScheduleCopyNoticeHide,
    Quit,
}
