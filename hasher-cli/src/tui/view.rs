//! Pure state-to-frame rendering.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap};
use ratatui::Frame;

use super::state::{AppState, View, MAIN_MENU_ITEMS, PIPELINE_TYPE_ITEMS};

pub fn render(state: &AppState, frame: &mut Frame) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.size());

    render_header(state, frame, areas[0]);
    match state.view {
        View::MainMenu => render_menu(state, frame, areas[1]),
        View::PipelineTypeSelect => render_type_select(state, frame, areas[1]),
        View::Chat => render_chat(state, frame, areas[1]),
        View::Progress => render_progress(state, frame, areas[1]),
        View::Pipeline => render_pipeline(state, frame, areas[1]),
        View::AsicConfig => render_config(state, frame, areas[1]),
    }
    render_footer(state, frame, areas[2]);
}

fn render_header(state: &AppState, frame: &mut Frame, area: Rect) {
    let host = if state.host_ready {
        format!(
            "host: ready:{}",
            state.host_port.map(|p| p.to_string()).unwrap_or_default()
        )
    } else if state.host_starting {
        "host: starting".to_string()
    } else {
        "host: offline".to_string()
    };
    let line = format!(
        "HASHER  |  cpu {:>5.1}%  mem {:>5.1}%  |  {host}",
        state.cpu_percent, state.memory_percent
    );
    let widget = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn selectable_list<'a>(
    items: &'a [String],
    selected: usize,
    title: &'a str,
) -> List<'a> {
    let rows: Vec<ListItem> = items
        .iter()
        .enumerate()
        .map(|(index, label)| {
            if index == selected {
                ListItem::new(format!("> {label}"))
                    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            } else {
                ListItem::new(format!("  {label}"))
            }
        })
        .collect();
    List::new(rows).block(Block::default().borders(Borders::ALL).title(title))
}

fn render_menu(state: &AppState, frame: &mut Frame, area: Rect) {
    let items: Vec<String> = MAIN_MENU_ITEMS.iter().map(|s| s.to_string()).collect();
    frame.render_widget(selectable_list(&items, state.menu_index, "Menu"), area);
}

fn render_type_select(state: &AppState, frame: &mut Frame, area: Rect) {
    let items: Vec<String> = PIPELINE_TYPE_ITEMS.iter().map(|s| s.to_string()).collect();
    frame.render_widget(
        selectable_list(&items, state.type_menu_index, "Pipeline Type"),
        area,
    );
}

fn render_chat(state: &AppState, frame: &mut Frame, area: Rect) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(area);

    let lines: Vec<Line> = state
        .chat_log
        .iter()
        .map(|line| Line::from(line.as_str()))
        .collect();
    let history = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Chat"));
    frame.render_widget(history, areas[0]);

    let input = Paragraph::new(format!("> {}", state.chat_input))
        .block(Block::default().borders(Borders::ALL).title("Message"));
    frame.render_widget(input, areas[1]);
}

fn render_progress(state: &AppState, frame: &mut Frame, area: Rect) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Training Progress"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(state.progress.clamp(0.0, 1.0))
        .label(state.progress_message.clone());
    frame.render_widget(gauge, areas[0]);

    let lines: Vec<Line> = state.logs.iter().map(|l| Line::from(l.as_str())).collect();
    let log = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Activity"));
    frame.render_widget(log, areas[1]);
}

fn render_pipeline(state: &AppState, frame: &mut Frame, area: Rect) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let title = format!(
        "Pipeline [{}] stage: {}",
        state
            .pipeline
            .pipeline_type
            .map(|t| t.as_str())
            .unwrap_or("-"),
        state.pipeline.stage_name
    );
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(state.pipeline.progress.clamp(0.0, 1.0));
    frame.render_widget(gauge, areas[0]);

    let lines: Vec<Line> = state
        .pipeline
        .logs
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();
    let log = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Stage Logs"));
    frame.render_widget(log, areas[1]);
}

fn render_config(state: &AppState, frame: &mut Frame, area: Rect) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(1)])
        .split(area);

    let selected = state
        .selected_device
        .as_deref()
        .unwrap_or("none configured");
    let summary = Paragraph::new(format!("selected device: {selected}"))
        .block(Block::default().borders(Borders::ALL).title("ASIC Configuration"));
    frame.render_widget(summary, areas[0]);

    if state.devices.is_empty() {
        let empty = Paragraph::new("no devices discovered yet")
            .block(Block::default().borders(Borders::ALL).title("Devices"));
        frame.render_widget(empty, areas[1]);
    } else {
        frame.render_widget(
            selectable_list(&state.devices, state.device_index, "Devices"),
            areas[1],
        );
    }
}

fn render_footer(state: &AppState, frame: &mut Frame, area: Rect) {
    let hint = match state.view {
        View::MainMenu => "↑/↓ select  Enter activate  Ctrl-C quit",
        View::PipelineTypeSelect => "↑/↓ select  Enter start  Esc back",
        View::Chat => "type message  Enter send  Esc back",
        View::Pipeline => "x cancel  Esc back",
        _ => "Esc back  Ctrl-C quit",
    };
    let line = match &state.copy_notice {
        Some(notice) => format!("{hint}  |  {notice}"),
        None => hint.to_string(),
    };
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL)),
        area,
    );
}
