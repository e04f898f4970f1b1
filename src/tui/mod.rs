mod help;
mod state;

use crate::model::{RunOutcome, SelectorConfig, SelectorEvent};
use crate::orchestrator::{self, UiCommand};
use crate::selector::Selector;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use state::{apply_event, push_wrapped_status_kv, UiState, HELP_VIEW};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(cfg: SelectorConfig, selector: Arc<Selector>) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SelectorEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_selector = Arc::clone(&selector);
    let ui_handle = std::thread::spawn(move || run_threaded(ui_selector, event_rx, cmd_tx));

    let res = orchestrator::run_controller(selector, cfg.run_after, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    selector: Arc<Selector>,
    mut event_rx: UnboundedReceiver<SelectorEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; the selector is the shared piece.
    let mut state = UiState::new(&selector);
    let on_click = selector.handler();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Char('r')) => {
                        if state.running.is_some() {
                            state.info = "A routine is already running".into();
                        } else {
                            let _ = cmd_tx.send(UiCommand::Run);
                        }
                    }
                    (_, KeyCode::Char('s')) => {
                        state.info = match selector.persist() {
                            Ok(()) => format!("Saved to {}", state.storage),
                            Err(e) => format!("Save failed: {e}"),
                        };
                    }
                    (_, KeyCode::Tab) => state.views.next(),
                    (_, KeyCode::Char('?')) => state.views.focus_named(HELP_VIEW),
                    (_, KeyCode::Esc) => selector.focus(&mut state.views),
                    (_, KeyCode::Up) | (_, KeyCode::Char('k')) => {
                        if state.on_selector_view() {
                            state.cursor_up();
                        }
                    }
                    (_, KeyCode::Down) | (_, KeyCode::Char('j')) => {
                        if state.on_selector_view() {
                            state.cursor_down();
                        }
                    }
                    (_, KeyCode::Enter) | (_, KeyCode::Char(' ')) => {
                        if state.on_selector_view() {
                            let token = state.cursor as i64;
                            click(&on_click, &mut state, token);
                        }
                    }
                    (_, KeyCode::Char(c @ '1'..='9')) => {
                        if state.on_selector_view() {
                            let token = i64::from(c as u8 - b'1');
                            click(&on_click, &mut state, token);
                        }
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn click<F>(on_click: &F, state: &mut UiState, token: i64)
where
    F: Fn(i64) -> Result<bool, crate::error::SelectorError>,
{
    match on_click(token) {
        Ok(changed) => state.mark_selected(token as usize, changed),
        Err(e) => state.info = format!("Selection rejected: {e}"),
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(
        state
            .views
            .names()
            .iter()
            .map(|n| Line::from(n.clone()))
            .collect::<Vec<_>>(),
    )
    .select(state.views.active())
    .block(Block::default().borders(Borders::ALL).title("auton-selector"))
    .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    if state.on_selector_view() {
        draw_selector(chunks[1], f, state);
    } else {
        help::draw_help(chunks[1], f);
    }
}

fn draw_selector(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
        .split(area);

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(vec![
        Span::raw(format!("Routines ({}) - ", state.routines.len())),
        Span::styled("↑/↓/j/k", Style::default().fg(Color::Magenta)),
        Span::raw(": move, "),
        Span::styled("enter", Style::default().fg(Color::Magenta)),
        Span::raw(": select, "),
        Span::styled("r", Style::default().fg(Color::Magenta)),
        Span::raw(": run"),
    ]));
    lines.push(Line::from(""));

    let max_items = (cols[0].height as usize).saturating_sub(4).max(1);
    let offset = state.cursor.saturating_sub(max_items - 1);
    for (idx, row) in state
        .routines
        .iter()
        .enumerate()
        .skip(offset)
        .take(max_items)
    {
        let is_selected = state.selected == Some(idx);
        let is_cursor = state.cursor == idx;
        let marker = if is_selected { "● " } else { "  " };
        let mut style = Style::default();
        if is_selected {
            style = style.fg(Color::Green);
        }
        if is_cursor {
            style = style.add_modifier(Modifier::REVERSED);
        }
        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Green)),
            Span::styled(format!("{:>2}. {}", idx + 1, row.name), style),
        ]));
    }

    let list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(state.selector_name.clone()),
    );
    f.render_widget(list, cols[0]);

    let width = cols[1].width;
    let mut status: Vec<Line<'static>> = Vec::new();
    let selected = state.selected.and_then(|i| state.routines.get(i));
    push_wrapped_status_kv(
        &mut status,
        "Selected",
        selected.map(|r| r.name.as_str()).unwrap_or("none"),
        width,
    );
    if let Some(img) = selected.and_then(|r| r.image.as_deref()) {
        push_wrapped_status_kv(&mut status, "Image", img, width);
    }
    push_wrapped_status_kv(&mut status, "Storage", &state.storage, width);
    status.push(Line::from(match state.running.as_deref() {
        Some(name) => Span::styled(format!("Running: {name}"), Style::default().fg(Color::Yellow)),
        None => Span::styled("Idle", Style::default().fg(Color::Gray)),
    }));
    if let Some(report) = state.last_report.as_ref() {
        let (text, color) = match &report.outcome {
            RunOutcome::Completed => ("completed".to_string(), Color::Green),
            RunOutcome::NoSelection => ("nothing selected".to_string(), Color::Yellow),
            RunOutcome::Failed(msg) => (format!("failed: {msg}"), Color::Red),
        };
        status.push(Line::from(""));
        push_wrapped_status_kv(
            &mut status,
            "Last run",
            report.routine.as_deref().unwrap_or("-"),
            width,
        );
        status.push(Line::from(Span::styled(text, Style::default().fg(color))));
    }
    if !state.info.is_empty() {
        status.push(Line::from(""));
        push_wrapped_status_kv(&mut status, "Info", &state.info, width);
    }

    let panel = Paragraph::new(status)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(panel, cols[1]);
}
