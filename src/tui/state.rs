use crate::model::{RunOutcome, RunReport, SelectorEvent};
use crate::selector::Selector;
use crate::views::ViewStack;
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::sync::Arc;

pub const HELP_VIEW: &str = "Help";

pub struct RoutineRow {
    pub name: String,
    pub image: Option<String>,
}

pub struct UiState {
    pub views: ViewStack,
    pub selector_name: String,
    pub storage: String,
    pub routines: Vec<RoutineRow>,
    pub cursor: usize,
    pub selected: Option<usize>,
    pub running: Option<String>,
    pub info: String,
    pub last_report: Option<Arc<RunReport>>,
}

impl UiState {
    pub fn new(selector: &Selector) -> Self {
        let mut views = ViewStack::new([HELP_VIEW]);
        selector.focus(&mut views);
        let selected = selector.selected();
        Self {
            views,
            selector_name: selector.name().to_string(),
            storage: selector.store_location(),
            routines: selector
                .registry()
                .iter()
                .map(|r| RoutineRow {
                    name: r.name.clone(),
                    image: r.image.clone(),
                })
                .collect(),
            cursor: selected.unwrap_or(0),
            selected,
            running: None,
            info: String::new(),
            last_report: None,
        }
    }

    pub fn on_selector_view(&self) -> bool {
        self.views.active_name() == Some(self.selector_name.as_str())
    }

    pub fn cursor_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_down(&mut self) {
        if self.cursor + 1 < self.routines.len() {
            self.cursor += 1;
        }
    }

    /// Record the result of a click forwarded to the selector.
    pub fn mark_selected(&mut self, index: usize, changed: bool) {
        self.selected = Some(index);
        self.cursor = index;
        if let Some(row) = self.routines.get(index) {
            self.info = if changed {
                format!("Selected: {}", row.name)
            } else {
                format!("{} is already selected", row.name)
            };
        }
    }
}

pub fn apply_event(state: &mut UiState, ev: SelectorEvent) {
    match ev {
        SelectorEvent::Selected { index, name } => {
            state.selected = Some(index);
            state.cursor = index;
            state.info = format!("Selected: {name}");
        }
        SelectorEvent::RunStarted { index, name } => {
            state.selected = Some(index);
            state.info = format!("Running: {name}");
            state.running = Some(name);
        }
        SelectorEvent::RunFinished { report } => {
            state.running = None;
            state.info = match &report.outcome {
                RunOutcome::Completed => format!(
                    "Finished {} in {:.1} s",
                    report.routine.as_deref().unwrap_or("-"),
                    report.elapsed_ms as f64 / 1000.0
                ),
                RunOutcome::NoSelection => "Nothing to run: select a routine first".into(),
                RunOutcome::Failed(msg) => format!("Routine failed: {msg}"),
            };
            state.last_report = Some(report);
        }
        SelectorEvent::Info(info) => state.info = info.to_message(),
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InfoEvent, Routine};
    use crate::storage::MemoryStore;

    fn state() -> UiState {
        let selector = Selector::new(
            "Match",
            vec![
                Routine::new("left", || Ok(())).with_image("/usd/left.bin"),
                Routine::new("right", || Ok(())),
            ],
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        UiState::new(&selector)
    }

    #[test]
    fn starts_focused_on_selector() {
        let s = state();
        assert!(s.on_selector_view());
        assert_eq!(s.routines[0].image.as_deref(), Some("/usd/left.bin"));
        assert_eq!(s.selected, None);
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut s = state();
        s.cursor_up();
        assert_eq!(s.cursor, 0);
        s.cursor_down();
        s.cursor_down();
        assert_eq!(s.cursor, 1);
    }

    #[test]
    fn run_events_update_status() {
        let mut s = state();
        apply_event(
            &mut s,
            SelectorEvent::RunStarted {
                index: 1,
                name: "right".into(),
            },
        );
        assert_eq!(s.running.as_deref(), Some("right"));

        let report = RunReport {
            selector: "Match".into(),
            index: Some(1),
            routine: Some("right".into()),
            started_utc: String::new(),
            elapsed_ms: 2000,
            outcome: RunOutcome::Completed,
        };
        apply_event(&mut s, SelectorEvent::RunFinished { report: Arc::new(report) });
        assert!(s.running.is_none());
        assert_eq!(s.info, "Finished right in 2.0 s");

        apply_event(&mut s, SelectorEvent::Info(InfoEvent::NoPriorSelection));
        assert!(s.info.contains("No saved selection"));
    }

    #[test]
    fn wraps_long_values() {
        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Image", "/usd/a/very/long/path/to/an/image.bin", 20);
        assert!(out.len() > 1);
        push_wrapped_status_kv(&mut out, "Empty", "   ", 20);
        assert!(out.len() > 1);
    }
}
