//! Text output for headless modes.
//!
//! Builds the routine listing and run report lines printed by `--list` and `--run`.

use crate::model::{RunOutcome, RunReport, SelectorState};
use crate::selector::Selector;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct Listing {
    pub selector: String,
    pub storage: String,
    pub state: SelectorState,
    pub selected: Option<usize>,
    pub routines: Vec<ListedRoutine>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ListedRoutine {
    pub index: usize,
    pub name: String,
    pub image: Option<String>,
    pub selected: bool,
}

pub(crate) fn build_listing(selector: &Selector) -> Listing {
    let selected = selector.selected();
    Listing {
        selector: selector.name().to_string(),
        storage: selector.store_location(),
        state: selector.state(),
        selected,
        routines: selector
            .registry()
            .iter()
            .enumerate()
            .map(|(index, r)| ListedRoutine {
                index,
                name: r.name.clone(),
                image: r.image.clone(),
                selected: selected == Some(index),
            })
            .collect(),
    }
}

pub(crate) fn listing_lines(listing: &Listing) -> Vec<String> {
    let mut lines = vec![
        format!("Selector: {}", listing.selector),
        format!("Storage:  {}", listing.storage),
    ];
    for r in &listing.routines {
        let marker = if r.selected { '*' } else { ' ' };
        let mut line = format!("{marker} {:>2}  {}", r.index, r.name);
        if let Some(img) = r.image.as_deref() {
            line.push_str(&format!("  [{img}]"));
        }
        lines.push(line);
    }
    if listing.state == SelectorState::Uninitialized {
        lines.push("No routine selected".into());
    }
    lines
}

pub(crate) fn report_lines(report: &RunReport) -> Vec<String> {
    let name = report.routine.as_deref().unwrap_or("-");
    let status = match &report.outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::NoSelection => "nothing selected".to_string(),
        RunOutcome::Failed(msg) => format!("failed: {msg}"),
    };
    vec![
        format!("Routine: {name}"),
        format!("Started: {}", report.started_utc),
        format!("Elapsed: {:.2} s", report.elapsed_ms as f64 / 1000.0),
        format!("Result:  {status}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Routine;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn listing_marks_selection_and_images() {
        let selector = Selector::new(
            "Match",
            vec![
                Routine::new("left", || Ok(())).with_image("/usd/left.bin"),
                Routine::new("right", || Ok(())),
            ],
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let lines = listing_lines(&build_listing(&selector));
        assert!(lines.last().unwrap().contains("No routine selected"));

        selector.select(0).unwrap();
        let listing = build_listing(&selector);
        assert_eq!(listing.selected, Some(0));
        assert_eq!(listing.state, SelectorState::Selected(0));
        let lines = listing_lines(&listing);
        assert_eq!(lines[2], "*  0  left  [/usd/left.bin]");
        assert_eq!(lines[3], "   1  right");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn report_lines_show_failures() {
        let report = RunReport {
            selector: "Match".into(),
            index: Some(1),
            routine: Some("right".into()),
            started_utc: "2026-01-01T00:00:00Z".into(),
            elapsed_ms: 1500,
            outcome: RunOutcome::Failed("arm jammed".into()),
        };
        let lines = report_lines(&report);
        assert_eq!(lines[0], "Routine: right");
        assert_eq!(lines[2], "Elapsed: 1.50 s");
        assert_eq!(lines[3], "Result:  failed: arm jammed");
    }
}
