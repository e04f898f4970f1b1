//! Selector lifecycle controller.
//!
//! Owns restore-on-start, routine runs and the optional automatic "match start" run,
//! and emits events for presentation layers. Selection itself goes straight through the
//! selector's click handler.

use crate::cli::run_with_report;
use crate::error::SelectorError;
use crate::model::{InfoEvent, RunReport, SelectorEvent};
use crate::selector::{RestoreOutcome, Selector};
use anyhow::Result;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Sleep};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Run,
    Quit,
}

/// Load the saved selection and tell the UI what happened.
pub(crate) fn restore_and_report(selector: &Selector, event_tx: &UnboundedSender<SelectorEvent>) {
    let info = match selector.restore() {
        RestoreOutcome::Restored(index) | RestoreOutcome::AlreadySelected(index) => {
            let name = selector
                .registry()
                .get(index)
                .map(|r| r.name.clone())
                .unwrap_or_default();
            let _ = event_tx.send(SelectorEvent::Selected {
                index,
                name: name.clone(),
            });
            InfoEvent::Restored { index, name }
        }
        RestoreOutcome::NoPriorSelection => InfoEvent::NoPriorSelection,
        RestoreOutcome::Discarded(e @ SelectorError::StorageUnavailable { .. }) => {
            InfoEvent::StorageDegraded(e.to_string())
        }
        RestoreOutcome::Discarded(e) => {
            InfoEvent::Message(format!("Saved selection ignored: {e}"))
        }
    };
    let _ = event_tx.send(SelectorEvent::Info(info));
}

fn start_run(
    selector: &Arc<Selector>,
    event_tx: &UnboundedSender<SelectorEvent>,
) -> tokio::task::JoinHandle<RunReport> {
    let runner = Arc::clone(selector);
    let started_tx = event_tx.clone();
    // Routine actions block, so they go to the blocking pool and never stall the UI.
    tokio::task::spawn_blocking(move || {
        run_with_report(&runner, |index, name| {
            let _ = started_tx.send(SelectorEvent::RunStarted {
                index,
                name: name.to_string(),
            });
        })
    })
}

/// Drive the selector from UI commands until quit.
pub(crate) async fn run_controller(
    selector: Arc<Selector>,
    run_after: Option<Duration>,
    event_tx: UnboundedSender<SelectorEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    restore_and_report(&selector, &event_tx);

    let mut run_handle: Option<tokio::task::JoinHandle<RunReport>> = None;
    let mut quit_pending = false;
    let mut auto_run: Option<Pin<Box<Sleep>>> = run_after.map(|d| {
        let _ = event_tx.send(SelectorEvent::Info(InfoEvent::Message(format!(
            "Auto-run in {}",
            humantime::format_duration(d)
        ))));
        Box::pin(tokio::time::sleep(d))
    });

    let res = loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Run) => {
                        if run_handle.is_some() {
                            let _ = event_tx.send(SelectorEvent::Info(InfoEvent::Message(
                                "A routine is already running".into(),
                            )));
                        } else {
                            auto_run = None;
                            run_handle = Some(start_run(&selector, &event_tx));
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Running actions can't be interrupted; wait for the current one to return.
                        if run_handle.is_some() {
                            quit_pending = true;
                            let _ = event_tx.send(SelectorEvent::Info(InfoEvent::Message(
                                "Waiting for routine to finish…".into(),
                            )));
                        } else {
                            break Ok(());
                        }
                    }
                }
            }
            // The timer stays armed until this branch wins; losing branches only borrow it.
            _ = async {
                match auto_run.as_mut() {
                    Some(timer) => timer.await,
                    None => futures::future::pending().await,
                }
            } => {
                auto_run = None;
                if run_handle.is_none() {
                    run_handle = Some(start_run(&selector, &event_tx));
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(h) = run_handle.as_mut() {
                    return Some(h.await);
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    run_handle = None;
                    match join_res {
                        Ok(report) => {
                            let _ = event_tx.send(SelectorEvent::RunFinished { report: Arc::new(report) });
                        }
                        Err(e) => {
                            let _ = event_tx.send(SelectorEvent::Info(InfoEvent::Message(format!(
                                "Routine thread failed: {e}"
                            ))));
                        }
                    }
                    if quit_pending {
                        break Ok(());
                    }
                }
            }
        }
    };

    selector.flush();
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Routine, RunOutcome};
    use crate::storage::{MemoryStore, SavedSelection};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn selector(store: Arc<MemoryStore>, hits: &Arc<AtomicUsize>) -> Arc<Selector> {
        let hits = Arc::clone(hits);
        Arc::new(
            Selector::new(
                "ctl",
                vec![
                    Routine::new("left", || Ok(())),
                    Routine::new("right", move || {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                ],
                store,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn run_started_matches_the_finished_report() {
        let hits = Arc::new(AtomicUsize::new(0));
        let sel = selector(Arc::new(MemoryStore::new()), &hits);
        sel.select(1).unwrap();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(Arc::clone(&sel), None, event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Run).unwrap();
        let mut started = None;
        let report = loop {
            match event_rx.recv().await {
                Some(SelectorEvent::RunStarted { index, name }) => started = Some((index, name)),
                Some(SelectorEvent::RunFinished { report }) => break report,
                Some(_) => {}
                None => panic!("controller closed before a run finished"),
            }
        };
        let (index, name) = started.unwrap();
        assert_eq!(report.index, Some(index));
        assert_eq!(report.routine.as_deref(), Some(name.as_str()));
        assert_eq!(name, "right");

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
    }

    async fn next_finished(rx: &mut UnboundedReceiver<SelectorEvent>) -> Arc<RunReport> {
        while let Some(ev) = rx.recv().await {
            if let SelectorEvent::RunFinished { report } = ev {
                return report;
            }
        }
        panic!("controller closed before a run finished");
    }

    #[tokio::test]
    async fn run_command_executes_current_selection() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        let sel = selector(Arc::clone(&store), &hits);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(Arc::clone(&sel), None, event_tx, cmd_rx));

        sel.select(1).unwrap();
        assert!(sel.select(7).is_err());
        cmd_tx.send(UiCommand::Run).unwrap();
        let report = next_finished(&mut event_rx).await;
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.routine.as_deref(), Some("right"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
        assert_eq!(store.peek("ctl").unwrap().selected_index, 1);
    }

    #[tokio::test]
    async fn restores_and_auto_runs_after_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        store.put("ctl", SavedSelection::new(1, 2, "right"));
        let sel = selector(store, &hits);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(
            sel,
            Some(Duration::from_millis(20)),
            event_tx,
            cmd_rx,
        ));

        let report = next_finished(&mut event_rx).await;
        assert_eq!(report.index, Some(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(cmd_tx);
        ctl.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_without_selection_is_reported() {
        let hits = Arc::new(AtomicUsize::new(0));
        let sel = selector(Arc::new(MemoryStore::new()), &hits);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(sel, None, event_tx, cmd_rx));

        cmd_tx.send(UiCommand::Run).unwrap();
        let report = next_finished(&mut event_rx).await;
        assert_eq!(report.outcome, RunOutcome::NoSelection);

        cmd_tx.send(UiCommand::Quit).unwrap();
        ctl.await.unwrap().unwrap();
    }

    #[test]
    fn ejected_card_is_reported_as_degraded() {
        let hits = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(MemoryStore::new());
        store.eject();
        let sel = selector(store, &hits);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        restore_and_report(&sel, &event_tx);
        match event_rx.try_recv().unwrap() {
            SelectorEvent::Info(InfoEvent::StorageDegraded(_)) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
