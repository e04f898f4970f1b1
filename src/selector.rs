//! Selection controller.
//!
//! Owns the selected routine index behind a mutex, persists it to the SD card and
//! runs the selected routine. The lock only ever covers a read or write of the
//! index; storage I/O, the switch callback and routine actions all run unlocked so
//! an action can call back into the selector.

use crate::error::SelectorError;
use crate::model::{PersistMode, Routine, SelectorState, SwitchCallback};
use crate::registry::RoutineRegistry;
use crate::storage::{SavedSelection, SelectionStore};
use crate::views::ViewStack;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

struct Inner {
    name: String,
    registry: RoutineRegistry,
    selected: Mutex<Option<usize>>,
    store: Arc<dyn SelectionStore>,
}

impl Inner {
    // The guarded value is a plain index, so a poisoned lock still holds a valid one.
    fn lock(&self) -> MutexGuard<'_, Option<usize>> {
        self.selected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Option<usize> {
        *self.lock()
    }

    fn persist(&self) -> Result<(), SelectorError> {
        let index = self.snapshot().ok_or(SelectorError::NoSelection)?;
        let routine = self.registry.get(index)?;
        let record = SavedSelection::new(index, self.registry.len(), &routine.name)
            .for_selector(&self.name);
        self.store.save(&self.name, &record)
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            if e.is_storage() {
                tracing::warn!(selector = %self.name, "selection not saved: {e}");
            } else {
                tracing::debug!(selector = %self.name, "nothing to save: {e}");
            }
        }
    }
}

enum WriterMsg {
    Persist,
    Flush(std_mpsc::Sender<()>),
}

/// Background SD card writer. Bursts of selections collapse into one write of the
/// latest index.
struct PersistWriter {
    tx: Option<std_mpsc::Sender<WriterMsg>>,
    handle: Option<JoinHandle<()>>,
}

impl PersistWriter {
    fn spawn(inner: Arc<Inner>) -> std::io::Result<Self> {
        let (tx, rx) = std_mpsc::channel::<WriterMsg>();
        let handle = std::thread::Builder::new()
            .name(format!("sd-writer-{}", inner.name))
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    let mut dirty = false;
                    let mut acks = Vec::new();
                    match msg {
                        WriterMsg::Persist => dirty = true,
                        WriterMsg::Flush(ack) => acks.push(ack),
                    }
                    while let Ok(more) = rx.try_recv() {
                        match more {
                            WriterMsg::Persist => dirty = true,
                            WriterMsg::Flush(ack) => acks.push(ack),
                        }
                    }
                    if dirty {
                        inner.persist_logged();
                    }
                    for ack in acks {
                        let _ = ack.send(());
                    }
                }
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    fn request(&self) -> bool {
        self.tx
            .as_ref()
            .map(|tx| tx.send(WriterMsg::Persist).is_ok())
            .unwrap_or(false)
    }

    fn flush(&self) {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        if let Some(tx) = self.tx.as_ref() {
            if tx.send(WriterMsg::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        }
    }
}

impl Drop for PersistWriter {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain pending writes and exit.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// In-flight runs, oldest first. Each run removes only its own entry, so
/// overlapping runs can finish in any order.
#[derive(Default)]
struct RunSet {
    next_id: AtomicU64,
    active: Mutex<Vec<(u64, usize)>>,
}

impl RunSet {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, usize)>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latest(&self) -> Option<usize> {
        self.lock().last().map(|&(_, index)| index)
    }
}

/// Drops its run's entry when the run ends, including on error or panic.
struct RunningGuard<'a> {
    runs: &'a RunSet,
    id: u64,
}

impl<'a> RunningGuard<'a> {
    fn enter(runs: &'a RunSet, index: usize) -> Self {
        let id = runs.next_id.fetch_add(1, Ordering::Relaxed);
        runs.lock().push((id, index));
        Self { runs, id }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.runs.lock().retain(|&(id, _)| id != self.id);
    }
}

/// What `restore()` found in the persistence slot.
#[derive(Debug)]
pub enum RestoreOutcome {
    Restored(usize),
    NoPriorSelection,
    /// The record could not be used; the selector starts without a selection.
    Discarded(SelectorError),
    /// Someone picked a routine before the restore ran; their choice is kept.
    AlreadySelected(usize),
}

pub struct Selector {
    inner: Arc<Inner>,
    switch_cb: SwitchCallback,
    writer: Option<PersistWriter>,
    runs: RunSet,
}

impl Selector {
    /// Build a selector persisting inline to `store`, with a no-op switch callback.
    pub fn new(
        name: impl Into<String>,
        routines: Vec<Routine>,
        store: Arc<dyn SelectionStore>,
    ) -> Result<Self, SelectorError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SelectorError::InvalidConfiguration(
                "selector name must not be empty".into(),
            ));
        }
        let registry = RoutineRegistry::new(routines)?;
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                registry,
                selected: Mutex::new(None),
                store,
            }),
            switch_cb: Box::new(|_, _| {}),
            writer: None,
            runs: RunSet::default(),
        })
    }

    pub fn with_switch_callback<F>(mut self, cb: F) -> Self
    where
        F: Fn(usize, &Routine) + Send + Sync + 'static,
    {
        self.switch_cb = Box::new(cb);
        self
    }

    pub fn with_persist_mode(mut self, mode: PersistMode) -> Self {
        self.writer = match mode {
            PersistMode::Inline => None,
            PersistMode::Background => match PersistWriter::spawn(Arc::clone(&self.inner)) {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!("could not start SD writer thread, saving inline: {e}");
                    None
                }
            },
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn registry(&self) -> &RoutineRegistry {
        &self.inner.registry
    }

    pub fn store_location(&self) -> String {
        self.inner.store.describe()
    }

    pub fn selected(&self) -> Option<usize> {
        self.inner.snapshot()
    }

    pub fn state(&self) -> SelectorState {
        if let Some(i) = self.runs.latest() {
            return SelectorState::Running(i);
        }
        match self.inner.snapshot() {
            Some(i) => SelectorState::Selected(i),
            None => SelectorState::Uninitialized,
        }
    }

    /// Select routine `index`. Returns `Ok(true)` when the selection changed.
    pub fn select(&self, index: usize) -> Result<bool, SelectorError> {
        let routine = self.inner.registry.get(index)?;

        let changed = {
            let mut selected = self.inner.lock();
            if *selected == Some(index) {
                false
            } else {
                *selected = Some(index);
                true
            }
        };

        if !changed {
            tracing::debug!(selector = %self.inner.name, index, "routine already selected");
            return Ok(false);
        }

        tracing::info!(
            selector = %self.inner.name,
            index,
            routine = %routine.name,
            "routine selected"
        );
        self.schedule_persist();
        (self.switch_cb)(index, routine);
        Ok(true)
    }

    /// Select from an opaque GUI token. Negative tokens are out of range.
    pub fn select_token(&self, token: i64) -> Result<bool, SelectorError> {
        let index = usize::try_from(token)
            .map_err(|_| SelectorError::out_of_range(token, self.inner.registry.len()))?;
        self.select(index)
    }

    /// Bound click handler for the GUI layer.
    pub fn handler(self: &Arc<Self>) -> impl Fn(i64) -> Result<bool, SelectorError> + Send + Sync {
        let selector = Arc::clone(self);
        move |token| selector.select_token(token)
    }

    /// Run the selected routine on the calling thread.
    pub fn run(&self) -> Result<(), SelectorError> {
        self.run_observed(|_, _| {})
    }

    /// Like `run`, but hands the snapshotted index and routine to `on_start`
    /// before the action is invoked. Reports built from that pair always name
    /// the routine that actually ran.
    pub fn run_observed<F>(&self, on_start: F) -> Result<(), SelectorError>
    where
        F: FnOnce(usize, &Routine),
    {
        let Some(index) = self.inner.snapshot() else {
            tracing::warn!(selector = %self.inner.name, "run requested with no routine selected");
            return Err(SelectorError::NoSelection);
        };
        let routine = self.inner.registry.get(index)?;

        let _running = RunningGuard::enter(&self.runs, index);
        tracing::info!(selector = %self.inner.name, index, routine = %routine.name, "running routine");
        on_start(index, routine);
        (routine.action)().map_err(SelectorError::Action)
    }

    /// Write the current selection to the SD card now.
    pub fn persist(&self) -> Result<(), SelectorError> {
        self.inner.persist()
    }

    /// Wait until queued background writes have reached the store.
    pub fn flush(&self) {
        if let Some(w) = self.writer.as_ref() {
            w.flush();
        }
    }

    /// Load the persisted selection. Any problem with the record means "no prior selection".
    pub fn restore(&self) -> RestoreOutcome {
        let found = match self.load_valid_record() {
            Ok(Some(i)) => i,
            Ok(None) => {
                tracing::info!(selector = %self.inner.name, "no saved selection");
                return RestoreOutcome::NoPriorSelection;
            }
            Err(e) => {
                if matches!(e, SelectorError::StaleState(_)) {
                    tracing::info!(selector = %self.inner.name, "discarding saved selection: {e}");
                } else {
                    tracing::warn!(selector = %self.inner.name, "could not read saved selection: {e}");
                }
                return RestoreOutcome::Discarded(e);
            }
        };

        let mut selected = self.inner.lock();
        match *selected {
            Some(current) => RestoreOutcome::AlreadySelected(current),
            None => {
                *selected = Some(found);
                drop(selected);
                tracing::info!(selector = %self.inner.name, index = found, "selection restored");
                RestoreOutcome::Restored(found)
            }
        }
    }

    /// Make this selector's view the active one.
    pub fn focus(&self, views: &mut ViewStack) {
        views.focus_named(&self.inner.name);
    }

    fn load_valid_record(&self) -> Result<Option<usize>, SelectorError> {
        let Some(record) = self.inner.store.load(&self.inner.name)? else {
            return Ok(None);
        };
        if !record.selector.is_empty() && record.selector != self.inner.name {
            return Err(SelectorError::StaleState(format!(
                "slot belongs to selector {:?}",
                record.selector
            )));
        }
        let size = self.inner.registry.len();
        if record.registry_size != size {
            return Err(SelectorError::StaleState(format!(
                "saved with {} routines, now {}",
                record.registry_size, size
            )));
        }
        let routine = self
            .inner
            .registry
            .get(record.selected_index)
            .map_err(|e| SelectorError::StaleState(e.to_string()))?;
        if !record.routine_name.is_empty() && record.routine_name != routine.name {
            return Err(SelectorError::StaleState(format!(
                "slot {} was {:?}, now {:?}",
                record.selected_index, record.routine_name, routine.name
            )));
        }
        Ok(Some(record.selected_index))
    }

    fn schedule_persist(&self) {
        match self.writer.as_ref() {
            Some(w) if w.request() => {}
            _ => self.inner.persist_logged(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SdCardStore};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, OnceLock, Weak};

    fn counting(name: &str, hits: &Arc<AtomicUsize>) -> Routine {
        let hits = Arc::clone(hits);
        Routine::new(name, move || {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn left_right(store: Arc<MemoryStore>) -> (Selector, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let sel = Selector::new(
            "match",
            vec![counting("left", &a), counting("right", &b)],
            store,
        )
        .unwrap();
        (sel, a, b)
    }

    #[test]
    fn select_then_run_invokes_exactly_that_action() {
        let (sel, a, b) = left_right(Arc::new(MemoryStore::new()));
        assert_eq!(sel.state(), SelectorState::Uninitialized);

        assert!(sel.select(1).unwrap());
        sel.run().unwrap();
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);

        let err = sel.select(5).unwrap_err();
        assert!(matches!(err, SelectorError::OutOfRange { index: 5, size: 2 }));
        assert_eq!(sel.selected(), Some(1));
        sel.run().unwrap();
        assert_eq!(b.load(Ordering::SeqCst), 2);
        assert_eq!(a.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn negative_tokens_are_out_of_range() {
        let (sel, _, _) = left_right(Arc::new(MemoryStore::new()));
        sel.select(0).unwrap();
        let err = sel.select_token(-1).unwrap_err();
        assert!(matches!(err, SelectorError::OutOfRange { index: -1, size: 2 }));
        assert_eq!(sel.selected(), Some(0));
    }

    #[test]
    fn run_without_selection_reports_no_selection() {
        let (sel, a, b) = left_right(Arc::new(MemoryStore::new()));
        assert!(matches!(sel.run(), Err(SelectorError::NoSelection)));
        assert_eq!(a.load(Ordering::SeqCst) + b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repeated_select_fires_switch_callback_and_write_once() {
        let store = Arc::new(MemoryStore::new());
        let switches = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&switches);
        let (sel, _, _) = left_right(Arc::clone(&store));
        let sel = sel.with_switch_callback(move |index, routine| {
            assert_eq!(index, 1);
            assert_eq!(routine.name, "right");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(sel.select(1).unwrap());
        assert!(!sel.select(1).unwrap());
        assert_eq!(switches.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.peek("match").unwrap().selected_index, 1);
    }

    #[test]
    fn action_errors_propagate_unchanged() {
        let sel = Selector::new(
            "match",
            vec![Routine::new("broken", || Err(anyhow::anyhow!("arm jammed")))],
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        sel.select(0).unwrap();
        match sel.run() {
            Err(SelectorError::Action(e)) => assert_eq!(e.to_string(), "arm jammed"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(sel.state(), SelectorState::Selected(0));
    }

    #[test]
    fn selection_survives_missing_card() {
        let store = Arc::new(MemoryStore::new());
        store.eject();
        let (sel, _, b) = left_right(Arc::clone(&store));
        assert!(sel.select(1).unwrap());
        assert!(sel.persist().unwrap_err().is_storage());
        sel.run().unwrap();
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn restore_picks_up_a_matching_record() {
        let store = Arc::new(MemoryStore::new());
        store.put("match", SavedSelection::new(1, 2, "right"));
        let (sel, _, b) = left_right(Arc::clone(&store));
        assert!(matches!(sel.restore(), RestoreOutcome::Restored(1)));
        assert_eq!(sel.state(), SelectorState::Selected(1));
        sel.run().unwrap();
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restore_discards_records_from_a_different_registry() {
        let store = Arc::new(MemoryStore::new());
        store.put("match", SavedSelection::new(1, 3, "right"));
        let (sel, _, _) = left_right(Arc::clone(&store));
        assert!(matches!(
            sel.restore(),
            RestoreOutcome::Discarded(SelectorError::StaleState(_))
        ));
        assert_eq!(sel.state(), SelectorState::Uninitialized);

        // Same size, but the routine at that slot was renamed/reordered.
        store.put("match", SavedSelection::new(1, 2, "skills"));
        assert!(matches!(sel.restore(), RestoreOutcome::Discarded(_)));
        assert_eq!(sel.state(), SelectorState::Uninitialized);

        // Hand-edited index past the end.
        let mut rec = SavedSelection::new(0, 2, "");
        rec.selected_index = 7;
        store.put("match", rec);
        assert!(matches!(sel.restore(), RestoreOutcome::Discarded(_)));
        assert_eq!(sel.selected(), None);
    }

    #[test]
    fn restore_without_card_or_slot_is_uninitialized() {
        let store = Arc::new(MemoryStore::new());
        let (sel, _, _) = left_right(Arc::clone(&store));
        assert!(matches!(sel.restore(), RestoreOutcome::NoPriorSelection));
        store.eject();
        assert!(matches!(
            sel.restore(),
            RestoreOutcome::Discarded(SelectorError::StorageUnavailable { .. })
        ));
        assert_eq!(sel.state(), SelectorState::Uninitialized);
    }

    #[test]
    fn restore_does_not_override_a_fresh_pick() {
        let store = Arc::new(MemoryStore::new());
        store.put("match", SavedSelection::new(1, 2, "right"));
        let (sel, _, _) = left_right(Arc::clone(&store));
        // Set directly so the saved record stays untouched.
        *sel.inner.lock() = Some(0);
        assert!(matches!(sel.restore(), RestoreOutcome::AlreadySelected(0)));
        assert_eq!(sel.selected(), Some(0));
    }

    #[test]
    fn persisted_selection_round_trips_through_a_new_selector() {
        let store = Arc::new(MemoryStore::new());
        let (first, _, _) = left_right(Arc::clone(&store));
        first.select(1).unwrap();
        drop(first);

        let (second, _, _) = left_right(Arc::clone(&store));
        assert!(matches!(second.restore(), RestoreOutcome::Restored(1)));
    }

    #[test]
    fn background_writer_persists_latest_selection() {
        let store = Arc::new(MemoryStore::new());
        let (sel, _, _) = left_right(Arc::clone(&store));
        let sel = sel.with_persist_mode(PersistMode::Background);
        for i in [0, 1, 0, 1] {
            sel.select(i).unwrap();
        }
        sel.flush();
        assert_eq!(store.peek("match").unwrap().selected_index, 1);
        assert!(store.writes() >= 1);
    }

    #[test]
    fn action_can_reenter_selector_without_deadlock() {
        let cell: Arc<OnceLock<Weak<Selector>>> = Arc::new(OnceLock::new());
        let from_action = Arc::clone(&cell);
        let observed = Arc::new(Mutex::new(None));
        let observed_in = Arc::clone(&observed);
        let sel = Arc::new(
            Selector::new(
                "match",
                vec![
                    Routine::new("chain", move || {
                        if let Some(sel) = from_action.get().and_then(Weak::upgrade) {
                            *observed_in.lock().unwrap() = Some(sel.state());
                            sel.select(1)?;
                        }
                        Ok(())
                    }),
                    Routine::new("park", || Ok(())),
                ],
                Arc::new(MemoryStore::new()),
            )
            .unwrap(),
        );
        cell.set(Arc::downgrade(&sel)).unwrap();

        sel.select(0).unwrap();
        sel.run().unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(SelectorState::Running(0)));
        assert_eq!(sel.state(), SelectorState::Selected(1));
    }

    #[test]
    fn concurrent_selects_land_on_one_attempted_index() {
        let store = Arc::new(MemoryStore::new());
        let routines = (0..8)
            .map(|i| Routine::new(format!("r{i}"), || Ok(())))
            .collect();
        let sel = Arc::new(
            Selector::new("match", routines, store.clone())
                .unwrap()
                .with_persist_mode(PersistMode::Background),
        );

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let sel = Arc::clone(&sel);
                std::thread::spawn(move || {
                    for n in 0..200 {
                        let _ = sel.select((t + n) % 8);
                        let _ = sel.select_token(-3);
                        let _ = sel.select(99);
                    }
                    (t + 199) % 8
                })
            })
            .collect();
        let last: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let final_index = sel.selected().unwrap();
        assert!(final_index < 8);
        assert!(last.contains(&final_index));
        sel.flush();
        assert_eq!(store.peek("match").unwrap().selected_index, final_index);
    }

    #[test]
    fn gui_handler_forwards_tokens() {
        let (sel, _, b) = left_right(Arc::new(MemoryStore::new()));
        let sel = Arc::new(sel);
        let on_click = sel.handler();
        assert!(on_click(1).unwrap());
        assert!(on_click(9).is_err());
        sel.run().unwrap();
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn focus_activates_the_selector_view() {
        let (sel, _, _) = left_right(Arc::new(MemoryStore::new()));
        let mut views = ViewStack::new(["Help"]);
        sel.focus(&mut views);
        assert_eq!(views.active_name(), Some("match"));
    }

    #[test]
    fn overlapping_runs_return_to_selected() {
        let a_inside = Arc::new(Barrier::new(2));
        let b_inside = Arc::new(Barrier::new(2));
        let a_release = Arc::new(Barrier::new(2));
        let (a_in, a_out) = (Arc::clone(&a_inside), Arc::clone(&a_release));
        let b_in = Arc::clone(&b_inside);
        let sel = Arc::new(
            Selector::new(
                "match",
                vec![
                    Routine::new("slow0", move || {
                        a_in.wait();
                        a_out.wait();
                        Ok(())
                    }),
                    Routine::new("slow1", move || {
                        b_in.wait();
                        Ok(())
                    }),
                ],
                Arc::new(MemoryStore::new()),
            )
            .unwrap(),
        );

        sel.select(0).unwrap();
        let first = {
            let sel = Arc::clone(&sel);
            std::thread::spawn(move || sel.run())
        };
        a_inside.wait();
        assert_eq!(sel.state(), SelectorState::Running(0));

        sel.select(1).unwrap();
        let second = {
            let sel = Arc::clone(&sel);
            std::thread::spawn(move || sel.run())
        };
        b_inside.wait();
        // slow1 may already be finished here; slow0 is still parked.
        assert!(matches!(
            sel.state(),
            SelectorState::Running(0) | SelectorState::Running(1)
        ));
        second.join().unwrap().unwrap();
        assert_eq!(sel.state(), SelectorState::Running(0));

        a_release.wait();
        first.join().unwrap().unwrap();
        assert_eq!(sel.state(), SelectorState::Selected(1));
    }

    #[test]
    fn run_observed_reports_the_routine_that_ran() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let routines = ["a", "b"]
            .into_iter()
            .map(|name| {
                let ran = Arc::clone(&ran);
                Routine::new(name, move || {
                    ran.lock().unwrap().push(name.to_string());
                    Ok(())
                })
            })
            .collect();
        let sel = Arc::new(Selector::new("match", routines, Arc::new(MemoryStore::new())).unwrap());
        sel.select(0).unwrap();

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flipper = {
            let (sel, stop) = (Arc::clone(&sel), Arc::clone(&stop));
            std::thread::spawn(move || {
                let mut n = 0;
                while !stop.load(Ordering::SeqCst) {
                    let _ = sel.select(n % 2);
                    n += 1;
                }
            })
        };

        for _ in 0..200 {
            let mut seen = None;
            sel.run_observed(|index, routine| seen = Some((index, routine.name.clone())))
                .unwrap();
            let (index, name) = seen.unwrap();
            let actual = ran.lock().unwrap().pop().unwrap();
            assert_eq!(name, actual);
            assert_eq!(sel.registry().get(index).unwrap().name, actual);
        }
        stop.store(true, Ordering::SeqCst);
        flipper.join().unwrap();
    }

    #[test]
    fn restore_ignores_a_slot_written_by_another_selector() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SelectionStore> = Arc::new(SdCardStore::new(dir.path()));
        let build = |name: &str| {
            Selector::new(
                name,
                vec![Routine::new("left", || Ok(())), Routine::new("right", || Ok(()))],
                Arc::clone(&store),
            )
            .unwrap()
        };

        build("Red Auton").select(1).unwrap();
        let other = build("red-auton");
        assert!(matches!(
            other.restore(),
            RestoreOutcome::Discarded(SelectorError::StaleState(_))
        ));
        assert_eq!(other.selected(), None);
        assert!(matches!(build("Red Auton").restore(), RestoreOutcome::Restored(1)));
    }
}
