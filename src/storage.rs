//! Selection persistence.
//!
//! The SD card is modelled as a directory that may or may not be present. Every
//! backend reports a missing medium as `StorageUnavailable` so the selector can
//! keep working from memory.

use crate::error::SelectorError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
#[cfg(test)]
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    sync::Mutex,
};

pub const RECORD_VERSION: u32 = 1;

/// On-disk record for one selector slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSelection {
    pub version: u32,
    /// Exact selector name; distinct names can share a slot file after `slot_key`.
    #[serde(default)]
    pub selector: String,
    pub selected_index: usize,
    pub registry_size: usize,
    #[serde(default)]
    pub routine_name: String,
    #[serde(default)]
    pub saved_at: String,
}

impl SavedSelection {
    pub fn new(selected_index: usize, registry_size: usize, routine_name: &str) -> Self {
        Self {
            version: RECORD_VERSION,
            selector: String::new(),
            selected_index,
            registry_size,
            routine_name: routine_name.to_string(),
            saved_at: now_rfc3339(),
        }
    }

    pub fn for_selector(mut self, name: &str) -> Self {
        self.selector = name.to_string();
        self
    }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

/// A named-slot store. Implementations must be usable from the writer thread.
pub trait SelectionStore: Send + Sync {
    fn save(&self, slot: &str, record: &SavedSelection) -> Result<(), SelectorError>;

    /// `Ok(None)` when the medium is present but the slot was never written.
    fn load(&self, slot: &str) -> Result<Option<SavedSelection>, SelectorError>;

    /// Human-readable location for status lines.
    fn describe(&self) -> String;
}

/// Reduce a selector name to a file-system friendly slot key.
pub fn slot_key(name: &str) -> String {
    let key: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if key.is_empty() {
        "selector".into()
    } else {
        key
    }
}

fn slot_file(root: &Path, slot: &str) -> PathBuf {
    root.join(format!("rd_{}.json", slot_key(slot)))
}

/// Directory-backed store standing in for the removable SD card.
#[derive(Debug, Clone)]
pub struct SdCardStore {
    root: Option<PathBuf>,
}

impl SdCardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// A store with no card inserted; every access is `StorageUnavailable`.
    pub fn absent() -> Self {
        Self { root: None }
    }

    /// Default mount point under the platform data directory.
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("auton-selector").join("usd"))
    }

    fn mounted_root(&self) -> Result<&Path, SelectorError> {
        match self.root.as_deref() {
            Some(root) if root.is_dir() => Ok(root),
            Some(root) => Err(SelectorError::unavailable(root, "no card mounted")),
            None => Err(SelectorError::unavailable("<none>", "no card inserted")),
        }
    }
}

impl SelectionStore for SdCardStore {
    fn save(&self, slot: &str, record: &SavedSelection) -> Result<(), SelectorError> {
        let root = self.mounted_root()?;
        let path = slot_file(root, slot);
        let body = serde_json::to_vec_pretty(record)
            .map_err(|e| SelectorError::unavailable(&path, e))?;

        // Write next to the target and rename so a pulled card never holds half a record.
        let mut tmp = NamedTempFile::new_in(root).map_err(|e| SelectorError::unavailable(root, e))?;
        tmp.write_all(&body)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SelectorError::unavailable(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| SelectorError::unavailable(&path, e.error))?;
        tracing::debug!(path = %path.display(), index = record.selected_index, "selection saved");
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<SavedSelection>, SelectorError> {
        let root = self.mounted_root()?;
        let path = slot_file(root, slot);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SelectorError::unavailable(&path, e)),
        };
        let record: SavedSelection = serde_json::from_slice(&bytes).map_err(|e| {
            SelectorError::StaleState(format!("unreadable record {}: {e}", path.display()))
        })?;
        if record.version != RECORD_VERSION {
            return Err(SelectorError::StaleState(format!(
                "record version {} is not supported",
                record.version
            )));
        }
        Ok(Some(record))
    }

    fn describe(&self) -> String {
        match &self.root {
            Some(root) => root.display().to_string(),
            None => "no SD card".into(),
        }
    }
}

/// In-process store. `eject`/`insert` simulate pulling the card.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, SavedSelection>>,
    ejected: AtomicBool,
    writes: AtomicUsize,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eject(&self) {
        self.ejected.store(true, Ordering::SeqCst);
    }

    pub fn insert(&self) {
        self.ejected.store(false, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn put(&self, slot: &str, record: SavedSelection) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slot_key(slot), record);
    }

    pub fn peek(&self, slot: &str) -> Option<SavedSelection> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&slot_key(slot))
            .cloned()
    }

    fn check_inserted(&self) -> Result<(), SelectorError> {
        if self.ejected.load(Ordering::SeqCst) {
            Err(SelectorError::unavailable("<memory>", "card ejected"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
impl SelectionStore for MemoryStore {
    fn save(&self, slot: &str, record: &SavedSelection) -> Result<(), SelectorError> {
        self.check_inserted()?;
        self.put(slot, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, slot: &str) -> Result<Option<SavedSelection>, SelectorError> {
        self.check_inserted()?;
        Ok(self.peek(slot))
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
