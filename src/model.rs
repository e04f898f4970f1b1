use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Zero-argument routine body. Errors are returned to whoever called `run()`.
pub type RoutineAction = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Hook fired once per effective selection change.
pub type SwitchCallback = Box<dyn Fn(usize, &Routine) + Send + Sync>;

pub struct Routine {
    pub name: String,
    pub action: RoutineAction,
    pub image: Option<String>,
}

impl Routine {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(action),
            image: None,
        }
    }

    /// Attach an image reference. Empty strings mean "no image".
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        self.image = if image.is_empty() { None } else { Some(image) };
        self
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.name)
            .field("image", &self.image)
            .finish_non_exhaustive()
    }
}

/// Runtime configuration assembled from CLI flags and the routines file.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub name: String,
    pub sd_root: Option<PathBuf>,
    pub persist: PersistMode,
    pub run_after: Option<Duration>,
    pub routines: Vec<RoutineSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Write on the calling thread right after the selection changes.
    Inline,
    /// Hand writes to a dedicated writer thread.
    #[default]
    Background,
}

/// Routine definition as it appears in the routines file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutineSpec {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    /// argv of a child process to run. Without it the routine is simulated.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutinesFile {
    #[serde(default)]
    pub name: Option<String>,
    pub routines: Vec<RoutineSpec>,
}

/// Observable selector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorState {
    Uninitialized,
    Selected(usize),
    Running(usize),
}

/// Events emitted by the lifecycle controller to presentation layers.
#[derive(Debug, Clone)]
pub enum SelectorEvent {
    Selected { index: usize, name: String },
    RunStarted { index: usize, name: String },
    RunFinished { report: Arc<RunReport> },
    Info(InfoEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Restored { index: usize, name: String },
    NoPriorSelection,
    StorageDegraded(String),
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Restored { index, name } => {
                format!("Restored selection #{} ({}) from SD card", index + 1, name)
            }
            InfoEvent::NoPriorSelection => "No saved selection; pick a routine".to_string(),
            InfoEvent::StorageDegraded(reason) => {
                format!("SD card unavailable, selection kept in memory only ({reason})")
            }
        }
    }
}

/// Outcome of a single `run()` as shown by the dashboard and headless output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub selector: String,
    pub index: Option<usize>,
    pub routine: Option<String>,
    pub started_utc: String,
    pub elapsed_ms: u64,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum RunOutcome {
    Completed,
    NoSelection,
    Failed(String),
}
