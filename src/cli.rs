use crate::model::{PersistMode, RunOutcome, RunReport, SelectorConfig};
use crate::selector::{RestoreOutcome, Selector};
use crate::storage::{SdCardStore, SelectionStore};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "auton-selector",
    version,
    about = "Pick, persist and run autonomous routines, with an optional TUI"
)]
pub struct Cli {
    /// JSON file describing the routines (defaults to a built-in demo set)
    #[arg(long)]
    pub routines: Option<PathBuf>,

    /// Selector name; also the key of the SD card slot
    #[arg(long)]
    pub name: Option<String>,

    /// Directory acting as the SD card mount point
    #[arg(long)]
    pub sd_root: Option<PathBuf>,

    /// Run without an SD card (selection is kept in memory only)
    #[arg(long, conflicts_with = "sd_root")]
    pub no_sd: bool,

    /// Use --background-persist false to write the SD card on the selecting thread
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub background_persist: bool,

    /// Select a routine by index (0-based) or name, then exit unless --run is given
    #[arg(long)]
    pub select: Option<String>,

    /// Run the selected routine and exit (no TUI)
    #[arg(long)]
    pub run: bool,

    /// List routines and the saved selection, then exit (no TUI)
    #[arg(long)]
    pub list: bool,

    /// Print JSON instead of text in headless modes
    #[arg(long)]
    pub json: bool,

    /// Automatically run the selected routine this long after the TUI starts
    #[arg(long)]
    pub run_after: Option<humantime::Duration>,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.list || self.run || self.select.is_some() || self.json
    }
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let selector = Arc::new(build_selector(&cfg)?);

    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(cfg, selector).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_headless(&args, &selector).await;
        }
    }

    run_headless(&args, &selector).await
}

/// Build a `SelectorConfig` from CLI arguments and the routines file.
pub fn build_config(args: &Cli) -> Result<SelectorConfig> {
    let (file_name, routines) = match args.routines.as_deref() {
        Some(path) => {
            let file = crate::routines::load_routines_file(path)?;
            (file.name, file.routines)
        }
        None => (None, crate::routines::demo_routines()),
    };

    let sd_root = if args.no_sd {
        None
    } else {
        args.sd_root.clone().or_else(SdCardStore::default_root)
    };

    Ok(SelectorConfig {
        name: args
            .name
            .clone()
            .or(file_name)
            .unwrap_or_else(|| "Auton Selector".into()),
        sd_root,
        persist: if args.background_persist {
            PersistMode::Background
        } else {
            PersistMode::Inline
        },
        run_after: args.run_after.map(Duration::from),
        routines,
    })
}

/// Assemble the selector and load whatever selection the SD card holds.
pub fn build_selector(cfg: &SelectorConfig) -> Result<Selector> {
    let store: Arc<dyn SelectionStore> = match cfg.sd_root.as_ref() {
        Some(root) => {
            // The default mount only exists once we create it; explicit roots must already exist.
            if Some(root) == SdCardStore::default_root().as_ref() {
                if let Err(e) = std::fs::create_dir_all(root) {
                    tracing::warn!(path = %root.display(), "could not create SD card directory: {e}");
                }
            }
            Arc::new(SdCardStore::new(root))
        }
        None => Arc::new(SdCardStore::absent()),
    };

    let routines = crate::routines::build_routines(&cfg.routines);
    let selector = Selector::new(cfg.name.clone(), routines, store)
        .context("invalid selector configuration")?
        .with_switch_callback(|index, routine| {
            tracing::debug!(index, routine = %routine.name, "switch callback");
        })
        .with_persist_mode(cfg.persist);
    Ok(selector)
}

/// Resolve `--select` as an index first, then as a routine name.
fn resolve_selection(selector: &Selector, raw: &str) -> Result<usize> {
    if let Ok(index) = raw.parse::<i64>() {
        let index = usize::try_from(index)
            .map_err(|_| crate::error::SelectorError::out_of_range(index, selector.registry().len()))?;
        selector.registry().get(index)?;
        return Ok(index);
    }
    selector
        .registry()
        .position(raw)
        .with_context(|| format!("no routine named {raw:?}"))
}

async fn run_headless(args: &Cli, selector: &Arc<Selector>) -> Result<()> {
    let restored = selector.restore();
    if let RestoreOutcome::Discarded(e) = &restored {
        if !args.json {
            eprintln!("Saved selection ignored: {e}");
        }
    }

    if let Some(raw) = args.select.as_deref() {
        let index = resolve_selection(selector, raw)?;
        selector.select(index)?;
        selector.flush();
    }

    if args.list || (!args.run && args.select.is_none()) {
        let listing = crate::text_summary::build_listing(selector);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&listing)?);
        } else {
            for line in crate::text_summary::listing_lines(&listing) {
                println!("{line}");
            }
        }
    } else if !args.run {
        if let Some(index) = selector.selected() {
            let name = &selector.registry().get(index)?.name;
            if args.json {
                println!("{}", serde_json::json!({ "selected": index, "routine": name }));
            } else {
                println!("Selected #{}: {}", index + 1, name);
            }
        }
    }

    if args.run {
        let runner = Arc::clone(selector);
        let report = tokio::task::spawn_blocking(move || run_with_report(&runner, |_, _| {}))
            .await
            .context("routine thread failed")?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            for line in crate::text_summary::report_lines(&report) {
                println!("{line}");
            }
        }
        if let RunOutcome::Failed(msg) = &report.outcome {
            anyhow::bail!("routine failed: {msg}");
        }
        if report.outcome == RunOutcome::NoSelection {
            anyhow::bail!("no routine selected; use --select");
        }
    }

    Ok(())
}

/// Run the selected routine and describe what happened. `on_start` sees the
/// same index and name the report carries.
pub fn run_with_report<F>(selector: &Selector, on_start: F) -> RunReport
where
    F: FnOnce(usize, &str),
{
    let mut ran: Option<(usize, String)> = None;
    let started_utc = crate::storage::now_rfc3339();
    let start = Instant::now();
    let result = selector.run_observed(|index, routine| {
        on_start(index, &routine.name);
        ran = Some((index, routine.name.clone()));
    });
    let (index, routine) = ran.unzip();
    let outcome = match result {
        Ok(()) => RunOutcome::Completed,
        Err(crate::error::SelectorError::NoSelection) => RunOutcome::NoSelection,
        Err(e) => RunOutcome::Failed(format!("{e:#}")),
    };
    RunReport {
        selector: selector.name().to_string(),
        index,
        routine,
        started_utc,
        elapsed_ms: start.elapsed().as_millis() as u64,
        outcome,
    }
}
