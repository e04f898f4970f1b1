//! Turning routine definitions into runnable routines.

use crate::model::{Routine, RoutineSpec, RoutinesFile};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const DEFAULT_SIMULATED: Duration = Duration::from_secs(2);

pub fn load_routines_file(path: &Path) -> Result<RoutinesFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read routines file {}", path.display()))?;
    let file: RoutinesFile = serde_json::from_str(&raw)
        .with_context(|| format!("parse routines file {}", path.display()))?;
    Ok(file)
}

/// Routines used when no routines file is given.
pub fn demo_routines() -> Vec<RoutineSpec> {
    let simulated = |name: &str, image: Option<&str>, secs: u64| RoutineSpec {
        name: name.into(),
        image: image.map(str::to_string),
        command: None,
        duration: Some(Duration::from_secs(secs)),
    };
    vec![
        simulated("Left side AWP", Some("/usd/left_awp.bin"), 3),
        simulated("Right side rush", Some("/usd/right_rush.bin"), 3),
        simulated("Skills", None, 5),
        simulated("Do nothing", None, 0),
    ]
}

pub fn build_routine(spec: &RoutineSpec) -> Routine {
    let name = spec.name.clone();
    let routine = match spec.command.clone() {
        Some(argv) => Routine::new(name.clone(), move || run_command(&name, &argv)),
        None => {
            let duration = spec.duration.unwrap_or(DEFAULT_SIMULATED);
            Routine::new(name.clone(), move || {
                tracing::info!(routine = %name, "simulated routine for {}", humantime::format_duration(duration));
                std::thread::sleep(duration);
                Ok(())
            })
        }
    };
    routine.with_image(spec.image.clone().unwrap_or_default())
}

pub fn build_routines(specs: &[RoutineSpec]) -> Vec<Routine> {
    specs.iter().map(build_routine).collect()
}

fn run_command(name: &str, argv: &[String]) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("routine {name:?} has an empty command");
    };
    tracing::info!(routine = %name, program = %program, "spawning routine command");
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("spawn {program}"))?;
    if !status.success() {
        bail!("routine {name:?} exited with {status}");
    }
    Ok(())
}
