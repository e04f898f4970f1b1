//! Application-level orchestration utilities.
//!
//! This module owns the selector lifecycle (restore, select, run, quit) so UI layers
//! only send commands and render events.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
