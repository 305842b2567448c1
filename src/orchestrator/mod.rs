//! Application-level orchestration.
//!
//! The controller owns the wizard, runs one computation at a time on its behalf
//! and emits events for presentation layers. Post-processing assembles the
//! final session report once pricing has finished.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, ControllerOptions, UiCommand};
