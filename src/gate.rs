//! Coarse lifecycle gate flags (spec §4.3 "Gate State").
//!
//! These live inside `ManagerState` next to the registry, under the
//! same lock, because every gated operation (`start_all`, `stop_all`,
//! a signal handler firing) needs to read-then-set them atomically
//! with respect to the registry it is about to walk.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMethod {
    Sigint,
    Sigterm,
    Sigtrap,
    Api,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GateState {
    pub is_starting: bool,
    pub is_started: bool,
    pub is_shutting_down: bool,
    pub shutdown_method: Option<ShutdownMethod>,
}

impl GateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh run after a prior shutdown looks exactly like a fresh
    /// run that never started (spec Open Question: re-registration
    /// after shutdown starts clean, it does not resurrect old gate
    /// state).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
