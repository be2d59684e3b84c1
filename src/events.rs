//! Observability events (spec §6 "Events").
//!
//! The event-emitter transport is explicitly an external collaborator
//! (spec §1): the core only needs a sink. [`EventSink`] is that seam —
//! a host process plugs in its own metrics pipeline. Independently, the
//! manager exposes an in-process `on`/`once`/`hasListener`/
//! `listenerCount` subscription surface (spec §6) backed by a
//! `tokio::sync::broadcast` channel; [`crate::manager::Manager::subscribe`]
//! is that surface. Both paths go through [`safe_emit`], which never lets
//! a panicking or erroring sink reach the engine.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::component::HealthCheckResult;
use crate::gate::ShutdownMethod;
use crate::results::ResultCode;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    ComponentRegistered {
        name: String,
    },
    ComponentRegistrationRejected {
        name: String,
        code: ResultCode,
    },
    ComponentUnregistered {
        name: String,
    },
    ComponentStarting {
        name: String,
    },
    ComponentStarted {
        name: String,
        at: DateTime<Utc>,
    },
    ComponentStartFailed {
        name: String,
        error: String,
    },
    ComponentStartSkipped {
        name: String,
        reason: String,
    },
    ComponentStartTimeout {
        name: String,
    },
    ComponentStartFailedOptional {
        name: String,
        error: String,
    },
    ComponentStopping {
        name: String,
    },
    ComponentStopped {
        name: String,
        at: DateTime<Utc>,
    },
    ComponentStopTimeout {
        name: String,
        phase: &'static str,
    },
    ComponentStalled {
        name: String,
        phase: &'static str,
        reason: &'static str,
    },
    ComponentShutdownWarning {
        name: String,
    },
    ComponentShutdownWarningCompleted {
        name: String,
    },
    ComponentShutdownWarningTimeout {
        name: String,
    },
    ComponentShutdownForce {
        name: String,
        graceful_phase_ran: bool,
        graceful_timed_out: bool,
    },
    ComponentShutdownForceCompleted {
        name: String,
    },
    ComponentShutdownForceTimeout {
        name: String,
    },
    ComponentReloadStarted {
        name: String,
    },
    ComponentReloadCompleted {
        name: String,
    },
    ComponentReloadFailed {
        name: String,
        error: String,
    },
    ComponentInfoStarted {
        name: String,
    },
    ComponentInfoCompleted {
        name: String,
    },
    ComponentInfoFailed {
        name: String,
        error: String,
    },
    ComponentDebugStarted {
        name: String,
    },
    ComponentDebugCompleted {
        name: String,
    },
    ComponentDebugFailed {
        name: String,
        error: String,
    },
    ComponentMessageSent {
        name: String,
        from: Option<String>,
    },
    ComponentMessageFailed {
        name: String,
        code: ResultCode,
    },
    ComponentBroadcastStarted {
        count: usize,
    },
    ComponentBroadcastCompleted {
        count: usize,
    },
    ComponentValueRequested {
        name: String,
        key: String,
    },
    ComponentValueReturned {
        name: String,
        key: String,
        found: bool,
    },
    ComponentStartupRollback {
        names: Vec<String>,
    },
    LifecycleManagerStarted {
        names: Vec<String>,
    },
    LifecycleManagerShutdownInitiated {
        method: ShutdownMethod,
        during_startup: bool,
    },
    LifecycleManagerShutdownWarning,
    LifecycleManagerShutdownCompleted {
        duration_ms: u64,
    },
    LifecycleManagerShutdownTimeout,
    LifecycleManagerSignalsAttached,
    LifecycleManagerSignalsDetached,
    SignalShutdown {
        method: ShutdownMethod,
    },
    SignalReload,
    SignalInfo,
    SignalDebug,
    HealthCheckFailed {
        name: String,
        result: HealthCheckResult,
    },
}

/// External sink for observability events. Handler exceptions must
/// never reach the engine (spec §5, §7); `safe_emit` wraps the call in
/// `catch_unwind` so a panicking sink cannot bring down an orchestrator
/// operation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LifecycleEvent);
}

pub(crate) struct NoopSink;
impl EventSink for NoopSink {
    fn emit(&self, _event: &LifecycleEvent) {}
}

pub(crate) fn safe_emit(
    broadcaster: &tokio::sync::broadcast::Sender<LifecycleEvent>,
    sink: &Arc<dyn EventSink>,
    event: LifecycleEvent,
) {
    // `broadcast::Sender::send` only fails when there are no
    // subscribers; that is a normal, non-error condition here.
    let _ = broadcaster.send(event.clone());

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| sink.emit(&event)));
    if let Err(panic) = result {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(%message, "event sink panicked; swallowed");
    }
}
