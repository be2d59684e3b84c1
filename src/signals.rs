//! The signal adapter (spec §6 "Signal adapter"): the external
//! collaborator that turns OS signals into calls on the manager's
//! `on_shutdown_requested`/`on_reload_requested`/`on_info_requested`/
//! `on_debug_requested` hooks. One spawned task per signal kind,
//! following the teacher's `install_signal_handlers` structure.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::engine::bulk::BulkStopOptions;
use crate::events::LifecycleEvent;
use crate::gate::ShutdownMethod;
use crate::manager::Manager;

pub struct SignalHandles {
    handles: Vec<JoinHandle<()>>,
}

impl Manager {
    /// Idempotent: a second `attach_signals` while handles are already
    /// installed is a no-op (spec §8 round-trip law).
    pub async fn attach_signals(self: &Arc<Self>) {
        let mut guard = self.signal_handles.lock().await;
        if guard.is_some() {
            return;
        }
        *guard = Some(install(self.clone()));
        drop(guard);
        self.emit(LifecycleEvent::LifecycleManagerSignalsAttached);
    }

    pub async fn detach_signals(&self) {
        let mut guard = self.signal_handles.lock().await;
        if let Some(handles) = guard.take() {
            for handle in handles.handles {
                handle.abort();
            }
            self.emit(LifecycleEvent::LifecycleManagerSignalsDetached);
        }
    }

    pub async fn signals_attached(&self) -> bool {
        self.signal_handles.lock().await.is_some()
    }

    /// Idempotent over repeated deliveries (spec §6): a shutdown
    /// already underway logs and ignores a second delivery rather than
    /// starting a concurrent teardown.
    async fn on_shutdown_requested(&self, method: ShutdownMethod) {
        self.emit(LifecycleEvent::SignalShutdown { method });
        if self.state.lock().await.gate.is_shutting_down {
            tracing::info!(?method, "shutdown already in progress; ignoring repeated signal");
            return;
        }
        let _ = self
            .stop_all_components(BulkStopOptions {
                method,
                ..Default::default()
            })
            .await;
    }

    async fn on_reload_requested(&self) {
        self.emit(LifecycleEvent::SignalReload);
        let _ = self.trigger_reload().await;
    }

    async fn on_info_requested(&self) {
        self.emit(LifecycleEvent::SignalInfo);
        let _ = self.trigger_info().await;
    }

    async fn on_debug_requested(&self) {
        self.emit(LifecycleEvent::SignalDebug);
        let _ = self.trigger_debug().await;
    }
}

#[cfg(unix)]
fn install(manager: Arc<Manager>) -> SignalHandles {
    use tokio::signal::unix::{signal, SignalKind};

    let mut handles = Vec::new();

    if let Ok(mut stream) = signal(SignalKind::interrupt()) {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                manager.on_shutdown_requested(ShutdownMethod::Sigint).await;
            }
        }));
    }
    if let Ok(mut stream) = signal(SignalKind::terminate()) {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                manager.on_shutdown_requested(ShutdownMethod::Sigterm).await;
            }
        }));
    }
    if let Ok(mut stream) = signal(SignalKind::from_raw(5)) {
        // SIGTRAP
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                manager.on_shutdown_requested(ShutdownMethod::Sigtrap).await;
            }
        }));
    }
    if let Ok(mut stream) = signal(SignalKind::hangup()) {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                manager.on_reload_requested().await;
            }
        }));
    }
    if let Ok(mut stream) = signal(SignalKind::user_defined1()) {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                manager.on_info_requested().await;
            }
        }));
    }
    if let Ok(mut stream) = signal(SignalKind::user_defined2()) {
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                manager.on_debug_requested().await;
            }
        }));
    }

    SignalHandles { handles }
}

#[cfg(windows)]
fn install(manager: Arc<Manager>) -> SignalHandles {
    let handles = vec![tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            manager.on_shutdown_requested(ShutdownMethod::Sigint).await;
        }
    })];
    SignalHandles { handles }
}
