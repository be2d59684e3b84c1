//! Signal & broadcast dispatcher (spec §4.6): the shutdown warning
//! phase, and the reload/info/debug broadcast used by both the
//! programmatic `trigger*` API and the external signal adapter.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::time::Duration;

use crate::events::LifecycleEvent;
use crate::manager::Manager;
use crate::results::{MessageResult, ResultCode, SignalResult};

impl Manager {
    /// Runs once per `stopAll`, before any component is actually
    /// stopped. `< 0` skips entirely; `0` is fire-and-forget (handlers
    /// are spawned but not awaited); `> 0` races the whole phase
    /// against the global timeout.
    pub(crate) async fn run_warning_phase(&self) {
        let warning_timeout_ms = self.config.shutdown_warning_timeout_ms;
        if warning_timeout_ms < 0 {
            return;
        }

        let running = {
            let guard = self.state.lock().await;
            guard
                .registry
                .order()
                .iter()
                .filter_map(|n| guard.registry.get(n).filter(|r| r.running).map(|r| (n.clone(), r.component.clone())))
                .filter(|(_, c)| c.capabilities().on_shutdown_warning)
                .collect::<Vec<_>>()
        };
        if running.is_empty() {
            return;
        }

        self.emit(LifecycleEvent::LifecycleManagerShutdownWarning);
        for (name, _) in &running {
            self.emit(LifecycleEvent::ComponentShutdownWarning { name: name.clone() });
        }

        if warning_timeout_ms == 0 {
            for (name, component) in running {
                tokio::spawn(async move {
                    component.on_shutdown_warning().await;
                });
                self.emit(LifecycleEvent::ComponentShutdownWarningCompleted { name });
            }
            tokio::task::yield_now().await;
            return;
        }

        let pending: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(running.iter().map(|(n, _)| n.clone()).collect()));

        let handlers = running.into_iter().map(|(name, component)| {
            let events = self.events.clone();
            let sink = self.sink.clone();
            let pending = pending.clone();
            async move {
                component.on_shutdown_warning().await;
                pending.lock().unwrap().remove(&name);
                let _ = crate::events::safe_emit(&events, &sink, LifecycleEvent::ComponentShutdownWarningCompleted { name });
            }
        });

        let all = futures::future::join_all(handlers);
        if tokio::time::timeout(Duration::from_millis(warning_timeout_ms as u64), all)
            .await
            .is_err()
        {
            // Global timeout: every handler still pending at this point gets
            // its own per-component timeout event before the phase proceeds
            // (spec §4.6). Handlers already spawned keep running in the
            // background; their eventual completion is ignored (spec §5:
            // late resolutions of a lost race are never acted on).
            let still_pending = pending.lock().unwrap().clone();
            for name in still_pending {
                self.emit(LifecycleEvent::ComponentShutdownWarningTimeout { name });
            }
            self.emit(LifecycleEvent::LifecycleManagerShutdownTimeout);
        }
    }

    pub async fn trigger_reload(&self) -> SignalResult {
        self.broadcast_hook(HookKind::Reload).await
    }

    pub async fn trigger_info(&self) -> SignalResult {
        self.broadcast_hook(HookKind::Info).await
    }

    pub async fn trigger_debug(&self) -> SignalResult {
        self.broadcast_hook(HookKind::Debug).await
    }

    async fn broadcast_hook(&self, kind: HookKind) -> SignalResult {
        let targets = {
            let guard = self.state.lock().await;
            guard
                .registry
                .order()
                .iter()
                .filter_map(|n| guard.registry.get(n).filter(|r| r.running).map(|r| (n.clone(), r.component.clone(), r.options.signal_timeout_ms)))
                .collect::<Vec<_>>()
        };

        let mut results = Vec::with_capacity(targets.len());
        let mut any_timeout = false;
        let mut any_error = false;

        for (name, component, timeout_ms) in targets {
            self.emit(kind.started_event(name.clone()));
            let has_hook = kind.has_hook(&component.capabilities());
            if !has_hook {
                results.push(MessageResult {
                    code: ResultCode::NoHandler,
                    name: name.clone(),
                    response: None,
                    error: None,
                });
                continue;
            }

            let call = kind.invoke(component.as_ref());
            let outcome = if timeout_ms == 0 {
                Ok(call.await)
            } else {
                tokio::time::timeout(Duration::from_millis(timeout_ms), call).await.map_err(|_| ())
            };

            match outcome {
                Ok(Ok(value)) => {
                    self.emit(kind.completed_event(name.clone()));
                    results.push(MessageResult {
                        code: ResultCode::Ok,
                        name,
                        response: Some(value),
                        error: None,
                    });
                }
                Ok(Err(err)) => {
                    any_error = true;
                    self.emit(kind.failed_event(name.clone(), err.to_string()));
                    results.push(MessageResult {
                        code: ResultCode::Error,
                        name,
                        response: None,
                        error: Some(err.to_string()),
                    });
                }
                Err(()) => {
                    any_timeout = true;
                    self.emit(kind.failed_event(name.clone(), "timeout".to_string()));
                    results.push(MessageResult {
                        code: ResultCode::Timeout,
                        name,
                        response: None,
                        error: Some("timeout".to_string()),
                    });
                }
            }
        }

        let code = match (any_timeout, any_error) {
            (true, true) => ResultCode::PartialError,
            (true, false) if results.iter().all(|r| r.code == ResultCode::Timeout) => ResultCode::Timeout,
            (true, false) => ResultCode::PartialTimeout,
            (false, true) if results.iter().all(|r| r.code == ResultCode::Error) => ResultCode::Error,
            (false, true) => ResultCode::PartialError,
            (false, false) => ResultCode::Ok,
        };

        SignalResult { code, results }
    }
}

#[derive(Clone, Copy)]
enum HookKind {
    Reload,
    Info,
    Debug,
}

impl HookKind {
    fn has_hook(&self, caps: &crate::component::Capabilities) -> bool {
        match self {
            HookKind::Reload => caps.on_reload,
            HookKind::Info => caps.on_info,
            HookKind::Debug => caps.on_debug,
        }
    }

    fn invoke<'a>(
        &self,
        component: &'a dyn crate::component::Component,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<serde_json::Value>> + Send + 'a>> {
        match self {
            HookKind::Reload => Box::pin(async move { component.on_reload().await.map(|()| serde_json::Value::Null) }),
            HookKind::Info => Box::pin(component.on_info()),
            HookKind::Debug => Box::pin(component.on_debug()),
        }
    }

    fn started_event(&self, name: String) -> LifecycleEvent {
        match self {
            HookKind::Reload => LifecycleEvent::ComponentReloadStarted { name },
            HookKind::Info => LifecycleEvent::ComponentInfoStarted { name },
            HookKind::Debug => LifecycleEvent::ComponentDebugStarted { name },
        }
    }

    fn completed_event(&self, name: String) -> LifecycleEvent {
        match self {
            HookKind::Reload => LifecycleEvent::ComponentReloadCompleted { name },
            HookKind::Info => LifecycleEvent::ComponentInfoCompleted { name },
            HookKind::Debug => LifecycleEvent::ComponentDebugCompleted { name },
        }
    }

    fn failed_event(&self, name: String, error: String) -> LifecycleEvent {
        match self {
            HookKind::Reload => LifecycleEvent::ComponentReloadFailed { name, error },
            HookKind::Info => LifecycleEvent::ComponentInfoFailed { name, error },
            HookKind::Debug => LifecycleEvent::ComponentDebugFailed { name, error },
        }
    }
}
