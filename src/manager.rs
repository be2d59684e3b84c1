//! The manager façade (spec §6): the single public entry point. Holds
//! the one mutex the whole engine serialises through, the broadcast
//! channel backing `on`/`once`, and the pluggable [`EventSink`].
//!
//! The `engine::*` modules add further `impl Manager` blocks in their
//! own files rather than free functions taking the state apart —
//! mirrors the teacher's `LifecycleManager` being one type whose
//! behaviour is spread across `coordination::lifecycle` and
//! `coordination::shutdown`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::component::{Component, ComponentOptions};
use crate::config::ManagerConfig;
use crate::events::{safe_emit, EventSink, LifecycleEvent, NoopSink};
use crate::gate::GateState;
use crate::registry::{ComponentState, Registry, SystemState};
use crate::results::{InsertPosition, RegisterResult, ResultCode, UnregisterResult, ValidationReport};
use crate::signals::SignalHandles;

pub(crate) struct ManagerState {
    pub registry: Registry,
    pub gate: GateState,
}

pub struct Manager {
    pub(crate) state: Mutex<ManagerState>,
    pub(crate) config: ManagerConfig,
    pub(crate) events: broadcast::Sender<LifecycleEvent>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) signal_handles: Mutex<Option<SignalHandles>>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    pub fn with_sink(config: ManagerConfig, sink: Arc<dyn EventSink>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            state: Mutex::new(ManagerState {
                registry: Registry::new(),
                gate: GateState::new(),
            }),
            config,
            events,
            sink,
            signal_handles: Mutex::new(None),
        })
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        safe_emit(&self.events, &self.sink, event);
    }

    /// In-process pub/sub (spec §6 `on`). `once` and the listener-count
    /// queries are left to the caller: a `broadcast::Receiver` already
    /// gives per-subscription delivery, and `listenerCount`/`hasListener`
    /// map onto `receiver_count()` below.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn has_listener(&self) -> bool {
        self.listener_count() > 0
    }

    pub async fn register_component(
        &self,
        component: Arc<dyn Component>,
        options: ComponentOptions,
    ) -> RegisterResult {
        self.insert_component_at(component, options, InsertPosition::End).await
    }

    pub async fn insert_component_at(
        &self,
        component: Arc<dyn Component>,
        options: ComponentOptions,
        position: InsertPosition,
    ) -> RegisterResult {
        let name = options.name().to_string();
        let mut guard = self.state.lock().await;
        let during_startup = guard.gate.is_starting;

        fn empty_result(code: ResultCode, name: String, during_startup: bool, message: &str) -> RegisterResult {
            RegisterResult {
                code,
                name,
                registered: false,
                registration_index_before: None,
                registration_index_after: None,
                startup_order: None,
                during_startup,
                manual_position_respected: None,
                message: Some(message.to_string()),
            }
        }

        if guard.gate.is_shutting_down {
            return empty_result(ResultCode::ShutdownInProgress, name, during_startup, "shutdown_in_progress");
        }
        if during_startup {
            let is_a_dependency = guard
                .registry
                .order()
                .iter()
                .any(|n| guard.registry.get(n).map(|r| r.options.dependencies.contains(&name)).unwrap_or(false));
            if is_a_dependency {
                return empty_result(ResultCode::StartupInProgress, name, during_startup, "startup_in_progress");
            }
        }

        use crate::registry::RegisterOutcome;
        let detail = guard.registry.register(component, options, position.clone());
        match detail.outcome {
            RegisterOutcome::Registered => {
                let manual_position_respected = match &position {
                    InsertPosition::Before(target) | InsertPosition::After(target) => {
                        guard.registry.startup_order().ok().map(|order| {
                            let new_idx = order.iter().position(|n| n == &name);
                            let target_idx = order.iter().position(|n| n == target);
                            match (new_idx, target_idx) {
                                (Some(a), Some(b)) => {
                                    if matches!(position, InsertPosition::Before(_)) {
                                        a < b
                                    } else {
                                        a > b
                                    }
                                }
                                _ => false,
                            }
                        })
                    }
                    _ => None,
                };
                let startup_order = guard.registry.startup_order().ok();
                drop(guard);
                self.emit(LifecycleEvent::ComponentRegistered { name: name.clone() });
                RegisterResult {
                    code: ResultCode::Registered,
                    name,
                    registered: true,
                    registration_index_before: detail.requested_index,
                    registration_index_after: detail.final_index,
                    startup_order,
                    during_startup,
                    manual_position_respected,
                    message: None,
                }
            }
            RegisterOutcome::AlreadySameInstance => RegisterResult {
                code: ResultCode::Ok,
                name,
                registered: true,
                registration_index_before: None,
                registration_index_after: None,
                startup_order: None,
                during_startup,
                manual_position_respected: None,
                message: Some("already registered".to_string()),
            },
            RegisterOutcome::AlreadyDifferentInstance => {
                drop(guard);
                self.emit(LifecycleEvent::ComponentRegistrationRejected {
                    name: name.clone(),
                    code: ResultCode::AlreadyRegistered,
                });
                empty_result(ResultCode::AlreadyRegistered, name, during_startup, "duplicate_name")
            }
            RegisterOutcome::TargetNotFound => {
                drop(guard);
                self.emit(LifecycleEvent::ComponentRegistrationRejected {
                    name: name.clone(),
                    code: ResultCode::TargetNotFound,
                });
                empty_result(ResultCode::TargetNotFound, name, during_startup, "target_not_found")
            }
            RegisterOutcome::CycleDetected(cycle) => {
                drop(guard);
                self.emit(LifecycleEvent::ComponentRegistrationRejected {
                    name: name.clone(),
                    code: ResultCode::DependencyCycle,
                });
                empty_result(
                    ResultCode::DependencyCycle,
                    name,
                    during_startup,
                    &format!("dependency_cycle: {cycle}"),
                )
            }
        }
    }

    pub async fn unregister_component(
        &self,
        name: &str,
        stop_if_running: bool,
        force_stop: bool,
    ) -> UnregisterResult {
        {
            let guard = self.state.lock().await;
            if guard.gate.is_starting || guard.gate.is_shutting_down {
                return UnregisterResult {
                    code: ResultCode::BulkOperationInProgress,
                    name: name.to_string(),
                    message: Some("bulk_operation_in_progress".to_string()),
                };
            }
            if !guard.registry.contains(name) {
                return UnregisterResult {
                    code: ResultCode::NotFound,
                    name: name.to_string(),
                    message: Some("component_not_found".to_string()),
                };
            }
            let record = guard.registry.get(name).unwrap();
            if record.stalled && stop_if_running {
                return UnregisterResult {
                    code: ResultCode::Stalled,
                    name: name.to_string(),
                    message: Some("component_stalled".to_string()),
                };
            }
            let dependents = guard.registry.running_dependents_of(name);
            if record.running && !dependents.is_empty() && !force_stop {
                return UnregisterResult {
                    code: ResultCode::HasDependents,
                    name: name.to_string(),
                    message: Some("has_running_dependents".to_string()),
                };
            }
        }

        if stop_if_running {
            let _ = self.stop_component(name, Default::default()).await;
        }

        let mut guard = self.state.lock().await;
        let removed = guard.registry.unregister(name);
        drop(guard);
        if removed {
            self.emit(LifecycleEvent::ComponentUnregistered {
                name: name.to_string(),
            });
            UnregisterResult {
                code: ResultCode::Unregistered,
                name: name.to_string(),
                message: None,
            }
        } else {
            UnregisterResult {
                code: ResultCode::NotFound,
                name: name.to_string(),
                message: Some("component_not_found".to_string()),
            }
        }
    }

    pub async fn has_component(&self, name: &str) -> bool {
        self.state.lock().await.registry.contains(name)
    }

    pub async fn is_component_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .await
            .registry
            .get(name)
            .map(|r| r.running)
            .unwrap_or(false)
    }

    pub async fn get_component_names(&self) -> Vec<String> {
        self.state.lock().await.registry.order().to_vec()
    }

    pub async fn get_running_component_names(&self) -> Vec<String> {
        self.state.lock().await.registry.names_with_running(true)
    }

    pub async fn get_component_status(&self, name: &str) -> Option<ComponentState> {
        self.state.lock().await.registry.get(name).map(|r| r.state)
    }

    pub async fn get_all_component_statuses(&self) -> HashMap<String, ComponentState> {
        let guard = self.state.lock().await;
        guard
            .registry
            .order()
            .iter()
            .map(|n| (n.clone(), guard.registry.get(n).unwrap().state))
            .collect()
    }

    pub async fn get_system_state(&self) -> SystemState {
        let guard = self.state.lock().await;
        guard.registry.system_state(guard.gate.is_shutting_down)
    }

    pub async fn get_stalled_components(&self) -> Vec<String> {
        let guard = self.state.lock().await;
        guard
            .registry
            .order()
            .iter()
            .filter(|n| guard.registry.get(*n).map(|r| r.stalled).unwrap_or(false))
            .cloned()
            .collect()
    }

    pub async fn get_startup_order(&self) -> Result<Vec<String>, String> {
        let guard = self.state.lock().await;
        guard.registry.startup_order().map_err(|e| e.to_string())
    }

    pub async fn validate_dependencies(&self) -> ValidationReport {
        self.state.lock().await.registry.validate_dependencies()
    }

    pub async fn component_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    pub async fn running_count(&self) -> usize {
        self.state.lock().await.registry.names_with_running(true).len()
    }
}
