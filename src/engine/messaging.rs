//! Messaging, value lookup, and health façade (spec §4.7).

use serde_json::Value;
use tokio::time::Duration;

use crate::component::{HealthCheckResult, ValueLookup};
use crate::events::LifecycleEvent;
use crate::manager::Manager;
use crate::results::{AggregateHealthResult, BroadcastResult, HealthResult, MessageResult, ResultCode, ValueResult};

#[derive(Debug, Clone, Default)]
pub struct MessageOptions {
    pub from: Option<String>,
    pub timeout_ms: Option<u64>,
    pub include_stalled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    pub from: Option<String>,
    pub component_names: Option<Vec<String>>,
    pub include_stopped: bool,
    pub include_stalled: bool,
}

impl Manager {
    pub async fn send_message_to_component(&self, name: &str, payload: Value, opts: MessageOptions) -> MessageResult {
        if self.state.lock().await.gate.is_shutting_down {
            return MessageResult {
                code: ResultCode::ShutdownInProgress,
                name: name.to_string(),
                response: None,
                error: Some("shutdown_in_progress".to_string()),
            };
        }

        let (component, timeout_ms) = {
            let guard = self.state.lock().await;
            let record = match guard.registry.get(name) {
                Some(r) => r,
                None => {
                    return MessageResult {
                        code: ResultCode::NotFound,
                        name: name.to_string(),
                        response: None,
                        error: Some("component_not_found".to_string()),
                    }
                }
            };
            if record.stalled && !opts.include_stalled {
                return MessageResult {
                    code: ResultCode::Stalled,
                    name: name.to_string(),
                    response: None,
                    error: Some("stalled".to_string()),
                };
            }
            if !record.running {
                return MessageResult {
                    code: ResultCode::Stopped,
                    name: name.to_string(),
                    response: None,
                    error: Some("stopped".to_string()),
                };
            }
            if !record.component.capabilities().on_message {
                return MessageResult {
                    code: ResultCode::NoHandler,
                    name: name.to_string(),
                    response: None,
                    error: None,
                };
            }
            (record.component.clone(), opts.timeout_ms.unwrap_or(self.config.message_timeout_ms))
        };

        self.emit(LifecycleEvent::ComponentMessageSent {
            name: name.to_string(),
            from: opts.from.clone(),
        });

        let call = component.on_message(payload, opts.from.clone());
        let outcome = if timeout_ms == 0 {
            Ok(call.await)
        } else {
            tokio::time::timeout(Duration::from_millis(timeout_ms), call).await.map_err(|_| ())
        };

        match outcome {
            Ok(Ok(value)) => MessageResult {
                code: ResultCode::Sent,
                name: name.to_string(),
                response: Some(value),
                error: None,
            },
            Ok(Err(err)) => {
                self.emit(LifecycleEvent::ComponentMessageFailed {
                    name: name.to_string(),
                    code: ResultCode::Error,
                });
                MessageResult {
                    code: ResultCode::Error,
                    name: name.to_string(),
                    response: None,
                    error: Some(err.to_string()),
                }
            }
            Err(()) => {
                self.emit(LifecycleEvent::ComponentMessageFailed {
                    name: name.to_string(),
                    code: ResultCode::Timeout,
                });
                MessageResult {
                    code: ResultCode::Timeout,
                    name: name.to_string(),
                    response: None,
                    error: Some("timeout".to_string()),
                }
            }
        }
    }

    pub async fn broadcast_message(&self, payload: Value, opts: BroadcastOptions) -> BroadcastResult {
        let targets: Vec<String> = {
            let guard = self.state.lock().await;
            match &opts.component_names {
                Some(names) => names.clone(),
                None => guard
                    .registry
                    .order()
                    .iter()
                    .filter(|n| {
                        let record = guard.registry.get(*n);
                        record
                            .map(|r| r.running || (opts.include_stopped && !r.stalled) || (opts.include_stalled && r.stalled))
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect(),
            }
        };

        self.emit(LifecycleEvent::ComponentBroadcastStarted { count: targets.len() });

        let mut results = Vec::with_capacity(targets.len());
        for name in &targets {
            let message_opts = MessageOptions {
                from: opts.from.clone(),
                timeout_ms: None,
                include_stalled: opts.include_stalled,
            };
            results.push(self.send_message_to_component(name, payload.clone(), message_opts).await);
        }

        self.emit(LifecycleEvent::ComponentBroadcastCompleted { count: targets.len() });

        let code = if results.iter().any(|r| r.code == ResultCode::Timeout) {
            ResultCode::PartialTimeout
        } else if results.iter().any(|r| r.code == ResultCode::Error) {
            ResultCode::PartialError
        } else {
            ResultCode::Ok
        };

        BroadcastResult { code, results }
    }

    pub async fn get_value(&self, name: &str, key: &str, requested_by: Option<String>) -> ValueResult {
        self.emit(LifecycleEvent::ComponentValueRequested {
            name: name.to_string(),
            key: key.to_string(),
        });

        let component = {
            let guard = self.state.lock().await;
            let record = match guard.registry.get(name) {
                Some(r) => r,
                None => {
                    return ValueResult {
                        code: ResultCode::NotFound,
                        name: name.to_string(),
                        key: key.to_string(),
                        value: None,
                    }
                }
            };
            if !record.running {
                return ValueResult {
                    code: ResultCode::Stopped,
                    name: name.to_string(),
                    key: key.to_string(),
                    value: None,
                };
            }
            if !record.component.capabilities().get_value {
                return ValueResult {
                    code: ResultCode::NoHandler,
                    name: name.to_string(),
                    key: key.to_string(),
                    value: None,
                };
            }
            record.component.clone()
        };

        let lookup = component.get_value(key, requested_by).await;
        match lookup {
            ValueLookup::Found(value) => {
                self.emit(LifecycleEvent::ComponentValueReturned {
                    name: name.to_string(),
                    key: key.to_string(),
                    found: true,
                });
                ValueResult {
                    code: ResultCode::Ok,
                    name: name.to_string(),
                    key: key.to_string(),
                    value: Some(value),
                }
            }
            ValueLookup::NotFound => {
                self.emit(LifecycleEvent::ComponentValueReturned {
                    name: name.to_string(),
                    key: key.to_string(),
                    found: false,
                });
                ValueResult {
                    code: ResultCode::Ok,
                    name: name.to_string(),
                    key: key.to_string(),
                    value: None,
                }
            }
        }
    }

    pub async fn check_component_health(&self, name: &str) -> HealthResult {
        let (component, timeout_ms) = {
            let guard = self.state.lock().await;
            let record = match guard.registry.get(name) {
                Some(r) => r,
                None => {
                    return HealthResult {
                        code: ResultCode::NotFound,
                        name: name.to_string(),
                        result: None,
                    }
                }
            };
            if record.stalled {
                return HealthResult {
                    code: ResultCode::Stalled,
                    name: name.to_string(),
                    result: Some(HealthCheckResult::unhealthy("stalled")),
                };
            }
            if !record.running {
                return HealthResult {
                    code: ResultCode::Stopped,
                    name: name.to_string(),
                    result: Some(HealthCheckResult::unhealthy("stopped")),
                };
            }
            if !record.component.capabilities().health_check {
                return HealthResult {
                    code: ResultCode::NoHandler,
                    name: name.to_string(),
                    result: Some(HealthCheckResult::healthy()),
                };
            }
            (record.component.clone(), record.options.health_check_timeout_ms)
        };

        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), component.health_check()).await;
        match outcome {
            Ok(Ok(result)) => {
                if !result.healthy {
                    self.emit(LifecycleEvent::HealthCheckFailed {
                        name: name.to_string(),
                        result: result.clone(),
                    });
                }
                HealthResult {
                    code: ResultCode::Ok,
                    name: name.to_string(),
                    result: Some(result),
                }
            }
            Ok(Err(err)) => HealthResult {
                code: ResultCode::Error,
                name: name.to_string(),
                result: Some(HealthCheckResult::unhealthy(err.to_string())),
            },
            Err(_) => HealthResult {
                code: ResultCode::Timeout,
                name: name.to_string(),
                result: Some(HealthCheckResult::unhealthy("timeout")),
            },
        }
    }

    pub async fn check_all_health(&self) -> AggregateHealthResult {
        let names = self.state.lock().await.registry.names_with_running(true);
        let futures = names.iter().map(|name| self.check_component_health(name));
        let results = futures::future::join_all(futures).await;

        let any_timeout = results.iter().any(|r| r.code == ResultCode::Timeout);
        let any_error = results.iter().any(|r| r.code == ResultCode::Error);
        // `no_handler` counts as healthy by convention (spec §4.7); only an
        // explicit unhealthy result (handler ran, reported `healthy: false`)
        // degrades the aggregate.
        let any_unhealthy = results
            .iter()
            .any(|r| r.code == ResultCode::Ok && r.result.as_ref().map(|h| !h.healthy).unwrap_or(false));
        let code = match (any_timeout, any_error, any_unhealthy) {
            (true, _, _) => ResultCode::Timeout,
            (false, true, _) => ResultCode::Error,
            (false, false, true) => ResultCode::Degraded,
            (false, false, false) => ResultCode::Ok,
        };

        AggregateHealthResult { code, results }
    }
}
