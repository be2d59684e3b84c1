//! Per-component lifecycle engine (spec §4.4).
//!
//! Each public method here follows the lock → snapshot → unlock →
//! await hook → lock → commit discipline from spec §5: the mutex is
//! never held across a user `start`/`stop`/abort-hook call.

use std::time::Instant;

use chrono::Utc;
use tokio::time::Duration;

use crate::events::LifecycleEvent;
use crate::manager::Manager;
use crate::registry::{ComponentState, StallInfo, StallPhase, StallReason};
use crate::results::{ResultCode, RestartResult, StartResult, StopResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    pub allow_non_running_dependencies: bool,
    pub allow_during_bulk_startup: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    pub force_immediate: bool,
    pub allow_stop_with_running_dependents: bool,
    pub graceful_timeout_override_ms: Option<u64>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl Manager {
    /// A `stalled` component is neither `running` nor `starting`, so it
    /// passes the same gates as any other non-running component here —
    /// this is the `forceStalled` recovery path spec §3's transition
    /// diagram names (`stalled -> starting -> running`), not a separate
    /// entry point. Success clears the stall bookkeeping.
    pub async fn start_component(&self, name: &str, opts: StartOptions) -> StartResult {
        let clock = Instant::now();

        let (component, startup_timeout_ms) = {
            let mut guard = self.state.lock().await;

            if guard.gate.is_shutting_down {
                return StartResult {
                    code: ResultCode::ShutdownInProgress,
                    name: name.to_string(),
                    error: Some("shutdown_in_progress".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }
            if guard.gate.is_starting && !opts.allow_during_bulk_startup {
                return StartResult {
                    code: ResultCode::StartupInProgress,
                    name: name.to_string(),
                    error: Some("startup_in_progress".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }

            let record = match guard.registry.get(name) {
                Some(r) => r,
                None => {
                    return StartResult {
                        code: ResultCode::NotFound,
                        name: name.to_string(),
                        error: Some("component_not_found".to_string()),
                        duration_ms: elapsed_ms(clock),
                    }
                }
            };
            if record.running {
                return StartResult {
                    code: ResultCode::AlreadyRunning,
                    name: name.to_string(),
                    error: Some("component_already_running".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }
            if record.state == ComponentState::Starting {
                return StartResult {
                    code: ResultCode::AlreadyInProgress,
                    name: name.to_string(),
                    error: Some("component_already_starting".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }

            for dep in &record.options.dependencies {
                let dep_running = guard.registry.get(dep).map(|r| r.running).unwrap_or(false);
                let dep_optional = guard.registry.get(dep).map(|r| r.options.optional).unwrap_or(false);
                if !dep_running && !dep_optional && !opts.allow_non_running_dependencies {
                    return StartResult {
                        code: ResultCode::DependencyMissing,
                        name: name.to_string(),
                        error: Some(format!("dependency_not_running: {dep}")),
                        duration_ms: elapsed_ms(clock),
                    };
                }
            }

            let record = guard.registry.get_mut(name).unwrap();
            record.state = ComponentState::Starting;
            let timeout = record.options.startup_timeout_ms;
            (record.component.clone(), timeout)
        };

        self.emit(LifecycleEvent::ComponentStarting {
            name: name.to_string(),
        });

        let start_fut = component.start();
        let outcome = if startup_timeout_ms == 0 {
            Ok(start_fut.await)
        } else {
            tokio::time::timeout(Duration::from_millis(startup_timeout_ms), start_fut)
                .await
                .map_err(|_| ())
        };

        let mut guard = self.state.lock().await;
        match outcome {
            Ok(Ok(())) => {
                let record = guard.registry.get_mut(name).unwrap();
                record.state = ComponentState::Running;
                record.running = true;
                record.started_at = Some(Utc::now());
                record.clear_stall();
                drop(guard);
                self.emit(LifecycleEvent::ComponentStarted {
                    name: name.to_string(),
                    at: Utc::now(),
                });
                StartResult {
                    code: ResultCode::Started,
                    name: name.to_string(),
                    error: None,
                    duration_ms: elapsed_ms(clock),
                }
            }
            Ok(Err(err)) => {
                let message = err.to_string();
                let record = guard.registry.get_mut(name).unwrap();
                let optional = record.options.optional;
                if optional {
                    record.state = ComponentState::Failed;
                    record.last_error = Some(message.clone());
                    drop(guard);
                    self.emit(LifecycleEvent::ComponentStartFailedOptional {
                        name: name.to_string(),
                        error: message.clone(),
                    });
                    StartResult {
                        code: ResultCode::Error,
                        name: name.to_string(),
                        error: Some(message),
                        duration_ms: elapsed_ms(clock),
                    }
                } else {
                    record.state = ComponentState::Registered;
                    record.last_error = Some(message.clone());
                    drop(guard);
                    self.emit(LifecycleEvent::ComponentStartFailed {
                        name: name.to_string(),
                        error: message.clone(),
                    });
                    StartResult {
                        code: ResultCode::Error,
                        name: name.to_string(),
                        error: Some(message),
                        duration_ms: elapsed_ms(clock),
                    }
                }
            }
            Err(()) => {
                let record = guard.registry.get_mut(name).unwrap();
                record.state = ComponentState::StartingTimedOut;
                let component = record.component.clone();
                drop(guard);
                component.on_startup_aborted().await;
                self.emit(LifecycleEvent::ComponentStartTimeout {
                    name: name.to_string(),
                });
                StartResult {
                    code: ResultCode::Timeout,
                    name: name.to_string(),
                    error: Some("start_timeout".to_string()),
                    duration_ms: elapsed_ms(clock),
                }
            }
        }
    }

    pub async fn stop_component(&self, name: &str, opts: StopOptions) -> StopResult {
        let clock = Instant::now();

        let component = {
            let mut guard = self.state.lock().await;
            if guard.gate.is_starting {
                return StopResult {
                    code: ResultCode::StartupInProgress,
                    name: name.to_string(),
                    forced: false,
                    error: Some("startup_in_progress".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }

            let record = match guard.registry.get(name) {
                Some(r) => r,
                None => {
                    return StopResult {
                        code: ResultCode::NotFound,
                        name: name.to_string(),
                        forced: false,
                        error: Some("component_not_found".to_string()),
                        duration_ms: elapsed_ms(clock),
                    }
                }
            };
            if record.stalled {
                return StopResult {
                    code: ResultCode::Stalled,
                    name: name.to_string(),
                    forced: false,
                    error: Some("component_stalled".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }
            if !record.running {
                return StopResult {
                    code: ResultCode::NotRunning,
                    name: name.to_string(),
                    forced: false,
                    error: Some("component_not_running".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }
            let dependents = guard.registry.running_dependents_of(name);
            if !dependents.is_empty() && !opts.allow_stop_with_running_dependents {
                return StopResult {
                    code: ResultCode::HasDependents,
                    name: name.to_string(),
                    forced: false,
                    error: Some("has_running_dependents".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }

            let record = guard.registry.get_mut(name).unwrap();
            record.state = ComponentState::Stopping;
            record.component.clone()
        };

        if opts.force_immediate {
            return self
                .force_stop_phase(name, &component, false, false, clock)
                .await;
        }

        self.emit(LifecycleEvent::ComponentStopping {
            name: name.to_string(),
        });

        self.run_stop_phases(name, &component, opts, clock).await
    }

    /// Re-attempts a stalled component's shutdown (spec §4.5
    /// `retryStalled`): a stalled component is, by definition, neither
    /// `running` nor eligible through the normal `stop_component` gates
    /// (which refuse on `stalled` before doing anything), so this path
    /// bypasses those gates and re-enters the same graceful→force phase
    /// sequence directly. Stall state is cleared on success, same as
    /// any other successful stop.
    pub(crate) async fn retry_stalled_component(&self, name: &str) -> StopResult {
        let clock = Instant::now();

        let component = {
            let mut guard = self.state.lock().await;
            let record = match guard.registry.get_mut(name) {
                Some(r) => r,
                None => {
                    return StopResult {
                        code: ResultCode::NotFound,
                        name: name.to_string(),
                        forced: false,
                        error: Some("component_not_found".to_string()),
                        duration_ms: elapsed_ms(clock),
                    }
                }
            };
            if !record.stalled {
                return StopResult {
                    code: ResultCode::NotRunning,
                    name: name.to_string(),
                    forced: false,
                    error: Some("component_not_running".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }
            record.state = ComponentState::Stopping;
            record.component.clone()
        };

        self.emit(LifecycleEvent::ComponentStopping {
            name: name.to_string(),
        });

        self.run_stop_phases(name, &component, StopOptions::default(), clock).await
    }

    async fn run_stop_phases(
        &self,
        name: &str,
        component: &std::sync::Arc<dyn crate::component::Component>,
        opts: StopOptions,
        clock: Instant,
    ) -> StopResult {
        let graceful_timeout_ms = {
            let guard = self.state.lock().await;
            opts.graceful_timeout_override_ms
                .unwrap_or(guard.registry.get(name).unwrap().options.shutdown_graceful_timeout_ms)
        };

        let outcome = tokio::time::timeout(Duration::from_millis(graceful_timeout_ms), component.stop()).await;

        match outcome {
            Ok(Ok(())) => {
                let mut guard = self.state.lock().await;
                let record = guard.registry.get_mut(name).unwrap();
                record.state = ComponentState::Stopped;
                record.running = false;
                record.stopped_at = Some(Utc::now());
                record.clear_stall();
                drop(guard);
                self.emit(LifecycleEvent::ComponentStopped {
                    name: name.to_string(),
                    at: Utc::now(),
                });
                StopResult {
                    code: ResultCode::Stopped,
                    name: name.to_string(),
                    forced: false,
                    error: None,
                    duration_ms: elapsed_ms(clock),
                }
            }
            Ok(Err(err)) => self.force_stop_phase(name, component, true, false, clock).await.with_context(err.to_string()),
            Err(_) => {
                component.on_graceful_stop_timeout().await;
                self.emit(LifecycleEvent::ComponentStopTimeout {
                    name: name.to_string(),
                    phase: "graceful",
                });
                self.force_stop_phase(name, component, true, true, clock).await
            }
        }
    }

    async fn force_stop_phase(
        &self,
        name: &str,
        component: &std::sync::Arc<dyn crate::component::Component>,
        graceful_phase_ran: bool,
        graceful_timed_out: bool,
        clock: Instant,
    ) -> StopResult {
        let mut guard = self.state.lock().await;
        let record = guard.registry.get_mut(name).unwrap();
        record.state = ComponentState::ForceStopping;
        let force_timeout_ms = record.options.shutdown_force_timeout_ms;
        let has_force_hook = record.component.capabilities().on_shutdown_force;
        drop(guard);

        self.emit(LifecycleEvent::ComponentShutdownForce {
            name: name.to_string(),
            graceful_phase_ran,
            graceful_timed_out,
        });

        if !has_force_hook {
            let reason = if graceful_timed_out {
                StallReason::Timeout
            } else {
                StallReason::Error
            };
            return self.record_stall(name, StallPhase::Graceful, reason, None, clock).await;
        }

        let outcome = tokio::time::timeout(Duration::from_millis(force_timeout_ms), component.on_shutdown_force()).await;
        match outcome {
            Ok(Ok(())) => {
                let mut guard = self.state.lock().await;
                let record = guard.registry.get_mut(name).unwrap();
                record.state = ComponentState::Stopped;
                record.running = false;
                record.stopped_at = Some(Utc::now());
                record.clear_stall();
                drop(guard);
                self.emit(LifecycleEvent::ComponentShutdownForceCompleted {
                    name: name.to_string(),
                });
                StopResult {
                    code: ResultCode::Stopped,
                    name: name.to_string(),
                    forced: true,
                    error: None,
                    duration_ms: elapsed_ms(clock),
                }
            }
            Ok(Err(err)) => {
                let reason = if graceful_timed_out { StallReason::Both } else { StallReason::Error };
                self.record_stall(name, StallPhase::Force, reason, Some(err.to_string()), clock).await
            }
            Err(_) => {
                component.on_shutdown_force_aborted().await;
                self.emit(LifecycleEvent::ComponentShutdownForceTimeout {
                    name: name.to_string(),
                });
                let reason = if graceful_timed_out { StallReason::Both } else { StallReason::Timeout };
                self.record_stall(name, StallPhase::Force, reason, None, clock).await
            }
        }
    }

    async fn record_stall(
        &self,
        name: &str,
        phase: StallPhase,
        reason: StallReason,
        error: Option<String>,
        clock: Instant,
    ) -> StopResult {
        let now = Utc::now();
        let mut guard = self.state.lock().await;
        let record = guard.registry.get_mut(name).unwrap();
        let started_at = record.started_at.unwrap_or(now);
        record.set_stalled(StallInfo {
            name: name.to_string(),
            phase,
            reason,
            started_at,
            stalled_at: now,
            error: error.clone(),
        });
        drop(guard);
        self.emit(LifecycleEvent::ComponentStalled {
            name: name.to_string(),
            phase: match phase {
                StallPhase::Graceful => "graceful",
                StallPhase::Force => "force",
            },
            reason: match reason {
                StallReason::Timeout => "timeout",
                StallReason::Error => "error",
                StallReason::Both => "both",
            },
        });
        StopResult {
            code: ResultCode::Error,
            name: name.to_string(),
            forced: true,
            error: error.or_else(|| Some("stop_timeout".to_string())),
            duration_ms: elapsed_ms(clock),
        }
    }

    /// Stops an already-started component as part of a `startAll`
    /// rollback (spec §4.5). Rollback runs while `gate.is_starting` is
    /// still `true` — the gate is only cleared once rollback finishes —
    /// so this bypasses `stop_component`'s `startup_in_progress` gate
    /// the same way `retry_stalled_component` bypasses the `stalled`
    /// gate. Dependents are not checked: rollback walks `started` in
    /// reverse, so any dependent of `name` was itself started later and
    /// is stopped first.
    pub(crate) async fn rollback_stop_component(&self, name: &str) -> StopResult {
        let clock = Instant::now();

        let component = {
            let mut guard = self.state.lock().await;
            let record = match guard.registry.get_mut(name) {
                Some(r) => r,
                None => {
                    return StopResult {
                        code: ResultCode::NotFound,
                        name: name.to_string(),
                        forced: false,
                        error: Some("component_not_found".to_string()),
                        duration_ms: elapsed_ms(clock),
                    }
                }
            };
            if !record.running {
                return StopResult {
                    code: ResultCode::NotRunning,
                    name: name.to_string(),
                    forced: false,
                    error: Some("component_not_running".to_string()),
                    duration_ms: elapsed_ms(clock),
                };
            }
            record.state = ComponentState::Stopping;
            record.component.clone()
        };

        self.emit(LifecycleEvent::ComponentStopping {
            name: name.to_string(),
        });

        self.run_stop_phases(name, &component, StopOptions::default(), clock).await
    }

    pub async fn restart_component(&self, name: &str, stop_opts: StopOptions, start_opts: StartOptions) -> RestartResult {
        let stop = self.stop_component(name, stop_opts).await;
        if stop.code != ResultCode::Stopped {
            return RestartResult {
                code: ResultCode::RestartStopFailed,
                name: name.to_string(),
                stop,
                start: None,
            };
        }
        let start = self.start_component(name, start_opts).await;
        let code = if start.code == ResultCode::Started {
            ResultCode::Restarted
        } else {
            ResultCode::RestartStartFailed
        };
        RestartResult {
            code,
            name: name.to_string(),
            stop,
            start: Some(start),
        }
    }
}

impl StopResult {
    fn with_context(mut self, error: String) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}
