//! Bulk lifecycle engine (spec §4.5): `startAll` / `stopAll` /
//! `restartAll`. Orchestration is strictly sequential — components
//! start and stop one at a time in resolver order — so rollback is
//! just "stop what we already started, in reverse".

use std::time::Instant;

use tokio::time::Duration;

use crate::engine::component::{StartOptions, StopOptions};
use crate::events::LifecycleEvent;
use crate::gate::ShutdownMethod;
use crate::manager::Manager;
use crate::results::{BulkStartResult, BulkStopResult, ResultCode};

#[derive(Debug, Clone, Copy, Default)]
pub struct BulkStartOptions {
    pub ignore_stalled_components: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BulkStopOptions {
    pub halt_on_stall: bool,
    pub retry_stalled: bool,
    pub timeout_ms: Option<u64>,
    pub method: ShutdownMethod,
}

impl Default for BulkStopOptions {
    fn default() -> Self {
        Self {
            halt_on_stall: true,
            retry_stalled: false,
            timeout_ms: None,
            method: ShutdownMethod::Api,
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl Manager {
    pub async fn start_all_components(&self, opts: BulkStartOptions) -> BulkStartResult {
        let clock = Instant::now();

        let order = {
            let mut guard = self.state.lock().await;
            if guard.gate.is_starting {
                return BulkStartResult {
                    code: ResultCode::AlreadyInProgress,
                    started: vec![],
                    skipped: vec![],
                    failed: vec![],
                    failed_optional: vec![],
                    rolled_back: vec![],
                    blocked_by_stalled: vec![],
                    duration_ms: elapsed_ms(clock),
                };
            }
            if guard.gate.is_shutting_down {
                return BulkStartResult {
                    code: ResultCode::Error,
                    started: vec![],
                    skipped: vec![],
                    failed: vec![],
                    failed_optional: vec![],
                    rolled_back: vec![],
                    blocked_by_stalled: vec![],
                    duration_ms: elapsed_ms(clock),
                };
            }
            if guard.registry.is_empty() {
                return BulkStartResult {
                    code: ResultCode::NoComponentsRegistered,
                    started: vec![],
                    skipped: vec![],
                    failed: vec![],
                    failed_optional: vec![],
                    rolled_back: vec![],
                    blocked_by_stalled: vec![],
                    duration_ms: elapsed_ms(clock),
                };
            }

            let stalled = guard
                .registry
                .order()
                .iter()
                .filter(|n| guard.registry.get(*n).map(|r| r.stalled).unwrap_or(false))
                .cloned()
                .collect::<Vec<_>>();
            if !stalled.is_empty() && !opts.ignore_stalled_components {
                return BulkStartResult {
                    code: ResultCode::Error,
                    started: vec![],
                    skipped: vec![],
                    failed: vec![],
                    failed_optional: vec![],
                    rolled_back: vec![],
                    blocked_by_stalled: stalled,
                    duration_ms: elapsed_ms(clock),
                };
            }

            if guard.registry.names_with_running(true).len() == guard.registry.len() {
                return BulkStartResult {
                    code: ResultCode::Ok,
                    started: guard.registry.names_with_running(true),
                    skipped: vec![],
                    failed: vec![],
                    failed_optional: vec![],
                    rolled_back: vec![],
                    blocked_by_stalled: vec![],
                    duration_ms: elapsed_ms(clock),
                };
            }

            let order = match guard.registry.startup_order() {
                Ok(order) => order,
                Err(err) => {
                    return BulkStartResult {
                        code: ResultCode::DependencyCycle,
                        started: vec![],
                        skipped: vec![],
                        failed: vec![(String::new(), err.to_string())],
                        failed_optional: vec![],
                        rolled_back: vec![],
                        blocked_by_stalled: vec![],
                        duration_ms: elapsed_ms(clock),
                    }
                }
            };
            guard.gate.is_starting = true;
            for name in &order {
                if let Some(record) = guard.registry.get_mut(name) {
                    record.skipped_due_to_dependency = None;
                }
            }
            order
        };

        let mut started = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();
        let mut failed_optional = Vec::new();
        let mut blocked: std::collections::HashSet<String> = std::collections::HashSet::new();

        for name in &order {
            if self.state.lock().await.gate.is_shutting_down {
                let rolled_back = self.rollback_started(&started).await;
                let mut guard = self.state.lock().await;
                guard.gate.is_starting = false;
                drop(guard);
                return BulkStartResult {
                    code: ResultCode::Error,
                    started: vec![],
                    skipped,
                    failed,
                    failed_optional,
                    rolled_back,
                    blocked_by_stalled: vec![],
                    duration_ms: elapsed_ms(clock),
                };
            }

            let deps_blocked = {
                let guard = self.state.lock().await;
                guard
                    .registry
                    .get(name)
                    .map(|r| r.options.dependencies.iter().any(|d| blocked.contains(d)))
                    .unwrap_or(false)
            };
            if deps_blocked {
                blocked.insert(name.clone());
                skipped.push(name.clone());
                let mut guard = self.state.lock().await;
                if let Some(record) = guard.registry.get_mut(name) {
                    record.skipped_due_to_dependency = Some("dependency unavailable".to_string());
                }
                drop(guard);
                self.emit(LifecycleEvent::ComponentStartSkipped {
                    name: name.clone(),
                    reason: "dependency unavailable".to_string(),
                });
                continue;
            }

            let result = self.start_component(name, StartOptions { allow_during_bulk_startup: true, ..Default::default() }).await;
            match result.code {
                ResultCode::Started => started.push(name.clone()),
                _ => {
                    let is_optional = self
                        .state
                        .lock()
                        .await
                        .registry
                        .get(name)
                        .map(|r| r.options.optional)
                        .unwrap_or(false);
                    if is_optional {
                        failed_optional.push(name.clone());
                        blocked.insert(name.clone());
                    } else {
                        let rolled_back = self.rollback_started(&started).await;
                        failed.push((name.clone(), result.error.clone().unwrap_or_default()));
                        let mut guard = self.state.lock().await;
                        guard.gate.is_starting = false;
                        drop(guard);
                        self.emit(LifecycleEvent::ComponentStartupRollback {
                            names: rolled_back.clone(),
                        });
                        return BulkStartResult {
                            code: ResultCode::Error,
                            started: vec![],
                            skipped,
                            failed,
                            failed_optional,
                            rolled_back,
                            blocked_by_stalled: vec![],
                            duration_ms: elapsed_ms(clock),
                        };
                    }
                }
            }
        }

        let mut guard = self.state.lock().await;
        guard.gate.is_starting = false;
        guard.gate.is_started = true;
        drop(guard);
        self.emit(LifecycleEvent::LifecycleManagerStarted {
            names: started.clone(),
        });

        BulkStartResult {
            code: ResultCode::Ok,
            started,
            skipped,
            failed,
            failed_optional,
            rolled_back: vec![],
            blocked_by_stalled: vec![],
            duration_ms: elapsed_ms(clock),
        }
    }

    async fn rollback_started(&self, started: &[String]) -> Vec<String> {
        let mut rolled_back = Vec::new();
        for name in started.iter().rev() {
            let result = self.rollback_stop_component(name).await;
            if result.code == ResultCode::Stopped {
                rolled_back.push(name.clone());
            }
        }
        rolled_back
    }

    pub async fn stop_all_components(&self, opts: BulkStopOptions) -> BulkStopResult {
        let clock = Instant::now();

        let running_in_shutdown_order = {
            let mut guard = self.state.lock().await;
            if guard.gate.is_shutting_down {
                return BulkStopResult {
                    code: ResultCode::AlreadyInProgress,
                    stopped: vec![],
                    forced: vec![],
                    stalled: vec![],
                    failed: vec![],
                    timed_out: false,
                    duration_ms: 0,
                };
            }
            guard.gate.is_shutting_down = true;
            guard.gate.shutdown_method = Some(opts.method);
            let during_startup = guard.gate.is_starting;
            drop(guard);
            self.emit(LifecycleEvent::LifecycleManagerShutdownInitiated {
                method: opts.method,
                during_startup,
            });

            let guard = self.state.lock().await;
            let order = guard.registry.shutdown_order().unwrap_or_else(|_| {
                let mut order = guard.registry.order().to_vec();
                order.reverse();
                order
            });
            order
                .into_iter()
                .filter(|n| guard.registry.get(n).map(|r| r.running || r.stalled).unwrap_or(false))
                .collect::<Vec<_>>()
        };

        self.run_warning_phase().await;

        let shutdown_future = self.stop_sequence(&running_in_shutdown_order, opts);

        let outcome = match opts.timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), shutdown_future).await,
            None => Ok(shutdown_future.await),
        };

        let mut guard = self.state.lock().await;
        guard.gate.is_shutting_down = false;
        guard.gate.is_started = false;
        drop(guard);

        match outcome {
            Ok(mut result) => {
                result.duration_ms = elapsed_ms(clock);
                self.emit(LifecycleEvent::LifecycleManagerShutdownCompleted {
                    duration_ms: result.duration_ms,
                });
                result
            }
            Err(_) => {
                self.emit(LifecycleEvent::LifecycleManagerShutdownTimeout);
                BulkStopResult {
                    code: ResultCode::ShutdownTimeout,
                    stopped: vec![],
                    forced: vec![],
                    stalled: vec![],
                    failed: vec![],
                    timed_out: true,
                    duration_ms: elapsed_ms(clock),
                }
            }
        }
    }

    async fn stop_sequence(&self, names: &[String], opts: BulkStopOptions) -> BulkStopResult {
        let mut stopped = Vec::new();
        let mut forced = Vec::new();
        let mut stalled = Vec::new();
        let mut failed = Vec::new();

        for name in names {
            let is_stalled = self.state.lock().await.registry.get(name).map(|r| r.stalled).unwrap_or(false);
            if is_stalled && !opts.retry_stalled {
                stalled.push(name.clone());
                if opts.halt_on_stall {
                    break;
                }
                continue;
            }

            let result = if is_stalled {
                self.retry_stalled_component(name).await
            } else {
                self.stop_component(name, StopOptions::default()).await
            };
            match result.code {
                ResultCode::Stopped if result.forced => forced.push(name.clone()),
                ResultCode::Stopped => stopped.push(name.clone()),
                _ => {
                    stalled.push(name.clone());
                    failed.push((name.clone(), result.error.unwrap_or_default()));
                    if opts.halt_on_stall {
                        break;
                    }
                }
            }
        }

        let code = if !stalled.is_empty() {
            ResultCode::Error
        } else {
            ResultCode::Ok
        };

        BulkStopResult {
            code,
            stopped,
            forced,
            stalled,
            failed,
            timed_out: false,
            duration_ms: 0,
        }
    }

    pub async fn restart_all_components(&self, stop_opts: BulkStopOptions, start_opts: BulkStartOptions) -> (BulkStopResult, Option<BulkStartResult>) {
        let stop = self.stop_all_components(stop_opts).await;
        if stop.code != ResultCode::Ok {
            return (stop, None);
        }
        let start = self.start_all_components(start_opts).await;
        (stop, Some(start))
    }
}
