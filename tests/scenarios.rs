//! End-to-end scenarios (spec §8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lifecycle_orchestrator::{
    BulkStopOptions, Capabilities, Component, ComponentOptions, InsertPosition, LifecycleEvent, Manager, ManagerConfig,
    ResultCode, StopOptions,
};

struct Recorder {
    starts: Arc<std::sync::Mutex<Vec<String>>>,
    stops: Arc<std::sync::Mutex<Vec<String>>>,
}

struct Plain {
    name: &'static str,
    rec: Recorder,
}

#[async_trait]
impl Component for Plain {
    fn name(&self) -> &str {
        self.name
    }
    async fn start(&self) -> anyhow::Result<()> {
        self.rec.starts.lock().unwrap().push(self.name.to_string());
        Ok(())
    }
    async fn stop(&self) -> anyhow::Result<()> {
        self.rec.stops.lock().unwrap().push(self.name.to_string());
        Ok(())
    }
}

fn recorder() -> (Recorder, Arc<std::sync::Mutex<Vec<String>>>, Arc<std::sync::Mutex<Vec<String>>>) {
    let starts = Arc::new(std::sync::Mutex::new(Vec::new()));
    let stops = Arc::new(std::sync::Mutex::new(Vec::new()));
    (
        Recorder {
            starts: starts.clone(),
            stops: stops.clone(),
        },
        starts,
        stops,
    )
}

#[tokio::test]
async fn linear_dependency_chain_starts_and_stops_in_order() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec, starts, stops) = recorder();

    let comp_c = Arc::new(Plain {
        name: "comp-c",
        rec: Recorder {
            starts: starts.clone(),
            stops: stops.clone(),
        },
    });
    let comp_b = Arc::new(Plain {
        name: "comp-b",
        rec: Recorder {
            starts: starts.clone(),
            stops: stops.clone(),
        },
    });
    let comp_a = Arc::new(Plain {
        name: "comp-a",
        rec,
    });

    manager
        .register_component(comp_c, ComponentOptions::new("comp-c").unwrap())
        .await;
    manager
        .register_component(comp_b, ComponentOptions::new("comp-b").unwrap().dependencies(["comp-c"]))
        .await;
    manager
        .register_component(comp_a, ComponentOptions::new("comp-a").unwrap().dependencies(["comp-b"]))
        .await;

    let result = manager.start_all_components(Default::default()).await;
    assert_eq!(result.code, ResultCode::Ok);
    assert_eq!(*starts.lock().unwrap(), vec!["comp-c", "comp-b", "comp-a"]);

    let result = manager.stop_all_components(BulkStopOptions::default()).await;
    assert_eq!(result.code, ResultCode::Ok);
    assert_eq!(*stops.lock().unwrap(), vec!["comp-a", "comp-b", "comp-c"]);
}

#[tokio::test]
async fn diamond_dependency_orders_a_first_and_d_last() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec, starts, _stops) = recorder();

    let a = Arc::new(Plain {
        name: "a",
        rec,
    });
    let b = Arc::new(Plain {
        name: "b",
        rec: Recorder { starts: starts.clone(), stops: Arc::new(std::sync::Mutex::new(Vec::new())) },
    });
    let c = Arc::new(Plain {
        name: "c",
        rec: Recorder { starts: starts.clone(), stops: Arc::new(std::sync::Mutex::new(Vec::new())) },
    });
    let d = Arc::new(Plain {
        name: "d",
        rec: Recorder { starts: starts.clone(), stops: Arc::new(std::sync::Mutex::new(Vec::new())) },
    });

    manager.register_component(a, ComponentOptions::new("a").unwrap()).await;
    manager.register_component(b, ComponentOptions::new("b").unwrap().dependencies(["a"])).await;
    manager.register_component(c, ComponentOptions::new("c").unwrap().dependencies(["a"])).await;
    manager.register_component(d, ComponentOptions::new("d").unwrap().dependencies(["b", "c"])).await;

    let result = manager.start_all_components(Default::default()).await;
    assert_eq!(result.code, ResultCode::Ok);
    let order = starts.lock().unwrap().clone();
    assert_eq!(order.first().unwrap(), "a");
    assert_eq!(order.last().unwrap(), "d");
}

#[tokio::test]
async fn cycle_on_registration_is_rejected_and_registry_is_unchanged() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec_a, _, _) = recorder();
    let (rec_b, _, _) = recorder();

    let a = Arc::new(Plain { name: "a", rec: rec_a });
    let b = Arc::new(Plain { name: "b", rec: rec_b });

    let result = manager
        .register_component(a, ComponentOptions::new("a").unwrap().dependencies(["b"]))
        .await;
    assert_eq!(result.code, ResultCode::Registered);

    let rejected = manager
        .register_component(b, ComponentOptions::new("b").unwrap().dependencies(["a"]))
        .await;
    assert_eq!(rejected.code, ResultCode::DependencyCycle);
    assert!(!rejected.registered);

    // `b` was never admitted, so `a`'s dangling dependency on it is simply
    // unresolved (not a cycle) — the registry still contains only `a`.
    assert_eq!(manager.get_component_names().await, vec!["a".to_string()]);
    assert_eq!(manager.get_startup_order().await, Ok(vec!["a".to_string()]));
}

struct OptionalFails {
    name: &'static str,
}

#[async_trait]
impl Component for OptionalFails {
    fn name(&self) -> &str {
        self.name
    }
    async fn start(&self) -> anyhow::Result<()> {
        anyhow::bail!("optional component refuses to start")
    }
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn optional_dependency_failure_skips_dependents_but_startup_succeeds() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec, _starts, _stops) = recorder();

    let comp_a = Arc::new(OptionalFails { name: "comp-a" });
    let comp_b = Arc::new(Plain { name: "comp-b", rec });

    manager
        .register_component(comp_a, ComponentOptions::new("comp-a").unwrap().optional(true))
        .await;
    manager
        .register_component(comp_b, ComponentOptions::new("comp-b").unwrap().dependencies(["comp-a"]))
        .await;

    let result = manager.start_all_components(Default::default()).await;
    assert_eq!(result.code, ResultCode::Ok);
    assert_eq!(result.failed_optional, vec!["comp-a".to_string()]);
    assert_eq!(result.skipped, vec!["comp-b".to_string()]);
}

struct Failing {
    name: &'static str,
}

#[async_trait]
impl Component for Failing {
    fn name(&self) -> &str {
        self.name
    }
    async fn start(&self) -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn startup_failure_rolls_back_already_started_components_in_reverse_order() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec, _starts, stops) = recorder();

    let x = Arc::new(Plain {
        name: "x",
        rec: Recorder { starts: rec.starts.clone(), stops: stops.clone() },
    });
    let y = Arc::new(Plain { name: "y", rec });
    let failing = Arc::new(Failing { name: "failing" });

    manager.register_component(x, ComponentOptions::new("x").unwrap()).await;
    manager.register_component(y, ComponentOptions::new("y").unwrap()).await;
    manager.register_component(failing, ComponentOptions::new("failing").unwrap()).await;

    let result = manager.start_all_components(Default::default()).await;
    assert_eq!(result.code, ResultCode::Error);
    assert!(result.started.is_empty());
    assert_eq!(result.rolled_back, vec!["y".to_string(), "x".to_string()]);
    assert_eq!(*stops.lock().unwrap(), vec!["y", "x"]);
}

struct StopThrows {
    name: &'static str,
    should_fail: Arc<AtomicBool>,
}

#[async_trait]
impl Component for StopThrows {
    fn name(&self) -> &str {
        self.name
    }
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn stop(&self) -> anyhow::Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            anyhow::bail!("stop refuses")
        } else {
            Ok(())
        }
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }
}

#[tokio::test]
async fn stalled_component_can_be_retried_after_being_fixed() {
    tokio::time::pause();
    let manager = Manager::new(ManagerConfig::default());
    let should_fail = Arc::new(AtomicBool::new(true));
    let comp = Arc::new(StopThrows {
        name: "flaky",
        should_fail: should_fail.clone(),
    });

    manager.register_component(comp, ComponentOptions::new("flaky").unwrap()).await;
    manager.start_all_components(Default::default()).await;

    let first = manager.stop_all_components(BulkStopOptions::default()).await;
    assert!(!first.stalled.is_empty() || !first.failed.is_empty());

    should_fail.store(false, Ordering::SeqCst);
    let retried = manager
        .stop_all_components(BulkStopOptions {
            retry_stalled: true,
            ..Default::default()
        })
        .await;
    assert_eq!(retried.code, ResultCode::Ok);
    assert!(manager.get_stalled_components().await.is_empty());
}

#[tokio::test]
async fn graceful_stop_error_reports_graceful_phase_ran_not_timed_out() {
    let manager = Manager::new(ManagerConfig::default());
    let comp = Arc::new(StopThrows {
        name: "refuser",
        should_fail: Arc::new(AtomicBool::new(true)),
    });
    manager.register_component(comp, ComponentOptions::new("refuser").unwrap()).await;
    manager.start_all_components(Default::default()).await;

    let mut events = manager.subscribe();
    manager.stop_component("refuser", StopOptions::default()).await;

    loop {
        match events.recv().await.unwrap() {
            LifecycleEvent::ComponentShutdownForce { name, graceful_phase_ran, graceful_timed_out } => {
                assert_eq!(name, "refuser");
                assert!(graceful_phase_ran, "graceful phase ran and errored, it did not time out");
                assert!(!graceful_timed_out);
                break;
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn stopping_an_already_stopped_component_reports_not_running() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec, _, _) = recorder();
    let comp = Arc::new(Plain { name: "solo", rec });
    manager.register_component(comp, ComponentOptions::new("solo").unwrap()).await;
    manager.start_all_components(Default::default()).await;

    let first = manager.stop_component("solo", StopOptions::default()).await;
    assert_eq!(first.code, ResultCode::Stopped);

    let second = manager.stop_component("solo", StopOptions::default()).await;
    assert_eq!(second.code, ResultCode::NotRunning);
}

struct SlowStopper;

#[async_trait]
impl Component for SlowStopper {
    fn name(&self) -> &str {
        "slow-stopper"
    }
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn stop(&self) -> anyhow::Result<()> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(())
    }
}

#[tokio::test]
async fn second_shutdown_during_in_flight_shutdown_is_rejected_instantly() {
    let manager = Manager::new(ManagerConfig::default());
    manager
        .register_component(Arc::new(SlowStopper), ComponentOptions::new("slow-stopper").unwrap())
        .await;
    manager.start_all_components(Default::default()).await;

    let manager_for_first = manager.clone();
    let first = tokio::spawn(async move { manager_for_first.stop_all_components(BulkStopOptions::default()).await });
    // Let the first shutdown acquire the gate and begin stopping before firing the second.
    tokio::task::yield_now().await;

    let second = manager.stop_all_components(BulkStopOptions::default()).await;
    assert_eq!(second.code, ResultCode::AlreadyInProgress);
    assert_eq!(second.duration_ms, 0);

    let first = first.await.unwrap();
    assert_eq!(first.code, ResultCode::Ok);
}

#[tokio::test]
async fn registering_same_name_twice_with_different_instance_rejects_cleanly() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec_1, _, _) = recorder();
    let (rec_2, _, _) = recorder();
    let first = Arc::new(Plain { name: "dup", rec: rec_1 });
    let second = Arc::new(Plain { name: "dup", rec: rec_2 });

    manager.register_component(first, ComponentOptions::new("dup").unwrap()).await;
    let result = manager.register_component(second, ComponentOptions::new("dup").unwrap()).await;
    assert_eq!(result.code, ResultCode::AlreadyRegistered);
    assert_eq!(manager.component_count().await, 1);
}

#[tokio::test]
async fn insert_at_before_named_target_lands_ahead_of_it_in_registration_order() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec_a, _, _) = recorder();
    let (rec_b, _, _) = recorder();
    let (rec_c, _, _) = recorder();

    manager
        .register_component(Arc::new(Plain { name: "a", rec: rec_a }), ComponentOptions::new("a").unwrap())
        .await;
    manager
        .register_component(Arc::new(Plain { name: "c", rec: rec_c }), ComponentOptions::new("c").unwrap())
        .await;

    let result = manager
        .insert_component_at(
            Arc::new(Plain { name: "b", rec: rec_b }),
            ComponentOptions::new("b").unwrap(),
            InsertPosition::Before("c".to_string()),
        )
        .await;

    assert_eq!(result.code, ResultCode::Registered);
    assert!(result.registered);
    assert_eq!(result.manual_position_respected, Some(true));
    assert_eq!(manager.get_component_names().await, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn insert_at_names_an_unregistered_target_and_is_rejected() {
    let manager = Manager::new(ManagerConfig::default());
    let (rec_a, _, _) = recorder();

    let result = manager
        .insert_component_at(
            Arc::new(Plain { name: "a", rec: rec_a }),
            ComponentOptions::new("a").unwrap(),
            InsertPosition::After("ghost".to_string()),
        )
        .await;

    assert_eq!(result.code, ResultCode::TargetNotFound);
    assert!(!result.registered);
    assert_eq!(manager.component_count().await, 0);
}

#[tokio::test]
async fn attach_signals_is_idempotent() {
    let manager = Manager::new(ManagerConfig::default());
    manager.attach_signals().await;
    manager.attach_signals().await;
    assert!(manager.signals_attached().await);
    manager.detach_signals().await;
    assert!(!manager.signals_attached().await);
}
