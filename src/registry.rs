//! The component registry (spec §4.2).
//!
//! Methods here assume the caller already holds the manager's single
//! lock (spec §5: "one logical actor"); nothing in this module does its
//! own locking. Ordering is tracked separately from the lookup map so
//! `order()` is always a plain registration-order walk, independent of
//! what `HashMap` iteration order happens to be.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::component::{Component, ComponentOptions};
use crate::resolver::{self, DependencyCycleError};
use crate::results::{InsertPosition, ValidationReport};

/// Legal transitions per spec §3. Stored as a plain `Copy` enum on the
/// record rather than derived, since several states (`starting`,
/// `starting-timed-out`, `failed`) have no other observable trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentState {
    Registered,
    Starting,
    StartingTimedOut,
    Running,
    Failed,
    Stopping,
    ForceStopping,
    Stopped,
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StallPhase {
    Graceful,
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    Timeout,
    Error,
    Both,
}

#[derive(Debug, Clone, Serialize)]
pub struct StallInfo {
    pub name: String,
    pub phase: StallPhase,
    pub reason: StallReason,
    pub started_at: DateTime<Utc>,
    pub stalled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Derived, never stored (spec §3 "System state").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemState {
    NoComponents,
    Ready,
    Starting,
    Running,
    Stalled,
    ShuttingDown,
    Stopped,
    Error,
}

pub struct ComponentRecord {
    pub component: Arc<dyn Component>,
    pub options: ComponentOptions,
    pub state: ComponentState,
    pub running: bool,
    pub stalled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub stall_info: Option<StallInfo>,
    /// Set by the bulk engine when a dependency was stalled, failed, or
    /// itself skipped (spec §4.5); cleared at the start of every
    /// `startAll` pass.
    pub skipped_due_to_dependency: Option<String>,
}

impl ComponentRecord {
    fn new(component: Arc<dyn Component>, options: ComponentOptions) -> Self {
        Self {
            component,
            options,
            state: ComponentState::Registered,
            running: false,
            stalled: false,
            started_at: None,
            stopped_at: None,
            last_error: None,
            stall_info: None,
            skipped_due_to_dependency: None,
        }
    }

    pub fn set_stalled(&mut self, info: StallInfo) {
        self.stalled = true;
        self.running = false;
        self.state = ComponentState::Stalled;
        self.stall_info = Some(info);
    }

    pub fn clear_stall(&mut self) {
        self.stalled = false;
        self.stall_info = None;
    }
}

#[derive(Default)]
pub struct Registry {
    order: Vec<String>,
    records: HashMap<String, ComponentRecord>,
}

pub enum RegisterOutcome {
    Registered,
    /// The exact same `Arc` is already registered under this name
    /// (spec §4.2: re-registering the identical instance is a no-op,
    /// distinguished via `Arc::ptr_eq` from registering a *different*
    /// instance under a name already in use, which is rejected).
    AlreadySameInstance,
    AlreadyDifferentInstance,
    /// `Before`/`After` named a target not currently registered.
    TargetNotFound,
    /// Adding this component at this position would introduce a
    /// dependency cycle; the registry is left completely unchanged
    /// (spec §4.2 "Registration side effects are atomic").
    CycleDetected(DependencyCycleError),
}

pub struct RegisterOutcomeDetail {
    pub outcome: RegisterOutcome,
    pub requested_index: Option<usize>,
    pub final_index: Option<usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends/inserts after a cycle check against the *candidate*
    /// graph (registry + the new component) so a rejected registration
    /// never touches `order` or `records` (spec §4.2 atomicity
    /// invariant, §8 "registry before a failed registration equals the
    /// registry after").
    pub fn register(
        &mut self,
        component: Arc<dyn Component>,
        options: ComponentOptions,
        position: InsertPosition,
    ) -> RegisterOutcomeDetail {
        let name = options.name().to_string();
        if let Some(existing) = self.records.get(&name) {
            let outcome = if Arc::ptr_eq(&existing.component, &component) {
                RegisterOutcome::AlreadySameInstance
            } else {
                RegisterOutcome::AlreadyDifferentInstance
            };
            return RegisterOutcomeDetail {
                outcome,
                requested_index: None,
                final_index: None,
            };
        }

        let insert_index = match &position {
            InsertPosition::End => self.order.len(),
            InsertPosition::Start => 0,
            InsertPosition::Before(target) => match self.order.iter().position(|n| n == target) {
                Some(idx) => idx,
                None => {
                    return RegisterOutcomeDetail {
                        outcome: RegisterOutcome::TargetNotFound,
                        requested_index: None,
                        final_index: None,
                    }
                }
            },
            InsertPosition::After(target) => match self.order.iter().position(|n| n == target) {
                Some(idx) => idx + 1,
                None => {
                    return RegisterOutcomeDetail {
                        outcome: RegisterOutcome::TargetNotFound,
                        requested_index: None,
                        final_index: None,
                    }
                }
            },
        }
        .min(self.order.len());

        let mut candidate_order = self.order.clone();
        candidate_order.insert(insert_index, name.clone());
        let mut candidate_deps = self.dependency_map();
        candidate_deps.insert(name.clone(), options.dependencies.clone());

        if let Err(cycle) = resolver::topological_order(&candidate_order, &candidate_deps) {
            return RegisterOutcomeDetail {
                outcome: RegisterOutcome::CycleDetected(cycle),
                requested_index: None,
                final_index: None,
            };
        }

        self.order = candidate_order;
        self.records.insert(name, ComponentRecord::new(component, options));
        RegisterOutcomeDetail {
            outcome: RegisterOutcome::Registered,
            requested_index: Some(insert_index),
            final_index: Some(insert_index),
        }
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        if self.records.remove(name).is_some() {
            self.order.retain(|n| n != name);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ComponentRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ComponentRecord> {
        self.records.get_mut(name)
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn names_with_running(&self, running: bool) -> Vec<String> {
        self.order
            .iter()
            .filter(|n| self.records.get(*n).map(|r| r.running) == Some(running))
            .cloned()
            .collect()
    }

    /// Components that declare `name` as a dependency and are currently
    /// running (spec §4.2 / Open Question: only *running* dependents
    /// block a stop — a registered-but-stopped dependent does not).
    pub fn running_dependents_of(&self, name: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|candidate| {
                self.records
                    .get(*candidate)
                    .map(|r| r.running && r.options.dependencies.iter().any(|d| d == name))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn dependency_map(&self) -> HashMap<String, Vec<String>> {
        self.order
            .iter()
            .map(|n| (n.clone(), self.records[n].options.dependencies.clone()))
            .collect()
    }

    pub fn startup_order(&self) -> Result<Vec<String>, DependencyCycleError> {
        resolver::topological_order(&self.order, &self.dependency_map())
    }

    pub fn shutdown_order(&self) -> Result<Vec<String>, DependencyCycleError> {
        Ok(resolver::reverse_order(&self.startup_order()?))
    }

    pub fn system_state(&self, is_shutting_down: bool) -> SystemState {
        if is_shutting_down {
            return SystemState::ShuttingDown;
        }
        if self.order.is_empty() {
            return SystemState::NoComponents;
        }
        if self.order.iter().any(|n| self.records[n].state == ComponentState::Stalled) {
            return SystemState::Stalled;
        }
        if self.order.iter().any(|n| self.records[n].state == ComponentState::Starting) {
            return SystemState::Starting;
        }
        if self.order.iter().any(|n| self.records[n].running) {
            return SystemState::Running;
        }
        if self
            .order
            .iter()
            .all(|n| self.records[n].state == ComponentState::Stopped)
        {
            return SystemState::Stopped;
        }
        if self
            .order
            .iter()
            .all(|n| self.records[n].state == ComponentState::Registered)
        {
            return SystemState::Ready;
        }
        SystemState::Error
    }

    pub fn validate_dependencies(&self) -> ValidationReport {
        let (missing, cycles) = resolver::validate_dependencies(&self.order, &self.dependency_map());
        let mut report = ValidationReport::ok();
        if !missing.is_empty() || !cycles.is_empty() {
            report.code = if !cycles.is_empty() {
                crate::results::ResultCode::DependencyCycle
            } else {
                crate::results::ResultCode::DependencyMissing
            };
        }
        report.missing_dependencies = missing
            .into_iter()
            .map(|(dependent, dependency)| {
                let dependent_optional = self.records.get(&dependent).map(|r| r.options.optional).unwrap_or(false);
                crate::results::MissingDependency {
                    dependent,
                    dependency,
                    dependent_optional,
                }
            })
            .collect();
        report.cycles = cycles;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Stub(&'static str);

    #[async_trait]
    impl Component for Stub {
        fn name(&self) -> &str {
            self.0
        }
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reregistering_same_instance_is_a_noop() {
        let mut registry = Registry::new();
        let comp: Arc<dyn Component> = Arc::new(Stub("a"));
        let opts = ComponentOptions::new("a").unwrap();
        assert!(matches!(
            registry.register(comp.clone(), opts.clone(), InsertPosition::End).outcome,
            RegisterOutcome::Registered
        ));
        assert!(matches!(
            registry.register(comp, opts, InsertPosition::End).outcome,
            RegisterOutcome::AlreadySameInstance
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registering_different_instance_under_same_name_is_rejected() {
        let mut registry = Registry::new();
        let first: Arc<dyn Component> = Arc::new(Stub("a"));
        let second: Arc<dyn Component> = Arc::new(Stub("a"));
        registry.register(first, ComponentOptions::new("a").unwrap(), InsertPosition::End);
        let outcome = registry.register(second, ComponentOptions::new("a").unwrap(), InsertPosition::End).outcome;
        assert!(matches!(outcome, RegisterOutcome::AlreadyDifferentInstance));
    }

    #[test]
    fn cycle_introduced_by_registration_is_rejected_and_registry_is_unchanged() {
        let mut registry = Registry::new();
        registry.register(
            Arc::new(Stub("a")),
            ComponentOptions::new("a").unwrap().dependencies(["b"]),
            InsertPosition::End,
        );
        let before = registry.order().to_vec();
        let outcome = registry
            .register(
                Arc::new(Stub("b")),
                ComponentOptions::new("b").unwrap().dependencies(["a"]),
                InsertPosition::End,
            )
            .outcome;
        assert!(matches!(outcome, RegisterOutcome::CycleDetected(_)));
        assert_eq!(registry.order(), before.as_slice());
    }

    #[test]
    fn validate_dependencies_reports_missing_dependency_and_dependent_optionality() {
        let mut registry = Registry::new();
        registry.register(
            Arc::new(Stub("api")),
            ComponentOptions::new("api").unwrap().dependencies(["ghost"]).optional(true),
            InsertPosition::End,
        );
        let report = registry.validate_dependencies();
        assert!(!report.is_valid());
        assert_eq!(report.missing_dependencies.len(), 1);
        let missing = &report.missing_dependencies[0];
        assert_eq!(missing.dependent, "api");
        assert_eq!(missing.dependency, "ghost");
        assert!(missing.dependent_optional);
    }

    #[test]
    fn running_dependents_excludes_stopped_dependents() {
        let mut registry = Registry::new();
        registry.register(
            Arc::new(Stub("db")),
            ComponentOptions::new("db").unwrap(),
            InsertPosition::End,
        );
        registry.register(
            Arc::new(Stub("api")),
            ComponentOptions::new("api").unwrap().dependencies(["db"]),
            InsertPosition::End,
        );
        assert!(registry.running_dependents_of("db").is_empty());
        registry.get_mut("api").unwrap().running = true;
        assert_eq!(registry.running_dependents_of("db"), vec!["api".to_string()]);
    }
}
