//! The scoped lifecycle handle (spec §3 "Ownership", §4.7, §9 Design
//! Notes): a restricted façade passed to each component instead of the
//! full manager, so siblings can be addressed without escalating to
//! registry mutation. `from` on every message/value call is fixed to
//! the owning component's name.

use std::sync::Arc;

use serde_json::Value;

use crate::engine::bulk::{BulkStartOptions, BulkStopOptions};
use crate::engine::component::{StartOptions, StopOptions};
use crate::engine::messaging::{BroadcastOptions, MessageOptions};
use crate::events::LifecycleEvent;
use crate::manager::Manager;
use crate::registry::{ComponentState, SystemState};
use crate::results::{
    AggregateHealthResult, BroadcastResult, BulkStartResult, BulkStopResult, HealthResult, MessageResult,
    RestartResult, SignalResult, StartResult, StopResult, ValueResult,
};

#[derive(Clone)]
pub struct ComponentLifecycleRef {
    manager: Arc<Manager>,
    owner: String,
}

impl ComponentLifecycleRef {
    pub(crate) fn new(manager: Arc<Manager>, owner: impl Into<String>) -> Self {
        Self {
            manager,
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
        self.manager.subscribe()
    }

    pub async fn has_component(&self, name: &str) -> bool {
        self.manager.has_component(name).await
    }

    pub async fn is_component_running(&self, name: &str) -> bool {
        self.manager.is_component_running(name).await
    }

    pub async fn get_component_status(&self, name: &str) -> Option<ComponentState> {
        self.manager.get_component_status(name).await
    }

    pub async fn get_system_state(&self) -> SystemState {
        self.manager.get_system_state().await
    }

    pub async fn start_component(&self, name: &str, opts: StartOptions) -> StartResult {
        self.manager.start_component(name, opts).await
    }

    pub async fn stop_component(&self, name: &str, opts: StopOptions) -> StopResult {
        self.manager.stop_component(name, opts).await
    }

    pub async fn restart_component(&self, name: &str, stop_opts: StopOptions, start_opts: StartOptions) -> RestartResult {
        self.manager.restart_component(name, stop_opts, start_opts).await
    }

    pub async fn start_all_components(&self, opts: BulkStartOptions) -> BulkStartResult {
        self.manager.start_all_components(opts).await
    }

    pub async fn stop_all_components(&self, opts: BulkStopOptions) -> BulkStopResult {
        self.manager.stop_all_components(opts).await
    }

    pub async fn restart_all_components(&self, stop_opts: BulkStopOptions, start_opts: BulkStartOptions) -> (BulkStopResult, Option<BulkStartResult>) {
        self.manager.restart_all_components(stop_opts, start_opts).await
    }

    pub async fn trigger_reload(&self) -> SignalResult {
        self.manager.trigger_reload().await
    }

    pub async fn trigger_info(&self) -> SignalResult {
        self.manager.trigger_info().await
    }

    pub async fn trigger_debug(&self) -> SignalResult {
        self.manager.trigger_debug().await
    }

    pub async fn send_message_to_component(&self, name: &str, payload: Value, mut opts: MessageOptions) -> MessageResult {
        opts.from = Some(self.owner.clone());
        self.manager.send_message_to_component(name, payload, opts).await
    }

    pub async fn broadcast_message(&self, payload: Value, mut opts: BroadcastOptions) -> BroadcastResult {
        opts.from = Some(self.owner.clone());
        self.manager.broadcast_message(payload, opts).await
    }

    pub async fn check_component_health(&self, name: &str) -> HealthResult {
        self.manager.check_component_health(name).await
    }

    pub async fn check_all_health(&self) -> AggregateHealthResult {
        self.manager.check_all_health().await
    }

    pub async fn get_value(&self, name: &str, key: &str) -> ValueResult {
        self.manager.get_value(name, key, Some(self.owner.clone())).await
    }
}

impl Manager {
    /// Builds the scoped handle a given component should be constructed
    /// with (spec §3 "Ownership"). Call this before registering the
    /// component so its `Arc` can capture the handle in its own
    /// constructor.
    pub fn scoped_handle(self: &Arc<Self>, owner: impl Into<String>) -> ComponentLifecycleRef {
        ComponentLifecycleRef::new(self.clone(), owner)
    }
}
