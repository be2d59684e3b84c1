//! The component contract (spec §4.1).
//!
//! Every managed unit implements [`Component`]. `start`/`stop` are
//! required; everything else is an optional hook whose *presence* is
//! reported through [`Capabilities`] rather than discovered by
//! reflection or duck-typing — the dispatcher (`engine::dispatcher`,
//! `engine::messaging`) consults `capabilities()` to decide between
//! `called` and `no_handler`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::OrchestratorError;
use crate::name::validate_component_name;

/// Minimum timeouts enforced regardless of user input (spec §3 table).
pub const MIN_SHUTDOWN_GRACEFUL_TIMEOUT_MS: u64 = 1_000;
pub const MIN_SHUTDOWN_FORCE_TIMEOUT_MS: u64 = 500;

pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SHUTDOWN_GRACEFUL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SHUTDOWN_FORCE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SIGNAL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SHUTDOWN_WARNING_TIMEOUT_MS: i64 = 500;

/// Presence of each optional hook, declared explicitly by the component
/// rather than inferred. Absence is a first-class signal: the
/// dispatcher reports `no_handler` for any hook whose flag is `false`
/// here, even if the trait method happens to have a (default, inert)
/// body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub on_shutdown_warning: bool,
    pub on_shutdown_force: bool,
    pub on_startup_aborted: bool,
    pub on_graceful_stop_timeout: bool,
    pub on_shutdown_force_aborted: bool,
    pub on_reload: bool,
    pub on_info: bool,
    pub on_debug: bool,
    pub on_message: bool,
    pub get_value: bool,
    pub health_check: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Result of a health check (spec §4.7). A plain `bool` returned by a
/// component is normalised to `{healthy, message: None, details: None}`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
            details: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
            details: None,
        }
    }
}

impl From<bool> for HealthCheckResult {
    fn from(healthy: bool) -> Self {
        Self {
            healthy,
            message: None,
            details: None,
        }
    }
}

/// Outcome of `getValue` (spec §4.7). `NotFound` is a normal negative
/// answer, not an error — it is distinct from the dispatcher's own
/// `not_found`/`no_handler` codes, which describe the *component*, not
/// the *key*.
#[derive(Debug, Clone)]
pub enum ValueLookup {
    Found(Value),
    NotFound,
}

impl ValueLookup {
    pub fn found(value: impl Into<Value>) -> Self {
        ValueLookup::Found(value.into())
    }
}

/// The polymorphic surface every managed unit implements (spec §4.1).
#[async_trait]
pub trait Component: Send + Sync {
    /// Stable name, already validated as strict kebab-case by whoever
    /// built the [`ComponentOptions`] this component is registered
    /// with; the trait itself does not re-validate on every call.
    fn name(&self) -> &str;

    /// Which optional hooks below are actually implemented.
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;

    async fn on_shutdown_warning(&self) {}
    async fn on_shutdown_force(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn on_startup_aborted(&self) {}
    async fn on_graceful_stop_timeout(&self) {}
    async fn on_shutdown_force_aborted(&self) {}
    async fn on_reload(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn on_info(&self) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
    async fn on_debug(&self) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
    async fn health_check(&self) -> anyhow::Result<HealthCheckResult> {
        Ok(HealthCheckResult::healthy())
    }
    async fn on_message(&self, _payload: Value, _from: Option<String>) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }
    async fn get_value(&self, _key: &str, _from: Option<String>) -> ValueLookup {
        ValueLookup::NotFound
    }
}

/// Declared dependency list, optionality, and per-phase timeouts for a
/// registered component (spec §3). This is the "constructor" at which
/// name validation and timeout-minimum enforcement happen — the Rust
/// analogue of the spec's "constructor-time validation" since the
/// `Component` trait itself has no constructor the core controls.
#[derive(Debug, Clone)]
pub struct ComponentOptions {
    pub(crate) name: String,
    pub dependencies: Vec<String>,
    pub optional: bool,
    pub startup_timeout_ms: u64,
    pub shutdown_graceful_timeout_ms: u64,
    pub shutdown_force_timeout_ms: u64,
    pub health_check_timeout_ms: u64,
    pub signal_timeout_ms: u64,
}

impl ComponentOptions {
    pub fn new(name: impl Into<String>) -> Result<Self, OrchestratorError> {
        let name = name.into();
        validate_component_name(&name)?;
        Ok(Self {
            name,
            dependencies: Vec::new(),
            optional: false,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            shutdown_graceful_timeout_ms: DEFAULT_SHUTDOWN_GRACEFUL_TIMEOUT_MS,
            shutdown_force_timeout_ms: DEFAULT_SHUTDOWN_FORCE_TIMEOUT_MS,
            health_check_timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
            signal_timeout_ms: DEFAULT_SIGNAL_TIMEOUT_MS,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// `0` disables the startup timeout.
    pub fn startup_timeout_ms(mut self, ms: u64) -> Self {
        self.startup_timeout_ms = ms;
        self
    }

    /// Raised to [`MIN_SHUTDOWN_GRACEFUL_TIMEOUT_MS`] if below it.
    pub fn shutdown_graceful_timeout_ms(mut self, ms: u64) -> Self {
        self.shutdown_graceful_timeout_ms = ms.max(MIN_SHUTDOWN_GRACEFUL_TIMEOUT_MS);
        self
    }

    /// Raised to [`MIN_SHUTDOWN_FORCE_TIMEOUT_MS`] if below it.
    pub fn shutdown_force_timeout_ms(mut self, ms: u64) -> Self {
        self.shutdown_force_timeout_ms = ms.max(MIN_SHUTDOWN_FORCE_TIMEOUT_MS);
        self
    }

    pub fn health_check_timeout_ms(mut self, ms: u64) -> Self {
        self.health_check_timeout_ms = ms;
        self
    }

    /// `0` disables the signal timeout.
    pub fn signal_timeout_ms(mut self, ms: u64) -> Self {
        self.signal_timeout_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_name_at_construction() {
        assert!(ComponentOptions::new("Bad_Name").is_err());
    }

    #[test]
    fn enforces_timeout_minimums_regardless_of_input() {
        let opts = ComponentOptions::new("comp-a")
            .unwrap()
            .shutdown_graceful_timeout_ms(500)
            .shutdown_force_timeout_ms(100);
        assert_eq!(opts.shutdown_graceful_timeout_ms, 1_000);
        assert_eq!(opts.shutdown_force_timeout_ms, 500);
    }
}
