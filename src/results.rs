//! Result records (spec §4.2, §7).
//!
//! Operator-facing operations never return `Result<_, E>` — they return
//! a plain struct with a stable, machine-readable `code` field. A
//! caller branches on `code`, not on a thrown type; this also makes the
//! surface trivially serializable for a host that exposes it over
//! whatever external transport it chooses.

use serde::Serialize;
use serde_json::Value;

use crate::component::HealthCheckResult;

/// Every stable code a result record can carry. Intentionally flat
/// (not per-struct enums) so a caller can match on `code` without
/// knowing which operation produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Ok,
    Sent,
    Stopped,
    Started,
    Restarted,
    Registered,
    Unregistered,
    NotFound,
    AlreadyRegistered,
    InvalidName,
    DependencyMissing,
    DependencyCycle,
    Timeout,
    PartialTimeout,
    PartialError,
    Error,
    NoHandler,
    NotRunning,
    AlreadyRunning,
    AlreadyInProgress,
    Stalled,
    ShutdownInProgress,
    StartupInProgress,
    NoComponentsRegistered,
    ShutdownTimeout,
    HasDependents,
    Skipped,
    RestartStopFailed,
    RestartStartFailed,
    UnknownError,
    Degraded,
    TargetNotFound,
    InvalidPosition,
    BulkOperationInProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResult {
    pub code: ResultCode,
    pub name: String,
    pub registered: bool,
    pub registration_index_before: Option<usize>,
    pub registration_index_after: Option<usize>,
    pub startup_order: Option<Vec<String>>,
    pub during_startup: bool,
    /// `true` iff the resolver's topological order preserves the
    /// requested relative placement; only meaningful for
    /// `InsertPosition::Before`/`After` (spec §4.2 `insertAt`).
    pub manual_position_respected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnregisterResult {
    pub code: ResultCode,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResult {
    pub code: ResultCode,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopResult {
    pub code: ResultCode,
    pub name: String,
    pub forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestartResult {
    pub code: ResultCode,
    pub name: String,
    pub stop: StopResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<StartResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkStartResult {
    pub code: ResultCode,
    pub started: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub failed_optional: Vec<String>,
    pub rolled_back: Vec<String>,
    pub blocked_by_stalled: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkStopResult {
    pub code: ResultCode,
    pub stopped: Vec<String>,
    pub forced: Vec<String>,
    pub stalled: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResult {
    pub code: ResultCode,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResult {
    pub code: ResultCode,
    pub results: Vec<MessageResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueResult {
    pub code: ResultCode,
    pub name: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResult {
    pub code: ResultCode,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<HealthCheckResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateHealthResult {
    pub code: ResultCode,
    pub results: Vec<HealthResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalResult {
    pub code: ResultCode,
    pub results: Vec<MessageResult>,
}

/// A declared dependency that is not registered (spec §4.3
/// `validateDependencies`). `dependent_optional` records whether the
/// *dependent* (not the missing dependency itself) is optional, since
/// that is what determines whether the gap aborts a bulk startup.
#[derive(Debug, Clone, Serialize)]
pub struct MissingDependency {
    pub dependent: String,
    pub dependency: String,
    pub dependent_optional: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub code: ResultCode,
    pub missing_dependencies: Vec<MissingDependency>,
    pub cycles: Vec<Vec<String>>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            code: ResultCode::Ok,
            missing_dependencies: Vec::new(),
            cycles: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.missing_dependencies.is_empty() && self.cycles.is_empty()
    }
}

/// Where a component lands when inserted outside of plain append
/// (spec §4.2 `insertAt`). `Before`/`After` name a target already in
/// the registry; this is a preference on the **registration
/// ordering**, not the resolver's startup order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    Start,
    End,
    Before(String),
    After(String),
}
