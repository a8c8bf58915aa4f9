//! Custom resource definitions for every coordination entity (§3).
//!
//! Each entity is a `konductor.sh/v1` kind generated with
//! `#[derive(kube::CustomResource)]`: a spec struct (desired, client-written)
//! and, where the entity has one, a status struct (observed, controller-
//! written) wired through `#[kube(status = "...")]`. Typed throughout
//! (apiVersion/kind/metadata/spec/status) rather than built by hand per
//! call site with `serde_json::json!` patch literals.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ───────────────────────────── Semaphore ─────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Semaphore",
    namespaced,
    status = "SemaphoreStatus",
    derive = "PartialEq"
)]
pub struct SemaphoreSpec {
    pub permits: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct SemaphoreStatus {
    #[serde(default)]
    pub in_use: i32,
    #[serde(default)]
    pub available: i32,
    #[serde(default)]
    pub phase: SemaphorePhase,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum SemaphorePhase {
    #[default]
    Ready,
    Full,
}

// ─────────────────────────────── Permit ───────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Permit",
    namespaced,
    status = "PermitStatus",
    derive = "PartialEq"
)]
pub struct PermitSpec {
    pub semaphore: String,
    pub holder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct PermitStatus {
    #[serde(default)]
    pub phase: PermitPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum PermitPhase {
    #[default]
    Pending,
    Granted,
    Expired,
}

// ─────────────────────────────── Barrier ───────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Barrier",
    namespaced,
    status = "BarrierStatus",
    derive = "PartialEq"
)]
pub struct BarrierSpec {
    pub expected: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

impl BarrierSpec {
    /// `quorum > expected` is rejected at create time (§4.7, §8 boundary
    /// behavior) rather than left for the controller to reject.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(q) = self.quorum {
            if q > self.expected {
                return Err(format!(
                    "quorum ({q}) must not exceed expected ({})",
                    self.expected
                ));
            }
            if q < 1 {
                return Err("quorum must be at least 1".to_string());
            }
        }
        if self.expected < 1 {
            return Err("expected must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn threshold(&self) -> i32 {
        self.quorum.unwrap_or(self.expected)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct BarrierStatus {
    #[serde(default)]
    pub arrived: i32,
    #[serde(default)]
    pub phase: BarrierPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arrivals: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum BarrierPhase {
    #[default]
    Waiting,
    Open,
    Failed,
}

// ─────────────────────────────── Arrival ───────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Arrival",
    namespaced,
    derive = "PartialEq"
)]
pub struct ArrivalSpec {
    pub barrier: String,
    pub holder: String,
}

// ──────────────────────────────── Lease ────────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Lease",
    namespaced,
    status = "LeaseStatus",
    derive = "PartialEq"
)]
pub struct LeaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct LeaseStatus {
    #[serde(default)]
    pub phase: LeasePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub renew_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum LeasePhase {
    #[default]
    Available,
    Held,
}

// ───────────────────────────── LeaseRequest ─────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "LeaseRequest",
    namespaced,
    status = "LeaseRequestStatus",
    derive = "PartialEq"
)]
pub struct LeaseRequestSpec {
    pub lease: String,
    pub holder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct LeaseRequestStatus {
    #[serde(default)]
    pub phase: LeaseRequestPhase,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum LeaseRequestPhase {
    #[default]
    Pending,
    Granted,
    Denied,
}

// ──────────────────────────────── Gate ────────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Gate",
    namespaced,
    status = "GateStatus",
    derive = "PartialEq"
)]
pub struct GateSpec {
    pub conditions: Vec<GateCondition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct GateCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct GateStatus {
    #[serde(default)]
    pub phase: GatePhase,
    #[serde(default)]
    pub condition_statuses: Vec<ConditionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct ConditionStatus {
    pub name: String,
    pub met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum GatePhase {
    #[default]
    Waiting,
    Open,
    Failed,
}

// ──────────────────────────────── Mutex ────────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Mutex",
    namespaced,
    status = "MutexStatus",
    derive = "PartialEq"
)]
pub struct MutexSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct MutexStatus {
    #[serde(default)]
    pub phase: MutexPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum MutexPhase {
    #[default]
    Unlocked,
    Locked,
}

// ─────────────────────────────── RwMutex ───────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "RwMutex",
    namespaced,
    status = "RwMutexStatus",
    derive = "PartialEq"
)]
pub struct RwMutexSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct RwMutexStatus {
    #[serde(default)]
    pub phase: RwMutexPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_holder: Option<String>,
    #[serde(default)]
    pub read_holders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum RwMutexPhase {
    #[default]
    Unlocked,
    ReadLocked,
    WriteLocked,
}

// ────────────────────────────── WaitGroup ──────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "WaitGroup",
    namespaced,
    status = "WaitGroupStatus",
    derive = "PartialEq"
)]
pub struct WaitGroupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct WaitGroupStatus {
    #[serde(default)]
    pub counter: i32,
    #[serde(default)]
    pub phase: WaitGroupPhase,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum WaitGroupPhase {
    #[default]
    Waiting,
    Done,
}

// ───────────────────────────────── Once ─────────────────────────────────

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "konductor.sh",
    version = "v1",
    kind = "Once",
    namespaced,
    status = "OnceStatus",
    derive = "PartialEq"
)]
pub struct OnceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct OnceStatus {
    #[serde(default)]
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phase: OncePhase,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum OncePhase {
    #[default]
    Pending,
    Executed,
}

/// Labels attached to child entities (Permit, Arrival, LeaseRequest) so the
/// controller can list-and-count them by parent without a back-reference
/// living in the parent's spec (§9 "cyclic references").
pub fn parent_label(kind: &str, parent: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(format!("konductor.sh/{}", kind.to_lowercase()), parent.to_string());
    labels
}
