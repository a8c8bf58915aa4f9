//! Per-primitive acquire/release protocols (§4.6–§4.12), built on the four
//! shared engines (wait, retry, holder identity, handle lifecycle) and the
//! store abstraction.

pub mod barrier;
pub mod gate;
pub mod lease;
pub mod mutex;
pub mod once;
pub mod rwmutex;
pub mod semaphore;
pub mod waitgroup;

use std::time::{SystemTime, UNIX_EPOCH};

pub const API_VERSION: &str = "konductor.sh/v1";

/// Builds the deterministic child-entity name `{parent}-{holder}` used by
/// Arrival and LeaseRequest, where at most one child per `(parent, holder)`
/// pair may exist (§4.7, §4.8).
pub(crate) fn holder_child_name(parent: &str, holder: &str) -> String {
    format!("{parent}-{holder}")
}

/// Builds a permit child name carrying a nanosecond timestamp so repeated
/// acquires by the same holder don't collide (§4.6).
pub(crate) fn unique_child_name(parent: &str, holder: &str) -> String {
    format!("{parent}-{holder}-{}", now_nanos())
}

pub(crate) fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
