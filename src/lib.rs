//! Client SDK for cluster-wide coordination primitives backed by a
//! declarative control plane: counting semaphores, N-of-M barriers,
//! priority-queued leases, gates, mutexes/rwmutexes, wait groups, and
//! exactly-once execution, all reconciled by an external controller over
//! custom resources.
//!
//! Entry point: [`client::Konductor`], constructed from an already-resolved
//! [`kube::Client`] and scope string, exposing one engine accessor per
//! primitive (`semaphores()`, `barriers()`, `leases()`, `gates()`,
//! `mutexes()`, `rwmutexes()`, `waitgroups()`, `onces()`).

pub mod backoff;
pub mod client;
pub mod error;
pub mod handle;
pub mod identity;
pub mod options;
pub mod primitives;
pub mod retry;
pub mod store;
pub mod wait;

pub use client::Konductor;
pub use error::{Error, Result};
pub use options::Options;
