//! Gate engine (§4.9): named, independently-trackable conditions that must
//! all be met before waiters proceed, plus an operator escape hatch
//! (`open`/`close`) for trusted callers to drive `phase` directly.

use crate::backoff::BackoffConfig;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::retry::retry;
use crate::store::types::{ConditionStatus, Gate, GateCondition, GatePhase, GateSpec};
use crate::store::Store;
use crate::wait::wait_for_condition;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct GateEngine {
    gates: Store<Gate>,
    backoff: BackoffConfig,
}

impl GateEngine {
    pub(crate) fn new(gates: Store<Gate>, backoff: BackoffConfig) -> Self {
        Self { gates, backoff }
    }

    pub async fn create(&self, name: &str, conditions: Vec<GateCondition>) -> Result<Gate> {
        let obj = Gate::new(name, GateSpec { conditions });
        self.gates.create(&obj).await
    }

    pub async fn get(&self, name: &str) -> Result<Gate> {
        self.gates.get(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.gates.delete(name).await
    }

    /// Waits for `phase` to settle. `Failed` is terminal for this call.
    pub async fn wait(&self, name: &str, opts: &Options) -> Result<Gate> {
        let result = wait_for_condition(
            "Gate",
            name,
            || async { self.gates.get_opt(name).await },
            |g: &Gate| {
                g.status
                    .as_ref()
                    .map(|s| matches!(s.phase, GatePhase::Open | GatePhase::Failed))
                    .unwrap_or(false)
            },
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await?;

        match result.status.as_ref().map(|s| s.phase) {
            Some(GatePhase::Open) => Ok(result),
            Some(GatePhase::Failed) => {
                Err(Error::Denied("Gate", name.to_string(), "gate failed".to_string()))
            }
            _ => unreachable!("predicate only returns on Open or Failed"),
        }
    }

    /// Waits until every condition in `names` has `met=true`, looked up in
    /// O(1) per poll via a map built from `conditionStatuses`.
    pub async fn wait_for_conditions(&self, name: &str, names: &[&str], opts: &Options) -> Result<Gate> {
        let wanted: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        wait_for_condition(
            "Gate",
            name,
            || async { self.gates.get_opt(name).await },
            move |g: &Gate| {
                let Some(status) = g.status.as_ref() else {
                    return false;
                };
                let index: HashMap<&str, &ConditionStatus> =
                    status.condition_statuses.iter().map(|c| (c.name.as_str(), c)).collect();
                wanted
                    .iter()
                    .all(|n| index.get(n.as_str()).map(|c| c.met).unwrap_or(false))
            },
            &self.backoff,
            opts.timeout,
            &opts.cancel,
        )
        .await
    }

    /// Drives `phase` to `Open`, retrying through write conflicts, then
    /// polls once to confirm the write is observable before returning.
    pub async fn open(&self, name: &str, timeout: Duration) -> Result<Gate> {
        self.set_phase(name, GatePhase::Open, timeout).await
    }

    /// Reverts `phase` to `Waiting`: a closed gate is re-gated, not failed,
    /// so a later `open` call or condition convergence can still succeed.
    pub async fn close(&self, name: &str, timeout: Duration) -> Result<Gate> {
        self.set_phase(name, GatePhase::Waiting, timeout).await
    }

    async fn set_phase(&self, name: &str, phase: GatePhase, timeout: Duration) -> Result<Gate> {
        let cancel = CancellationToken::new();
        retry(
            "Gate",
            name,
            || async {
                let mut gate = self.gates.get(name).await?;
                let status = gate.status.get_or_insert_with(Default::default);
                status.phase = phase;
                if phase == GatePhase::Open {
                    status.opened_at = Some(chrono::Utc::now());
                }
                self.gates.status_update(&gate).await
            },
            &self.backoff,
            timeout,
            &cancel,
        )
        .await?;

        wait_for_condition(
            "Gate",
            name,
            || async { self.gates.get_opt(name).await },
            move |g: &Gate| g.status.as_ref().map(|s| s.phase == phase).unwrap_or(false),
            &self.backoff,
            timeout,
            &cancel,
        )
        .await
    }
}
