//! Batch plans: an ordered call list plus execution settings.

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::call::{Call, WireCall};

/// Gas price preference forwarded to the wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasStrategy {
    Fast,
    #[default]
    Standard,
    Slow,
    Custom,
}

/// What to do when the batched attempt fails with an escalatable error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Replay the calls one at a time.
    #[default]
    Sequential,
    /// Surface the failure to the caller.
    Abort,
}

/// The plan for one purchase attempt.
///
/// Call order is execution order; dependent calls come after the calls they depend on.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    #[builder(default)]
    pub calls: Vec<Call>,
    pub gas_limit: Option<u64>,
    #[builder(default)]
    pub gas_strategy: GasStrategy,
    /// Budget for the whole attempt from `preparing` onward.
    #[builder(default = Duration::from_secs(120))]
    pub timeout: Duration,
    #[builder(default = true)]
    pub simulate_first: bool,
    #[builder(default)]
    pub fallback_policy: FallbackPolicy,
    #[builder(into, default)]
    pub description: String,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Sum of the per-call gas estimates, i.e. the cost of sending every call on its own.
    pub fn individual_gas(&self) -> u64 {
        self.calls
            .iter()
            .filter_map(|c| c.estimated_gas)
            .fold(0u64, u64::saturating_add)
    }

    pub fn wire_calls(&self) -> Vec<WireCall> {
        self.calls.iter().map(WireCall::from).collect()
    }
}
