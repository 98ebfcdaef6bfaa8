//! Engine configuration.
//!
//! Values here are the lowest-precedence defaults: capability recommendations
//! and per-purchase [`PlanOverrides`](crate::builder::PlanOverrides) win over them.

use std::time::Duration;

use batchpay_core::plan::{FallbackPolicy, GasStrategy};
use bon::Builder;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Batching overhead is never budgeted below this share of the payment call's gas.
pub const MIN_BATCH_OVERHEAD_PERCENT: u8 = 25;

#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget for one attempt from `preparing` onward.
    #[builder(default = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
    /// Budget for the sequential fallback. Defaults to a fresh copy of the plan timeout.
    pub fallback_timeout_secs: Option<u64>,
    #[builder(default)]
    pub gas_strategy: GasStrategy,
    #[builder(default = true)]
    pub simulate_first: bool,
    #[builder(default = MIN_BATCH_OVERHEAD_PERCENT)]
    pub batch_overhead_percent: u8,
    #[builder(default)]
    pub fallback_policy: FallbackPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::builder().build()
    }
}

impl EngineConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Option<Duration> {
        self.fallback_timeout_secs.map(Duration::from_secs)
    }

    /// The configured overhead, floored at [`MIN_BATCH_OVERHEAD_PERCENT`].
    pub fn batch_overhead_percent(&self) -> u8 {
        self.batch_overhead_percent.max(MIN_BATCH_OVERHEAD_PERCENT)
    }
}
