//! What the connected account can do, as far as batching is concerned.

use serde::{Deserialize, Serialize};

/// How the connected account executes transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// A plain key-pair account with no code.
    Eoa,
    /// An account with executable code (smart contract wallet or delegated EOA).
    SmartAccount,
}

/// Result of capability detection for one (address, connector) pair.
///
/// Immutable for the session; recomputed only when the address or connector changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCapability {
    pub supports_batch: bool,
    pub max_batch_size: Option<usize>,
    pub account_kind: AccountKind,
    /// Human-readable reasons batching is unavailable.
    pub limitations: Vec<String>,
}

impl AccountCapability {
    /// The fail-safe answer used whenever detection cannot complete.
    pub fn fail_safe(limitation: impl Into<String>) -> Self {
        AccountCapability {
            supports_batch: false,
            max_batch_size: None,
            account_kind: AccountKind::Eoa,
            limitations: vec![limitation.into()],
        }
    }

    /// Whether a plan of `call_count` calls may be sent as one batch.
    pub fn can_batch(&self, call_count: usize) -> bool {
        self.supports_batch && self.max_batch_size.is_none_or(|max| call_count <= max)
    }

    /// Reason a plan of `call_count` calls cannot be batched, if any.
    pub fn batch_blocker(&self, call_count: usize) -> Option<String> {
        if !self.supports_batch {
            return Some(
                self.limitations
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "batched calls are not supported".to_string()),
            );
        }
        match self.max_batch_size {
            Some(max) if call_count > max => Some(format!(
                "plan has {call_count} calls but the wallet accepts at most {max} per batch"
            )),
            _ => None,
        }
    }

    /// Simulation preference implied by the account, if it has one.
    ///
    /// Simulation only applies to the batched path, so accounts that cannot
    /// batch recommend skipping it. Batch-capable accounts leave it to configuration.
    pub fn recommended_simulation(&self) -> Option<bool> {
        (!self.supports_batch).then_some(false)
    }
}
