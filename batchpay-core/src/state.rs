//! Mutable state of one purchase attempt.
//!
//! [`ExecutionState`] has a single writer: the transition function in
//! [`machine`](crate::machine). Everything else reads snapshots.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::types::{TimestampMillis, TxHash};

/// Progress bands assigned on phase entry.
///
/// Progress never decreases within an attempt, so a later phase that maps to a
/// lower band (for example `fallback` after a late batch failure) keeps the
/// current value.
pub mod progress {
    pub const IDLE: u8 = 0;
    pub const PREPARING: u8 = 10;
    pub const SIMULATING: u8 = 25;
    pub const SIGNING: u8 = 40;
    pub const EXECUTING: u8 = 60;
    pub const CONFIRMING: u8 = 85;
    pub const COMPLETED: u8 = 100;
    /// Sequential fallback interpolates from here up to [`COMPLETED`].
    pub const FALLBACK_START: u8 = 20;

    /// Progress after `settled` of `total` calls have finished during fallback.
    pub fn fallback(settled: usize, total: usize) -> u8 {
        if total == 0 {
            return COMPLETED;
        }
        let span = (COMPLETED - FALLBACK_START) as usize;
        let done = settled.min(total);
        FALLBACK_START + (span * done / total) as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Preparing,
    Simulating,
    Signing,
    Executing,
    Confirming,
    Completed,
    Failed,
    Fallback,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Simulating => "simulating",
            Phase::Signing => "signing",
            Phase::Executing => "executing",
            Phase::Confirming => "confirming",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Fallback => "fallback",
        }
    }

    /// `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Any phase in which an attempt is in flight and may be cancelled.
    pub fn is_active(&self) -> bool {
        !matches!(self, Phase::Idle | Phase::Completed | Phase::Failed)
    }

    /// Band assigned on entry. `fallback` starts at its own band and interpolates upward.
    pub fn progress_band(&self) -> u8 {
        match self {
            Phase::Idle => progress::IDLE,
            Phase::Preparing => progress::PREPARING,
            Phase::Simulating => progress::SIMULATING,
            Phase::Signing => progress::SIGNING,
            Phase::Executing => progress::EXECUTING,
            Phase::Confirming => progress::CONFIRMING,
            Phase::Completed => progress::COMPLETED,
            Phase::Fallback => progress::FALLBACK_START,
            Phase::Failed => progress::IDLE,
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallState {
    pub status: CallStatus,
    pub tx_hash: Option<TxHash>,
    pub error: Option<ExecutionError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SimulationFailed,
    UserRejected,
    ExecutionFailed,
    Timeout,
    Unsupported,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SimulationFailed => "simulation_failed",
            ErrorKind::UserRejected => "user_rejected",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unsupported => "unsupported",
        }
    }

    /// Whether a batch failure of this kind may be replayed sequentially.
    ///
    /// Rejections and unsupported-method errors are never retried automatically.
    pub fn escalates_to_fallback(&self) -> bool {
        matches!(
            self,
            ErrorKind::SimulationFailed | ErrorKind::ExecutionFailed | ErrorKind::Timeout
        )
    }

    /// Short instruction shown to the buyer on a terminal failure.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorKind::UserRejected => "The request was rejected in your wallet. Try again.",
            ErrorKind::Unsupported => {
                "Your wallet cannot batch these calls. The standard flow is used automatically, no action needed."
            }
            ErrorKind::SimulationFailed => {
                "The payment would fail. Check your balance and allowance, then try again."
            }
            ErrorKind::ExecutionFailed => "The transaction failed on chain. Try again.",
            ErrorKind::Timeout => "The network took too long to confirm. Try again in a moment.",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ExecutionError {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasUsage {
    /// Sum of per-call estimates, i.e. the cost of sending each call alone.
    pub estimated: u64,
    pub actual: Option<u64>,
    /// `estimated` minus the batch gas, clamped at zero. Always zero once the
    /// calls run sequentially.
    pub saved: u64,
}

impl GasUsage {
    pub fn new(estimated: u64, batch_gas: u64) -> Self {
        GasUsage {
            estimated,
            actual: None,
            saved: estimated.saturating_sub(batch_gas),
        }
    }

    /// Usage for calls sent one by one: nothing is saved.
    pub fn sequential(estimated: u64) -> Self {
        GasUsage {
            estimated,
            actual: None,
            saved: 0,
        }
    }

    /// Record the gas actually consumed by the batch and recompute the saving.
    pub fn settle(&mut self, actual: u64) {
        self.actual = Some(actual);
        self.saved = self.estimated.saturating_sub(actual);
    }

    /// Add the gas one sequential call consumed.
    pub fn add_sequential(&mut self, gas: u64) {
        self.actual = Some(self.actual.unwrap_or(0).saturating_add(gas));
        self.saved = 0;
    }
}

/// Phase-entry timestamps for one attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub start_time: Option<TimestampMillis>,
    pub simulation_time: Option<TimestampMillis>,
    pub sign_time: Option<TimestampMillis>,
    pub execution_time: Option<TimestampMillis>,
    pub confirmation_time: Option<TimestampMillis>,
    pub fallback_time: Option<TimestampMillis>,
    /// Milliseconds from start to the terminal phase; set only at `completed`/`failed`.
    pub total_time: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub phase: Phase,
    pub progress: u8,
    /// Parallel to the plan's calls.
    pub call_states: Vec<CallState>,
    pub batch_tx_hash: Option<TxHash>,
    pub gas_usage: GasUsage,
    pub timing: Timing,
    pub error: Option<ExecutionError>,
    pub fell_back_to_sequential: bool,
}

/// Per-status call counts. `pending + executing + completed + failed` is the plan length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTally {
    pub pending: usize,
    pub executing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl CallTally {
    pub fn total(&self) -> usize {
        self.pending + self.executing + self.completed + self.failed
    }
}

impl ExecutionState {
    /// A fresh `idle` state for a plan of `call_count` calls.
    pub fn idle(call_count: usize) -> Self {
        ExecutionState {
            call_states: vec![CallState::default(); call_count],
            ..Default::default()
        }
    }

    pub fn tally(&self) -> CallTally {
        self.call_states
            .iter()
            .fold(CallTally::default(), |mut tally, call| {
                match call.status {
                    CallStatus::Pending => tally.pending += 1,
                    CallStatus::Executing => tally.executing += 1,
                    CallStatus::Completed => tally.completed += 1,
                    CallStatus::Failed => tally.failed += 1,
                }
                tally
            })
    }

    /// Hash of the last call that completed during sequential execution.
    pub fn last_call_hash(&self) -> Option<TxHash> {
        self.call_states
            .iter()
            .rev()
            .find(|c| c.status == CallStatus::Completed)
            .and_then(|c| c.tx_hash)
    }
}
