//! Read-only projections of [`ExecutionState`] for UIs and analytics.
//!
//! Everything here is recomputed from scratch on each state change; there is no caching.

use std::time::Duration;

use serde::Serialize;

use crate::{
    call::CallKind,
    capability::AccountKind,
    plan::BatchPlan,
    state::{CallStatus, CallTally, ExecutionError, ExecutionState, Phase, Timing},
    types::{AmountValue, TimestampMillis, TxHash},
};

/// Display-ready view of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub phase: Phase,
    pub label: &'static str,
    pub progress: u8,
    pub calls: Vec<CallRow>,
    pub tally: CallTally,
    pub elapsed: Duration,
    pub remaining: Duration,
    /// Whether the UI should offer a cancel button.
    pub cancellable: bool,
    pub fell_back_to_sequential: bool,
    pub error: Option<ExecutionError>,
    pub recovery_hint: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRow {
    pub index: usize,
    pub kind: CallKind,
    pub description: String,
    pub critical: bool,
    /// Native value attached to the call, serialized as a decimal string.
    pub value: AmountValue,
    pub status: CallStatus,
    pub tx_hash: Option<TxHash>,
    pub error: Option<String>,
}

/// Short user-facing label for a phase.
pub fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "Ready",
        Phase::Preparing => "Preparing transaction",
        Phase::Simulating => "Checking transaction",
        Phase::Signing => "Waiting for wallet confirmation",
        Phase::Executing => "Submitting transaction",
        Phase::Confirming => "Waiting for confirmation",
        Phase::Completed => "Purchase complete",
        Phase::Failed => "Purchase failed",
        Phase::Fallback => "Processing step by step",
    }
}

impl ProgressReport {
    /// Project `state` for `plan` as seen at `now`.
    ///
    /// `remaining = max(0, plan.timeout - (now - start))`; before the attempt
    /// starts, nothing has elapsed.
    pub fn project(state: &ExecutionState, plan: &BatchPlan, now: TimestampMillis) -> Self {
        let elapsed = match (state.timing.total_time, state.timing.start_time) {
            (Some(total), _) => Duration::from_millis(total),
            (None, Some(start)) => Duration::from_millis(now.millis_since(start)),
            (None, None) => Duration::ZERO,
        };
        let remaining = plan.timeout.saturating_sub(elapsed);

        let calls = plan
            .calls
            .iter()
            .zip(state.call_states.iter())
            .enumerate()
            .map(|(index, (call, call_state))| CallRow {
                index,
                kind: call.kind,
                description: call.description.clone(),
                critical: call.critical,
                value: call.value,
                status: call_state.status,
                tx_hash: call_state.tx_hash,
                error: call_state.error.as_ref().map(|e| e.message.clone()),
            })
            .collect();

        let recovery_hint = match state.phase {
            Phase::Failed => state.error.as_ref().map(|e| e.kind.recovery_hint()),
            _ => None,
        };

        ProgressReport {
            phase: state.phase,
            label: phase_label(state.phase),
            progress: state.progress,
            calls,
            tally: state.tally(),
            elapsed,
            remaining,
            cancellable: state.phase.is_active(),
            fell_back_to_sequential: state.fell_back_to_sequential,
            error: state.error.clone(),
            recovery_hint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TelemetryKind {
    PhaseEntered,
    Terminal { success: bool },
}

/// Event forwarded to the analytics collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub kind: TelemetryKind,
    pub phase: Phase,
    pub progress: u8,
    pub timing: Timing,
    pub account_kind: AccountKind,
    pub fell_back_to_sequential: bool,
}

impl TelemetryEvent {
    pub fn phase_entered(state: &ExecutionState, account_kind: AccountKind) -> Self {
        Self::from_state(TelemetryKind::PhaseEntered, state, account_kind)
    }

    pub fn terminal(state: &ExecutionState, account_kind: AccountKind) -> Self {
        let kind = TelemetryKind::Terminal {
            success: state.phase == Phase::Completed,
        };
        Self::from_state(kind, state, account_kind)
    }

    fn from_state(kind: TelemetryKind, state: &ExecutionState, account_kind: AccountKind) -> Self {
        TelemetryEvent {
            kind,
            phase: state.phase,
            progress: state.progress,
            timing: state.timing,
            account_kind,
            fell_back_to_sequential: state.fell_back_to_sequential,
        }
    }
}

/// Payload of the terminal `on_complete` callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub success: bool,
    /// The batch transaction, or the last confirmed call when executed sequentially.
    pub transaction_hash: Option<TxHash>,
    pub gas_used: Option<u64>,
    pub time_taken: Duration,
    pub fell_back_to_sequential: bool,
    pub error: Option<ExecutionError>,
}

impl CompletionResult {
    /// Build the result from a terminal state.
    pub fn from_state(state: &ExecutionState) -> Self {
        CompletionResult {
            success: state.phase == Phase::Completed,
            transaction_hash: state.batch_tx_hash.or_else(|| state.last_call_hash()),
            gas_used: state.gas_usage.actual,
            time_taken: Duration::from_millis(state.timing.total_time.unwrap_or_default()),
            fell_back_to_sequential: state.fell_back_to_sequential,
            error: state.error.clone(),
        }
    }
}
