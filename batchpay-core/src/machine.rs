//! The batch execution state machine.
//!
//! [`transition`] is a pure function `(state, event) -> state`. The async engine
//! in the `batchpay` crate turns wallet I/O into [`Event`]s and publishes every
//! resulting state; nothing else writes [`ExecutionState`].
//!
//! ```text
//! idle ──► preparing ──► simulating ──► signing ──► executing ──► confirming ──► completed
//!  │           │             │             │            │              │
//!  │           └─────────────┴─────────────┴────────────┴──────────────┴──► failed ──► fallback
//!  ├──► fallback (capability known unsupported)                                          │
//!  └──► completed (empty plan)                                      completed ◄──────────┤
//!                                                                   failed    ◄──────────┘
//! ```
//!
//! Any phase returns to `idle` on [`Event::Reset`].

use crate::{
    errors::{Error, Result},
    state::{
        CallState, CallStatus, ExecutionError, ExecutionState, GasUsage, Phase, progress,
    },
    types::{TimestampMillis, TxHash},
};

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `idle -> preparing`. The batch gas is refined by [`Event::Simulated`] and
    /// settled by [`Event::Confirmed`].
    Start {
        at: TimestampMillis,
        estimated_gas: u64,
    },
    /// `idle -> fallback`, taken when the account is known not to support batching.
    SkipToFallback {
        at: TimestampMillis,
        estimated_gas: u64,
    },
    /// `idle -> completed` for a plan with no calls.
    CompleteEmpty { at: TimestampMillis },
    /// `preparing -> simulating`.
    BeginSimulation { at: TimestampMillis },
    /// `simulating -> signing`, optionally refining the batch gas estimate.
    Simulated {
        at: TimestampMillis,
        gas_estimate: Option<u64>,
    },
    /// `preparing -> signing` when simulation is skipped.
    BeginSigning { at: TimestampMillis },
    /// `signing -> executing`: the user approved the batch.
    Signed { at: TimestampMillis },
    /// `executing -> confirming`: the wallet returned a batch handle.
    Submitted {
        at: TimestampMillis,
        batch_tx_hash: Option<TxHash>,
    },
    /// `confirming -> completed`: the batch was included.
    Confirmed {
        at: TimestampMillis,
        tx_hash: Option<TxHash>,
        gas_used: Option<u64>,
    },
    /// Any in-flight phase `-> failed`.
    Fail {
        at: TimestampMillis,
        error: ExecutionError,
    },
    /// `failed -> fallback` after an escalatable batch failure.
    EnterFallback { at: TimestampMillis },
    /// Fallback: call `index` starts executing.
    CallStarted { index: usize },
    /// Fallback: call `index` was confirmed.
    CallSucceeded {
        index: usize,
        tx_hash: TxHash,
        gas_used: Option<u64>,
    },
    /// Fallback: call `index` failed.
    CallFailed { index: usize, error: ExecutionError },
    /// `fallback -> completed` once no call is left pending.
    FallbackCompleted { at: TimestampMillis },
    /// `* -> idle`.
    Reset,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::SkipToFallback { .. } => "skip_to_fallback",
            Event::CompleteEmpty { .. } => "complete_empty",
            Event::BeginSimulation { .. } => "begin_simulation",
            Event::Simulated { .. } => "simulated",
            Event::BeginSigning { .. } => "begin_signing",
            Event::Signed { .. } => "signed",
            Event::Submitted { .. } => "submitted",
            Event::Confirmed { .. } => "confirmed",
            Event::Fail { .. } => "fail",
            Event::EnterFallback { .. } => "enter_fallback",
            Event::CallStarted { .. } => "call_started",
            Event::CallSucceeded { .. } => "call_succeeded",
            Event::CallFailed { .. } => "call_failed",
            Event::FallbackCompleted { .. } => "fallback_completed",
            Event::Reset => "reset",
        }
    }
}

/// Apply `event` to `state`, returning the next state.
///
/// On error `state` is unchanged and the event is rejected.
pub fn transition(state: &ExecutionState, event: Event) -> Result<ExecutionState> {
    let mut next = state.clone();
    let name = event.name();
    let invalid = || Error::InvalidTransition {
        phase: state.phase,
        event: name,
    };

    match (state.phase, event) {
        (_, Event::Reset) => {
            return Ok(ExecutionState::idle(state.call_states.len()));
        }

        (Phase::Idle, Event::Start { at, estimated_gas }) => {
            next.timing.start_time = Some(at);
            next.gas_usage = GasUsage::new(estimated_gas, estimated_gas);
            enter(&mut next, Phase::Preparing);
        }

        (Phase::Idle, Event::SkipToFallback { at, estimated_gas }) => {
            next.timing.start_time = Some(at);
            next.timing.fallback_time = Some(at);
            next.gas_usage = GasUsage::sequential(estimated_gas);
            next.fell_back_to_sequential = true;
            enter(&mut next, Phase::Fallback);
        }

        (Phase::Idle, Event::CompleteEmpty { at }) => {
            if !state.call_states.is_empty() {
                return Err(invalid());
            }
            next.timing.start_time = Some(at);
            finish(&mut next, Phase::Completed, at);
        }

        (Phase::Preparing, Event::BeginSimulation { at }) => {
            next.timing.simulation_time = Some(at);
            enter(&mut next, Phase::Simulating);
        }

        (Phase::Simulating, Event::Simulated { at, gas_estimate }) => {
            if let Some(gas) = gas_estimate {
                next.gas_usage = GasUsage::new(next.gas_usage.estimated, gas);
            }
            next.timing.sign_time = Some(at);
            enter(&mut next, Phase::Signing);
        }

        (Phase::Preparing, Event::BeginSigning { at }) => {
            next.timing.sign_time = Some(at);
            enter(&mut next, Phase::Signing);
        }

        (Phase::Signing, Event::Signed { at }) => {
            next.timing.execution_time = Some(at);
            for call in &mut next.call_states {
                call.status = CallStatus::Executing;
            }
            enter(&mut next, Phase::Executing);
        }

        (Phase::Executing, Event::Submitted { at, batch_tx_hash }) => {
            next.timing.confirmation_time = Some(at);
            next.batch_tx_hash = batch_tx_hash;
            enter(&mut next, Phase::Confirming);
        }

        (
            Phase::Confirming,
            Event::Confirmed {
                at,
                tx_hash,
                gas_used,
            },
        ) => {
            if tx_hash.is_some() {
                next.batch_tx_hash = tx_hash;
            }
            if let Some(gas) = gas_used {
                next.gas_usage.settle(gas);
            }
            for call in &mut next.call_states {
                call.status = CallStatus::Completed;
                call.tx_hash = next.batch_tx_hash;
            }
            finish(&mut next, Phase::Completed, at);
        }

        (
            Phase::Preparing
            | Phase::Simulating
            | Phase::Signing
            | Phase::Executing
            | Phase::Confirming
            | Phase::Fallback,
            Event::Fail { at, error },
        ) => {
            // A batch is atomic: calls handed to the wallet failed together.
            if state.phase != Phase::Fallback {
                for call in &mut next.call_states {
                    if call.status == CallStatus::Executing {
                        call.status = CallStatus::Failed;
                        call.error = Some(error.clone());
                    }
                }
            }
            next.error = Some(error);
            finish(&mut next, Phase::Failed, at);
        }

        (Phase::Failed, Event::EnterFallback { at }) => {
            let escalatable = state
                .error
                .as_ref()
                .is_some_and(|e| e.kind.escalates_to_fallback());
            if state.fell_back_to_sequential || !escalatable {
                return Err(invalid());
            }
            for call in &mut next.call_states {
                if call.status != CallStatus::Completed {
                    *call = CallState::default();
                }
            }
            // The failed batch neither saved gas nor produced the purchase hash.
            next.batch_tx_hash = None;
            next.gas_usage = GasUsage::sequential(state.gas_usage.estimated);
            next.error = None;
            next.timing.fallback_time = Some(at);
            next.timing.total_time = None;
            next.fell_back_to_sequential = true;
            enter(&mut next, Phase::Fallback);
        }

        (Phase::Fallback, Event::CallStarted { index }) => {
            let call = call_mut(&mut next, index)?;
            if call.status != CallStatus::Pending {
                return Err(invalid());
            }
            call.status = CallStatus::Executing;
        }

        (
            Phase::Fallback,
            Event::CallSucceeded {
                index,
                tx_hash,
                gas_used,
            },
        ) => {
            let call = call_mut(&mut next, index)?;
            if call.status != CallStatus::Executing {
                return Err(invalid());
            }
            call.status = CallStatus::Completed;
            call.tx_hash = Some(tx_hash);
            if let Some(gas) = gas_used {
                next.gas_usage.add_sequential(gas);
            }
            advance_fallback_progress(&mut next);
        }

        (Phase::Fallback, Event::CallFailed { index, error }) => {
            let call = call_mut(&mut next, index)?;
            if call.status == CallStatus::Completed || call.status == CallStatus::Failed {
                return Err(invalid());
            }
            call.status = CallStatus::Failed;
            call.error = Some(error);
            advance_fallback_progress(&mut next);
        }

        (Phase::Fallback, Event::FallbackCompleted { at }) => {
            let tally = next.tally();
            if tally.pending > 0 || tally.executing > 0 {
                return Err(invalid());
            }
            finish(&mut next, Phase::Completed, at);
        }

        _ => return Err(invalid()),
    }

    Ok(next)
}

fn enter(state: &mut ExecutionState, phase: Phase) {
    state.phase = phase;
    state.progress = state.progress.max(phase.progress_band());
}

fn finish(state: &mut ExecutionState, phase: Phase, at: TimestampMillis) {
    enter(state, phase);
    let start = state.timing.start_time.unwrap_or(at);
    state.timing.total_time = Some(at.millis_since(start));
}

fn call_mut(state: &mut ExecutionState, index: usize) -> Result<&mut CallState> {
    let len = state.call_states.len();
    state
        .call_states
        .get_mut(index)
        .ok_or(Error::CallIndexOutOfRange { index, len })
}

fn advance_fallback_progress(state: &mut ExecutionState) {
    let tally = state.tally();
    let settled = tally.completed + tally.failed;
    state.progress = state
        .progress
        .max(progress::fallback(settled, state.call_states.len()));
}

#[cfg(test)]
mod tests {
    use crate::state::ErrorKind;

    use super::*;

    fn at(ms: u64) -> TimestampMillis {
        TimestampMillis(ms)
    }

    fn run(state: ExecutionState, events: Vec<Event>) -> Vec<ExecutionState> {
        let mut states = vec![state];
        for event in events {
            let next = transition(states.last().unwrap(), event).expect("valid transition");
            states.push(next);
        }
        states
    }

    fn batch_happy_path() -> Vec<Event> {
        vec![
            Event::Start {
                at: at(1_000),
                estimated_gas: 200_000,
            },
            Event::BeginSimulation { at: at(1_100) },
            Event::Simulated {
                at: at(1_200),
                gas_estimate: Some(170_000),
            },
            Event::Signed { at: at(1_300) },
            Event::Submitted {
                at: at(1_400),
                batch_tx_hash: Some(TxHash::repeat_byte(0xab)),
            },
            Event::Confirmed {
                at: at(2_000),
                tx_hash: None,
                gas_used: Some(165_000),
            },
        ]
    }

    #[test]
    fn batch_path_reaches_completed_with_monotonic_progress() {
        let states = run(ExecutionState::idle(2), batch_happy_path());
        let phases: Vec<Phase> = states.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Idle,
                Phase::Preparing,
                Phase::Simulating,
                Phase::Signing,
                Phase::Executing,
                Phase::Confirming,
                Phase::Completed,
            ]
        );
        assert!(states.windows(2).all(|w| w[0].progress <= w[1].progress));

        let last = states.last().unwrap();
        assert_eq!(last.progress, 100);
        assert_eq!(last.timing.total_time, Some(1_000));
        assert_eq!(last.gas_usage.actual, Some(165_000));
        assert_eq!(last.gas_usage.saved, 35_000);
        assert!(last.call_states.iter().all(|c| c.status == CallStatus::Completed));
        assert!(!last.fell_back_to_sequential);
    }

    #[test]
    fn saving_is_zero_until_the_batch_is_measured() {
        let states = run(ExecutionState::idle(2), batch_happy_path());
        assert_eq!(states[1].gas_usage.estimated, 200_000);
        assert_eq!(states[1].gas_usage.saved, 0);
        assert_eq!(states[3].gas_usage.saved, 30_000);
    }

    #[test]
    fn total_time_only_set_on_terminal_phases() {
        let states = run(ExecutionState::idle(1), batch_happy_path());
        for state in &states[..states.len() - 1] {
            assert_eq!(state.timing.total_time, None);
        }
    }

    #[test]
    fn empty_plan_completes_immediately() {
        let state = transition(
            &ExecutionState::idle(0),
            Event::CompleteEmpty { at: at(5) },
        )
        .unwrap();
        assert_eq!(state.phase, Phase::Completed);
        assert_eq!(state.progress, 100);
        assert_eq!(state.timing.total_time, Some(0));

        let err = transition(
            &ExecutionState::idle(1),
            Event::CompleteEmpty { at: at(5) },
        );
        assert!(matches!(err, Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn phases_cannot_be_skipped() {
        let err = transition(&ExecutionState::idle(2), Event::Signed { at: at(1) }).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                phase: Phase::Idle,
                event: "signed"
            }
        ));
    }

    #[test]
    fn late_batch_failure_escalates_without_progress_regression() {
        let mut events = batch_happy_path();
        events.truncate(5); // up to confirming
        events.push(Event::Fail {
            at: at(1_500),
            error: ExecutionError::new(ErrorKind::Timeout, "confirmation timed out"),
        });
        events.push(Event::EnterFallback { at: at(1_600) });
        let states = run(ExecutionState::idle(2), events);

        let failed = &states[states.len() - 2];
        assert_eq!(failed.phase, Phase::Failed);
        assert!(failed.call_states.iter().all(|c| c.status == CallStatus::Failed));

        let fallback = states.last().unwrap();
        assert_eq!(fallback.phase, Phase::Fallback);
        assert_eq!(fallback.progress, 85);
        assert!(fallback.fell_back_to_sequential);
        assert!(fallback.error.is_none());
        assert!(fallback.call_states.iter().all(|c| c.status == CallStatus::Pending));
        assert_eq!(fallback.timing.total_time, None);
        assert_eq!(fallback.batch_tx_hash, None);
        assert_eq!(fallback.gas_usage.saved, 0);
        assert_eq!(fallback.gas_usage.estimated, 200_000);
    }

    #[test]
    fn reverted_batch_hash_is_not_reported_after_fallback() {
        let mut events = batch_happy_path();
        events.truncate(5);
        events.extend([
            Event::Fail {
                at: at(1_500),
                error: ExecutionError::new(ErrorKind::ExecutionFailed, "batch reverted"),
            },
            Event::EnterFallback { at: at(1_600) },
            Event::CallStarted { index: 0 },
            Event::CallSucceeded {
                index: 0,
                tx_hash: TxHash::repeat_byte(1),
                gas_used: Some(60_000),
            },
            Event::CallStarted { index: 1 },
            Event::CallSucceeded {
                index: 1,
                tx_hash: TxHash::repeat_byte(2),
                gas_used: Some(60_000),
            },
            Event::FallbackCompleted { at: at(2_000) },
        ]);
        let states = run(ExecutionState::idle(2), events);

        let last = states.last().unwrap();
        assert_eq!(last.phase, Phase::Completed);
        assert_eq!(last.batch_tx_hash, None);
        assert_eq!(last.last_call_hash(), Some(TxHash::repeat_byte(2)));
        assert_eq!(last.gas_usage.actual, Some(120_000));
        assert_eq!(last.gas_usage.saved, 0);
    }

    #[test]
    fn user_rejection_never_escalates() {
        let states = run(
            ExecutionState::idle(2),
            vec![
                Event::Start {
                    at: at(0),
                    estimated_gas: 0,
                },
                Event::BeginSigning { at: at(1) },
                Event::Fail {
                    at: at(2),
                    error: ExecutionError::new(ErrorKind::UserRejected, "rejected"),
                },
            ],
        );
        let failed = states.last().unwrap();
        // Signing never handed the calls over, so they stay pending.
        assert!(failed.call_states.iter().all(|c| c.status == CallStatus::Pending));
        assert!(transition(failed, Event::EnterFallback { at: at(3) }).is_err());
    }

    #[test]
    fn fallback_is_entered_at_most_once() {
        let states = run(
            ExecutionState::idle(1),
            vec![
                Event::SkipToFallback {
                    at: at(0),
                    estimated_gas: 100,
                },
                Event::CallStarted { index: 0 },
                Event::CallFailed {
                    index: 0,
                    error: ExecutionError::new(ErrorKind::ExecutionFailed, "reverted"),
                },
                Event::Fail {
                    at: at(10),
                    error: ExecutionError::new(ErrorKind::ExecutionFailed, "reverted"),
                },
            ],
        );
        assert!(transition(states.last().unwrap(), Event::EnterFallback { at: at(11) }).is_err());
    }

    #[test]
    fn sequential_calls_interpolate_progress_and_accumulate_gas() {
        let states = run(
            ExecutionState::idle(2),
            vec![
                Event::SkipToFallback {
                    at: at(0),
                    estimated_gas: 200_000,
                },
                Event::CallStarted { index: 0 },
                Event::CallSucceeded {
                    index: 0,
                    tx_hash: TxHash::repeat_byte(1),
                    gas_used: Some(50_000),
                },
                Event::CallStarted { index: 1 },
                Event::CallSucceeded {
                    index: 1,
                    tx_hash: TxHash::repeat_byte(2),
                    gas_used: Some(140_000),
                },
                Event::FallbackCompleted { at: at(900) },
            ],
        );
        let progress: Vec<u8> = states.iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![0, 20, 20, 60, 60, 100, 100]);

        let last = states.last().unwrap();
        assert_eq!(last.phase, Phase::Completed);
        assert_eq!(last.gas_usage.actual, Some(190_000));
        assert_eq!(last.gas_usage.saved, 0);
        assert_eq!(last.last_call_hash(), Some(TxHash::repeat_byte(2)));
    }

    #[test]
    fn fallback_cannot_complete_with_pending_calls() {
        let states = run(
            ExecutionState::idle(2),
            vec![Event::SkipToFallback {
                at: at(0),
                estimated_gas: 0,
            }],
        );
        assert!(transition(states.last().unwrap(), Event::FallbackCompleted { at: at(1) }).is_err());
    }

    #[test]
    fn call_events_are_bounds_checked() {
        let state = transition(
            &ExecutionState::idle(1),
            Event::SkipToFallback {
                at: at(0),
                estimated_gas: 0,
            },
        )
        .unwrap();
        let err = transition(&state, Event::CallStarted { index: 3 }).unwrap_err();
        assert!(matches!(err, Error::CallIndexOutOfRange { index: 3, len: 1 }));
    }

    #[test]
    fn reset_returns_to_idle_from_anywhere() {
        let states = run(ExecutionState::idle(2), batch_happy_path());
        for state in &states {
            let reset = transition(state, Event::Reset).unwrap();
            assert_eq!(reset, ExecutionState::idle(2));
        }
    }
}
