//! The batch execution engine.
//!
//! [`BatchEngine::execute`] drives one purchase attempt through the state
//! machine: simulate, sign, submit and confirm a batch when the account can
//! batch, and replay the plan call by call otherwise or when the batch fails
//! with an escalatable error.
//!
//! State is published through a [`watch`] channel. The attempt task is its only
//! writer; UIs subscribe and render [`ProgressReport`]s from the snapshots.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use batchpay_core::{
    capability::AccountCapability,
    machine::{Event, transition},
    plan::{BatchPlan, FallbackPolicy},
    report::{CompletionResult, ProgressReport, TelemetryEvent},
    state::{CallStatus, ErrorKind, ExecutionError, ExecutionState},
    types::TimestampMillis,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    config::EngineConfig,
    errors::EngineError,
    fallback::{SequentialOutcome, run_sequential},
    telemetry::{NoopTelemetry, TelemetrySink},
    wallet::{BatchRequest, ReceiptStatus, WalletClient, classify},
};

type CompletionCallback = Box<dyn Fn(&CompletionResult) + Send + Sync>;

/// How an [`execute`](BatchEngine::execute) call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt reached `completed` or `failed`.
    Finished(CompletionResult),
    /// The attempt was cancelled and the state reset to `idle`.
    Cancelled,
}

impl AttemptOutcome {
    pub fn completion(&self) -> Option<&CompletionResult> {
        match self {
            AttemptOutcome::Finished(result) => Some(result),
            AttemptOutcome::Cancelled => None,
        }
    }
}

pub struct BatchEngine<W: WalletClient> {
    wallet: W,
    config: EngineConfig,
    state: watch::Sender<ExecutionState>,
    attempt: Mutex<Option<CancellationToken>>,
    telemetry: Arc<dyn TelemetrySink + Send + Sync>,
    on_complete: Option<CompletionCallback>,
}

impl<W: WalletClient + Debug> Debug for BatchEngine<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("wallet", &self.wallet)
            .field("config", &self.config)
            .field("phase", &self.state.borrow().phase)
            .finish_non_exhaustive()
    }
}

impl<W: WalletClient> BatchEngine<W> {
    pub fn new(wallet: W, config: EngineConfig) -> Self {
        BatchEngine {
            wallet,
            config,
            state: watch::Sender::new(ExecutionState::default()),
            attempt: Mutex::new(None),
            telemetry: Arc::new(NoopTelemetry),
            on_complete: None,
        }
    }

    /// Send telemetry events to `sink`.
    pub fn with_telemetry<T>(mut self, sink: Arc<T>) -> Self
    where
        T: TelemetrySink + Send + Sync + 'static,
    {
        self.telemetry = sink;
        self
    }

    /// Call `callback` once per attempt that reaches a terminal phase.
    ///
    /// Cancelled attempts do not call it.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CompletionResult) + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Observe every state change. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ExecutionState {
        self.state.borrow().clone()
    }

    /// Project the current state for `plan`.
    pub fn report(&self, plan: &BatchPlan) -> ProgressReport {
        ProgressReport::project(&self.state.borrow(), plan, TimestampMillis::now())
    }

    /// Abort the in-flight attempt, if any. The state resolves to `idle`.
    pub fn cancel(&self) {
        if let Some(token) = self.attempt.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            token.cancel();
        }
    }

    /// Cancel any in-flight attempt and return to `idle`.
    pub fn reset(&self) {
        self.cancel();
        self.state.send_modify(|state| {
            if let Ok(idle) = transition(state, Event::Reset) {
                *state = idle;
            }
        });
    }

    /// Run one attempt of `plan` for an account with `capability`.
    ///
    /// Resolves once the attempt is `completed`, `failed` or cancelled.
    /// Payment failures are reported in the [`CompletionResult`], not as
    /// errors. Only one attempt may be in flight per engine.
    pub async fn execute(
        &self,
        plan: &BatchPlan,
        capability: &AccountCapability,
    ) -> Result<AttemptOutcome, EngineError> {
        let token = CancellationToken::new();
        {
            let mut slot = self.attempt.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(EngineError::AttemptInFlight(self.state.borrow().phase));
            }
            *slot = Some(token.clone());
        }

        let mut guard = AttemptGuard {
            engine: self,
            call_count: plan.calls.len(),
            finished: false,
        };
        self.state.send_replace(ExecutionState::idle(plan.calls.len()));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            calls = plan.calls.len(),
            supports_batch = capability.supports_batch,
            account_kind = ?capability.account_kind,
            "Starting purchase attempt: {}",
            plan.description
        );

        let attempt = Attempt {
            engine: self,
            plan,
            capability,
        };

        tokio::select! {
            biased;

            _ = token.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::info!(phase = %self.state.borrow().phase, "Purchase attempt cancelled");

                Ok(AttemptOutcome::Cancelled)
            }
            result = attempt.run() => match result {
                Ok(result) => {
                    guard.finished = true;
                    Ok(AttemptOutcome::Finished(result))
                }
                Err(error) => {
                    guard.abandon(&error);
                    Err(error)
                }
            }
        }
    }
}

/// Frees the attempt slot when `execute` returns or is dropped, and resets
/// the state to `idle` unless the attempt finished.
struct AttemptGuard<'a, W: WalletClient> {
    engine: &'a BatchEngine<W>,
    call_count: usize,
    finished: bool,
}

impl<W: WalletClient> AttemptGuard<'_, W> {
    /// The attempt stopped on an engine error and will not finish.
    fn abandon(&self, error: &EngineError) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            phase = %self.engine.state.borrow().phase,
            %error,
            "Purchase attempt aborted; resetting to idle"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = error;
    }
}

impl<W: WalletClient> Drop for AttemptGuard<'_, W> {
    fn drop(&mut self) {
        if !self.finished {
            self.engine
                .state
                .send_replace(ExecutionState::idle(self.call_count));
        }
        self.engine
            .attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Why the batch path stopped before confirmation.
enum Interrupt {
    Failed(ExecutionError),
    Engine(EngineError),
}

impl From<ExecutionError> for Interrupt {
    fn from(error: ExecutionError) -> Self {
        Interrupt::Failed(error)
    }
}

impl From<EngineError> for Interrupt {
    fn from(error: EngineError) -> Self {
        Interrupt::Engine(error)
    }
}

struct Attempt<'a, W: WalletClient> {
    engine: &'a BatchEngine<W>,
    plan: &'a BatchPlan,
    capability: &'a AccountCapability,
}

impl<W: WalletClient> Attempt<'_, W> {
    /// Apply `event` and publish the next state.
    fn apply(&self, event: Event) -> Result<(), EngineError> {
        #[cfg(feature = "tracing")]
        let name = event.name();

        let (previous, next) = {
            let current = self.engine.state.borrow();
            (current.phase, transition(&current, event)?)
        };
        let entered = next.phase != previous;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            event = name,
            phase = %next.phase,
            progress = next.progress,
            "State transition"
        );

        if entered {
            self.engine
                .telemetry
                .record(&TelemetryEvent::phase_entered(&next, self.capability.account_kind));
        }
        self.engine.state.send_replace(next);
        Ok(())
    }

    async fn run(&self) -> Result<CompletionResult, EngineError> {
        let plan = self.plan;

        if plan.is_empty() {
            self.apply(Event::CompleteEmpty { at: now() })?;
            return Ok(self.finish());
        }

        if let Some(reason) = self.capability.batch_blocker(plan.calls.len()) {
            #[cfg(feature = "tracing")]
            tracing::info!(reason = %reason, "Batching unavailable; executing calls sequentially");
            #[cfg(not(feature = "tracing"))]
            let _ = reason;

            self.apply(Event::SkipToFallback {
                at: now(),
                estimated_gas: plan.individual_gas(),
            })?;
            self.run_fallback().await?;
            return Ok(self.finish());
        }

        self.apply(Event::Start {
            at: now(),
            estimated_gas: plan.individual_gas(),
        })?;

        let failure = match tokio::time::timeout(plan.timeout, self.run_batch()).await {
            Ok(Ok(())) => None,
            Ok(Err(Interrupt::Failed(error))) => Some(error),
            Ok(Err(Interrupt::Engine(error))) => return Err(error),
            Err(_) => Some(timed_out(plan.timeout)),
        };

        if let Some(error) = failure {
            let escalate = error.kind.escalates_to_fallback()
                && plan.fallback_policy == FallbackPolicy::Sequential;

            #[cfg(feature = "tracing")]
            tracing::warn!(
                kind = %error.kind,
                escalate,
                "Batch attempt failed: {}",
                error.message
            );

            self.apply(Event::Fail { at: now(), error })?;
            if escalate {
                self.apply(Event::EnterFallback { at: now() })?;
                self.run_fallback().await?;
            }
        }

        Ok(self.finish())
    }

    async fn run_batch(&self) -> Result<(), Interrupt> {
        let wallet = &self.engine.wallet;
        let calls = self.plan.wire_calls();

        if self.plan.simulate_first {
            self.apply(Event::BeginSimulation { at: now() })?;
            let gas_estimate = wallet
                .simulate_calls(&calls)
                .await
                .map_err(|e| classify(&e, ErrorKind::SimulationFailed))?;
            self.apply(Event::Simulated {
                at: now(),
                gas_estimate,
            })?;
        } else {
            self.apply(Event::BeginSigning { at: now() })?;
        }

        let request = BatchRequest {
            calls,
            gas_limit: self.plan.gas_limit,
            gas_strategy: self.plan.gas_strategy,
        };
        let signed = wallet
            .sign_calls(&request)
            .await
            .map_err(|e| classify(&e, ErrorKind::ExecutionFailed))?;
        self.apply(Event::Signed { at: now() })?;

        let handle = wallet
            .send_calls(&signed)
            .await
            .map_err(|e| classify(&e, ErrorKind::ExecutionFailed))?;
        self.apply(Event::Submitted {
            at: now(),
            batch_tx_hash: handle.tx_hash,
        })?;

        let receipt = wallet
            .wait_for_confirmation(&handle)
            .await
            .map_err(|e| classify(&e, ErrorKind::ExecutionFailed))?;
        if receipt.status == ReceiptStatus::Reverted {
            return Err(ExecutionError::new(
                ErrorKind::ExecutionFailed,
                format!("Batch {} reverted", handle.id),
            )
            .into());
        }

        self.apply(Event::Confirmed {
            at: now(),
            tx_hash: receipt.tx_hash,
            gas_used: receipt.gas_used,
        })?;
        Ok(())
    }

    /// Replay the plan sequentially. Expects the machine in `fallback`.
    async fn run_fallback(&self) -> Result<(), EngineError> {
        let budget = self
            .engine
            .config
            .fallback_timeout()
            .unwrap_or(self.plan.timeout);
        let run = run_sequential(&self.engine.wallet, self.plan, |update| {
            self.apply(update.into())
        });

        match tokio::time::timeout(budget, run).await {
            Ok(Ok(SequentialOutcome::Completed {
                failed_non_critical,
            })) => {
                #[cfg(feature = "tracing")]
                if !failed_non_critical.is_empty() {
                    tracing::warn!(
                        ?failed_non_critical,
                        "Sequential execution completed with failed non-critical calls"
                    );
                }
                #[cfg(not(feature = "tracing"))]
                let _ = failed_non_critical;

                self.apply(Event::FallbackCompleted { at: now() })
            }
            Ok(Ok(SequentialOutcome::Halted { error, .. })) => {
                self.apply(Event::Fail { at: now(), error })
            }
            Ok(Err(error)) => Err(error),
            Err(_) => {
                let error = timed_out(budget);
                let in_flight = self
                    .engine
                    .state
                    .borrow()
                    .call_states
                    .iter()
                    .position(|call| call.status == CallStatus::Executing);
                if let Some(index) = in_flight {
                    self.apply(Event::CallFailed {
                        index,
                        error: error.clone(),
                    })?;
                }
                self.apply(Event::Fail { at: now(), error })
            }
        }
    }

    /// Emit the terminal event and notify the completion callback.
    fn finish(&self) -> CompletionResult {
        let state = self.engine.state.borrow().clone();
        self.engine
            .telemetry
            .record(&TelemetryEvent::terminal(&state, self.capability.account_kind));

        let result = CompletionResult::from_state(&state);

        #[cfg(feature = "tracing")]
        tracing::info!(
            success = result.success,
            fell_back_to_sequential = result.fell_back_to_sequential,
            time_taken_ms = result.time_taken.as_millis() as u64,
            tx_hash = ?result.transaction_hash,
            "Purchase attempt finished"
        );

        if let Some(callback) = &self.engine.on_complete {
            callback(&result);
        }
        result
    }
}

fn now() -> TimestampMillis {
    TimestampMillis::now()
}

fn timed_out(budget: Duration) -> ExecutionError {
    ExecutionError::new(
        ErrorKind::Timeout,
        format!("No result within {}s", budget.as_secs()),
    )
}
