#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{B256, address};
use batchpay::{
    engine::BatchEngine,
    telemetry::TelemetrySink,
    wallet::{
        BatchHandle, BatchReceipt, BatchRequest, CallReceipt, ReceiptStatus, SignedBatch,
        WalletClient, WalletError,
    },
};
use batchpay_core::{
    call::{Call, CallKind, WireCall},
    capability::{AccountCapability, AccountKind},
    networks::evm::{EvmAddress, EvmNetwork, ExplicitEvmNetwork, networks::Base},
    plan::BatchPlan,
    report::{CompletionResult, TelemetryEvent, TelemetryKind},
    state::{ExecutionState, Phase},
    types::{Bytes, TxHash},
};
use tokio::sync::watch;

pub const ACCOUNT: EvmAddress = EvmAddress(address!("0x3CB9B3bBfde8501f411bB69Ad3DC07908ED0dE20"));
pub const TOKEN: EvmAddress = EvmAddress(address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"));
pub const MARKET: EvmAddress = EvmAddress(address!("0x1111111111111111111111111111111111111111"));

pub const APPROVE_GAS: u64 = 46_000;
pub const PURCHASE_GAS: u64 = 120_000;
pub const BATCH_GAS_USED: u64 = 150_000;

pub fn batch_hash() -> TxHash {
    B256::repeat_byte(0xba)
}

pub fn tx_hash(n: usize) -> TxHash {
    B256::repeat_byte(n as u8)
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FakeError {
    #[error("User rejected the request")]
    Rejected,
    #[error("Method not supported")]
    Unsupported,
    #[error("{0}")]
    Failed(&'static str),
}

impl WalletError for FakeError {
    fn is_user_rejection(&self) -> bool {
        matches!(self, FakeError::Rejected)
    }

    fn is_unsupported(&self) -> bool {
        matches!(self, FakeError::Unsupported)
    }
}

/// What a scripted wallet step does.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(FakeError),
    /// The receipt reports a revert.
    Revert,
    /// Never resolves, like a wallet prompt nobody answers.
    Hang,
}

impl Step {
    /// `Ok(true)` when the step reverted.
    async fn play(&self) -> Result<bool, FakeError> {
        match self {
            Step::Succeed => Ok(false),
            Step::Revert => Ok(true),
            Step::Fail(err) => Err(err.clone()),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// In-memory wallet with scripted answers. Records every wallet call and the
/// engine state seen at each of them.
pub struct FakeWallet {
    pub network: EvmNetwork,
    pub code: Bytes,
    pub simulate: Step,
    pub sign: Step,
    pub send: Step,
    pub confirm: Step,
    /// One step per sequential transaction; unscripted transactions succeed.
    pub transactions: Mutex<VecDeque<Step>>,
    pub log: Mutex<Vec<String>>,
    pub observer: Mutex<Option<watch::Receiver<ExecutionState>>>,
    pub observed: Mutex<Vec<ExecutionState>>,
    /// Sequential transactions sent so far; the next one gets `tx_hash(sent + 1)`.
    pub sent: AtomicUsize,
}

impl FakeWallet {
    pub fn new() -> Self {
        FakeWallet {
            network: Base::NETWORK,
            code: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
            simulate: Step::Succeed,
            sign: Step::Succeed,
            send: Step::Succeed,
            confirm: Step::Succeed,
            transactions: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
            observed: Mutex::new(Vec::new()),
            sent: AtomicUsize::new(0),
        }
    }

    pub fn eoa() -> Self {
        FakeWallet {
            code: Bytes::new(),
            ..FakeWallet::new()
        }
    }

    pub fn with_transactions(self, steps: Vec<Step>) -> Self {
        *self.transactions.lock().unwrap() = steps.into();
        self
    }

    /// Record engine state at every wallet call from now on.
    pub fn observe(&self, receiver: watch::Receiver<ExecutionState>) {
        *self.observer.lock().unwrap() = Some(receiver);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn observed(&self) -> Vec<ExecutionState> {
        self.observed.lock().unwrap().clone()
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
        if let Some(receiver) = self.observer.lock().unwrap().as_ref() {
            self.observed.lock().unwrap().push(receiver.borrow().clone());
        }
    }
}

impl WalletClient for FakeWallet {
    type Error = FakeError;

    fn network(&self) -> EvmNetwork {
        self.network
    }

    async fn get_bytecode(&self, _address: EvmAddress) -> Result<Bytes, FakeError> {
        self.record("get_bytecode");
        Ok(self.code.clone())
    }

    async fn simulate_calls(&self, calls: &[WireCall]) -> Result<Option<u64>, FakeError> {
        self.record("simulate");
        self.simulate.play().await?;
        Ok(Some(calls.len() as u64 * 70_000))
    }

    async fn sign_calls(&self, request: &BatchRequest) -> Result<SignedBatch, FakeError> {
        self.record(format!("sign:{}", request.calls.len()));
        self.sign.play().await?;
        Ok(SignedBatch {
            id: "batch-1".to_string(),
        })
    }

    async fn send_calls(&self, batch: &SignedBatch) -> Result<BatchHandle, FakeError> {
        self.record("send_calls");
        self.send.play().await?;
        Ok(BatchHandle {
            id: batch.id.clone(),
            tx_hash: Some(batch_hash()),
        })
    }

    async fn wait_for_confirmation(&self, _handle: &BatchHandle) -> Result<BatchReceipt, FakeError> {
        self.record("confirm");
        let reverted = self.confirm.play().await?;
        Ok(BatchReceipt {
            status: if reverted {
                ReceiptStatus::Reverted
            } else {
                ReceiptStatus::Success
            },
            tx_hash: Some(batch_hash()),
            gas_used: Some(BATCH_GAS_USED),
        })
    }

    async fn send_transaction(&self, call: &WireCall) -> Result<TxHash, FakeError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(format!("send_tx:{}", call.to));
        let step = self
            .transactions
            .lock()
            .unwrap()
            .front()
            .cloned()
            .unwrap_or(Step::Succeed);
        if let Step::Fail(_) | Step::Hang = step {
            self.transactions.lock().unwrap().pop_front();
            step.play().await?;
        }
        Ok(tx_hash(n))
    }

    async fn wait_for_transaction(&self, tx_hash: TxHash) -> Result<CallReceipt, FakeError> {
        self.record("wait_tx");
        let step = self
            .transactions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed);
        let reverted = step.play().await?;
        Ok(CallReceipt {
            status: if reverted {
                ReceiptStatus::Reverted
            } else {
                ReceiptStatus::Success
            },
            tx_hash,
            gas_used: Some(60_000),
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    pub events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Phases in the order they were entered.
    pub fn phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == TelemetryKind::PhaseEntered)
            .map(|e| e.phase)
            .collect()
    }

    pub fn terminal(&self) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e.kind, TelemetryKind::Terminal { .. }))
            .collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Engine wired to a recording sink and a completion collector.
pub struct Harness {
    pub engine: BatchEngine<FakeWallet>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub completions: Arc<Mutex<Vec<CompletionResult>>>,
}

impl Harness {
    pub fn new(wallet: FakeWallet) -> Self {
        Harness::with_config(wallet, Default::default())
    }

    pub fn with_config(wallet: FakeWallet, config: batchpay::config::EngineConfig) -> Self {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let completions = Arc::new(Mutex::new(Vec::new()));
        let sink = completions.clone();
        let engine = BatchEngine::new(wallet, config)
            .with_telemetry(telemetry.clone())
            .on_complete(move |result| sink.lock().unwrap().push(result.clone()));
        engine.wallet().observe(engine.subscribe());
        Harness {
            engine,
            telemetry,
            completions,
        }
    }

    pub fn completions(&self) -> Vec<CompletionResult> {
        self.completions.lock().unwrap().clone()
    }

    pub fn wallet(&self) -> &FakeWallet {
        self.engine.wallet()
    }
}

pub fn smart_account() -> AccountCapability {
    AccountCapability {
        supports_batch: true,
        max_batch_size: None,
        account_kind: AccountKind::SmartAccount,
        limitations: vec![],
    }
}

pub fn eoa() -> AccountCapability {
    AccountCapability::fail_safe("account has no contract code")
}

pub fn approve_call() -> Call {
    Call::builder()
        .target(TOKEN)
        .kind(CallKind::Approve)
        .description("Approve 1.5 USDC")
        .estimated_gas(APPROVE_GAS)
        .build()
}

pub fn purchase_call() -> Call {
    Call::builder()
        .target(MARKET)
        .kind(CallKind::Payment)
        .description("Purchase content #42")
        .estimated_gas(PURCHASE_GAS)
        .build()
}

/// `approve` then `purchase`, both critical.
pub fn approve_and_purchase() -> BatchPlan {
    BatchPlan::builder()
        .calls(vec![approve_call(), purchase_call()])
        .timeout(Duration::from_secs(30))
        .description("Approve 1.5 USDC and purchase content #42")
        .build()
}
