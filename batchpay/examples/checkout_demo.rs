//! Buys a piece of content twice against an in-memory wallet: once from a
//! smart account (one batched prompt) and once from a plain EOA (sequential).
//!
//! ```sh
//! cargo run -p batchpay --example checkout_demo
//! ```

use std::{sync::Arc, time::Duration};

use alloy_primitives::{B256, address};
use batchpay::{
    builder::{Approval, PaymentIntent, PaymentMethod, PlanOverrides},
    checkout::Checkout,
    config::EngineConfig,
    detector::{CapabilityDetector, Environment},
    encoder::SolCallEncoder,
    engine::{AttemptOutcome, BatchEngine},
    telemetry::TracingTelemetry,
    wallet::{
        BatchHandle, BatchReceipt, BatchRequest, CallReceipt, ReceiptStatus, SignedBatch,
        WalletClient, WalletError,
    },
};
use batchpay_core::{
    call::WireCall,
    networks::evm::{
        EvmAddress, EvmNetwork, ExplicitEvmNetwork, assets::UsdcBase, networks::Base,
    },
    types::{Bytes, TxHash},
};

const BUYER: EvmAddress = EvmAddress(address!("0x3CB9B3bBfde8501f411bB69Ad3DC07908ED0dE20"));
const MARKET: EvmAddress = EvmAddress(address!("0x1111111111111111111111111111111111111111"));

#[derive(Debug, thiserror::Error)]
#[error("demo wallet error")]
struct DemoError;

impl WalletError for DemoError {}

/// Answers every request after a short delay, as if a user approved each prompt.
struct DemoWallet {
    smart_account: bool,
    latency: Duration,
}

impl DemoWallet {
    async fn wait(&self) {
        tokio::time::sleep(self.latency).await;
    }
}

impl WalletClient for DemoWallet {
    type Error = DemoError;

    fn network(&self) -> EvmNetwork {
        Base::NETWORK
    }

    async fn get_bytecode(&self, _address: EvmAddress) -> Result<Bytes, DemoError> {
        self.wait().await;
        Ok(if self.smart_account {
            Bytes::from_static(&[0xef, 0x01, 0x00])
        } else {
            Bytes::new()
        })
    }

    async fn simulate_calls(&self, calls: &[WireCall]) -> Result<Option<u64>, DemoError> {
        self.wait().await;
        Ok(Some(calls.len() as u64 * 75_000))
    }

    async fn sign_calls(&self, _request: &BatchRequest) -> Result<SignedBatch, DemoError> {
        self.wait().await;
        Ok(SignedBatch {
            id: "demo-batch".to_string(),
        })
    }

    async fn send_calls(&self, batch: &SignedBatch) -> Result<BatchHandle, DemoError> {
        self.wait().await;
        Ok(BatchHandle {
            id: batch.id.clone(),
            tx_hash: Some(B256::repeat_byte(0xba)),
        })
    }

    async fn wait_for_confirmation(&self, handle: &BatchHandle) -> Result<BatchReceipt, DemoError> {
        self.wait().await;
        Ok(BatchReceipt {
            status: ReceiptStatus::Success,
            tx_hash: handle.tx_hash,
            gas_used: Some(148_000),
        })
    }

    async fn send_transaction(&self, call: &WireCall) -> Result<TxHash, DemoError> {
        self.wait().await;
        Ok(B256::left_padding_from(call.to.0.as_slice()))
    }

    async fn wait_for_transaction(&self, tx_hash: TxHash) -> Result<CallReceipt, DemoError> {
        self.wait().await;
        Ok(CallReceipt {
            status: ReceiptStatus::Success,
            tx_hash,
            gas_used: Some(83_000),
        })
    }
}

async fn buy(label: &str, smart_account: bool) {
    let wallet = DemoWallet {
        smart_account,
        latency: Duration::from_millis(150),
    };
    let environment = Environment::builder()
        .connector("demo")
        .batch_calls_supported(true)
        .build();
    let engine = BatchEngine::new(wallet, EngineConfig::default())
        .with_telemetry(Arc::new(TracingTelemetry));
    let checkout = Checkout::new(CapabilityDetector::new(environment), SolCallEncoder, engine);

    let intent = PaymentIntent::builder()
        .method(PaymentMethod::token(UsdcBase, Approval::Required))
        .amount(1_500_000u64)
        .content_contract(MARKET)
        .content_id(42)
        .build();

    let overrides = PlanOverrides::default();

    println!("== {label} ==");
    let mut states = checkout.engine.subscribe();
    let watch_progress = async {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            let bar = "#".repeat(state.progress as usize / 5);
            println!("[{bar:<20}] {:>3}% {}", state.progress, state.phase);
            if state.phase.is_terminal() {
                break;
            }
        }
    };

    let (outcome, ()) = tokio::join!(
        checkout.purchase(BUYER, &intent, &overrides),
        watch_progress
    );

    match outcome {
        Ok(AttemptOutcome::Finished(result)) => {
            println!(
                "success={} sequential={} tx={:?} gas={:?} in {:?}",
                result.success,
                result.fell_back_to_sequential,
                result.transaction_hash,
                result.gas_used,
                result.time_taken
            );
        }
        Ok(AttemptOutcome::Cancelled) => println!("cancelled"),
        Err(err) => println!("checkout error: {err}"),
    }

    let snapshot = checkout.engine.snapshot();
    println!(
        "{} calls settled, {} gas saved\n",
        snapshot.tally().completed,
        snapshot.gas_usage.saved
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    buy("Smart account", true).await;
    buy("Externally owned account", false).await;
}
