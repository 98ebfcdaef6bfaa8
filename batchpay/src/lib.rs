//! # Batchpay
//!
//! Batchpay turns a content purchase into as few wallet prompts as the connected
//! account allows. When the account and wallet support EIP-5792 batched calls,
//! `approve` and `purchase` are simulated, signed once and confirmed together.
//! Otherwise the same calls run one at a time, with the same progress and
//! telemetry shape.
//!
//! ## Components
//!
//! - **[`detector`]**: classifies the account (EOA or smart account) and decides
//!   whether batching is usable in the current [`Environment`](detector::Environment).
//! - **[`builder`]**: turns a [`PaymentIntent`](builder::PaymentIntent) into an
//!   ordered [`BatchPlan`](batchpay_core::plan::BatchPlan).
//! - **[`engine`]**: drives one attempt through the state machine and publishes
//!   every state change.
//! - **[`fallback`]**: the sequential executor used when batching is unavailable or fails.
//! - **[`telemetry`]**: sinks for phase and terminal events.
//! - **[`checkout`]**: detect, build and execute in one call.
//!
//! The pure state machine and value types live in [`batchpay_core`], re-exported here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use batchpay::{
//!     builder::{Approval, PaymentIntent, PaymentMethod, PlanOverrides},
//!     checkout::Checkout,
//!     config::EngineConfig,
//!     detector::CapabilityDetector,
//!     encoder::SolCallEncoder,
//!     engine::{AttemptOutcome, BatchEngine},
//!     rpc_client::RpcWalletClient,
//! };
//! use batchpay_core::networks::evm::{assets::UsdcBase, networks::Base};
//!
//! let wallet = RpcWalletClient::new(url, account, Base);
//! let environment = wallet.environment("injected").await?;
//!
//! let checkout = Checkout::new(
//!     CapabilityDetector::new(environment),
//!     SolCallEncoder,
//!     BatchEngine::new(wallet, EngineConfig::default()),
//! );
//!
//! let intent = PaymentIntent::builder()
//!     .method(PaymentMethod::token(UsdcBase, Approval::Required))
//!     .amount(1_500_000u64)
//!     .content_contract(market)
//!     .content_id(42)
//!     .build();
//!
//! let mut states = checkout.engine.subscribe();
//! match checkout.purchase(account, &intent, &PlanOverrides::default()).await? {
//!     AttemptOutcome::Finished(result) => println!("success: {}", result.success),
//!     AttemptOutcome::Cancelled => println!("cancelled"),
//! }
//! ```

pub mod builder;
pub mod checkout;
pub mod config;
pub mod detector;
pub mod encoder;
pub mod engine;
pub mod errors;
pub mod fallback;
pub mod telemetry;
pub mod wallet;

#[cfg(feature = "rpc-client")]
pub mod rpc_client;

pub use batchpay_core;
