//! Builds a [`BatchPlan`] from a payment intent.
//!
//! Deterministic: the same intent, capability, overrides and configuration
//! always produce the same plan.

use std::time::Duration;

use alloy_primitives::U256;
use batchpay_core::{
    call::{Call, CallKind},
    capability::AccountCapability,
    networks::evm::{EvmAddress, EvmAsset, EvmNetwork},
    plan::{BatchPlan, FallbackPolicy, GasStrategy},
    types::AmountValue,
};
use bon::Builder;

use crate::{config::EngineConfig, encoder::CallEncoder, errors::BuildError};

/// Typical gas of an ERC-20 `approve`.
pub const APPROVE_GAS_ESTIMATE: u64 = 46_000;
/// Typical gas of a token-paid `purchaseContent`.
pub const TOKEN_PURCHASE_GAS_ESTIMATE: u64 = 120_000;
/// Typical gas of a native-paid purchase.
pub const NATIVE_PURCHASE_GAS_ESTIMATE: u64 = 90_000;

const NATIVE_DECIMALS: u8 = 18;
const NATIVE_SYMBOL: &str = "ETH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// The market has no sufficient allowance yet.
    Required,
    /// An allowance covering the amount already exists.
    Granted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Token { asset: EvmAsset, approval: Approval },
    /// Native value sent straight to the market contract.
    Native,
}

impl PaymentMethod {
    pub fn token(asset: impl Into<EvmAsset>, approval: Approval) -> Self {
        PaymentMethod::Token {
            asset: asset.into(),
            approval,
        }
    }
}

/// What the buyer wants to pay for.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub method: PaymentMethod,
    /// Price in the smallest units of the payment asset.
    #[builder(into)]
    pub amount: AmountValue,
    /// The market contract: spender of the approval and target of the purchase.
    #[builder(into)]
    pub content_contract: EvmAddress,
    /// Market listing id, passed to the contract as a `uint256`.
    pub content_id: u64,
}

/// Per-purchase settings that win over every default.
#[derive(Builder, Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOverrides {
    pub gas_limit: Option<u64>,
    pub gas_strategy: Option<GasStrategy>,
    pub timeout: Option<Duration>,
    pub simulate_first: Option<bool>,
    pub fallback_policy: Option<FallbackPolicy>,
    #[builder(into)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlanBuilder<E: CallEncoder> {
    pub encoder: E,
    pub config: EngineConfig,
    /// Chain the plans are executed on. Token payments must use an asset on it.
    pub network: EvmNetwork,
}

impl<E: CallEncoder> PlanBuilder<E> {
    pub fn new(encoder: E, config: EngineConfig, network: impl Into<EvmNetwork>) -> Self {
        PlanBuilder {
            encoder,
            config,
            network: network.into(),
        }
    }

    /// Build the plan for `intent`.
    ///
    /// Precedence for every setting: `overrides`, then what `capability`
    /// recommends, then the builder's configuration.
    pub fn build(
        &self,
        intent: &PaymentIntent,
        capability: &AccountCapability,
        overrides: &PlanOverrides,
    ) -> Result<BatchPlan, BuildError> {
        if intent.amount.is_zero() {
            return Err(BuildError::ZeroAmount);
        }
        if let PaymentMethod::Token { asset, .. } = intent.method {
            if asset.network.chain_id != self.network.chain_id {
                return Err(BuildError::NetworkMismatch {
                    symbol: asset.symbol,
                    asset_network: asset.network.name,
                    network: self.network.name,
                });
            }
        }

        let (calls, payment_gas, description) = match intent.method {
            PaymentMethod::Token {
                asset,
                approval: Approval::Required,
            } => {
                let price = format!("{} {}", intent.amount.format_units(asset.decimals), asset.symbol);
                let calls = vec![
                    self.approve_call(asset, intent, &price),
                    self.token_purchase_call(intent),
                ];
                let description = format!(
                    "Approve {price} and purchase content #{}",
                    intent.content_id
                );
                (calls, TOKEN_PURCHASE_GAS_ESTIMATE, description)
            }
            PaymentMethod::Token {
                asset,
                approval: Approval::Granted,
            } => {
                let price = format!("{} {}", intent.amount.format_units(asset.decimals), asset.symbol);
                let description = format!("Purchase content #{} for {price}", intent.content_id);
                (
                    vec![self.token_purchase_call(intent)],
                    TOKEN_PURCHASE_GAS_ESTIMATE,
                    description,
                )
            }
            PaymentMethod::Native => {
                let description = format!(
                    "Purchase content #{} for {} {NATIVE_SYMBOL}",
                    intent.content_id,
                    intent.amount.format_units(NATIVE_DECIMALS)
                );
                (
                    vec![self.native_purchase_call(intent)],
                    NATIVE_PURCHASE_GAS_ESTIMATE,
                    description,
                )
            }
        };

        let individual: u64 = calls.iter().filter_map(|c| c.estimated_gas).sum();
        let overhead = payment_gas * self.config.batch_overhead_percent() as u64 / 100;

        Ok(BatchPlan {
            calls,
            gas_limit: Some(overrides.gas_limit.unwrap_or(individual + overhead)),
            gas_strategy: overrides.gas_strategy.unwrap_or(self.config.gas_strategy),
            timeout: overrides.timeout.unwrap_or_else(|| self.config.timeout()),
            simulate_first: overrides
                .simulate_first
                .or(capability.recommended_simulation())
                .unwrap_or(self.config.simulate_first),
            fallback_policy: overrides
                .fallback_policy
                .unwrap_or(self.config.fallback_policy),
            description: overrides.description.clone().unwrap_or(description),
        })
    }

    fn approve_call(&self, asset: EvmAsset, intent: &PaymentIntent, price: &str) -> Call {
        Call::builder()
            .target(asset.address)
            .payload(self.encoder.approve(intent.content_contract, intent.amount))
            .kind(CallKind::Approve)
            .description(format!("Approve {price}"))
            .estimated_gas(APPROVE_GAS_ESTIMATE)
            .critical(true)
            .build()
    }

    fn token_purchase_call(&self, intent: &PaymentIntent) -> Call {
        Call::builder()
            .target(intent.content_contract)
            .payload(self.encoder.purchase(U256::from(intent.content_id)))
            .kind(CallKind::Payment)
            .description(format!("Purchase content #{}", intent.content_id))
            .estimated_gas(TOKEN_PURCHASE_GAS_ESTIMATE)
            .critical(true)
            .build()
    }

    fn native_purchase_call(&self, intent: &PaymentIntent) -> Call {
        Call::builder()
            .target(intent.content_contract)
            .value(intent.amount)
            .payload(self.encoder.purchase_with_native(U256::from(intent.content_id)))
            .kind(CallKind::Payment)
            .description(format!("Purchase content #{}", intent.content_id))
            .estimated_gas(NATIVE_PURCHASE_GAS_ESTIMATE)
            .critical(true)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use batchpay_core::{
        capability::AccountKind,
        networks::evm::{
            ExplicitEvmAsset,
            assets::{UsdcBase, UsdcEthereum},
            networks::Base,
        },
        types::Bytes,
    };

    use super::*;

    /// Tags calldata with the step so tests can tell calls apart.
    struct TagEncoder;

    impl CallEncoder for TagEncoder {
        fn approve(&self, _spender: EvmAddress, _amount: AmountValue) -> Bytes {
            Bytes::from_static(b"approve")
        }

        fn purchase(&self, _content_id: U256) -> Bytes {
            Bytes::from_static(b"purchase")
        }

        fn purchase_with_native(&self, _content_id: U256) -> Bytes {
            Bytes::from_static(b"native")
        }
    }

    const MARKET: EvmAddress = EvmAddress(address!("0x1111111111111111111111111111111111111111"));

    fn smart() -> AccountCapability {
        AccountCapability {
            supports_batch: true,
            max_batch_size: None,
            account_kind: AccountKind::SmartAccount,
            limitations: vec![],
        }
    }

    fn intent(approval: Approval) -> PaymentIntent {
        PaymentIntent::builder()
            .method(PaymentMethod::token(UsdcBase, approval))
            .amount(1_500_000u64)
            .content_contract(MARKET)
            .content_id(42)
            .build()
    }

    fn builder() -> PlanBuilder<TagEncoder> {
        PlanBuilder::new(TagEncoder, EngineConfig::default(), Base)
    }

    #[test]
    fn approval_intent_emits_approve_then_purchase() {
        let plan = builder()
            .build(&intent(Approval::Required), &smart(), &PlanOverrides::default())
            .unwrap();

        assert_eq!(plan.calls.len(), 2);
        let (approve, purchase) = (&plan.calls[0], &plan.calls[1]);
        assert_eq!(approve.kind, CallKind::Approve);
        assert_eq!(approve.target, UsdcBase::ASSET.address);
        assert_eq!(approve.payload, Bytes::from_static(b"approve"));
        assert_eq!(purchase.kind, CallKind::Payment);
        assert_eq!(purchase.target, MARKET);
        assert!(approve.critical && purchase.critical);
        assert_eq!(plan.description, "Approve 1.5 USDC and purchase content #42");
        assert_eq!(plan.fallback_policy, FallbackPolicy::Sequential);
    }

    #[test]
    fn gas_limit_adds_a_quarter_of_the_payment_estimate() {
        let plan = builder()
            .build(&intent(Approval::Required), &smart(), &PlanOverrides::default())
            .unwrap();
        let expected = APPROVE_GAS_ESTIMATE
            + TOKEN_PURCHASE_GAS_ESTIMATE
            + TOKEN_PURCHASE_GAS_ESTIMATE / 4;
        assert_eq!(plan.gas_limit, Some(expected));
        assert_eq!(
            plan.individual_gas(),
            APPROVE_GAS_ESTIMATE + TOKEN_PURCHASE_GAS_ESTIMATE
        );
    }

    #[test]
    fn granted_and_native_intents_emit_a_single_call() {
        let granted = builder()
            .build(&intent(Approval::Granted), &smart(), &PlanOverrides::default())
            .unwrap();
        assert_eq!(granted.calls.len(), 1);
        assert_eq!(granted.calls[0].value, AmountValue::ZERO);

        let native = PaymentIntent::builder()
            .method(PaymentMethod::Native)
            .amount(10u128.pow(16))
            .content_contract(MARKET)
            .content_id(7)
            .build();
        let plan = builder()
            .build(&native, &smart(), &PlanOverrides::default())
            .unwrap();
        assert_eq!(plan.calls.len(), 1);
        assert_eq!(plan.calls[0].value, AmountValue(10u128.pow(16)));
        assert_eq!(plan.calls[0].payload, Bytes::from_static(b"native"));
        assert_eq!(plan.description, "Purchase content #7 for 0.01 ETH");
    }

    #[test]
    fn overrides_beat_capability_which_beats_config() {
        let eoa = AccountCapability::fail_safe("no code");
        let plan = builder()
            .build(&intent(Approval::Required), &eoa, &PlanOverrides::default())
            .unwrap();
        assert!(!plan.simulate_first);

        let plan = builder()
            .build(&intent(Approval::Required), &smart(), &PlanOverrides::default())
            .unwrap();
        assert!(plan.simulate_first);

        let overrides = PlanOverrides::builder()
            .simulate_first(true)
            .gas_strategy(GasStrategy::Fast)
            .timeout(Duration::from_secs(30))
            .fallback_policy(FallbackPolicy::Abort)
            .gas_limit(500_000)
            .description("Custom")
            .build();
        let plan = builder()
            .build(&intent(Approval::Required), &eoa, &overrides)
            .unwrap();
        assert!(plan.simulate_first);
        assert_eq!(plan.gas_strategy, GasStrategy::Fast);
        assert_eq!(plan.timeout, Duration::from_secs(30));
        assert_eq!(plan.fallback_policy, FallbackPolicy::Abort);
        assert_eq!(plan.gas_limit, Some(500_000));
        assert_eq!(plan.description, "Custom");
    }

    #[test]
    fn zero_amount_is_rejected() {
        let intent = PaymentIntent::builder()
            .method(PaymentMethod::Native)
            .amount(0u64)
            .content_contract(MARKET)
            .content_id(1)
            .build();
        assert!(matches!(
            builder().build(&intent, &smart(), &PlanOverrides::default()),
            Err(BuildError::ZeroAmount)
        ));
    }

    #[test]
    fn token_on_another_chain_is_rejected() {
        let intent = PaymentIntent::builder()
            .method(PaymentMethod::token(UsdcEthereum, Approval::Required))
            .amount(1_500_000u64)
            .content_contract(MARKET)
            .content_id(42)
            .build();
        let err = builder()
            .build(&intent, &smart(), &PlanOverrides::default())
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::NetworkMismatch {
                symbol: "USDC",
                asset_network: "ethereum",
                network: "base",
            }
        ));
        assert_eq!(
            err.to_string(),
            "USDC is deployed on ethereum, but the wallet is on base"
        );

        // Native payments carry no asset and build on any chain.
        let native = PaymentIntent::builder()
            .method(PaymentMethod::Native)
            .amount(1u64)
            .content_contract(MARKET)
            .content_id(42)
            .build();
        assert!(builder().build(&native, &smart(), &PlanOverrides::default()).is_ok());
    }

    #[test]
    fn building_is_deterministic() {
        let a = builder()
            .build(&intent(Approval::Required), &smart(), &PlanOverrides::default())
            .unwrap();
        let b = builder()
            .build(&intent(Approval::Required), &smart(), &PlanOverrides::default())
            .unwrap();
        assert_eq!(a, b);
    }
}
