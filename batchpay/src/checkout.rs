//! One-call purchase flow: detect, plan, execute.

use batchpay_core::networks::evm::EvmAddress;

use crate::{
    builder::{PaymentIntent, PlanBuilder, PlanOverrides},
    detector::CapabilityDetector,
    encoder::CallEncoder,
    engine::{AttemptOutcome, BatchEngine},
    errors::CheckoutError,
    wallet::WalletClient,
};

/// Ties the capability detector, plan builder and engine together for a
/// single connected wallet.
pub struct Checkout<W: WalletClient, E: CallEncoder> {
    pub detector: CapabilityDetector,
    pub builder: PlanBuilder<E>,
    pub engine: BatchEngine<W>,
}

impl<W: WalletClient, E: CallEncoder> Checkout<W, E> {
    /// The builder takes its defaults from the engine's configuration and its
    /// network from the engine's wallet.
    pub fn new(detector: CapabilityDetector, encoder: E, engine: BatchEngine<W>) -> Self {
        let builder = PlanBuilder::new(
            encoder,
            engine.config().clone(),
            engine.wallet().network(),
        );
        Checkout {
            detector,
            builder,
            engine,
        }
    }

    /// Buy `intent` from `account`.
    pub async fn purchase(
        &self,
        account: EvmAddress,
        intent: &PaymentIntent,
        overrides: &PlanOverrides,
    ) -> Result<AttemptOutcome, CheckoutError> {
        let capability = self.detector.detect(self.engine.wallet(), account).await;
        let plan = self.builder.build(intent, &capability, overrides)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            %account,
            calls = plan.calls.len(),
            supports_batch = capability.supports_batch,
            "Purchasing: {}",
            plan.description
        );

        Ok(self.engine.execute(&plan, &capability).await?)
    }
}
