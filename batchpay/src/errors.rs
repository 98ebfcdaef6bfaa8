use batchpay_core::state::Phase;

/// Errors returned by [`BatchEngine`](crate::engine::BatchEngine) itself.
///
/// Payment failures are not errors: they end the attempt in the `failed`
/// phase and are reported through the completion result.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Another attempt is still in flight on this engine.
    #[error("A purchase attempt is already in flight (phase '{0}')")]
    AttemptInFlight(Phase),

    /// The state machine rejected an event.
    #[error("State machine error: {0}")]
    StateMachine(#[from] batchpay_core::Error),
}

/// Errors building a [`BatchPlan`](batchpay_core::plan::BatchPlan) from an intent.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Payment amount must be greater than zero")]
    ZeroAmount,

    /// The payment token is not deployed on the wallet's chain.
    #[error("{symbol} is deployed on {asset_network}, but the wallet is on {network}")]
    NetworkMismatch {
        symbol: &'static str,
        asset_network: &'static str,
        network: &'static str,
    },
}

/// Errors from the full [`Checkout`](crate::checkout::Checkout) flow.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Failed to build call plan: {0}")]
    Build(#[from] BuildError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
