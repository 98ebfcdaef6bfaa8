//! The wallet collaborator the engine drives.
//!
//! Implementations are bound to the active account; the engine never chooses
//! a sender. See [`RpcWalletClient`](crate::rpc_client::RpcWalletClient) for a
//! JSON-RPC implementation.

use batchpay_core::{
    call::WireCall,
    networks::evm::{EvmAddress, EvmNetwork},
    plan::GasStrategy,
    state::{ErrorKind, ExecutionError},
    types::{Bytes, TxHash},
};

/// Classification hooks for wallet errors.
pub trait WalletError: std::error::Error {
    /// The user declined the request in the wallet UI.
    fn is_user_rejection(&self) -> bool {
        false
    }

    /// The wallet or account does not support the requested method.
    fn is_unsupported(&self) -> bool {
        false
    }
}

/// Map a wallet error to an execution error, using `default` unless the
/// wallet reports a rejection or an unsupported method.
pub fn classify<E: WalletError>(error: &E, default: ErrorKind) -> ExecutionError {
    let kind = if error.is_user_rejection() {
        ErrorKind::UserRejected
    } else if error.is_unsupported() {
        ErrorKind::Unsupported
    } else {
        default
    };
    ExecutionError::new(kind, error.to_string())
}

/// Calls to authorize as a single batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub calls: Vec<WireCall>,
    pub gas_limit: Option<u64>,
    pub gas_strategy: GasStrategy,
}

/// A batch the user has authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBatch {
    /// Wallet-assigned batch identifier.
    pub id: String,
}

/// A batch handed to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchHandle {
    pub id: String,
    /// Transaction hash, if the wallet reports it before confirmation.
    pub tx_hash: Option<TxHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    pub status: ReceiptStatus,
    pub tx_hash: Option<TxHash>,
    pub gas_used: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReceipt {
    pub status: ReceiptStatus,
    pub tx_hash: TxHash,
    pub gas_used: Option<u64>,
}

/// Signing and calling capability for the active account.
pub trait WalletClient {
    type Error: WalletError;

    /// Chain the wallet is connected to.
    fn network(&self) -> EvmNetwork;

    /// Code deployed at `address`; empty for a plain account.
    fn get_bytecode(
        &self,
        address: EvmAddress,
    ) -> impl Future<Output = Result<Bytes, Self::Error>>;

    /// Dry-run `calls` in order against current chain state.
    ///
    /// Returns the gas the batch would use, when the backend reports it.
    fn simulate_calls(
        &self,
        calls: &[WireCall],
    ) -> impl Future<Output = Result<Option<u64>, Self::Error>>;

    /// Ask the user to authorize the batch. This is the wallet prompt.
    fn sign_calls(
        &self,
        request: &BatchRequest,
    ) -> impl Future<Output = Result<SignedBatch, Self::Error>>;

    /// Submit an authorized batch.
    fn send_calls(
        &self,
        batch: &SignedBatch,
    ) -> impl Future<Output = Result<BatchHandle, Self::Error>>;

    /// Wait until the batch is included on chain.
    fn wait_for_confirmation(
        &self,
        handle: &BatchHandle,
    ) -> impl Future<Output = Result<BatchReceipt, Self::Error>>;

    /// Send one call as its own transaction. Prompts the user.
    fn send_transaction(
        &self,
        call: &WireCall,
    ) -> impl Future<Output = Result<TxHash, Self::Error>>;

    /// Wait until a transaction sent with [`send_transaction`](Self::send_transaction) is included.
    fn wait_for_transaction(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<CallReceipt, Self::Error>>;
}
