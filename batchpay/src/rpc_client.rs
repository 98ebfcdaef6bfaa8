//! A [`WalletClient`] speaking JSON-RPC to an EIP-1193 style wallet endpoint.
//!
//! Batches go through EIP-5792 (`wallet_sendCalls` v2.0.0 with
//! `atomicRequired`); the wallet prompts and submits in that single request, so
//! [`sign_calls`](WalletClient::sign_calls) is where the user is asked and
//! [`send_calls`](WalletClient::send_calls) only resolves the batch handle.
//!
//! The gas limit and gas strategy travel as optional capabilities
//! (`gasLimitOverride`, `feeStrategy`): wallets that do not know them still
//! accept the batch and choose fees themselves.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy_primitives::U64;
use batchpay_core::{
    call::WireCall,
    networks::evm::{EvmAddress, EvmNetwork},
    types::{Bytes, TxHash},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use url::Url;

use crate::{
    detector::Environment,
    wallet::{
        BatchHandle, BatchReceipt, BatchRequest, CallReceipt, ReceiptStatus, SignedBatch,
        WalletClient, WalletError,
    },
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// EIP-1193: the user rejected the request.
pub const USER_REJECTED: i64 = 4001;
/// EIP-1193: the provider does not support the method.
pub const UNSUPPORTED_METHOD: i64 = 4200;
/// EIP-5792: missing or invalid capabilities.
pub const UNSUPPORTED_CAPABILITY: i64 = 5700;
/// EIP-5792: unsupported chain id.
pub const UNSUPPORTED_CHAIN: i64 = 5710;
/// EIP-5792: the wallet cannot execute the batch atomically.
pub const ATOMICITY_NOT_SUPPORTED: i64 = 5760;
/// JSON-RPC 2.0: method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, thiserror::Error)]
pub enum RpcClientError {
    #[error("HTTP request error: {0}")]
    HttpRequestError(#[from] reqwest::Error),
    #[error("Serialization/Deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("JSON-RPC response to '{0}' has no result")]
    MissingResult(&'static str),
    #[error("Simulation reverted at call {index}: {reason}")]
    SimulationReverted { index: usize, reason: String },
    #[error("Wallet reported batch '{id}' failed before inclusion")]
    BatchFailed { id: String },
}

impl WalletError for RpcClientError {
    fn is_user_rejection(&self) -> bool {
        matches!(self, RpcClientError::Rpc { code: USER_REJECTED, .. })
    }

    fn is_unsupported(&self) -> bool {
        matches!(
            self,
            RpcClientError::Rpc {
                code: UNSUPPORTED_METHOD
                    | UNSUPPORTED_CAPABILITY
                    | UNSUPPORTED_CHAIN
                    | ATOMICITY_NOT_SUPPORTED
                    | METHOD_NOT_FOUND,
                ..
            }
        )
    }
}

#[derive(Debug)]
pub struct RpcWalletClient {
    pub url: Url,
    pub client: reqwest::Client,
    /// The connected account; every call is sent from it.
    pub account: EvmAddress,
    pub network: EvmNetwork,
    /// Delay between status polls while waiting for inclusion.
    pub poll_interval: Duration,
    next_id: AtomicU64,
}

impl RpcWalletClient {
    pub fn new(url: Url, account: EvmAddress, network: impl Into<EvmNetwork>) -> Self {
        RpcWalletClient {
            url,
            client: reqwest::Client::new(),
            account,
            network: network.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Describe the connection for capability detection, from `wallet_getCapabilities`.
    ///
    /// A wallet without EIP-5792 support yields an environment without batch calls.
    pub async fn environment(
        &self,
        connector: impl Into<String>,
    ) -> Result<Environment, RpcClientError> {
        let chain = chain_id_hex(self.network.chain_id);
        let supported = match self
            .call::<HashMap<String, ChainCapabilities>>(
                "wallet_getCapabilities",
                json!([self.account, [chain]]),
            )
            .await
        {
            Ok(capabilities) => capabilities
                .and_then(|mut by_chain| by_chain.remove(&chain))
                .is_some_and(|c| c.supports_atomic_batch()),
            Err(err) if err.is_unsupported() => false,
            Err(err) => return Err(err),
        };

        Ok(Environment::builder()
            .connector(connector)
            .batch_calls_supported(supported)
            .build())
    }

    /// Send one JSON-RPC request. A `null` result is `None`.
    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<Option<R>, RpcClientError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(method, id = request.id, "JSON-RPC request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .json::<RpcResponse<R>>()
            .await?;

        response.into_result()
    }

    async fn call_required<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<R, RpcClientError> {
        self.call(method, params)
            .await?
            .ok_or(RpcClientError::MissingResult(method))
    }

    /// Parameters of `wallet_sendCalls` for `request`.
    fn send_calls_params(&self, request: &BatchRequest) -> serde_json::Value {
        let mut capabilities = json!({
            "feeStrategy": { "value": request.gas_strategy, "optional": true },
        });
        if let Some(gas_limit) = request.gas_limit {
            capabilities["gasLimitOverride"] =
                json!({ "value": U64::from(gas_limit), "optional": true });
        }

        json!({
            "version": "2.0.0",
            "chainId": chain_id_hex(self.network.chain_id),
            "from": self.account,
            "atomicRequired": true,
            "calls": request.calls,
            "capabilities": capabilities,
        })
    }

    fn transaction(&self, call: &WireCall) -> serde_json::Value {
        json!({
            "from": self.account,
            "to": call.to,
            "value": call.value,
            "data": call.data,
        })
    }
}

impl WalletClient for RpcWalletClient {
    type Error = RpcClientError;

    fn network(&self) -> EvmNetwork {
        self.network
    }

    async fn get_bytecode(&self, address: EvmAddress) -> Result<Bytes, Self::Error> {
        Ok(self
            .call("eth_getCode", json!([address, "latest"]))
            .await?
            .unwrap_or_default())
    }

    async fn simulate_calls(&self, calls: &[WireCall]) -> Result<Option<u64>, Self::Error> {
        let calls: Vec<_> = calls.iter().map(|c| self.transaction(c)).collect();
        let blocks: Vec<SimulatedBlock> = self
            .call_required(
                "eth_simulateV1",
                json!([{ "blockStateCalls": [{ "calls": calls }], "validation": false }, "latest"]),
            )
            .await?;
        simulated_gas(blocks)
    }

    async fn sign_calls(&self, request: &BatchRequest) -> Result<SignedBatch, Self::Error> {
        let params = self.send_calls_params(request);
        let sent: SendCallsResult = self.call_required("wallet_sendCalls", json!([params])).await?;
        Ok(SignedBatch { id: sent.id })
    }

    async fn send_calls(&self, batch: &SignedBatch) -> Result<BatchHandle, Self::Error> {
        let status: CallsStatus = self
            .call_required("wallet_getCallsStatus", json!([batch.id]))
            .await?;
        Ok(BatchHandle {
            id: batch.id.clone(),
            tx_hash: status.first_hash(),
        })
    }

    async fn wait_for_confirmation(&self, handle: &BatchHandle) -> Result<BatchReceipt, Self::Error> {
        loop {
            let status: CallsStatus = self
                .call_required("wallet_getCallsStatus", json!([handle.id]))
                .await?;
            if let Some(receipt) = status.into_receipt(&handle.id)? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn send_transaction(&self, call: &WireCall) -> Result<TxHash, Self::Error> {
        self.call_required("eth_sendTransaction", json!([self.transaction(call)]))
            .await
    }

    async fn wait_for_transaction(&self, tx_hash: TxHash) -> Result<CallReceipt, Self::Error> {
        loop {
            let receipt: Option<TransactionReceipt> = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(CallReceipt {
                    status: receipt_status(receipt.status),
                    tx_hash: receipt.transaction_hash,
                    gas_used: Some(receipt.gas_used.to()),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn chain_id_hex(chain_id: u64) -> String {
    format!("{chain_id:#x}")
}

fn receipt_status(status: U64) -> ReceiptStatus {
    if status == U64::from(1) {
        ReceiptStatus::Success
    } else {
        ReceiptStatus::Reverted
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl<R> RpcResponse<R> {
    fn into_result(self) -> Result<Option<R>, RpcClientError> {
        match self.error {
            Some(RpcErrorObject { code, message }) => Err(RpcClientError::Rpc { code, message }),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainCapabilities {
    atomic: Option<AtomicCapability>,
    /// Pre-2.0 wallets report `atomicBatch: { supported }`.
    atomic_batch: Option<LegacyAtomicBatch>,
}

#[derive(Debug, Deserialize)]
struct AtomicCapability {
    status: String,
}

#[derive(Debug, Deserialize)]
struct LegacyAtomicBatch {
    supported: bool,
}

impl ChainCapabilities {
    /// `ready` means the wallet upgrades the account on first use.
    fn supports_atomic_batch(&self) -> bool {
        match (&self.atomic, &self.atomic_batch) {
            (Some(atomic), _) => matches!(atomic.status.as_str(), "supported" | "ready"),
            (None, Some(legacy)) => legacy.supported,
            (None, None) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendCallsResult {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CallsStatus {
    status: u16,
    #[serde(default)]
    receipts: Vec<BatchTransactionReceipt>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchTransactionReceipt {
    status: U64,
    gas_used: U64,
    transaction_hash: TxHash,
}

impl CallsStatus {
    fn first_hash(&self) -> Option<TxHash> {
        self.receipts.first().map(|r| r.transaction_hash)
    }

    /// `None` while the batch is pending (1xx).
    fn into_receipt(self, id: &str) -> Result<Option<BatchReceipt>, RpcClientError> {
        let status = match self.status {
            100..=199 => return Ok(None),
            200..=299 => ReceiptStatus::Success,
            // 500: reverted on chain, 600: partially reverted.
            500..=699 => ReceiptStatus::Reverted,
            _ => return Err(RpcClientError::BatchFailed { id: id.to_string() }),
        };
        let gas_used = self
            .receipts
            .iter()
            .map(|r| r.gas_used.to::<u64>())
            .fold(0u64, u64::saturating_add);
        let reverted = self.receipts.iter().any(|r| r.status != U64::from(1));

        Ok(Some(BatchReceipt {
            status: if reverted { ReceiptStatus::Reverted } else { status },
            tx_hash: self.first_hash(),
            gas_used: (!self.receipts.is_empty()).then_some(gas_used),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: U64,
    gas_used: U64,
    transaction_hash: TxHash,
}

#[derive(Debug, Deserialize)]
struct SimulatedBlock {
    calls: Vec<SimulatedCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCall {
    status: U64,
    gas_used: U64,
    error: Option<RpcErrorObject>,
}

/// Total gas of a successful simulation; the first failing call is an error.
fn simulated_gas(blocks: Vec<SimulatedBlock>) -> Result<Option<u64>, RpcClientError> {
    let calls: Vec<_> = blocks.into_iter().flat_map(|b| b.calls).collect();
    if calls.is_empty() {
        return Ok(None);
    }

    let mut total = 0u64;
    for (index, call) in calls.into_iter().enumerate() {
        if call.status != U64::from(1) {
            let reason = call
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "execution reverted".to_string());
            return Err(RpcClientError::SimulationReverted { index, reason });
        }
        total = total.saturating_add(call.gas_used.to());
    }
    Ok(Some(total))
}
