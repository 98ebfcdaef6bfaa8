//! Account capability detection.
//!
//! Classifies the connected account from its bytecode and combines that with the
//! host [`Environment`] to decide whether batched calls are usable. Lookups are
//! cached per (address, connector); failures degrade to the fail-safe EOA answer.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use batchpay_core::{
    capability::{AccountCapability, AccountKind},
    networks::evm::EvmAddress,
};
use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::wallet::WalletClient;

/// What the host knows about the wallet connection.
///
/// Passed in explicitly instead of probing globals, so tests can vary it.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Identifier of the wallet connector in use.
    #[builder(into)]
    pub connector: String,
    #[builder(default = true)]
    pub connected: bool,
    /// Whether the host (e.g. an embedded mini-app) reports batch-call support.
    #[builder(default)]
    pub batch_calls_supported: bool,
    pub max_batch_size: Option<usize>,
}

pub const LIMITATION_EOA: &str = "account has no contract code; batched calls need a smart account";
pub const LIMITATION_DISCONNECTED: &str = "wallet is not connected";
pub const LIMITATION_HOST: &str = "host environment does not support batched calls";

type CacheKey = (EvmAddress, String);

#[derive(Debug)]
pub struct CapabilityDetector {
    environment: Mutex<Environment>,
    cache: Mutex<HashMap<CacheKey, AccountCapability>>,
}

impl CapabilityDetector {
    pub fn new(environment: Environment) -> Self {
        CapabilityDetector {
            environment: Mutex::new(environment),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the environment. Cached answers are dropped if anything changed.
    pub fn set_environment(&self, environment: Environment) {
        let mut current = self
            .environment
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != environment {
            *current = environment;
            self.invalidate();
        }
    }

    /// Forget every cached capability.
    pub fn invalidate(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Detect the capability of `address`.
    ///
    /// Never fails: a bytecode lookup error yields an EOA without batching,
    /// with the error recorded in `limitations`. Such answers are not cached.
    pub async fn detect<W: WalletClient>(
        &self,
        wallet: &W,
        address: EvmAddress,
    ) -> AccountCapability {
        let environment = self.environment();
        let key = (address, environment.connector.clone());

        if let Some(cached) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return cached.clone();
        }

        let bytecode = match wallet.get_bytecode(address).await {
            Ok(code) => code,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%address, "Bytecode lookup failed: {err}; assuming EOA");
                return AccountCapability::fail_safe(format!("account lookup failed: {err}"));
            }
        };

        let capability = classify(&bytecode, &environment);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            %address,
            connector = %environment.connector,
            account_kind = ?capability.account_kind,
            supports_batch = capability.supports_batch,
            "Detected account capability"
        );

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, capability.clone());

        capability
    }
}

fn classify(bytecode: &[u8], environment: &Environment) -> AccountCapability {
    let account_kind = if bytecode.is_empty() {
        AccountKind::Eoa
    } else {
        AccountKind::SmartAccount
    };

    let mut limitations = Vec::new();
    if account_kind == AccountKind::Eoa {
        limitations.push(LIMITATION_EOA.to_string());
    }
    if !environment.connected {
        limitations.push(LIMITATION_DISCONNECTED.to_string());
    }
    if !environment.batch_calls_supported {
        limitations.push(LIMITATION_HOST.to_string());
    }

    AccountCapability {
        supports_batch: limitations.is_empty(),
        max_batch_size: environment.max_batch_size,
        account_kind,
        limitations,
    }
}
