//! Atomic calls that make up a payment plan.

use alloy_primitives::U256;
use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    networks::evm::EvmAddress,
    types::{AmountValue, Bytes},
};

/// What a call does, for display and analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Approve,
    Payment,
    Swap,
    Custom,
}

/// One contract call in a plan. Immutable once built.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Contract the call is sent to.
    #[builder(into)]
    pub target: EvmAddress,
    /// Native value attached to the call.
    #[builder(into, default)]
    pub value: AmountValue,
    /// ABI-encoded calldata.
    #[builder(into, default)]
    pub payload: Bytes,
    pub kind: CallKind,
    #[builder(into)]
    pub description: String,
    pub estimated_gas: Option<u64>,
    /// A failing critical call halts the remaining calls of the plan.
    #[builder(default = true)]
    pub critical: bool,
}

/// The `{to, value, data}` triple handed to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCall {
    pub to: EvmAddress,
    pub value: U256,
    pub data: Bytes,
}

impl Call {
    pub fn to_wire(&self) -> WireCall {
        WireCall {
            to: self.target,
            value: self.value.into(),
            data: self.payload.clone(),
        }
    }
}

impl From<&Call> for WireCall {
    fn from(call: &Call) -> Self {
        call.to_wire()
    }
}
