use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// An EVM chain the checkout can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmNetwork {
    pub name: &'static str,
    pub chain_id: u64,
    /// CAIP-2 identifier, e.g. `"eip155:8453"`.
    pub network_id: &'static str,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvmAddress(pub alloy_primitives::Address);

impl EvmAddress {
    pub const ZERO: EvmAddress = EvmAddress(alloy_primitives::Address::ZERO);
}

impl From<alloy_primitives::Address> for EvmAddress {
    fn from(addr: alloy_primitives::Address) -> Self {
        EvmAddress(addr)
    }
}

impl From<EvmAddress> for alloy_primitives::Address {
    fn from(addr: EvmAddress) -> Self {
        addr.0
    }
}

impl FromStr for EvmAddress {
    type Err = alloy_primitives::AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = alloy_primitives::Address::from_str(s)?;
        Ok(EvmAddress(addr))
    }
}

impl Display for EvmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for EvmAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EvmAddress({})", self.0)
    }
}

impl Serialize for EvmAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EvmAddress::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An ERC-20 token deployed on an EVM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmAsset {
    pub address: EvmAddress,
    /// Chain the token contract lives on.
    pub network: EvmNetwork,
    pub decimals: u8,
    pub name: &'static str,
    pub symbol: &'static str,
}

pub trait ExplicitEvmNetwork {
    const NETWORK: EvmNetwork;
}

pub trait ExplicitEvmAsset {
    type Network: ExplicitEvmNetwork;

    const ASSET: EvmAsset;
}

impl<T> From<T> for EvmNetwork
where
    T: ExplicitEvmNetwork,
{
    fn from(_: T) -> Self {
        T::NETWORK
    }
}

impl<T> From<T> for EvmAsset
where
    T: ExplicitEvmAsset,
{
    fn from(_: T) -> Self {
        T::ASSET
    }
}

pub mod networks {
    use super::*;

    macro_rules! define_explicit_evm_network {
        ($struct_name:ident, $name:literal, $chain_id:literal) => {
            pub struct $struct_name;

            impl ExplicitEvmNetwork for $struct_name {
                const NETWORK: EvmNetwork = EvmNetwork {
                    name: $name,
                    chain_id: $chain_id,
                    network_id: concat!("eip155:", $chain_id),
                };
            }
        };
    }

    define_explicit_evm_network!(Ethereum, "ethereum", 1);
    define_explicit_evm_network!(EthereumSepolia, "ethereum-sepolia", 11155111);
    define_explicit_evm_network!(Base, "base", 8453);
    define_explicit_evm_network!(BaseSepolia, "base-sepolia", 84532);
}

pub mod assets {
    use alloy_primitives::address;

    use super::*;

    macro_rules! define_explicit_usdc {
        ($struct_name:ident, $network_struct:ty, $addr:expr) => {
            pub struct $struct_name;

            impl ExplicitEvmAsset for $struct_name {
                type Network = $network_struct;

                const ASSET: EvmAsset = EvmAsset {
                    address: EvmAddress(address!($addr)),
                    network: <<Self as ExplicitEvmAsset>::Network as ExplicitEvmNetwork>::NETWORK,
                    decimals: 6,
                    name: "USD Coin",
                    symbol: "USDC",
                };
            }
        };
    }

    define_explicit_usdc!(
        UsdcEthereum,
        networks::Ethereum,
        "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
    );

    define_explicit_usdc!(
        UsdcEthereumSepolia,
        networks::EthereumSepolia,
        "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"
    );

    define_explicit_usdc!(
        UsdcBase,
        networks::Base,
        "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
    );

    define_explicit_usdc!(
        UsdcBaseSepolia,
        networks::BaseSepolia,
        "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
    );
}
