//! Calldata for the contracts a purchase touches.

use alloy_primitives::U256;
use batchpay_core::{networks::evm::EvmAddress, types::{AmountValue, Bytes}};

/// Turns a purchase step into calldata.
pub trait CallEncoder {
    /// ERC-20 `approve(spender, amount)`.
    fn approve(&self, spender: EvmAddress, amount: AmountValue) -> Bytes;

    /// Token-paid purchase; the contract pulls the approved amount.
    fn purchase(&self, content_id: U256) -> Bytes;

    /// Purchase paid with the native value attached to the call.
    fn purchase_with_native(&self, content_id: U256) -> Bytes;
}

#[cfg(feature = "sol-encoder")]
mod sol_encoder {
    use alloy_core::{sol, sol_types::SolCall};

    use super::*;

    sol! {
        interface IERC20 {
            function approve(address spender, uint256 amount) external returns (bool);
        }

        interface IContentMarket {
            function purchaseContent(uint256 contentId) external;
            function purchaseContentWithNative(uint256 contentId) external payable;
        }
    }

    /// ABI encoder for the standard ERC-20 and content market interfaces.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SolCallEncoder;

    impl CallEncoder for SolCallEncoder {
        fn approve(&self, spender: EvmAddress, amount: AmountValue) -> Bytes {
            IERC20::approveCall {
                spender: spender.0,
                amount: amount.into(),
            }
            .abi_encode()
            .into()
        }

        fn purchase(&self, content_id: U256) -> Bytes {
            IContentMarket::purchaseContentCall {
                contentId: content_id,
            }
            .abi_encode()
            .into()
        }

        fn purchase_with_native(&self, content_id: U256) -> Bytes {
            IContentMarket::purchaseContentWithNativeCall {
                contentId: content_id,
            }
            .abi_encode()
            .into()
        }
    }

}

#[cfg(feature = "sol-encoder")]
pub use sol_encoder::SolCallEncoder;
