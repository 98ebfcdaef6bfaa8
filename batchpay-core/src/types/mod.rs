//! Core types used across batchpay.

mod amount;
mod common;

pub use amount::*;
pub use common::*;
