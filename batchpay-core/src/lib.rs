//! Batchpay core library.
//!
//! Chain-facing value types and the pure parts of the batched checkout engine:
//! call plans, account capabilities, the execution state machine and the
//! progress projection consumed by UIs and analytics.
//!
//! Nothing in this crate performs I/O. The async driver lives in the `batchpay` crate.

pub mod call;
pub mod capability;
pub mod errors;
pub mod machine;
pub mod networks;
pub mod plan;
pub mod report;
pub mod state;
pub mod types;

pub use errors::{Error, Result};
