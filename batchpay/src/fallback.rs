//! Sequential fallback: replay a plan one call at a time.
//!
//! Used when the account cannot batch or a batch attempt failed with an
//! escalatable error. Each call is its own wallet prompt and transaction.

use batchpay_core::{
    machine::Event,
    plan::BatchPlan,
    state::{ErrorKind, ExecutionError},
    types::TxHash,
};

use crate::wallet::{ReceiptStatus, WalletClient, classify};

/// Per-call progress reported by [`run_sequential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallUpdate {
    Started {
        index: usize,
    },
    Succeeded {
        index: usize,
        tx_hash: TxHash,
        gas_used: Option<u64>,
    },
    Failed {
        index: usize,
        error: ExecutionError,
    },
}

impl From<CallUpdate> for Event {
    fn from(update: CallUpdate) -> Self {
        match update {
            CallUpdate::Started { index } => Event::CallStarted { index },
            CallUpdate::Succeeded {
                index,
                tx_hash,
                gas_used,
            } => Event::CallSucceeded {
                index,
                tx_hash,
                gas_used,
            },
            CallUpdate::Failed { index, error } => Event::CallFailed { index, error },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequentialOutcome {
    /// Every call was attempted. Lists the non-critical calls that failed.
    Completed { failed_non_critical: Vec<usize> },
    /// A critical call failed; calls after `index` were never attempted.
    Halted { index: usize, error: ExecutionError },
}

/// Execute `plan` strictly in order, reporting every call transition through
/// `on_update` before moving on.
///
/// A failing critical call halts the run. A failing non-critical call is
/// recorded and the run continues. An error returned by `on_update` aborts the
/// run and is passed through.
pub async fn run_sequential<W, F, E>(
    wallet: &W,
    plan: &BatchPlan,
    mut on_update: F,
) -> Result<SequentialOutcome, E>
where
    W: WalletClient,
    F: FnMut(CallUpdate) -> Result<(), E>,
{
    let mut failed_non_critical = Vec::new();

    for (index, call) in plan.calls.iter().enumerate() {
        on_update(CallUpdate::Started { index })?;

        match execute_one(wallet, &call.to_wire()).await {
            Ok((tx_hash, gas_used)) => {
                on_update(CallUpdate::Succeeded {
                    index,
                    tx_hash,
                    gas_used,
                })?;
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    index,
                    critical = call.critical,
                    kind = %error.kind,
                    "Sequential call failed: {}",
                    call.description
                );

                on_update(CallUpdate::Failed {
                    index,
                    error: error.clone(),
                })?;

                if call.critical {
                    return Ok(SequentialOutcome::Halted { index, error });
                }
                failed_non_critical.push(index);
            }
        }
    }

    Ok(SequentialOutcome::Completed {
        failed_non_critical,
    })
}

async fn execute_one<W: WalletClient>(
    wallet: &W,
    call: &batchpay_core::call::WireCall,
) -> Result<(TxHash, Option<u64>), ExecutionError> {
    let tx_hash = wallet
        .send_transaction(call)
        .await
        .map_err(|e| classify(&e, ErrorKind::ExecutionFailed))?;

    let receipt = wallet
        .wait_for_transaction(tx_hash)
        .await
        .map_err(|e| classify(&e, ErrorKind::ExecutionFailed))?;

    match receipt.status {
        ReceiptStatus::Success => Ok((receipt.tx_hash, receipt.gas_used)),
        ReceiptStatus::Reverted => Err(ExecutionError::new(
            ErrorKind::ExecutionFailed,
            format!("Transaction {} reverted", receipt.tx_hash),
        )),
    }
}
