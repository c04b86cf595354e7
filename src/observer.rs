use alloy::primitives::B256;
use tracing::{debug, error, info, warn};

use crate::models::AttemptStage;

/// Notable steps of transaction submission, carrying the fields worth recording.
#[derive(Clone, Debug, PartialEq)]
pub enum TxnEvent {
    AttemptStarted {
        attempt: u32,
        nonce: u64,
        gas_limit: u64,
        gas_price: u128,
    },
    Broadcast {
        attempt: u32,
        nonce: u64,
        txn_hash: B256,
    },
    Confirmed {
        txn_hash: B256,
        block_number: Option<u64>,
        gas_used: u64,
    },
    AttemptFailed {
        attempt: u32,
        stage: AttemptStage,
        nonce: Option<u64>,
        gas_price: Option<u128>,
        txn_hash: Option<B256>,
        retryable: bool,
        error: String,
    },
    BackingOff {
        attempt: u32,
        max_retries: u32,
        delay_sec: u64,
    },
    RetriesExhausted {
        attempts: u32,
        error: String,
    },
    SweepStarted {
        confirmed_nonce: u64,
        pending_nonce: u64,
    },
    ReplacementSent {
        nonce: u64,
        gas_price: u128,
        txn_hash: B256,
    },
    ReplacementFailed {
        nonce: u64,
        error: String,
    },
    SweepProgress {
        processed: u64,
        initial_pending: u64,
    },
    SweepFinished {
        remaining: u64,
        cleared: bool,
    },
}

/// Receives [`TxnEvent`]s from a `TxnManager`.
pub trait TxnObserver: Send + Sync {
    fn on_event(&self, event: &TxnEvent);
}

/// Default observer that forwards events to `tracing` with structured fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl TxnObserver for TracingObserver {
    fn on_event(&self, event: &TxnEvent) {
        match event {
            TxnEvent::AttemptStarted {
                attempt,
                nonce,
                gas_limit,
                gas_price,
            } => info!(attempt, nonce, gas_limit, gas_price, "Sending transaction"),
            TxnEvent::Broadcast {
                attempt,
                nonce,
                txn_hash,
            } => info!(attempt, nonce, txn_hash = %txn_hash, "Transaction broadcast"),
            TxnEvent::Confirmed {
                txn_hash,
                block_number,
                gas_used,
            } => info!(
                txn_hash = %txn_hash,
                block_number = ?block_number,
                gas_used,
                "Transaction successful"
            ),
            TxnEvent::AttemptFailed {
                attempt,
                stage,
                nonce,
                gas_price,
                txn_hash,
                retryable,
                error,
            } => warn!(
                attempt,
                stage = ?stage,
                nonce = ?nonce,
                gas_price = ?gas_price,
                txn_hash = ?txn_hash,
                retryable,
                error = %error,
                "Transaction attempt failed"
            ),
            TxnEvent::BackingOff {
                attempt,
                max_retries,
                delay_sec,
            } => warn!(attempt, max_retries, delay_sec, "Waiting before retry"),
            TxnEvent::RetriesExhausted { attempts, error } => {
                error!(attempts, error = %error, "Transaction failed after all attempts")
            }
            TxnEvent::SweepStarted {
                confirmed_nonce,
                pending_nonce,
            } => warn!(
                confirmed_nonce,
                pending_nonce,
                pending = pending_nonce.saturating_sub(*confirmed_nonce),
                "Clearing pending transactions"
            ),
            TxnEvent::ReplacementSent {
                nonce,
                gas_price,
                txn_hash,
            } => info!(nonce, gas_price, txn_hash = %txn_hash, "Sent replacement transaction"),
            TxnEvent::ReplacementFailed { nonce, error } => {
                warn!(nonce, error = %error, "Failed to replace transaction")
            }
            TxnEvent::SweepProgress {
                processed,
                initial_pending,
            } => debug!(processed, initial_pending, "Pending transactions clearing"),
            TxnEvent::SweepFinished { remaining, cleared } => {
                if *cleared {
                    info!(remaining, "Pending transactions cleared");
                } else {
                    warn!(remaining, "Timed out waiting for pending transactions to clear");
                }
            }
        }
    }
}
