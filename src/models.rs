use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::B256;
use alloy::rpc::types::TransactionRequest;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::TxnManagerConfig;
use crate::observer::TxnObserver;
use crate::utils::ErrorClassifier;

/// Reliable transaction submission for a single account.
///
/// The `TxnManager` provides functionality to:
/// - Allocate nonces safely across concurrent callers
/// - Price transactions and escalate fees across retries
/// - Simulate calls before broadcasting them so logic reverts fail fast
/// - Wait for receipts with a bounded timeout and retry transient failures with backoff
/// - Replace stuck pending transactions when too many pile up
///
/// # Example
/// ```no_run
/// use alloy::primitives::{Address, U256};
/// use vana_txn_manager::{ContractCall, TxnManager, TxnManagerConfig};
///
/// # async fn run() -> Result<(), vana_txn_manager::TxnManagerSendError> {
/// let config = TxnManagerConfig::default();
/// let txn_manager = TxnManager::connect(
///     "http://rpc.moksha.vana.com",
///     "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
///     config.clone(),
/// )
/// .await?;
///
/// let call = ContractCall::from_signature(Address::ZERO, "claim()", vec![]);
/// let (txn_hash, receipt) = txn_manager
///     .send_transaction(&call, U256::ZERO, &config.send_options())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TxnManager<C, S> {
    pub(crate) client: Arc<C>,
    pub(crate) signer: Arc<S>,
    pub(crate) chain_id: u64,
    pub(crate) config: TxnManagerConfig,
    pub(crate) nonce_state: Mutex<NonceState>,
    pub(crate) classifier: Arc<dyn ErrorClassifier>,
    pub(crate) observer: Arc<dyn TxnObserver>,
}

/// Nonce bookkeeping for the managed account.
///
/// The chain's pending transaction count decides the nonce of every attempt. `next_nonce`
/// records where the last reconciliation or broadcast left off, so a pending count that fell
/// behind it reveals dropped transactions.
#[derive(Debug, Default)]
pub(crate) struct NonceState {
    pub(crate) next_nonce: Option<u64>,
    pub(crate) last_refresh: Option<Instant>,
}

impl NonceState {
    /// Adopts `chain_pending` as the nonce to use.
    ///
    /// Returns the nonce and, when the recorded nonce was ahead of the chain, the stale value
    /// it replaced.
    pub(crate) fn reconcile(&mut self, chain_pending: u64) -> (u64, Option<u64>) {
        let stale = self.next_nonce.filter(|recorded| *recorded > chain_pending);

        self.next_nonce = Some(chain_pending);
        self.last_refresh = Some(Instant::now());
        (chain_pending, stale)
    }

    /// Records that `nonce` was taken by our own broadcast.
    pub(crate) fn mark_used(&mut self, nonce: u64) {
        let next = nonce.saturating_add(1);
        if self.next_nonce.map_or(true, |recorded| recorded < next) {
            self.next_nonce = Some(next);
        }
    }

    /// Forgets the recorded nonce after the node rejected ours as too high.
    pub(crate) fn reset(&mut self) {
        self.next_nonce = None;
    }
}

/// Fee fields of a single attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GasPricingPlan {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl GasPricingPlan {
    pub fn apply(&self, request: TransactionRequest) -> TransactionRequest {
        match *self {
            GasPricingPlan::Legacy { gas_price } => request.with_gas_price(gas_price),
            GasPricingPlan::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => request
                .with_max_fee_per_gas(max_fee_per_gas)
                .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
        }
    }

    /// Highest price per gas unit the plan allows.
    pub fn fee_cap(&self) -> u128 {
        match *self {
            GasPricingPlan::Legacy { gas_price } => gas_price,
            GasPricingPlan::Eip1559 {
                max_fee_per_gas, ..
            } => max_fee_per_gas,
        }
    }

    /// Same plan with every fee field raised by `percent`, and by at least one wei.
    pub(crate) fn bumped(&self, percent: u128) -> Self {
        let bump = |fee: u128| {
            (fee.saturating_mul(100 + percent) / 100).max(fee.saturating_add(1))
        };

        match *self {
            GasPricingPlan::Legacy { gas_price } => GasPricingPlan::Legacy {
                gas_price: bump(gas_price),
            },
            GasPricingPlan::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => GasPricingPlan::Eip1559 {
                max_fee_per_gas: bump(max_fee_per_gas),
                max_priority_fee_per_gas: bump(max_priority_fee_per_gas),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttemptStage {
    AcquiringNonce,
    Estimating,
    Pricing,
    Simulating,
    Broadcast,
    AwaitingReceipt,
}

/// State of one retry iteration of `send_transaction`.
#[derive(Clone, Debug)]
pub(crate) struct SubmissionAttempt {
    pub(crate) attempt: u32,
    pub(crate) stage: AttemptStage,
    pub(crate) nonce: Option<u64>,
    pub(crate) gas_plan: Option<GasPricingPlan>,
    pub(crate) txn_hash: Option<B256>,
}

impl SubmissionAttempt {
    pub(crate) fn new(attempt: u32) -> Self {
        Self {
            attempt,
            stage: AttemptStage::AcquiringNonce,
            nonce: None,
            gas_plan: None,
            txn_hash: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxnReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub status: bool,
}

/// Per-call knobs of `send_transaction`.
#[derive(Clone, Debug)]
pub struct SendOptions {
    pub max_retries: u32,
    pub base_gas_multiplier: f64,
    pub gas_multiplier_growth: f64,
    pub max_gas_multiplier: f64,
    pub timeout: Duration,
    /// Pending-minus-confirmed gap above which stuck transactions are swept first. 0 disables.
    pub max_pending_transactions: u64,
}

impl Default for SendOptions {
    fn default() -> Self {
        TxnManagerConfig::default().send_options()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepOutcome {
    pub initial_pending: u64,
    pub replacements_sent: u64,
    pub remaining: u64,
    pub cleared: bool,
}
