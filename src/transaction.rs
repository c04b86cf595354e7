use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::json_abi::JsonAbi;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, info_span, warn, Instrument};

use crate::chain::{ChainClient, ContractCall, PendingCall, TxnSigner};
use crate::config::{FeeMode, TxnManagerConfig};
use crate::constants::{
    BACKOFF_BASE, BACKOFF_FACTOR_MS, SWEEP_FEE_INCREMENT_PERCENT, SWEEP_UNDERPRICED_RETRIES,
    TRANSFER_GAS_LIMIT,
};
use crate::errors::{ChainClientError, TxnManagerSendError};
use crate::models::{
    AttemptStage, GasPricingPlan, NonceState, SendOptions, SubmissionAttempt, SweepOutcome,
    TxnManager, TxnReceipt,
};
use crate::observer::{TracingObserver, TxnEvent, TxnObserver};
use crate::utils::{gas_multiplier, scale_by, scale_gas, ErrorClassifier, RpcErrorClassifier};

impl<C, S> TxnManager<C, S>
where
    C: ChainClient,
    S: TxnSigner,
{
    /// Creates a new transaction manager for the account of `signer`.
    ///
    /// # Errors
    /// * `TxnManagerSendError::InvalidConfig` - If the config fails validation.
    /// * Any classified RPC error if the chain id cannot be read.
    pub async fn new(
        client: Arc<C>,
        signer: Arc<S>,
        config: TxnManagerConfig,
    ) -> Result<Self, TxnManagerSendError> {
        config.validate()?;

        let classifier: Arc<dyn ErrorClassifier> = Arc::new(RpcErrorClassifier);
        let chain_id = client
            .get_chain_id()
            .await
            .map_err(|err| classifier.classify(&err, None))?;

        Ok(Self {
            client,
            signer,
            chain_id,
            config,
            nonce_state: Mutex::new(NonceState::default()),
            classifier,
            observer: Arc::new(TracingObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn TxnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn config(&self) -> &TxnManagerConfig {
        &self.config
    }

    /// Sends a contract call and waits until it is mined.
    ///
    /// Each attempt reconciles the nonce with the chain, estimates gas, prices the
    /// transaction, simulates it and broadcasts it while holding the nonce lock, then polls
    /// for the receipt with the lock released. Transient failures are retried with
    /// exponential backoff and escalating fees; reverts are returned immediately.
    ///
    /// # Returns
    /// * `(txn_hash, receipt)` of the successful transaction.
    ///
    /// # Errors
    /// * `TxnManagerSendError::ContractExecution` - If the call reverts during estimation or
    ///                                              simulation, with the decoded reason
    /// * `TxnManagerSendError::Reverted` - If the transaction was mined but reverted
    /// * `TxnManagerSendError::RetriesExhausted` - If every attempt failed transiently, wrapping
    ///                                             the last failure
    pub async fn send_transaction<P>(
        &self,
        call: &P,
        value: U256,
        options: &SendOptions,
    ) -> Result<(B256, TxnReceipt), TxnManagerSendError>
    where
        P: PendingCall + ?Sized,
    {
        options.validate()?;

        let txn_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("send_transaction", txn_id = %txn_id, to = %call.to());

        self._send_transaction(call, value, options)
            .instrument(span)
            .await
    }

    async fn _send_transaction<P>(
        &self,
        call: &P,
        value: U256,
        options: &SendOptions,
    ) -> Result<(B256, TxnReceipt), TxnManagerSendError>
    where
        P: PendingCall + ?Sized,
    {
        if options.max_pending_transactions > 0 {
            self._clear_congestion(options.max_pending_transactions)
                .await;
        }

        let attempts = AtomicU32::new(0);
        // Yields 2s, 4s, 8s, ... between consecutive attempts
        let backoff = ExponentialBackoff::from_millis(BACKOFF_BASE)
            .factor(BACKOFF_FACTOR_MS)
            .take(options.max_retries.saturating_sub(1) as usize);

        let result = RetryIf::spawn(
            backoff,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                self._attempt(call, value, options, attempt)
            },
            |err: &TxnManagerSendError| {
                let made = attempts.load(Ordering::SeqCst);
                let retryable = err.is_retryable();
                if retryable && made < options.max_retries {
                    self.observer.on_event(&TxnEvent::BackingOff {
                        attempt: made,
                        max_retries: options.max_retries,
                        delay_sec: BACKOFF_BASE.saturating_pow(made),
                    });
                }
                retryable
            },
        )
        .await;

        result.map_err(|err| {
            if !err.is_retryable() {
                return err;
            }

            let attempts = attempts.load(Ordering::SeqCst);
            self.observer.on_event(&TxnEvent::RetriesExhausted {
                attempts,
                error: err.to_string(),
            });
            TxnManagerSendError::RetriesExhausted {
                attempts,
                last_error: Box::new(err),
            }
        })
    }

    /// Sweeps stuck transactions first when the account has more than `max_pending`
    /// unconfirmed ones. Advisory: failures are logged and never abort the send.
    async fn _clear_congestion(&self, max_pending: u64) {
        match self.pending_transaction_count().await {
            Ok(pending) if pending > max_pending => {}
            Ok(_) => return,
            Err(err) => {
                warn!(error = %err, "Failed to check pending transactions");
                return;
            }
        }

        let mut nonce_guard = self.nonce_state.lock().await;

        // Another caller may have swept while we waited for the lock
        match self.pending_transaction_count().await {
            Ok(pending) if pending > max_pending => {
                self._sweep_stuck_transactions(&mut nonce_guard, self.config.sweep_max_wait())
                    .await;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Failed to check pending transactions"),
        }
    }

    async fn _attempt<P>(
        &self,
        call: &P,
        value: U256,
        options: &SendOptions,
        attempt: u32,
    ) -> Result<(B256, TxnReceipt), TxnManagerSendError>
    where
        P: PendingCall + ?Sized,
    {
        let mut submission = SubmissionAttempt::new(attempt);

        let result = match self._submit(call, value, options, &mut submission).await {
            Ok(txn_hash) => {
                submission.stage = AttemptStage::AwaitingReceipt;
                self._wait_for_receipt(txn_hash, options.timeout)
                    .await
                    .map(|receipt| (txn_hash, receipt))
            }
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            self.observer.on_event(&TxnEvent::AttemptFailed {
                attempt,
                stage: submission.stage,
                nonce: submission.nonce,
                gas_price: submission.gas_plan.map(|plan| plan.fee_cap()),
                txn_hash: submission.txn_hash,
                retryable: err.is_retryable(),
                error: err.to_string(),
            });
        }
        result
    }

    /// Assigns the nonce and broadcasts one attempt. The nonce lock is held for the whole
    /// call and released on return, before any receipt polling.
    async fn _submit<P>(
        &self,
        call: &P,
        value: U256,
        options: &SendOptions,
        submission: &mut SubmissionAttempt,
    ) -> Result<B256, TxnManagerSendError>
    where
        P: PendingCall + ?Sized,
    {
        let abi = call.abi();
        let mut nonce_guard = self.nonce_state.lock().await;

        let nonce = self._next_nonce(&mut nonce_guard).await?;
        submission.nonce = Some(nonce);

        submission.stage = AttemptStage::Estimating;
        let transaction_request = call.build_transaction(
            TransactionRequest::default()
                .with_from(self.address())
                .with_value(value)
                .with_nonce(nonce)
                .with_chain_id(self.chain_id),
        );
        let estimated_gas = self
            .client
            .estimate_gas(&transaction_request)
            .await
            .map_err(|err| self._classify(&err, abi))?;
        let gas_limit = scale_gas(estimated_gas, self.config.gas_limit_multiplier);

        submission.stage = AttemptStage::Pricing;
        let multiplier = gas_multiplier(
            submission.attempt,
            options.base_gas_multiplier,
            options.gas_multiplier_growth,
            options.max_gas_multiplier,
        );
        let gas_plan = self._gas_pricing_plan(multiplier).await?;
        submission.gas_plan = Some(gas_plan);

        let transaction_request = gas_plan.apply(transaction_request.with_gas_limit(gas_limit));

        submission.stage = AttemptStage::Simulating;
        self.client
            .call(&transaction_request)
            .await
            .map_err(|err| self._classify(&err, abi))?;

        submission.stage = AttemptStage::Broadcast;
        self.observer.on_event(&TxnEvent::AttemptStarted {
            attempt: submission.attempt,
            nonce,
            gas_limit,
            gas_price: gas_plan.fee_cap(),
        });

        let raw_txn = self.signer.sign_transaction(transaction_request).await?;
        let txn_hash = match self.client.send_raw_transaction(&raw_txn).await {
            Ok(txn_hash) => txn_hash,
            Err(err) => {
                let err = self._classify(&err, abi);
                if matches!(err, TxnManagerSendError::NonceTooHigh(_)) {
                    nonce_guard.reset();
                }
                return Err(err);
            }
        };

        nonce_guard.mark_used(nonce);
        submission.txn_hash = Some(txn_hash);

        self.observer.on_event(&TxnEvent::Broadcast {
            attempt: submission.attempt,
            nonce,
            txn_hash,
        });
        Ok(txn_hash)
    }

    async fn _next_nonce(&self, nonce_state: &mut NonceState) -> Result<u64, TxnManagerSendError> {
        let chain_pending = self
            .client
            .get_transaction_count(self.address(), BlockNumberOrTag::Pending)
            .await
            .map_err(|err| self._classify(&err, None))?;

        let since_last_refresh = nonce_state.last_refresh.map(|refresh| refresh.elapsed());
        let (nonce, stale_nonce) = nonce_state.reconcile(chain_pending);

        if let Some(stale_nonce) = stale_nonce {
            warn!(
                stale_nonce,
                chain_pending, "Pending count fell behind our broadcasts, reusing chain nonce"
            );
        }
        debug!(
            chain_pending,
            nonce,
            since_last_refresh = ?since_last_refresh,
            "Nonce reconciled with chain"
        );
        Ok(nonce)
    }

    async fn _gas_pricing_plan(
        &self,
        multiplier: f64,
    ) -> Result<GasPricingPlan, TxnManagerSendError> {
        let base_fee = match self.config.fee_mode {
            FeeMode::Legacy => None,
            FeeMode::Auto | FeeMode::Eip1559 => self
                .client
                .get_latest_base_fee()
                .await
                .map_err(|err| self._classify(&err, None))?,
        };

        if let Some(base_fee) = base_fee {
            let max_priority_fee = self
                .client
                .get_max_priority_fee()
                .await
                .map_err(|err| self._classify(&err, None))?;
            let max_priority_fee_per_gas = scale_by(max_priority_fee, multiplier);

            return Ok(GasPricingPlan::Eip1559 {
                max_fee_per_gas: scale_by(base_fee, multiplier)
                    .saturating_mul(2)
                    .saturating_add(max_priority_fee_per_gas),
                max_priority_fee_per_gas,
            });
        }

        let gas_price = self
            .client
            .get_gas_price()
            .await
            .map_err(|err| self._classify(&err, None))?;
        let gas_price = scale_by(gas_price, multiplier);

        if self.config.fee_mode == FeeMode::Eip1559 {
            // No base fee reported, price both fields off the legacy gas price
            return Ok(GasPricingPlan::Eip1559 {
                max_fee_per_gas: gas_price,
                max_priority_fee_per_gas: gas_price,
            });
        }
        Ok(GasPricingPlan::Legacy { gas_price })
    }

    /// Polls for the receipt of `txn_hash` until it shows up or `timeout` elapses.
    ///
    /// # Errors
    /// * `TxnManagerSendError::Reverted` - If the receipt reports a failed execution
    /// * `TxnManagerSendError::Timeout` - If no receipt appears within `timeout`
    async fn _wait_for_receipt(
        &self,
        txn_hash: B256,
        timeout: Duration,
    ) -> Result<TxnReceipt, TxnManagerSendError> {
        let start = Instant::now();
        let poll_interval = self.config.receipt_poll_interval();

        loop {
            match self.client.get_transaction_receipt(txn_hash).await {
                Ok(Some(receipt)) if receipt.status => {
                    self.observer.on_event(&TxnEvent::Confirmed {
                        txn_hash,
                        block_number: receipt.block_number,
                        gas_used: receipt.gas_used,
                    });
                    return Ok(receipt);
                }
                Ok(Some(receipt)) => {
                    return Err(TxnManagerSendError::Reverted {
                        txn_hash,
                        gas_used: receipt.gas_used,
                    })
                }
                Ok(None) => {}
                // Receipt lookups are retried until the timeout
                Err(err) => debug!(txn_hash = %txn_hash, error = %err, "Failed to get transaction receipt"),
            }

            if start.elapsed() >= timeout {
                return Err(TxnManagerSendError::Timeout(format!(
                    "Transaction {txn_hash} not mined within {} seconds",
                    timeout.as_secs()
                )));
            }

            sleep(poll_interval).await;
        }
    }

    /// Replaces every pending transaction of the account with a zero-value self-transfer at a
    /// higher fee and waits up to `max_wait_time` for them to be mined.
    ///
    /// Best effort: failures are reported through the observer and the returned outcome, never
    /// as an error.
    pub async fn clear_pending_transactions(&self, max_wait_time: Duration) -> SweepOutcome {
        let mut nonce_guard = self.nonce_state.lock().await;
        self._sweep_stuck_transactions(&mut nonce_guard, max_wait_time)
            .await
    }

    async fn _sweep_stuck_transactions(
        &self,
        nonce_state: &mut NonceState,
        max_wait_time: Duration,
    ) -> SweepOutcome {
        let (confirmed_nonce, pending_nonce) = match self._nonce_range().await {
            Ok(range) => range,
            Err(err) => {
                warn!(error = %err, "Failed to read nonces for clearing pending transactions");
                return SweepOutcome::default();
            }
        };

        if pending_nonce <= confirmed_nonce {
            return SweepOutcome {
                cleared: true,
                ..Default::default()
            };
        }

        let initial_pending = pending_nonce - confirmed_nonce;
        let highest_nonce = pending_nonce - 1;
        self.observer.on_event(&TxnEvent::SweepStarted {
            confirmed_nonce,
            pending_nonce,
        });

        let mut replacements_sent = 0;
        for nonce in confirmed_nonce..pending_nonce {
            if self._send_replacement(nonce).await {
                replacements_sent += 1;
            }
        }
        nonce_state.mark_used(highest_nonce);

        let start = Instant::now();
        let mut remaining = initial_pending;
        loop {
            match self._nonce_range().await {
                Ok((current_nonce, current_pending)) => {
                    remaining = current_pending.saturating_sub(current_nonce);

                    if current_nonce > highest_nonce || remaining == 0 {
                        self.observer.on_event(&TxnEvent::SweepFinished {
                            remaining,
                            cleared: true,
                        });
                        return SweepOutcome {
                            initial_pending,
                            replacements_sent,
                            remaining,
                            cleared: true,
                        };
                    }

                    if remaining != initial_pending {
                        self.observer.on_event(&TxnEvent::SweepProgress {
                            processed: initial_pending.saturating_sub(remaining),
                            initial_pending,
                        });
                    }
                }
                Err(err) => debug!(error = %err, "Failed to read nonces while clearing"),
            }

            if start.elapsed() >= max_wait_time {
                break;
            }
            sleep(self.config.sweep_poll_interval()).await;
        }

        self.observer.on_event(&TxnEvent::SweepFinished {
            remaining,
            cleared: false,
        });
        SweepOutcome {
            initial_pending,
            replacements_sent,
            remaining,
            cleared: false,
        }
    }

    /// Sends a zero-value self-transfer at `nonce`, raising the fee while the node rejects it
    /// as underpriced. Returns whether a replacement was accepted.
    async fn _send_replacement(&self, nonce: u64) -> bool {
        let address = self.address();

        let mut gas_plan = match self
            ._gas_pricing_plan(self.config.sweep_fee_multiplier)
            .await
        {
            Ok(gas_plan) => gas_plan,
            Err(err) => {
                self._replacement_failed(nonce, err.to_string());
                return false;
            }
        };

        for _ in 0..=SWEEP_UNDERPRICED_RETRIES {
            let dummy_txn = gas_plan.apply(
                TransactionRequest::default()
                    .with_from(address)
                    .with_to(address)
                    .with_value(U256::ZERO)
                    .with_nonce(nonce)
                    .with_gas_limit(TRANSFER_GAS_LIMIT)
                    .with_chain_id(self.chain_id),
            );

            let raw_txn = match self.signer.sign_transaction(dummy_txn).await {
                Ok(raw_txn) => raw_txn,
                Err(err) => {
                    self._replacement_failed(nonce, err.to_string());
                    return false;
                }
            };

            let err = match self.client.send_raw_transaction(&raw_txn).await {
                Ok(txn_hash) => {
                    self.observer.on_event(&TxnEvent::ReplacementSent {
                        nonce,
                        gas_price: gas_plan.fee_cap(),
                        txn_hash,
                    });
                    return true;
                }
                Err(err) => self._classify(&err, None),
            };

            match err {
                TxnManagerSendError::GasPriceLow(_) => {
                    gas_plan = gas_plan.bumped(SWEEP_FEE_INCREMENT_PERCENT);
                }
                TxnManagerSendError::NonceTooLow(_) => {
                    debug!(nonce, "Nonce already mined, no replacement needed");
                    return false;
                }
                err => {
                    self._replacement_failed(nonce, err.to_string());
                    return false;
                }
            }
        }

        self._replacement_failed(
            nonce,
            format!(
                "still underpriced after {SWEEP_UNDERPRICED_RETRIES} fee increases"
            ),
        );
        false
    }

    fn _replacement_failed(&self, nonce: u64, error: String) {
        self.observer
            .on_event(&TxnEvent::ReplacementFailed { nonce, error });
    }

    /// Sends `amount` of the native currency to `dest` after checking the account can cover
    /// it plus the transfer fee.
    ///
    /// # Errors
    /// * `TxnManagerSendError::InsufficientBalance` - If the balance cannot cover amount and fee
    pub async fn transfer(
        &self,
        dest: Address,
        amount: U256,
        options: &SendOptions,
    ) -> Result<(B256, TxnReceipt), TxnManagerSendError> {
        let balance = self.get_balance(self.address()).await?;
        let gas_price = self
            .client
            .get_gas_price()
            .await
            .map_err(|err| self._classify(&err, None))?;
        let fee = U256::from(gas_price).saturating_mul(U256::from(TRANSFER_GAS_LIMIT));

        if balance < amount.saturating_add(fee) {
            return Err(TxnManagerSendError::InsufficientBalance(format!(
                "balance: {balance}, amount: {amount}, fee: {fee}"
            )));
        }

        self.send_transaction(&ContractCall::transfer(dest), amount, options)
            .await
    }

    /// Executes `call` as a read-only call from the managed account.
    pub async fn read_contract<P>(&self, call: &P) -> Result<Bytes, TxnManagerSendError>
    where
        P: PendingCall + ?Sized,
    {
        let transaction_request =
            call.build_transaction(TransactionRequest::default().with_from(self.address()));

        self.client
            .call(&transaction_request)
            .await
            .map_err(|err| self._classify(&err, call.abi()))
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, TxnManagerSendError> {
        self.client
            .get_balance(address)
            .await
            .map_err(|err| self._classify(&err, None))
    }

    /// Number of transactions broadcast by the account that are not yet mined.
    pub async fn pending_transaction_count(&self) -> Result<u64, TxnManagerSendError> {
        let (confirmed_nonce, pending_nonce) = self._nonce_range().await?;
        Ok(pending_nonce.saturating_sub(confirmed_nonce))
    }

    async fn _nonce_range(&self) -> Result<(u64, u64), TxnManagerSendError> {
        let address = self.address();

        let confirmed_nonce = self
            .client
            .get_transaction_count(address, BlockNumberOrTag::Latest)
            .await
            .map_err(|err| self._classify(&err, None))?;
        let pending_nonce = self
            .client
            .get_transaction_count(address, BlockNumberOrTag::Pending)
            .await
            .map_err(|err| self._classify(&err, None))?;

        Ok((confirmed_nonce, pending_nonce))
    }

    fn _classify(&self, err: &ChainClientError, abi: Option<&JsonAbi>) -> TxnManagerSendError {
        self.classifier.classify(err, abi)
    }
}
