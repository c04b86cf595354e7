use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

use crate::chain::{ChainClient, TxnSigner};
use crate::config::TxnManagerConfig;
use crate::errors::{ChainClientError, TxnManagerSendError};
use crate::models::{TxnManager, TxnReceipt};
use crate::observer::{TxnEvent, TxnObserver};

pub(crate) const CHAIN_ID: u64 = 14800;
pub(crate) const OWNER_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub(crate) const CONTRACT_ADDRESS: Address = address!("9a79Bb5676c19A01ad27D88ca6A0131d51022AC4");
pub(crate) const GAS_PRICE: u128 = 1_000_000_000;
pub(crate) const ESTIMATED_GAS: u64 = 50_000;

/// What happens to a non-replacement transaction once it is accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ReceiptMode {
    #[default]
    MineSuccess,
    MineReverted,
    Never,
}

#[derive(Debug)]
pub(crate) struct FakeChainState {
    pub(crate) latest_nonce: u64,
    pub(crate) pending_nonce: u64,
    pub(crate) gas_price: u128,
    pub(crate) base_fee: Option<u128>,
    pub(crate) priority_fee: u128,
    pub(crate) balance: U256,
    pub(crate) receipt_mode: ReceiptMode,
    pub(crate) mine_replacements: bool,
    pub(crate) estimate_error: Option<ChainClientError>,
    pub(crate) call_error: Option<ChainClientError>,
    pub(crate) send_errors: VecDeque<ChainClientError>,
    pub(crate) fail_all_sends: bool,
    pub(crate) sent: Vec<TransactionRequest>,
    pub(crate) receipts: HashMap<B256, TxnReceipt>,
    pub(crate) estimate_calls: u32,
    pub(crate) simulate_calls: u32,
    pub(crate) send_attempts: u32,
}

impl Default for FakeChainState {
    fn default() -> Self {
        Self {
            latest_nonce: 0,
            pending_nonce: 0,
            gas_price: GAS_PRICE,
            base_fee: None,
            priority_fee: 0,
            balance: U256::from(10u128.pow(18)),
            receipt_mode: ReceiptMode::MineSuccess,
            mine_replacements: true,
            estimate_error: None,
            call_error: None,
            send_errors: VecDeque::new(),
            fail_all_sends: false,
            sent: Vec::new(),
            receipts: HashMap::new(),
            estimate_calls: 0,
            simulate_calls: 0,
            send_attempts: 0,
        }
    }
}

impl FakeChainState {
    /// Nonces of the accepted transactions, in broadcast order.
    pub(crate) fn sent_nonces(&self) -> Vec<u64> {
        self.sent
            .iter()
            .map(|request| request.nonce.unwrap_or_default())
            .collect()
    }

    /// Accepted transactions not addressed to the account itself, i.e. not sweep replacements.
    pub(crate) fn sent_by_caller(&self) -> Vec<TransactionRequest> {
        self.sent
            .iter()
            .filter(|request| request.to != Some(OWNER_ADDRESS.into()))
            .cloned()
            .collect()
    }
}

/// In-memory chain for a single account. Every RPC yields once so concurrent callers interleave.
#[derive(Debug, Default)]
pub(crate) struct FakeChainClient {
    state: Mutex<FakeChainState>,
}

impl FakeChainClient {
    pub(crate) fn new(state: FakeChainState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, FakeChainState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn get_transaction_count(
        &self,
        _address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<u64, ChainClientError> {
        tokio::task::yield_now().await;

        let state = self.state();
        match tag {
            BlockNumberOrTag::Pending => Ok(state.pending_nonce),
            _ => Ok(state.latest_nonce),
        }
    }

    async fn get_latest_base_fee(&self) -> Result<Option<u128>, ChainClientError> {
        Ok(self.state().base_fee)
    }

    async fn get_gas_price(&self) -> Result<u128, ChainClientError> {
        Ok(self.state().gas_price)
    }

    async fn get_max_priority_fee(&self) -> Result<u128, ChainClientError> {
        Ok(self.state().priority_fee)
    }

    async fn estimate_gas(&self, _request: &TransactionRequest) -> Result<u64, ChainClientError> {
        tokio::task::yield_now().await;

        let mut state = self.state();
        state.estimate_calls += 1;
        match state.estimate_error.clone() {
            Some(err) => Err(err),
            None => Ok(ESTIMATED_GAS),
        }
    }

    async fn call(&self, _request: &TransactionRequest) -> Result<Bytes, ChainClientError> {
        tokio::task::yield_now().await;

        let mut state = self.state();
        state.simulate_calls += 1;
        match state.call_error.clone() {
            Some(err) => Err(err),
            None => Ok(Bytes::new()),
        }
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainClientError> {
        tokio::task::yield_now().await;

        let request: TransactionRequest = serde_json::from_slice(raw)
            .map_err(|err| ChainClientError::Transport(err.to_string()))?;

        let mut state = self.state();
        state.send_attempts += 1;
        if let Some(err) = state.send_errors.pop_front() {
            return Err(err);
        }
        if state.fail_all_sends {
            return Err(ChainClientError::Transport("connection refused".to_string()));
        }

        let nonce = request.nonce.unwrap_or_default();
        if nonce < state.latest_nonce {
            return Err(ChainClientError::rpc(-32000, "nonce too low"));
        }

        let txn_hash = keccak256(raw);
        let is_replacement = nonce < state.pending_nonce;
        state.pending_nonce = state.pending_nonce.max(nonce + 1);

        let status = match (is_replacement, state.receipt_mode) {
            (true, _) => state.mine_replacements.then_some(true),
            (false, ReceiptMode::MineSuccess) => Some(true),
            (false, ReceiptMode::MineReverted) => Some(false),
            (false, ReceiptMode::Never) => None,
        };
        if let Some(status) = status {
            state.latest_nonce = state.latest_nonce.max(nonce + 1);
            let block_number = state.sent.len() as u64 + 1;
            state.receipts.insert(
                txn_hash,
                TxnReceipt {
                    transaction_hash: txn_hash,
                    block_number: Some(block_number),
                    gas_used: request.gas.unwrap_or_default(),
                    status,
                },
            );
        }

        state.sent.push(request);
        Ok(txn_hash)
    }

    async fn get_transaction_receipt(
        &self,
        txn_hash: B256,
    ) -> Result<Option<TxnReceipt>, ChainClientError> {
        Ok(self.state().receipts.get(&txn_hash).cloned())
    }

    async fn get_chain_id(&self) -> Result<u64, ChainClientError> {
        Ok(CHAIN_ID)
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, ChainClientError> {
        Ok(self.state().balance)
    }
}

/// Signer whose "raw transaction" is the JSON encoded request, decoded again by
/// [`FakeChainClient`].
#[derive(Debug)]
pub(crate) struct FakeSigner {
    pub(crate) address: Address,
}

#[async_trait]
impl TxnSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Bytes, TxnManagerSendError> {
        serde_json::to_vec(&request)
            .map(Bytes::from)
            .map_err(|err| TxnManagerSendError::Signing(err.to_string()))
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<TxnEvent>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<TxnEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&TxnEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| predicate(event))
            .count()
    }
}

impl TxnObserver for RecordingObserver {
    fn on_event(&self, event: &TxnEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub(crate) type FakeTxnManager = TxnManager<FakeChainClient, FakeSigner>;

/// Manager over a fresh [`FakeChainClient`] seeded with `state`.
pub(crate) async fn generate_txn_manager(
    state: FakeChainState,
    config: TxnManagerConfig,
) -> (Arc<FakeTxnManager>, Arc<FakeChainClient>, Arc<RecordingObserver>) {
    let client = Arc::new(FakeChainClient::new(state));
    let observer = Arc::new(RecordingObserver::default());

    let txn_manager = TxnManager::new(
        client.clone(),
        Arc::new(FakeSigner {
            address: OWNER_ADDRESS,
        }),
        config,
    )
    .await
    .unwrap()
    .with_observer(observer.clone());

    (Arc::new(txn_manager), client, observer)
}
