use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::eips::BlockNumberOrTag;
use alloy::json_abi::JsonAbi;
use alloy::network::TransactionBuilder;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

use crate::errors::{ChainClientError, TxnManagerSendError};
use crate::models::TxnReceipt;

/// Blockchain RPC capabilities the transaction manager depends on.
///
/// Implementations must be safe to share across tasks; the manager never synchronises access to
/// the client itself.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_transaction_count(
        &self,
        address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<u64, ChainClientError>;

    /// Base fee of the latest block, `None` on chains without a fee market.
    async fn get_latest_base_fee(&self) -> Result<Option<u128>, ChainClientError>;

    async fn get_gas_price(&self) -> Result<u128, ChainClientError>;

    async fn get_max_priority_fee(&self) -> Result<u128, ChainClientError>;

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ChainClientError>;

    /// Executes the request against current state without broadcasting it.
    async fn call(&self, request: &TransactionRequest) -> Result<Bytes, ChainClientError>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainClientError>;

    async fn get_transaction_receipt(
        &self,
        txn_hash: B256,
    ) -> Result<Option<TxnReceipt>, ChainClientError>;

    async fn get_chain_id(&self) -> Result<u64, ChainClientError>;

    async fn get_balance(&self, address: Address) -> Result<U256, ChainClientError>;
}

/// Account capable of signing transactions for the manager.
#[async_trait]
pub trait TxnSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Signs a fully populated request and returns the raw encoded transaction.
    async fn sign_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Bytes, TxnManagerSendError>;
}

/// An unsent contract invocation.
///
/// The manager fills in sender, value, nonce, gas and fees; the call contributes the target and
/// calldata through [`PendingCall::build_transaction`].
pub trait PendingCall: Send + Sync {
    fn to(&self) -> Address;

    fn input(&self) -> Bytes;

    /// ABI used to decode custom errors raised by the target contract.
    fn abi(&self) -> Option<&JsonAbi> {
        None
    }

    fn build_transaction(&self, request: TransactionRequest) -> TransactionRequest {
        request.with_to(self.to()).with_input(self.input())
    }
}

#[derive(Clone, Debug)]
pub struct ContractCall {
    pub to: Address,
    pub input: Bytes,
    pub abi: Option<Arc<JsonAbi>>,
}

impl ContractCall {
    pub fn new(to: Address, input: Bytes) -> Self {
        Self {
            to,
            input,
            abi: None,
        }
    }

    /// Plain value transfer with no calldata.
    pub fn transfer(to: Address) -> Self {
        Self::new(to, Bytes::new())
    }

    /// Encodes a call from its canonical function signature, e.g. `"approve(address,uint256)"`.
    pub fn from_signature(to: Address, signature: &str, args: Vec<DynSolValue>) -> Self {
        let function_selector = keccak256(signature.as_bytes());

        let mut txn_data = function_selector[..4].to_vec();
        txn_data.extend(DynSolValue::Tuple(args).abi_encode_params());

        Self::new(to, Bytes::from(txn_data))
    }

    pub fn with_abi(mut self, abi: JsonAbi) -> Self {
        self.abi = Some(Arc::new(abi));
        self
    }
}

impl PendingCall for ContractCall {
    fn to(&self) -> Address {
        self.to
    }

    fn input(&self) -> Bytes {
        self.input.clone()
    }

    fn abi(&self) -> Option<&JsonAbi> {
        self.abi.as_deref()
    }
}
