use alloy::primitives::{Bytes, B256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxnManagerSendError {
    #[error("Invalid RPC URL. Error: {0}")]
    InvalidRpcUrl(String),
    #[error("Invalid private signer. Error: {0}")]
    InvalidPrivateSigner(String),
    #[error("Invalid configuration. Error: {0}")]
    InvalidConfig(String),
    #[error("Failed to sign transaction. Error: {0}")]
    Signing(String),
    #[error("Nonce too low. Error: {0}")]
    NonceTooLow(String),
    #[error("Nonce too high. Error: {0}")]
    NonceTooHigh(String),
    #[error("Out of gas. Error: {0}")]
    OutOfGas(String),
    #[error("Insufficient balance in wallet. Error: {0}")]
    InsufficientBalance(String),
    #[error("Gas too high. Error: {0}")]
    GasTooHigh(String),
    #[error("Gas price low. Error: {0}")]
    GasPriceLow(String),
    #[error("Contract execution failed. Error: {0}")]
    ContractExecution(String),
    #[error("Transaction {txn_hash} reverted on-chain after consuming {gas_used} gas")]
    Reverted { txn_hash: B256, gas_used: u64 },
    #[error("Network connectivity issue. Error: {0}")]
    NetworkConnectivity(String),
    #[error("Other retryable error. Error: {0}")]
    OtherRetryable(String),
    #[error("Timeout. Error: {0}")]
    Timeout(String),
    #[error("Failed to send transaction after {attempts} attempts. Error: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<TxnManagerSendError>,
    },
}

impl TxnManagerSendError {
    /// Whether a fresh attempt can succeed where this one failed.
    ///
    /// Logic reverts, mined-but-reverted receipts and transactions that can never fit in a
    /// block are deterministic and end the retry loop immediately.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TxnManagerSendError::InvalidRpcUrl(_)
                | TxnManagerSendError::InvalidPrivateSigner(_)
                | TxnManagerSendError::InvalidConfig(_)
                | TxnManagerSendError::Signing(_)
                | TxnManagerSendError::GasTooHigh(_)
                | TxnManagerSendError::ContractExecution(_)
                | TxnManagerSendError::Reverted { .. }
                | TxnManagerSendError::RetriesExhausted { .. }
        )
    }
}

/// Raw failure reported by a [`ChainClient`](crate::ChainClient) before classification.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainClientError {
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Bytes>,
    },
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ChainClientError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        ChainClientError::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn revert(message: impl Into<String>, data: Bytes) -> Self {
        ChainClientError::Rpc {
            code: 3,
            message: message.into(),
            data: Some(data),
        }
    }
}
