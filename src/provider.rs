use std::sync::Arc;

use alloy::eips::eip2718::Encodable2718;
use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockTransactionsKind, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::{BoxTransport, TransportError};
use async_trait::async_trait;

use crate::chain::{ChainClient, TxnSigner};
use crate::config::TxnManagerConfig;
use crate::errors::{ChainClientError, TxnManagerSendError};
use crate::models::{TxnManager, TxnReceipt};
use crate::utils::{verify_private_signer, verify_rpc_url};

type BuiltinProvider = RootProvider<BoxTransport>;

impl From<TransportError> for ChainClientError {
    fn from(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => ChainClientError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
                data: payload.as_revert_data(),
            },
            None => ChainClientError::Transport(err.to_string()),
        }
    }
}

/// [`ChainClient`] over an HTTP or WebSocket JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct AlloyChainClient {
    provider: BuiltinProvider,
}

impl AlloyChainClient {
    /// Connects to `rpc_url`. WebSocket endpoints are dialled here, HTTP ones lazily on the
    /// first request.
    pub async fn new(rpc_url: &str) -> Result<Self, TxnManagerSendError> {
        let url = verify_rpc_url(rpc_url)?;

        let provider = ProviderBuilder::new()
            .on_builtin(url.as_str())
            .await
            .map_err(|err| {
                TxnManagerSendError::NetworkConnectivity(format!(
                    "Failed to connect to {rpc_url:?}: {err}"
                ))
            })?;

        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn get_transaction_count(
        &self,
        address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<u64, ChainClientError> {
        Ok(self
            .provider
            .get_transaction_count(address)
            .block_id(BlockId::Number(tag))
            .await?)
    }

    async fn get_latest_base_fee(&self) -> Result<Option<u128>, ChainClientError> {
        let block = self
            .provider
            .get_block(BlockId::latest(), BlockTransactionsKind::Hashes)
            .await?;

        Ok(block.and_then(|block| block.header.base_fee_per_gas.map(u128::from)))
    }

    async fn get_gas_price(&self) -> Result<u128, ChainClientError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn get_max_priority_fee(&self) -> Result<u128, ChainClientError> {
        Ok(self.provider.get_max_priority_fee_per_gas().await?)
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ChainClientError> {
        Ok(self.provider.estimate_gas(request).await?)
    }

    async fn call(&self, request: &TransactionRequest) -> Result<Bytes, ChainClientError> {
        Ok(self.provider.call(request).await?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainClientError> {
        let pending_txn = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending_txn.tx_hash())
    }

    async fn get_transaction_receipt(
        &self,
        txn_hash: B256,
    ) -> Result<Option<TxnReceipt>, ChainClientError> {
        let receipt = self.provider.get_transaction_receipt(txn_hash).await?;

        Ok(receipt.map(|receipt| TxnReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used as u64,
            status: receipt.status(),
        }))
    }

    async fn get_chain_id(&self) -> Result<u64, ChainClientError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainClientError> {
        Ok(self.provider.get_balance(address).await?)
    }
}

#[async_trait]
impl TxnSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        <Self as Signer>::address(self)
    }

    async fn sign_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<Bytes, TxnManagerSendError> {
        let signer_wallet = EthereumWallet::from(self.clone());

        let envelope = request
            .build(&signer_wallet)
            .await
            .map_err(|err| TxnManagerSendError::Signing(err.to_string()))?;

        Ok(envelope.encoded_2718().into())
    }
}

impl TxnManager<AlloyChainClient, PrivateKeySigner> {
    /// Creates a manager for the account of `private_signer_hex` on the endpoint `rpc_url`.
    ///
    /// # Errors
    /// * `TxnManagerSendError::InvalidRpcUrl` - If the RPC URL is invalid.
    /// * `TxnManagerSendError::InvalidPrivateSigner` - If the private signer is invalid.
    /// * `TxnManagerSendError::NetworkConnectivity` - If the endpoint cannot be reached.
    pub async fn connect(
        rpc_url: &str,
        private_signer_hex: &str,
        config: TxnManagerConfig,
    ) -> Result<Self, TxnManagerSendError> {
        let client = AlloyChainClient::new(rpc_url).await?;
        let private_signer = verify_private_signer(private_signer_hex)?;

        TxnManager::new(Arc::new(client), Arc::new(private_signer), config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;

    #[test]
    fn test_default_endpoints_are_valid_rpc_urls() {
        for network in [
            Network::Vana,
            Network::Satori,
            Network::Moksha,
            Network::Local,
            Network::Archive,
        ] {
            let endpoint = network.default_endpoint().unwrap();
            assert!(
                verify_rpc_url(endpoint).is_ok(),
                "{network} endpoint {endpoint} rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_new_accepts_http_endpoints_without_connecting() {
        for network in [Network::Vana, Network::Satori, Network::Moksha] {
            let endpoint = network.default_endpoint().unwrap();
            assert!(AlloyChainClient::new(endpoint).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_new_rejects_unsupported_scheme() {
        assert!(matches!(
            AlloyChainClient::new("ftp://rpc.vana.com").await,
            Err(TxnManagerSendError::InvalidRpcUrl(_))
        ));
    }
}
