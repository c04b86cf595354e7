pub(crate) mod chain;
pub(crate) mod config;
pub(crate) mod constants;
pub(crate) mod errors;
pub(crate) mod models;
pub(crate) mod observer;
pub(crate) mod provider;
pub(crate) mod transaction;
pub(crate) mod utils;

#[cfg(test)]
mod test_util;

pub use chain::{ChainClient, ContractCall, PendingCall, TxnSigner};
pub use config::{resolve_network, ConfigManager, FeeMode, Network, TxnManagerConfig};
pub use errors::{ChainClientError, TxnManagerSendError};
pub use models::{
    AttemptStage, GasPricingPlan, SendOptions, SweepOutcome, TxnManager, TxnReceipt,
};
pub use observer::{TracingObserver, TxnEvent, TxnObserver};
pub use provider::AlloyChainClient;
pub use utils::{decode_revert_data, parse_send_error, ErrorClassifier, RpcErrorClassifier};
