use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::hex;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::decode_revert_reason;
use alloy::transports::http::reqwest::Url;

use crate::constants::MULTIPLIER_SCALE;
use crate::errors::{ChainClientError, TxnManagerSendError};

/// JSON-RPC code geth-compatible nodes use for "execution reverted".
const EXECUTION_REVERTED_CODE: i64 = 3;
const INTERNAL_ERROR_CODE: i64 = -32603;
const LIMIT_EXCEEDED_CODE: i64 = -32005;

/// Maps raw chain client failures onto the manager's fatal/retryable taxonomy.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &ChainClientError, abi: Option<&JsonAbi>) -> TxnManagerSendError;
}

/// Classifies by JSON-RPC error code first and falls back to [`parse_send_error`] for nodes
/// that only report a free-form message.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpcErrorClassifier;

impl ErrorClassifier for RpcErrorClassifier {
    fn classify(&self, error: &ChainClientError, abi: Option<&JsonAbi>) -> TxnManagerSendError {
        let (code, message, data) = match error {
            ChainClientError::Transport(message) => {
                return TxnManagerSendError::NetworkConnectivity(message.clone())
            }
            ChainClientError::Rpc {
                code,
                message,
                data,
            } => (*code, message, data),
        };

        let reverted = code == EXECUTION_REVERTED_CODE
            || (data.is_some() && message.to_lowercase().contains("revert"));
        if reverted {
            let reason = match data {
                Some(data) if !data.is_empty() => decode_revert_data(data, abi),
                _ => message.clone(),
            };
            return TxnManagerSendError::ContractExecution(reason);
        }

        match code {
            LIMIT_EXCEEDED_CODE => TxnManagerSendError::OtherRetryable(message.clone()),
            INTERNAL_ERROR_CODE => TxnManagerSendError::NetworkConnectivity(message.clone()),
            _ => parse_send_error(message),
        }
    }
}

// Function to categorize the rpc send txn errors into relevant enums
pub fn parse_send_error(error: &str) -> TxnManagerSendError {
    let error_lower = error.to_lowercase();
    let error = error.to_string();

    if error_lower.contains("nonce too low") {
        return TxnManagerSendError::NonceTooLow(error);
    }

    if error_lower.contains("nonce too high") || error_lower.contains("too many pending transactions")
    {
        return TxnManagerSendError::NonceTooHigh(error);
    }

    if error_lower.contains("out of gas") {
        return TxnManagerSendError::OutOfGas(error);
    }

    if error_lower.contains("gas limit too high")
        || error_lower.contains("exceeds block gas limit")
    {
        return TxnManagerSendError::GasTooHigh(error);
    }

    if error_lower.contains("gas price too low")
        || error_lower.contains("underpriced")
        || error_lower.contains("max fee per gas less than block base fee")
    {
        return TxnManagerSendError::GasPriceLow(error);
    }

    if error_lower.contains("insufficient funds") {
        return TxnManagerSendError::InsufficientBalance(error);
    }

    if error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("timed out")
    {
        return TxnManagerSendError::NetworkConnectivity(error);
    }

    if error_lower.contains("reverted") {
        return TxnManagerSendError::ContractExecution(error);
    }

    TxnManagerSendError::OtherRetryable(error)
}

/// Renders revert data as readable text: ABI custom error first, then the standard
/// `Error(string)`/`Panic(uint256)` reasons, then the raw hex.
pub fn decode_revert_data(data: &[u8], abi: Option<&JsonAbi>) -> String {
    if let Some(decoded) = abi.and_then(|abi| decode_custom_error(abi, data)) {
        return decoded;
    }

    if let Some(reason) = decode_revert_reason(data) {
        return reason;
    }

    format!("Unknown error({})", hex::encode_prefixed(data))
}

fn decode_custom_error(abi: &JsonAbi, data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, args) = data.split_at(4);

    abi.errors()
        .filter(|error| error.selector().as_slice() == selector)
        .find_map(|error| {
            let values = error.abi_decode_input(args, true).ok()?;
            let values: Vec<String> = values.iter().map(format_sol_value).collect();
            Some(format!("{}({})", error.name, values.join(", ")))
        })
}

fn format_sol_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(address) => address.to_string(),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        DynSolValue::Bytes(bytes) => hex::encode_prefixed(bytes),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(values)
        | DynSolValue::FixedArray(values)
        | DynSolValue::Tuple(values) => {
            let values: Vec<String> = values.iter().map(format_sol_value).collect();
            format!("[{}]", values.join(", "))
        }
        other => format!("{other:?}"),
    }
}

/// Multiplier applied to the fee baseline on `attempt` (0-based).
///
/// The first attempt pays the network price; retry `n` pays
/// `base * growth^(n-1)`, never more than `max`.
pub(crate) fn gas_multiplier(attempt: u32, base: f64, growth: f64, max: f64) -> f64 {
    if attempt == 0 {
        return 1.0;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    (base * growth.powi(exponent)).min(max)
}

/// Scales `value` by `multiplier` in fixed point, rounding up so a multiplier above 1 always
/// raises a non-zero value.
pub(crate) fn scale_by(value: u128, multiplier: f64) -> u128 {
    let multiplier = (multiplier * MULTIPLIER_SCALE as f64).round() as u128;
    value
        .saturating_mul(multiplier)
        .div_ceil(MULTIPLIER_SCALE)
}

pub(crate) fn scale_gas(value: u64, multiplier: f64) -> u64 {
    u64::try_from(scale_by(u128::from(value), multiplier)).unwrap_or(u64::MAX)
}

pub fn verify_rpc_url(rpc_url: &str) -> Result<Url, TxnManagerSendError> {
    let url = Url::parse(rpc_url).map_err(|err| {
        TxnManagerSendError::InvalidRpcUrl(format!("Failed to parse {rpc_url:?}: {err}"))
    })?;

    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(TxnManagerSendError::InvalidRpcUrl(format!(
            "{rpc_url:?}. URL must start with http, https, ws or wss"
        )));
    }
    Ok(url)
}

pub fn verify_private_signer(private_signer_hex: &str) -> Result<PrivateKeySigner, TxnManagerSendError> {
    let private_signer_hex = private_signer_hex
        .strip_prefix("0x")
        .unwrap_or(private_signer_hex);

    let bytes = hex::decode(private_signer_hex)
        .map_err(|err| TxnManagerSendError::InvalidPrivateSigner(err.to_string()))?;
    if bytes.len() != 32 {
        return Err(TxnManagerSendError::InvalidPrivateSigner(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    PrivateKeySigner::from_slice(&bytes)
        .map_err(|err| TxnManagerSendError::InvalidPrivateSigner(err.to_string()))
}
