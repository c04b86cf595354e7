use std::fmt;
use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{
    ARCHIVE_ENTRYPOINT, BASE_GAS_MULTIPLIER, CONFIG_ENV_PREFIX, GAS_LIMIT_MULTIPLIER,
    GAS_MULTIPLIER_GROWTH, LOCAL_ENTRYPOINT, MAX_GAS_MULTIPLIER, MAX_PENDING_TRANSACTIONS,
    MAX_RETRIES, MOKSHA_ENTRYPOINT, RECEIPT_POLL_INTERVAL_MS, RECEIPT_TIMEOUT_SEC,
    SATORI_ENTRYPOINT, SWEEP_FEE_MULTIPLIER, SWEEP_MAX_WAIT_SEC, SWEEP_POLL_INTERVAL_SEC,
    VANA_ENTRYPOINT,
};
use crate::errors::TxnManagerSendError;
use crate::models::SendOptions;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    /// EIP-1559 when the latest block reports a base fee, legacy otherwise.
    #[default]
    Auto,
    Legacy,
    Eip1559,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TxnManagerConfig {
    pub max_retries: u32,
    pub base_gas_multiplier: f64,
    pub gas_multiplier_growth: f64,
    pub max_gas_multiplier: f64,
    pub gas_limit_multiplier: f64,
    pub timeout_sec: u64,
    pub receipt_poll_interval_ms: u64,
    pub max_pending_transactions: u64,
    pub fee_mode: FeeMode,
    pub sweep_fee_multiplier: f64,
    pub sweep_max_wait_sec: u64,
    pub sweep_poll_interval_sec: u64,
}

impl Default for TxnManagerConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_gas_multiplier: BASE_GAS_MULTIPLIER,
            gas_multiplier_growth: GAS_MULTIPLIER_GROWTH,
            max_gas_multiplier: MAX_GAS_MULTIPLIER,
            gas_limit_multiplier: GAS_LIMIT_MULTIPLIER,
            timeout_sec: RECEIPT_TIMEOUT_SEC,
            receipt_poll_interval_ms: RECEIPT_POLL_INTERVAL_MS,
            max_pending_transactions: MAX_PENDING_TRANSACTIONS,
            fee_mode: FeeMode::Auto,
            sweep_fee_multiplier: SWEEP_FEE_MULTIPLIER,
            sweep_max_wait_sec: SWEEP_MAX_WAIT_SEC,
            sweep_poll_interval_sec: SWEEP_POLL_INTERVAL_SEC,
        }
    }
}

impl TxnManagerConfig {
    pub fn validate(&self) -> Result<(), TxnManagerSendError> {
        self.send_options().validate()?;

        if self.gas_limit_multiplier < 1.0 {
            return Err(TxnManagerSendError::InvalidConfig(
                "gas_limit_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.sweep_fee_multiplier < 1.0 {
            return Err(TxnManagerSendError::InvalidConfig(
                "sweep_fee_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.receipt_poll_interval_ms == 0 || self.sweep_poll_interval_sec == 0 {
            return Err(TxnManagerSendError::InvalidConfig(
                "poll intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            max_retries: self.max_retries,
            base_gas_multiplier: self.base_gas_multiplier,
            gas_multiplier_growth: self.gas_multiplier_growth,
            max_gas_multiplier: self.max_gas_multiplier,
            timeout: Duration::from_secs(self.timeout_sec),
            max_pending_transactions: self.max_pending_transactions,
        }
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn sweep_max_wait(&self) -> Duration {
        Duration::from_secs(self.sweep_max_wait_sec)
    }

    pub fn sweep_poll_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_poll_interval_sec)
    }
}

impl SendOptions {
    pub fn validate(&self) -> Result<(), TxnManagerSendError> {
        if self.max_retries == 0 {
            return Err(TxnManagerSendError::InvalidConfig(
                "max_retries must be positive".to_string(),
            ));
        }
        if self.base_gas_multiplier < 1.0 || self.gas_multiplier_growth < 1.0 {
            return Err(TxnManagerSendError::InvalidConfig(
                "gas multipliers must be at least 1.0".to_string(),
            ));
        }
        if self.max_gas_multiplier < self.base_gas_multiplier {
            return Err(TxnManagerSendError::InvalidConfig(format!(
                "max_gas_multiplier {} is below base_gas_multiplier {}",
                self.max_gas_multiplier, self.base_gas_multiplier
            )));
        }
        Ok(())
    }
}

pub struct ConfigManager {
    path: String,
}

impl ConfigManager {
    pub fn new(path: &str) -> ConfigManager {
        ConfigManager {
            path: path.to_string(),
        }
    }

    /// Loads the config file, if present, with `VANA_TXN_*` environment overrides on top.
    pub fn load_config(&self) -> Result<TxnManagerConfig, ConfigError> {
        let settings = config::Config::builder()
            .add_source(File::with_name(self.path.as_str()).required(false))
            .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX))
            .build()?;
        settings.try_deserialize()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Vana,
    Satori,
    Moksha,
    Local,
    Archive,
    Unknown,
}

impl Network {
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Network::Vana => Some(VANA_ENTRYPOINT),
            Network::Satori => Some(SATORI_ENTRYPOINT),
            Network::Moksha => Some(MOKSHA_ENTRYPOINT),
            Network::Local => Some(LOCAL_ENTRYPOINT),
            Network::Archive => Some(ARCHIVE_ENTRYPOINT),
            Network::Unknown => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Vana => "vana",
            Network::Satori => "satori",
            Network::Moksha => "moksha",
            Network::Local => "local",
            Network::Archive => "archive",
            Network::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Resolves a network name or endpoint URL to the network and the endpoint to connect to.
///
/// An explicit `chain_endpoint` wins over a named network's default endpoint.
pub fn resolve_network(network: &str, chain_endpoint: Option<&str>) -> (Network, String) {
    let named = match network {
        "vana" => Some(Network::Vana),
        "satori" => Some(Network::Satori),
        "moksha" => Some(Network::Moksha),
        "local" => Some(Network::Local),
        "archive" => Some(Network::Archive),
        _ => None,
    };

    let resolved = named.unwrap_or_else(|| {
        // Order matters: testnet hosts are subdomains of the mainnet host
        if network.contains("rpc.satori.vana") {
            Network::Satori
        } else if network.contains("rpc.moksha.vana") {
            Network::Moksha
        } else if network.contains("archive.vana") {
            Network::Archive
        } else if network == VANA_ENTRYPOINT || network.contains("rpc.vana") {
            Network::Vana
        } else if network.contains("127.0.0.1") || network.contains("localhost") {
            Network::Local
        } else {
            Network::Unknown
        }
    });

    let endpoint = match (chain_endpoint, named) {
        (Some(endpoint), _) => endpoint.to_string(),
        (None, Some(network)) => network.default_endpoint().unwrap_or_default().to_string(),
        // A raw URL is its own endpoint
        (None, None) => network.to_string(),
    };

    (resolved, endpoint)
}
