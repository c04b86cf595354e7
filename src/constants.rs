pub(crate) const MAX_RETRIES: u32 = 3;
pub(crate) const BASE_GAS_MULTIPLIER: f64 = 1.5;
pub(crate) const GAS_MULTIPLIER_GROWTH: f64 = 1.2;
pub(crate) const MAX_GAS_MULTIPLIER: f64 = 5.0;
pub(crate) const GAS_LIMIT_MULTIPLIER: f64 = 1.5;
pub(crate) const RECEIPT_TIMEOUT_SEC: u64 = 30;
pub(crate) const RECEIPT_POLL_INTERVAL_MS: u64 = 2000;
pub(crate) const MAX_PENDING_TRANSACTIONS: u64 = 10;

// Backoff between attempts is BACKOFF_BASE^attempt seconds
pub(crate) const BACKOFF_BASE: u64 = 2;
pub(crate) const BACKOFF_FACTOR_MS: u64 = 1000;

pub(crate) const SWEEP_FEE_MULTIPLIER: f64 = 4.0;
pub(crate) const SWEEP_MAX_WAIT_SEC: u64 = 180;
pub(crate) const SWEEP_POLL_INTERVAL_SEC: u64 = 5;
pub(crate) const SWEEP_UNDERPRICED_RETRIES: u32 = 3;
pub(crate) const SWEEP_FEE_INCREMENT_PERCENT: u128 = 50;

// Gas used by a plain value transfer
pub(crate) const TRANSFER_GAS_LIMIT: u64 = 21_000;

pub(crate) const MULTIPLIER_SCALE: u128 = 10_000;

pub(crate) const CONFIG_ENV_PREFIX: &str = "VANA_TXN";

pub(crate) const VANA_ENTRYPOINT: &str = "http://rpc.vana.com";
pub(crate) const SATORI_ENTRYPOINT: &str = "http://rpc.satori.vana.com";
pub(crate) const MOKSHA_ENTRYPOINT: &str = "http://rpc.moksha.vana.com";
pub(crate) const ARCHIVE_ENTRYPOINT: &str = "wss://archive.vana.com:443/";
pub(crate) const LOCAL_ENTRYPOINT: &str = "ws://127.0.0.1:9944";
