use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vana_txn_manager::{resolve_network, ConfigManager, ContractCall, TxnManager};

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[derive(Parser)]
#[command(version, about = "Send transactions to a Vana network")]
struct Cli {
    /// Network name (vana, satori, moksha) or RPC URL
    #[arg(long, default_value = "moksha")]
    network: String,

    /// Overrides the network's default endpoint
    #[arg(long)]
    chain_endpoint: Option<String>,

    /// Hex encoded private key of the sending account
    #[arg(long, env = "VANA_PRIVATE_KEY")]
    private_key: String,

    /// Optional config file, `VANA_TXN_*` environment variables take precedence
    #[arg(long, default_value = "txn_manager")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call a contract function by its signature, without arguments
    Call {
        #[arg(long)]
        to: Address,
        #[arg(long)]
        signature: String,
        #[arg(long, default_value_t = U256::ZERO)]
        value: U256,
    },
    /// Send native currency
    Transfer {
        #[arg(long)]
        to: Address,
        #[arg(long)]
        amount: U256,
    },
    /// Replace stuck pending transactions of the account
    ClearPending {
        #[arg(long, default_value_t = 180)]
        max_wait_sec: u64,
    },
    /// Show balance and pending transaction count
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    let config = ConfigManager::new(&cli.config)
        .load_config()
        .context("failed to load config")?;
    let (network, endpoint) = resolve_network(&cli.network, cli.chain_endpoint.as_deref());
    info!(%network, %endpoint, "Connecting");

    let txn_manager = TxnManager::connect(&endpoint, &cli.private_key, config.clone())
        .await
        .context("failed to create transaction manager")?;
    let options = config.send_options();

    match cli.command {
        Commands::Call {
            to,
            signature,
            value,
        } => {
            let call = ContractCall::from_signature(to, &signature, vec![]);
            let (txn_hash, receipt) = txn_manager
                .send_transaction(&call, value, &options)
                .await?;
            info!(%txn_hash, block_number = ?receipt.block_number, "Call mined");
        }
        Commands::Transfer { to, amount } => {
            let (txn_hash, receipt) = txn_manager.transfer(to, amount, &options).await?;
            info!(%txn_hash, gas_used = receipt.gas_used, "Transfer mined");
        }
        Commands::ClearPending { max_wait_sec } => {
            let outcome = txn_manager
                .clear_pending_transactions(Duration::from_secs(max_wait_sec))
                .await;
            info!(?outcome, "Finished clearing pending transactions");
        }
        Commands::Status => {
            let address = txn_manager.address();
            let balance = txn_manager.get_balance(address).await?;
            let pending = txn_manager.pending_transaction_count().await?;
            info!(%address, %balance, pending, chain_id = txn_manager.chain_id(), "Account status");
        }
    }

    Ok(())
}
