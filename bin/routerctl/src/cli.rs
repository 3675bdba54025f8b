use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Parser, Subcommand};
use routerctl_deploy::{DEFAULT_SETTINGS_FILE, faucet::DEFAULT_FUNDING_ETH};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "routerctl")]
#[command(
    author,
    version,
    about = "Deploy, verify and configure the swap router and its executors"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "ROUTERCTL_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Target network, as named in the network table (e.g. ethereum, base, tenderly).
    #[arg(short, long, env = "NETWORK")]
    pub network: String,

    /// The URL of the RPC endpoint of the target network.
    ///
    /// The node must be able to sign for the deployer account (`eth_sendTransaction`).
    #[arg(long, alias = "rpc", env = "RPC_URL")]
    pub rpc_url: Url,

    /// The account that signs every transaction.
    ///
    /// If not provided, the node's first account is used.
    #[arg(long, alias = "from", env = "DEPLOYER_ADDRESS")]
    pub deployer: Option<Address>,

    /// Path to a network table replacing the built-in one.
    #[arg(long, env = "ROUTERCTL_NETWORKS", global = true)]
    pub networks: Option<PathBuf>,

    /// Path to the settings file.
    ///
    /// Missing files are ignored; `ROUTERCTL_*` environment variables override its values.
    #[arg(long, alias = "conf", env = "ROUTERCTL_CONFIG", default_value = DEFAULT_SETTINGS_FILE, global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy and verify the router.
    DeployRouter,

    /// Deploy and verify every executor configured for the network.
    DeployExecutors {
        /// Write the deployed addresses into the executor declaration file.
        #[arg(long)]
        record: bool,
    },

    /// Register the declared executors the router does not know yet.
    SetExecutors {
        #[command(flatten)]
        router: RouterArgs,

        /// Approve the batch without prompting.
        #[arg(short, long)]
        yes: bool,
    },

    /// Grant the declared access-control roles.
    SetRoles {
        #[command(flatten)]
        router: RouterArgs,
    },

    /// Set an account's balance on a simulation network.
    FundWallet {
        /// The account to fund. Defaults to the deployer.
        #[arg(long)]
        account: Option<Address>,

        /// The balance to set, in ETH.
        #[arg(long, default_value_t = DEFAULT_FUNDING_ETH)]
        amount: f64,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct RouterArgs {
    /// Address of the deployed router.
    #[arg(long, env = "ROUTER_ADDRESS")]
    pub router: Address,
}
