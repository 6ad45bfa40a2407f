use crate::{
    deployment::{
        self,
        DeploymentEnv,
        DeploymentStore,
    },
    state::DedupPolicy,
    submission::DEFAULT_GAS_LIMIT,
    wallets,
};
use alloy::primitives::Address;
use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::PathBuf,
    str::FromStr,
    time::Duration,
};
use url::Url;

pub const DEFAULT_SEPOLIA_RPC_URL: &str = "https://ethereum-sepolia-rpc.publicnode.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545/";
pub const SEPOLIA_WAVE_PORTAL: &str = "0xbA2717Ba32410F651ECE74A75B12F4918FC03Cd4";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

#[derive(Parser, Debug)]
#[command(
    name = "wave-portal",
    version,
    about = "Send a high five to the WavePortal contract and watch the waves roll in",
    long_about = None,
    group(
        ArgGroup::new("network")
            .args(["sepolia", "local"])
            .required(false)
    )
)]
pub struct Args {
    /// Connect to Sepolia (default)
    #[arg(long)]
    pub sepolia: bool,

    /// Connect to a local node such as anvil
    #[arg(long)]
    pub local: bool,

    /// Override the RPC URL for the selected network
    #[arg(long)]
    pub rpc_url: Option<Url>,

    /// WavePortal contract address; defaults to the latest recorded deployment
    #[arg(short, long)]
    pub contract: Option<String>,

    /// Record `--contract` as the latest deployment for the selected network
    #[arg(long, requires = "contract")]
    pub save_contract: bool,

    /// Gas limit attached to every wave
    #[arg(long, default_value_t = DEFAULT_GAS_LIMIT)]
    pub gas_limit: u64,

    /// Keystore wallet to unlock; node-managed accounts are used when omitted
    #[arg(short, long)]
    pub wallet: Option<String>,

    /// Override the keystore directory (defaults to ~/.wave-portal/wallets)
    #[arg(long)]
    pub wallet_dir: Option<String>,

    /// How often the event filters are polled
    #[arg(
        long,
        default_value_t = DEFAULT_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_ms: u64,

    /// Drop live waves already present in the loaded history
    #[arg(long)]
    pub dedup_entries: bool,

    /// Directory for the rolling log file (defaults to ~/.wave-portal/logs)
    #[arg(long)]
    pub log_dir: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Sepolia { url: Url },
    LocalNode { url: Url },
}

impl NetworkTarget {
    pub fn url(&self) -> &Url {
        match self {
            NetworkTarget::Sepolia { url } | NetworkTarget::LocalNode { url } => url,
        }
    }

    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Sepolia { .. } => DeploymentEnv::Sepolia,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletConfig {
    NodeAccounts,
    Keystore { name: String, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub contract: Address,
    pub gas_limit: u64,
    pub wallet: WalletConfig,
    pub poll_interval: Duration,
    pub dedup: DedupPolicy,
    pub log_dir: PathBuf,
}

impl Args {
    pub fn into_config(self) -> Result<AppConfig> {
        self.into_config_with_store(DeploymentStore::new)
    }

    pub fn into_config_with_store(
        self,
        store_for: impl Fn(DeploymentEnv) -> DeploymentStore,
    ) -> Result<AppConfig> {
        let network = if self.local {
            let url = match self.rpc_url.clone() {
                Some(url) => url,
                None => Url::parse(DEFAULT_LOCAL_RPC_URL).wrap_err("default local RPC URL")?,
            };
            NetworkTarget::LocalNode { url }
        } else {
            let url = match self.rpc_url.clone() {
                Some(url) => url,
                None => {
                    Url::parse(DEFAULT_SEPOLIA_RPC_URL).wrap_err("default Sepolia RPC URL")?
                }
            };
            NetworkTarget::Sepolia { url }
        };

        let store = store_for(network.env());
        let contract = match &self.contract {
            Some(raw) => {
                let address = parse_address(raw).wrap_err("parsing --contract")?;
                if self.save_contract {
                    deployment::record_deployment(&store, address.to_string(), network.url())?;
                    tracing::info!(
                        "Recorded {address} as latest {} deployment in {}",
                        network.env(),
                        store.path().display()
                    );
                }
                address
            }
            None => match store.latest()? {
                Some(record) => {
                    tracing::info!(
                        "Using deployment record {} (network {}) deployed at {}",
                        record.contract_address,
                        record.network_url,
                        record.deployed_at
                    );
                    parse_address(&record.contract_address).wrap_err_with(|| {
                        format!(
                            "parsing contract address from deployment record {}",
                            record.contract_address
                        )
                    })?
                }
                None => match network.env() {
                    DeploymentEnv::Sepolia => parse_address(SEPOLIA_WAVE_PORTAL)?,
                    env => {
                        return Err(eyre!(
                            "No deployment record found for {env}; provide --contract"
                        ));
                    }
                },
            },
        };

        let wallet = match self.wallet {
            Some(name) => WalletConfig::Keystore {
                name,
                dir: wallets::resolve_wallet_dir(self.wallet_dir.as_deref())?,
            },
            None => WalletConfig::NodeAccounts,
        };

        let log_dir = match self.log_dir.as_deref() {
            Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
            None => default_log_dir()?,
        };

        Ok(AppConfig {
            network,
            contract,
            gas_limit: self.gas_limit,
            wallet,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            dedup: if self.dedup_entries {
                DedupPolicy::DropReplayed
            } else {
                DedupPolicy::KeepDuplicates
            },
            log_dir,
        })
    }
}

pub fn default_log_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".wave-portal").join("logs"))
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| eyre!("Failed to parse contract address '{raw}': {e}"))
}
