use crate::{
    error::{
        PortalError,
        Result,
    },
    wallets::Authority,
};
use alloy::{
    network::EthereumWallet,
    primitives::{
        Address,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
};
use futures::{
    FutureExt,
    StreamExt,
    future::BoxFuture,
    stream::BoxStream,
};
use std::{
    fmt,
    time::Duration,
};
use url::Url;
use wave_portal_types::WavePortal;

pub mod wave_portal_types {
    alloy::sol! {
        #[sol(rpc)]
        contract WavePortal {
            struct Wave {
                address waver;
                string message;
                uint256 timestamp;
            }

            event NewWave(address indexed from, uint256 timestamp, string message);
            event Awarded(address indexed from, uint256 prize);

            function wave(string memory _message) public;
            function getAllWaves() public view returns (Wave[] memory);
            function getTotalWaves() public view returns (uint256);
        }
    }
}

/// A `getAllWaves` record before projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteWave {
    pub waver: String,
    pub timestamp: U256,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    NewWave {
        from: String,
        timestamp: U256,
        message: String,
    },
    Awarded {
        from: String,
        prize: U256,
    },
}

pub type LedgerEventStream = BoxStream<'static, Result<LedgerEvent>>;

/// A broadcast `wave` transaction whose inclusion has not been observed yet.
pub struct PendingWave {
    tx_hash: String,
    confirmation: BoxFuture<'static, Result<()>>,
}

impl PendingWave {
    pub fn new(
        tx_hash: impl Into<String>,
        confirmation: BoxFuture<'static, Result<()>>,
    ) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            confirmation,
        }
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    /// Resolves once the transaction is mined. There is no timeout.
    pub async fn confirmed(self) -> Result<()> {
        self.confirmation.await
    }
}

impl fmt::Debug for PendingWave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWave")
            .field("tx_hash", &self.tx_hash)
            .finish_non_exhaustive()
    }
}

pub trait Ledger: Send + Sync + 'static {
    /// Every wave ever recorded, in ledger order.
    fn all_waves(&self) -> impl Future<Output = Result<Vec<RemoteWave>>> + Send;

    fn total_waves(&self) -> impl Future<Output = Result<U256>> + Send;

    fn send_wave(
        &self,
        message: &str,
        gas_limit: u64,
    ) -> impl Future<Output = Result<PendingWave>> + Send;

    /// `NewWave` and `Awarded` events merged into one stream, in arrival order.
    fn subscribe(&self) -> impl Future<Output = Result<LedgerEventStream>> + Send;

    /// A handle to the same contract that submits as `authority`.
    fn with_authority(&self, authority: &Authority) -> Result<Self>
    where
        Self: Sized;
}

#[derive(Clone)]
pub struct RpcLedger {
    rpc_url: Url,
    provider: DynProvider,
    contract: Address,
    sender: Option<Address>,
    poll_interval: Duration,
}

impl RpcLedger {
    /// Read-only handle: reads and subscriptions, no signer.
    pub fn connect(rpc_url: Url, contract: Address, poll_interval: Duration) -> Self {
        tracing::info!("Connecting to WavePortal {contract} at URL: {rpc_url}");
        let provider = ProviderBuilder::new().on_http(rpc_url.clone()).erased();
        Self {
            rpc_url,
            provider,
            contract,
            sender: None,
            poll_interval,
        }
    }

    pub fn provider(&self) -> DynProvider {
        self.provider.clone()
    }

    fn instance(&self) -> WavePortal::WavePortalInstance<(), DynProvider> {
        WavePortal::new(self.contract, self.provider.clone())
    }
}

impl Ledger for RpcLedger {
    async fn all_waves(&self) -> Result<Vec<RemoteWave>> {
        let waves = self
            .instance()
            .getAllWaves()
            .call()
            .await
            .map_err(PortalError::read)?
            ._0;
        Ok(waves
            .into_iter()
            .map(|wave| RemoteWave {
                waver: wave.waver.to_string(),
                timestamp: wave.timestamp,
                message: wave.message,
            })
            .collect())
    }

    async fn total_waves(&self) -> Result<U256> {
        let total = self
            .instance()
            .getTotalWaves()
            .call()
            .await
            .map_err(PortalError::read)?
            ._0;
        Ok(total)
    }

    async fn send_wave(&self, message: &str, gas_limit: u64) -> Result<PendingWave> {
        let instance = self.instance();
        let mut call = instance.wave(message.to_owned()).gas(gas_limit);
        if let Some(from) = self.sender {
            call = call.from(from);
        }
        let pending = call.send().await.map_err(PortalError::write)?;
        let tx_hash = pending.tx_hash().to_string();
        let confirmation = async move {
            pending
                .watch()
                .await
                .map(|_| ())
                .map_err(PortalError::write)
        }
        .boxed();
        Ok(PendingWave::new(tx_hash, confirmation))
    }

    async fn subscribe(&self) -> Result<LedgerEventStream> {
        let instance = self.instance();

        let mut new_waves = instance
            .NewWave_filter()
            .watch()
            .await
            .map_err(PortalError::read)?;
        new_waves.poller = new_waves.poller.with_poll_interval(self.poll_interval);
        let new_waves = new_waves.into_stream().map(|item| {
            let (event, _log) = item.map_err(PortalError::read)?;
            Ok(LedgerEvent::NewWave {
                from: event.from.to_string(),
                timestamp: event.timestamp,
                message: event.message,
            })
        });

        let mut awards = instance
            .Awarded_filter()
            .watch()
            .await
            .map_err(PortalError::read)?;
        awards.poller = awards.poller.with_poll_interval(self.poll_interval);
        let awards = awards.into_stream().map(|item| {
            let (event, _log) = item.map_err(PortalError::read)?;
            Ok(LedgerEvent::Awarded {
                from: event.from.to_string(),
                prize: event.prize,
            })
        });

        Ok(futures::stream::select(new_waves, awards).boxed())
    }

    fn with_authority(&self, authority: &Authority) -> Result<Self> {
        match authority {
            Authority::NodeAccount(address) => Ok(Self {
                sender: Some(*address),
                ..self.clone()
            }),
            Authority::LocalKey(signer) => {
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer.clone()))
                    .on_http(self.rpc_url.clone())
                    .erased();
                Ok(Self {
                    provider,
                    sender: Some(signer.address()),
                    ..self.clone()
                })
            }
        }
    }
}
