use crate::{
    error::{
        PortalError,
        Result,
    },
    ledger::{
        Ledger,
        LedgerEvent,
        LedgerEventStream,
        PendingWave,
        RemoteWave,
    },
    wallets::{
        Authority,
        Connection,
        Consent,
        WalletProvider,
    },
};
use alloy::primitives::{
    Address,
    U256,
};
use futures::{
    FutureExt,
    StreamExt,
};
use std::sync::{
    Arc,
    Mutex,
};
use tokio::sync::mpsc;

#[derive(Default)]
struct FakeLedgerState {
    waves: Vec<RemoteWave>,
    sent: Vec<(String, u64)>,
    reads: usize,
    all_waves_calls: usize,
    fail_reads: bool,
    fail_sends: bool,
    fail_confirmations: bool,
    hold_confirmations: bool,
    authorities: Vec<Address>,
}

type EventFeed = mpsc::UnboundedSender<Result<LedgerEvent>>;
type EventTap = mpsc::UnboundedReceiver<Result<LedgerEvent>>;

/// In-memory ledger. Clones share state so a test can keep a handle after
/// giving one away.
#[derive(Clone)]
pub struct FakeLedger {
    state: Arc<Mutex<FakeLedgerState>>,
    feed: EventFeed,
    tap: Arc<Mutex<Option<EventTap>>>,
}

impl Default for FakeLedger {
    fn default() -> Self {
        let (feed, tap) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(FakeLedgerState::default())),
            feed,
            tap: Arc::new(Mutex::new(Some(tap))),
        }
    }
}

impl FakeLedger {
    pub fn with_waves(waves: Vec<RemoteWave>) -> Self {
        let ledger = Self::default();
        ledger.state.lock().unwrap().waves = waves;
        ledger
    }

    /// Pushes events into the stream handed out by `subscribe`.
    pub fn event_sender(&self) -> EventFeed {
        self.feed.clone()
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }

    pub fn fail_sends(&self) {
        self.state.lock().unwrap().fail_sends = true;
    }

    pub fn fail_confirmations(&self) {
        self.state.lock().unwrap().fail_confirmations = true;
    }

    /// Confirmations never resolve, leaving the submission in flight.
    pub fn hold_confirmations(&self) {
        self.state.lock().unwrap().hold_confirmations = true;
    }

    pub fn sent(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn read_count(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn all_waves_calls(&self) -> usize {
        self.state.lock().unwrap().all_waves_calls
    }

    pub fn authorities(&self) -> Vec<Address> {
        self.state.lock().unwrap().authorities.clone()
    }
}

impl Ledger for FakeLedger {
    async fn all_waves(&self) -> Result<Vec<RemoteWave>> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        state.all_waves_calls += 1;
        if state.fail_reads {
            return Err(PortalError::read("fake read failure"));
        }
        Ok(state.waves.clone())
    }

    async fn total_waves(&self) -> Result<U256> {
        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if state.fail_reads {
            return Err(PortalError::read("fake read failure"));
        }
        Ok(U256::from(state.waves.len() + state.sent.len()))
    }

    async fn send_wave(&self, message: &str, gas_limit: u64) -> Result<PendingWave> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(PortalError::write("fake send failure"));
        }
        state.sent.push((message.to_owned(), gas_limit));
        let tx_hash = format!("0x{:064x}", state.sent.len());
        let confirmation = if state.hold_confirmations {
            futures::future::pending().boxed()
        } else if state.fail_confirmations {
            futures::future::ready(Err(PortalError::write("fake revert"))).boxed()
        } else {
            futures::future::ready(Ok(())).boxed()
        };
        Ok(PendingWave::new(tx_hash, confirmation))
    }

    async fn subscribe(&self) -> Result<LedgerEventStream> {
        let tap = self
            .tap
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| PortalError::read("already subscribed"))?;
        Ok(futures::stream::unfold(tap, |mut tap| async move {
            tap.recv().await.map(|item| (item, tap))
        })
        .boxed())
    }

    fn with_authority(&self, authority: &Authority) -> Result<Self> {
        self.state
            .lock()
            .unwrap()
            .authorities
            .push(authority.address());
        Ok(self.clone())
    }
}

#[derive(Default)]
struct FakeWalletState {
    authorized: Vec<String>,
    requestable: Vec<String>,
    fail: bool,
    password: Option<String>,
    requests: usize,
}

#[derive(Clone, Default)]
pub struct FakeWallet {
    state: Arc<Mutex<FakeWalletState>>,
}

impl FakeWallet {
    /// Accounts that are already authorized and returned without prompting.
    pub fn with_accounts<const N: usize>(accounts: [&str; N]) -> Self {
        let wallet = Self::default();
        wallet.state.lock().unwrap().authorized =
            accounts.iter().map(|a| a.to_string()).collect();
        wallet
    }

    /// Accounts that only an explicit request authorizes.
    pub fn with_requestable<const N: usize>(accounts: [&str; N]) -> Self {
        let wallet = Self::default();
        wallet.state.lock().unwrap().requestable =
            accounts.iter().map(|a| a.to_string()).collect();
        wallet
    }

    /// Like a keystore: a request only succeeds with `password`.
    pub fn with_password<const N: usize>(accounts: [&str; N], password: &str) -> Self {
        let wallet = Self::with_requestable(accounts);
        wallet.state.lock().unwrap().password = Some(password.to_owned());
        wallet
    }

    pub fn failing() -> Self {
        let wallet = Self::default();
        wallet.state.lock().unwrap().fail = true;
        wallet
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests
    }
}

fn fake_connection(identity: &str) -> Connection {
    Connection {
        identity: identity.to_owned(),
        authority: Authority::NodeAccount(Address::ZERO),
    }
}

impl WalletProvider for FakeWallet {
    async fn accounts(&self) -> Result<Vec<Connection>> {
        let state = self.state.lock().unwrap();
        if state.fail {
            return Err(PortalError::read("fake wallet failure"));
        }
        Ok(state.authorized.iter().map(|a| fake_connection(a)).collect())
    }

    async fn request_accounts(&self, consent: Consent) -> Result<Vec<Connection>> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        let supplied = match consent {
            Consent::Declined => {
                return Err(PortalError::rejected("user declined the request"));
            }
            Consent::Granted { password } => password,
        };
        if state.password.is_some() && state.password != supplied {
            return Err(PortalError::rejected("wrong password"));
        }
        let granted = state.requestable.clone();
        state.authorized = granted.clone();
        Ok(granted.iter().map(|a| fake_connection(a)).collect())
    }

    fn needs_password(&self) -> bool {
        self.state.lock().unwrap().password.is_some()
    }
}
