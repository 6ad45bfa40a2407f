use crate::error::{
    PortalError,
    Result,
};
use alloy::{
    primitives::Address,
    providers::{
        DynProvider,
        Provider,
    },
    signers::local::{
        MnemonicBuilder,
        PrivateKeySigner,
        coins_bip39::English,
    },
};
use color_eyre::eyre::{
    self,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tracing::{
    info,
    warn,
};

/// Who signs a submitted wave.
#[derive(Clone, Debug)]
pub enum Authority {
    /// The RPC node holds the key and signs `eth_sendTransaction`.
    NodeAccount(Address),
    LocalKey(PrivateKeySigner),
}

impl Authority {
    pub fn address(&self) -> Address {
        match self {
            Authority::NodeAccount(address) => *address,
            Authority::LocalKey(signer) => signer.address(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Connection {
    pub identity: String,
    pub authority: Authority,
}

impl From<Authority> for Connection {
    fn from(authority: Authority) -> Self {
        Self {
            identity: authority.address().to_string(),
            authority,
        }
    }
}

/// The user's answer to an explicit connection request.
#[derive(Clone, Debug)]
pub enum Consent {
    Granted { password: Option<String> },
    Declined,
}

pub trait WalletProvider: Send + Sync + 'static {
    /// Accounts already authorized for this session; never prompts.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Connection>>> + Send;

    /// Accounts authorized by an explicit request.
    fn request_accounts(
        &self,
        consent: Consent,
    ) -> impl Future<Output = Result<Vec<Connection>>> + Send;

    /// Whether an explicit request has to carry a password.
    fn needs_password(&self) -> bool {
        false
    }
}

/// Accounts managed by the JSON-RPC node (`eth_accounts` / `eth_requestAccounts`).
#[derive(Clone)]
pub struct NodeWallet {
    provider: DynProvider,
}

impl NodeWallet {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

impl WalletProvider for NodeWallet {
    async fn accounts(&self) -> Result<Vec<Connection>> {
        let accounts = self.provider.get_accounts().await.map_err(PortalError::read)?;
        Ok(accounts
            .into_iter()
            .map(|address| Connection::from(Authority::NodeAccount(address)))
            .collect())
    }

    async fn request_accounts(&self, consent: Consent) -> Result<Vec<Connection>> {
        if let Consent::Declined = consent {
            return Err(PortalError::rejected("user declined the request"));
        }
        let accounts: Vec<Address> = self
            .provider
            .raw_request("eth_requestAccounts".into(), ())
            .await
            .map_err(PortalError::rejected)?;
        Ok(accounts
            .into_iter()
            .map(|address| Connection::from(Authority::NodeAccount(address)))
            .collect())
    }
}

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

/// A Web3 secret-storage keystore unlocked with a password.
#[derive(Clone)]
pub struct KeystoreWallet {
    descriptor: WalletDescriptor,
    unlocked: Arc<Mutex<Option<PrivateKeySigner>>>,
}

impl KeystoreWallet {
    pub fn new(descriptor: WalletDescriptor) -> Self {
        Self {
            descriptor,
            unlocked: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn cached_signer(&self) -> Option<PrivateKeySigner> {
        self.unlocked
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

impl WalletProvider for KeystoreWallet {
    async fn accounts(&self) -> Result<Vec<Connection>> {
        Ok(self
            .cached_signer()
            .map(|signer| Connection::from(Authority::LocalKey(signer)))
            .into_iter()
            .collect())
    }

    async fn request_accounts(&self, consent: Consent) -> Result<Vec<Connection>> {
        let password = match consent {
            Consent::Granted {
                password: Some(password),
            } => password,
            Consent::Granted { password: None } => {
                return Err(PortalError::rejected("no password supplied"));
            }
            Consent::Declined => {
                return Err(PortalError::rejected("user declined the request"));
            }
        };
        let descriptor = self.descriptor.clone();
        // scrypt key derivation is deliberately slow
        let signer =
            tokio::task::spawn_blocking(move || unlock_wallet(&descriptor, &password))
                .await
                .map_err(PortalError::rejected)?
                .map_err(PortalError::rejected)?;
        if let Ok(mut guard) = self.unlocked.lock() {
            *guard = Some(signer.clone());
        }
        Ok(vec![Connection::from(Authority::LocalKey(signer))])
    }

    fn needs_password(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub enum WalletSource {
    Node(NodeWallet),
    Keystore(KeystoreWallet),
}

impl WalletSource {
    pub fn label(&self) -> String {
        match self {
            WalletSource::Node(_) => String::from("node accounts"),
            WalletSource::Keystore(wallet) => format!("keystore '{}'", wallet.name()),
        }
    }
}

impl WalletProvider for WalletSource {
    async fn accounts(&self) -> Result<Vec<Connection>> {
        match self {
            WalletSource::Node(wallet) => wallet.accounts().await,
            WalletSource::Keystore(wallet) => wallet.accounts().await,
        }
    }

    async fn request_accounts(&self, consent: Consent) -> Result<Vec<Connection>> {
        match self {
            WalletSource::Node(wallet) => wallet.request_accounts(consent).await,
            WalletSource::Keystore(wallet) => wallet.request_accounts(consent).await,
        }
    }

    fn needs_password(&self) -> bool {
        matches!(self, WalletSource::Keystore(_))
    }
}

/// Resolves the wallet identity. `None` means no provider is installed.
pub struct ConnectionGateway<W> {
    provider: Option<W>,
}

impl<W: WalletProvider> ConnectionGateway<W> {
    pub fn new(provider: Option<W>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> Option<&W> {
        self.provider.as_ref()
    }

    /// Looks for an already-authorized account without prompting.
    pub async fn detect_existing_connection(&self) -> Option<Connection> {
        let Some(provider) = &self.provider else {
            warn!("no wallet provider configured; skipping account detection");
            return None;
        };
        match provider.accounts().await {
            Ok(accounts) => match accounts.into_iter().next() {
                Some(connection) => {
                    info!(identity = %connection.identity, "found authorized account");
                    Some(connection)
                }
                None => {
                    info!("no authorized account found");
                    None
                }
            },
            Err(err) => {
                warn!(?err, "account detection failed");
                None
            }
        }
    }

    pub async fn request_connection(&self, consent: Consent) -> Result<Connection> {
        let provider = self.provider.as_ref().ok_or(PortalError::ProviderMissing)?;
        let connection = provider
            .request_accounts(consent)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortalError::rejected("no account was authorized"))?;
        info!(identity = %connection.identity, "connected");
        Ok(connection)
    }
}

pub fn default_wallet_dir() -> eyre::Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".wave-portal").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> eyre::Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> eyre::Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if ext != "wallet" && ext != "json" {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> eyre::Result<Option<WalletDescriptor>> {
    Ok(list_wallets(dir)?.into_iter().find(|w| w.name == name))
}

pub fn unlock_wallet(
    descriptor: &WalletDescriptor,
    password: &str,
) -> eyre::Result<PrivateKeySigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;

    if secret.len() == 32
        && let Ok(signer) = PrivateKeySigner::from_slice(&secret)
    {
        return Ok(signer);
    }

    if let Ok(mnemonic) = std::str::from_utf8(&secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            let signer = MnemonicBuilder::<English>::default()
                .phrase(mnemonic.trim())
                .build()
                .wrap_err("Failed to derive key from mnemonic")?;
            return Ok(signer);
        }
    }

    Err(eyre!(
        "Wallet '{}' contained unsupported key material",
        descriptor.name
    ))
}
