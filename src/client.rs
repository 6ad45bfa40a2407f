use crate::{
    config::{
        AppConfig,
        WalletConfig,
    },
    entry::Entry,
    error::PortalError,
    ledger::{
        Ledger,
        LedgerEvent,
        RpcLedger,
    },
    reconciler::{
        self,
        Reconciled,
    },
    snapshot,
    state::{
        DedupPolicy,
        PortalState,
        SubmitRejected,
    },
    submission::{
        self,
        SubmissionController,
        SubmissionUpdate,
    },
    ui,
    wallets::{
        self,
        Connection,
        ConnectionGateway,
        Consent,
        KeystoreWallet,
        NodeWallet,
        WalletProvider,
        WalletSource,
    },
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{
    debug,
    error,
    info,
    warn,
};

pub const PROVIDER_MISSING_ALERT: &str =
    "No wallet provider found. Start with --wallet <name> or use a node that manages accounts.";

/// Results of background work, reported back to the application loop.
#[derive(Debug)]
pub enum TaskEvent {
    Connected(Connection),
    ConnectionFailed(PortalError),
    SnapshotLoaded(Vec<Entry>),
    SnapshotFailed(PortalError),
    TotalWaves(u64),
}

/// What the loop does after a user event has been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    PromptPassword,
    Quit,
}

pub struct Channels {
    pub tasks: mpsc::UnboundedReceiver<TaskEvent>,
    pub submissions: mpsc::UnboundedReceiver<SubmissionUpdate>,
}

/// Owns the [`PortalState`] and is the only thing that mutates it. Network
/// work is spawned and comes back through [`Channels`].
pub struct AppController<L, W> {
    ledger: Arc<L>,
    gateway: Arc<ConnectionGateway<W>>,
    writer: Option<SubmissionController<L>>,
    gas_limit: u64,
    state: PortalState,
    task_tx: mpsc::UnboundedSender<TaskEvent>,
    submission_tx: mpsc::UnboundedSender<SubmissionUpdate>,
}

impl<L: Ledger, W: WalletProvider> AppController<L, W> {
    pub fn new(
        ledger: L,
        wallet: Option<W>,
        gas_limit: u64,
        dedup: DedupPolicy,
    ) -> (Self, Channels) {
        let (task_tx, tasks) = mpsc::unbounded_channel();
        let (submission_tx, submissions) = mpsc::unbounded_channel();
        let controller = Self {
            ledger: Arc::new(ledger),
            gateway: Arc::new(ConnectionGateway::new(wallet)),
            writer: None,
            gas_limit,
            state: PortalState::new(dedup),
            task_tx,
            submission_tx,
        };
        (controller, Channels { tasks, submissions })
    }

    pub fn state(&self) -> &PortalState {
        &self.state
    }

    pub fn ledger(&self) -> Arc<L> {
        self.ledger.clone()
    }

    /// Looks for an already authorized account without prompting.
    pub fn on_startup(&self) {
        let gateway = self.gateway.clone();
        let tasks = self.task_tx.clone();
        tokio::spawn(async move {
            if let Some(connection) = gateway.detect_existing_connection().await {
                let _ = tasks.send(TaskEvent::Connected(connection));
            }
        });
    }

    pub fn request_connection(&self, consent: Consent) {
        let gateway = self.gateway.clone();
        let tasks = self.task_tx.clone();
        tokio::spawn(async move {
            let event = match gateway.request_connection(consent).await {
                Ok(connection) => TaskEvent::Connected(connection),
                Err(err) => TaskEvent::ConnectionFailed(err),
            };
            let _ = tasks.send(event);
        });
    }

    /// Reads the full history and the wave count. The result replaces the
    /// entry list wholesale when it arrives.
    pub fn load_snapshot(&self) {
        let ledger = self.ledger.clone();
        let tasks = self.task_tx.clone();
        tokio::spawn(async move {
            let event = match snapshot::load_all(ledger.as_ref()).await {
                Ok(entries) => TaskEvent::SnapshotLoaded(entries),
                Err(err) => TaskEvent::SnapshotFailed(err),
            };
            if tasks.send(event).is_err() {
                return;
            }
            match snapshot::total_waves(ledger.as_ref()).await {
                Ok(total) => {
                    let _ = tasks.send(TaskEvent::TotalWaves(total));
                }
                Err(err) => warn!(?err, "total wave count unavailable"),
            }
        });
    }

    pub fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Connected(connection) => self.connected(connection),
            TaskEvent::ConnectionFailed(PortalError::ProviderMissing) => {
                warn!("connection requested without a wallet provider");
                self.state.alert(PROVIDER_MISSING_ALERT);
            }
            TaskEvent::ConnectionFailed(err) => {
                warn!(?err, "connection request failed");
                self.state.set_status("Not connected");
            }
            TaskEvent::SnapshotLoaded(entries) => {
                info!(count = entries.len(), "replacing entries with snapshot");
                self.state.replace_entries(entries);
            }
            TaskEvent::SnapshotFailed(err) => {
                warn!(?err, "snapshot load failed; keeping current entries");
            }
            TaskEvent::TotalWaves(total) => {
                info!(total, "retrieved total high fives");
                self.state.set_total_waves(total);
            }
        }
    }

    fn connected(&mut self, connection: Connection) {
        let Connection {
            identity,
            authority,
        } = connection;
        info!(%identity, "Connected");
        self.state.connect(identity);
        self.state.set_status("Connected");
        match self.ledger.with_authority(&authority) {
            Ok(writer) => {
                self.writer =
                    Some(SubmissionController::new(Arc::new(writer), self.gas_limit));
            }
            Err(err) => error!(?err, "failed to bind the connected account"),
        }
        self.load_snapshot();
    }

    pub fn handle_ledger_event(&mut self, event: LedgerEvent) -> Reconciled {
        reconciler::reconcile(&mut self.state, event)
    }

    pub fn handle_submission_update(&mut self, update: SubmissionUpdate) {
        submission::apply(&mut self.state, update);
    }

    pub fn submit(&mut self) {
        let Some(writer) = &self.writer else {
            warn!("wave attempted before connecting");
            self.state.set_status("Connect a wallet before sending a high five");
            return;
        };
        match writer.submit(&mut self.state, self.submission_tx.clone()) {
            Ok(_) => debug!(gas_limit = writer.gas_limit(), "wave submission started"),
            Err(SubmitRejected::Empty) => debug!("nothing to send"),
            Err(SubmitRejected::InFlight) => debug!("a wave is already in flight"),
        }
    }

    pub fn handle_user_event(&mut self, event: ui::UserEvent) -> Flow {
        match event {
            ui::UserEvent::Quit => return Flow::Quit,
            ui::UserEvent::Connect => {
                if self.state.identity().is_some() {
                    return Flow::Continue;
                }
                if self
                    .gateway
                    .provider()
                    .is_some_and(|provider| provider.needs_password())
                {
                    return Flow::PromptPassword;
                }
                self.request_connection(Consent::Granted { password: None });
            }
            ui::UserEvent::PasswordEntered(password) => {
                self.state.set_status("Unlocking wallet...");
                self.request_connection(Consent::Granted {
                    password: Some(password),
                });
            }
            ui::UserEvent::PasswordCancelled => {
                self.request_connection(Consent::Declined);
            }
            ui::UserEvent::Refresh => {
                if self.state.identity().is_some() {
                    self.load_snapshot();
                }
            }
            ui::UserEvent::Input(c) => {
                if self.state.input_editable() {
                    self.state.push_input(c);
                }
            }
            ui::UserEvent::Backspace => {
                if self.state.input_editable() {
                    self.state.pop_input();
                }
            }
            ui::UserEvent::Submit => self.submit(),
            ui::UserEvent::DismissPrize => self.state.dismiss_prize(),
            ui::UserEvent::Redraw => {}
        }
        Flow::Continue
    }
}

fn wallet_source(config: &AppConfig, ledger: &RpcLedger) -> Result<Option<WalletSource>> {
    match &config.wallet {
        WalletConfig::NodeAccounts => {
            Ok(Some(WalletSource::Node(NodeWallet::new(ledger.provider()))))
        }
        WalletConfig::Keystore { name, dir } => match wallets::find_wallet(dir, name)? {
            Some(descriptor) => {
                info!("Using keystore '{}' at {}", name, descriptor.path.display());
                Ok(Some(WalletSource::Keystore(KeystoreWallet::new(descriptor))))
            }
            None => {
                warn!("Wallet '{}' not found in {}", name, dir.display());
                Ok(None)
            }
        },
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let ledger = RpcLedger::connect(
        config.network.url().clone(),
        config.contract,
        config.poll_interval,
    );
    let wallet = wallet_source(&config, &ledger)?;
    let label = wallet.as_ref().map(WalletSource::label);
    let (controller, channels) =
        AppController::new(ledger, wallet, config.gas_limit, config.dedup);
    let mut ui_state = ui::UiState::new(label, config.network.env().to_string());
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, channels, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop<L: Ledger, W: WalletProvider>(
    mut controller: AppController<L, W>,
    mut channels: Channels,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    let (ledger_tx, mut ledger_rx) = mpsc::unbounded_channel();
    let subscription = reconciler::subscribe(controller.ledger(), ledger_tx);
    controller.on_startup();
    ui::draw(ui_state, controller.state()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            Some(event) = ledger_rx.recv() => {
                let outcome = controller.handle_ledger_event(event);
                debug!(?outcome, "reconciled ledger event");
            }
            Some(event) = channels.tasks.recv() => {
                controller.handle_task_event(event);
            }
            Some(update) = channels.submissions.recv() => {
                controller.handle_submission_update(update);
            }
            _ = tokio::signal::ctrl_c() => break,
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, controller.state(), event) else {
                    continue;
                };
                match controller.handle_user_event(ev) {
                    Flow::Quit => break,
                    Flow::PromptPassword => ui::open_password_prompt(ui_state),
                    Flow::Continue => {}
                }
            }
        }
        ui::draw(ui_state, controller.state()).wrap_err("draw failed")?;
    }

    subscription.unsubscribe();
    tracing::info!("Unsubscribed from ledger events");
    Ok(())
}
