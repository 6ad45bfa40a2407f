use crate::{
    error::{
        PortalError,
        Result,
    },
    ledger::Ledger,
    snapshot,
    state::{
        PortalState,
        SubmitRejected,
    },
};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{
    error,
    info,
};

pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

/// Progress of one submission, reported back to the owner of the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionUpdate {
    Sent { tx_hash: String },
    Confirmed { tx_hash: String, total_waves: u64 },
    Failed(PortalError),
}

/// Drives `Idle -> Submitting -> {Confirmed, Failed} -> Idle`.
///
/// The single-flight guard lives in [`PortalState::begin_submission`]: a
/// second `submit` while one is in flight is rejected before any network call.
pub struct SubmissionController<L> {
    ledger: Arc<L>,
    gas_limit: u64,
}

impl<L: Ledger> SubmissionController<L> {
    pub fn new(ledger: Arc<L>, gas_limit: u64) -> Self {
        Self { ledger, gas_limit }
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Starts submitting the current input. Progress arrives on `updates` and
    /// must be fed back through [`apply`].
    pub fn submit(
        &self,
        state: &mut PortalState,
        updates: mpsc::UnboundedSender<SubmissionUpdate>,
    ) -> std::result::Result<JoinHandle<()>, SubmitRejected> {
        let message = state.begin_submission()?;
        state.set_status("Sending a high five...");
        let ledger = self.ledger.clone();
        let gas_limit = self.gas_limit;
        Ok(tokio::spawn(async move {
            let outcome = drive(ledger.as_ref(), &message, gas_limit, &updates).await;
            let update = match outcome {
                Ok((tx_hash, total_waves)) => SubmissionUpdate::Confirmed {
                    tx_hash,
                    total_waves,
                },
                Err(err) => {
                    error!(error = %err, "wave submission failed");
                    SubmissionUpdate::Failed(err)
                }
            };
            let _ = updates.send(update);
        }))
    }
}

async fn drive<L: Ledger>(
    ledger: &L,
    message: &str,
    gas_limit: u64,
    updates: &mpsc::UnboundedSender<SubmissionUpdate>,
) -> Result<(String, u64)> {
    let count = snapshot::total_waves(ledger).await?;
    info!(count, "retrieved total high fives");

    let pending = ledger.send_wave(message, gas_limit).await?;
    let tx_hash = pending.tx_hash().to_owned();
    info!(%tx_hash, "mining");
    let _ = updates.send(SubmissionUpdate::Sent {
        tx_hash: tx_hash.clone(),
    });

    pending.confirmed().await?;
    info!(%tx_hash, "mined");

    let count = snapshot::total_waves(ledger).await?;
    info!(count, "retrieved total high fives");
    Ok((tx_hash, count))
}

/// Applies one progress update to the store.
///
/// The new wave itself is not appended here; it shows up when the ledger
/// echoes it back as a `NewWave` event.
pub fn apply(state: &mut PortalState, update: SubmissionUpdate) {
    match update {
        SubmissionUpdate::Sent { tx_hash } => {
            state.set_status(format!("Mining {tx_hash}..."));
            state.submission_sent(tx_hash);
        }
        SubmissionUpdate::Confirmed {
            tx_hash,
            total_waves,
        } => {
            state.set_total_waves(total_waves);
            state.set_status(format!("Mined {tx_hash}"));
            state.submission_confirmed();
        }
        SubmissionUpdate::Failed(_) => {
            state.set_status("Ready");
            state.submission_failed();
        }
    }
}
