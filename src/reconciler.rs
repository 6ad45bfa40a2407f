use crate::{
    entry::{
        Entry,
        format_ether,
    },
    ledger::{
        Ledger,
        LedgerEvent,
    },
    state::PortalState,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{
    debug,
    info,
    warn,
};

/// What a live event did to the local state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciled {
    Appended,
    DroppedReplay,
    PrizeShown { amount: String },
    AwardForOther,
}

/// Merges one ledger event into the store.
///
/// The identity for `Awarded` is read from the store at the time the event is
/// applied, so a connection made after subscribing is honoured.
pub fn reconcile(state: &mut PortalState, event: LedgerEvent) -> Reconciled {
    match event {
        LedgerEvent::NewWave {
            from,
            timestamp,
            message,
        } => {
            debug!(%from, %timestamp, %message, "NewWave");
            if state.apply_new_wave(Entry::new(from, timestamp, message)) {
                Reconciled::Appended
            } else {
                Reconciled::DroppedReplay
            }
        }
        LedgerEvent::Awarded { from, prize } => {
            let amount = format_ether(prize);
            info!(%from, identity = ?state.identity(), %amount, "Awarded");
            if state.apply_award(&from, amount.clone()) {
                Reconciled::PrizeShown { amount }
            } else {
                Reconciled::AwardForOther
            }
        }
    }
}

/// A live subscription to the ledger's event stream. Dropping it unsubscribes.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts forwarding ledger events into `events` until the stream ends, the
/// receiver is dropped, or the subscription is dropped.
pub fn subscribe<L: Ledger>(
    ledger: Arc<L>,
    events: mpsc::UnboundedSender<LedgerEvent>,
) -> Subscription {
    let task = tokio::spawn(async move {
        let mut stream = match ledger.subscribe().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(?err, "event subscription failed");
                return;
            }
        };
        info!("subscribed to NewWave and Awarded");
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    if events.send(event).is_err() {
                        debug!("event receiver dropped; ending subscription");
                        break;
                    }
                }
                Err(err) => warn!(?err, "failed to decode ledger event"),
            }
        }
    });
    Subscription { task }
}
