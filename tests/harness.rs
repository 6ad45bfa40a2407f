#![allow(non_snake_case)]

use alloy::primitives::U256;
use std::sync::Arc;
use tokio::sync::mpsc;
use wave_portal::{
    client::{
        AppController,
        Channels,
        Flow,
    },
    ledger::{
        LedgerEvent,
        RemoteWave,
    },
    reconciler::{
        self,
        Reconciled,
    },
    state::DedupPolicy,
    submission::SubmissionUpdate,
    test_helpers::{
        FakeLedger,
        FakeWallet,
    },
    ui::UserEvent,
};

fn remote(waver: &str, secs: u64, message: &str) -> RemoteWave {
    RemoteWave {
        waver: waver.to_owned(),
        timestamp: U256::from(secs),
        message: message.to_owned(),
    }
}

async fn connect(
    controller: &mut AppController<FakeLedger, FakeWallet>,
    channels: &mut Channels,
) {
    controller.on_startup();
    // Connected, SnapshotLoaded, TotalWaves
    for _ in 0..3 {
        let event = channels.tasks.recv().await.unwrap();
        controller.handle_task_event(event);
    }
}

async fn settle_submission(
    controller: &mut AppController<FakeLedger, FakeWallet>,
    channels: &mut Channels,
) -> Vec<(bool, bool, String)> {
    let mut trace = Vec::new();
    while let Some(update) = channels.submissions.recv().await {
        let terminal = !matches!(update, SubmissionUpdate::Sent { .. });
        controller.handle_submission_update(update);
        let state = controller.state();
        trace.push((
            state.pending().in_flight,
            state.pending().transaction_id.is_some(),
            state.input().to_owned(),
        ));
        if terminal {
            break;
        }
    }
    trace
}

#[tokio::test]
async fn wave_round_trip__entry_arrives_through_the_event_stream() {
    // given
    let ledger = FakeLedger::with_waves(vec![remote("0xAA", 1000, "hi")]);
    let feed = ledger.event_sender();
    let wallet = FakeWallet::with_accounts(["0xBB"]);
    let (mut controller, mut channels) =
        AppController::new(ledger.clone(), Some(wallet), 300_000, DedupPolicy::default());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let _subscription = reconciler::subscribe(controller.ledger(), events_tx);
    connect(&mut controller, &mut channels).await;
    assert_eq!(
        controller.state().entries()[0].timestamp.timestamp_millis(),
        1_000_000
    );
    for c in "hello".chars() {
        controller.handle_user_event(UserEvent::Input(c));
    }

    // when
    controller.handle_user_event(UserEvent::Submit);
    assert!(controller.state().pending().in_flight);
    let trace = settle_submission(&mut controller, &mut channels).await;
    feed.send(Ok(LedgerEvent::NewWave {
        from: String::from("0xBB"),
        timestamp: U256::from(2000u64),
        message: String::from("hello"),
    }))
    .unwrap();
    let echoed = events_rx.recv().await.unwrap();
    let outcome = controller.handle_ledger_event(echoed);

    // then
    assert_eq!(
        trace,
        vec![
            (true, true, String::from("hello")),
            (false, false, String::new()),
        ]
    );
    assert_eq!(ledger.sent(), vec![(String::from("hello"), 300_000)]);
    assert_eq!(outcome, Reconciled::Appended);
    let messages: Vec<_> = controller
        .state()
        .entries()
        .iter()
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(messages, vec!["hi", "hello"]);
    assert_eq!(controller.state().total_waves(), Some(2));
}

#[tokio::test]
async fn wave_round_trip__failed_confirmation_keeps_message_for_retry() {
    // given
    let ledger = FakeLedger::default();
    ledger.fail_confirmations();
    let wallet = FakeWallet::with_accounts(["0xBB"]);
    let (mut controller, mut channels) =
        AppController::new(ledger.clone(), Some(wallet), 300_000, DedupPolicy::default());
    connect(&mut controller, &mut channels).await;
    controller.handle_user_event(UserEvent::Input('x'));

    // when
    controller.handle_user_event(UserEvent::Submit);
    let trace = settle_submission(&mut controller, &mut channels).await;

    // then
    assert_eq!(trace.last(), Some(&(false, false, String::from("x"))));
    assert!(controller.state().can_submit());
}

#[tokio::test]
async fn awarded__prize_dialog_shows_until_dismissed() {
    // given
    let wallet = FakeWallet::with_accounts(["0xAA"]);
    let (mut controller, mut channels) = AppController::new(
        FakeLedger::default(),
        Some(wallet),
        300_000,
        DedupPolicy::default(),
    );
    connect(&mut controller, &mut channels).await;

    // when
    controller.handle_ledger_event(LedgerEvent::Awarded {
        from: String::from("0xaa"),
        prize: U256::from(5_000_000_000_000_000_000u64),
    });
    let shown = controller.state().prize().clone();
    let flow = controller.handle_user_event(UserEvent::DismissPrize);

    // then
    assert!(shown.visible);
    assert_eq!(shown.amount, "5.0");
    assert_eq!(flow, Flow::Continue);
    assert!(!controller.state().prize().visible);
}

#[tokio::test]
async fn dedup_entries__replayed_snapshot_wave_is_dropped() {
    // given
    let ledger = FakeLedger::with_waves(vec![remote("0xAA", 1000, "hi")]);
    let wallet = FakeWallet::with_accounts(["0xAA"]);
    let (mut controller, mut channels) = AppController::new(
        ledger,
        Some(wallet),
        300_000,
        DedupPolicy::DropReplayed,
    );
    connect(&mut controller, &mut channels).await;

    // when
    let outcome = controller.handle_ledger_event(LedgerEvent::NewWave {
        from: String::from("0xaa"),
        timestamp: U256::from(1000u64),
        message: String::from("hi"),
    });

    // then
    assert_eq!(outcome, Reconciled::DroppedReplay);
    assert_eq!(controller.state().entries().len(), 1);
}

#[tokio::test]
async fn subscription__is_active_while_stream_is_open() {
    // given
    let ledger = Arc::new(FakeLedger::default());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let subscription = reconciler::subscribe(ledger, events_tx);
    tokio::task::yield_now().await;

    // when
    let active = subscription.is_active();
    subscription.unsubscribe();

    // then
    assert!(active);
}
