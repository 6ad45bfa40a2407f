use crate::entry::Entry;

/// Whether a live `NewWave` already present in the list is appended again.
///
/// Snapshot load and subscription start race each other, so the same wave can
/// arrive through both paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    #[default]
    KeepDuplicates,
    DropReplayed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingSubmission {
    pub transaction_id: Option<String>,
    pub in_flight: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrizeNotification {
    pub amount: String,
    pub visible: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitRejected {
    Empty,
    InFlight,
}

/// The single owned client state. Only the application loop holds it and
/// every change goes through one of the transition methods below.
#[derive(Clone, Debug, Default)]
pub struct PortalState {
    identity: Option<String>,
    entries: Vec<Entry>,
    pending: PendingSubmission,
    prize: PrizeNotification,
    input: String,
    total_waves: Option<u64>,
    dedup: DedupPolicy,
    status: String,
    alerts: Vec<String>,
}

impl PortalState {
    pub fn new(dedup: DedupPolicy) -> Self {
        Self {
            dedup,
            status: String::from("Ready"),
            ..Self::default()
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn pending(&self) -> &PendingSubmission {
        &self.pending
    }

    pub fn prize(&self) -> &PrizeNotification {
        &self.prize
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn total_waves(&self) -> Option<u64> {
        self.total_waves
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    /// The send affordance is live only with text and nothing in flight.
    pub fn can_submit(&self) -> bool {
        !self.input.is_empty() && !self.pending.in_flight
    }

    /// Typing is accepted once connected and while nothing is in flight.
    pub fn input_editable(&self) -> bool {
        self.identity.is_some() && !self.pending.in_flight
    }

    pub fn connect(&mut self, identity: impl Into<String>) {
        self.identity = Some(identity.into());
        self.alerts.clear();
    }

    pub fn replace_entries(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
    }

    /// Appends a live wave. Returns `false` when the entry was dropped as a
    /// replay under [`DedupPolicy::DropReplayed`].
    pub fn apply_new_wave(&mut self, entry: Entry) -> bool {
        if self.dedup == DedupPolicy::DropReplayed
            && self.entries.iter().any(|known| known.same_wave(&entry))
        {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Shows the prize dialog if `from` is the identity held right now.
    pub fn apply_award(&mut self, from: &str, amount: String) -> bool {
        let Some(identity) = self.identity.as_deref() else {
            return false;
        };
        if !identity.eq_ignore_ascii_case(from) {
            return false;
        }
        self.prize = PrizeNotification {
            amount,
            visible: true,
        };
        true
    }

    pub fn dismiss_prize(&mut self) {
        self.prize.visible = false;
    }

    pub fn set_total_waves(&mut self, total: u64) {
        self.total_waves = Some(total);
    }

    pub fn push_input(&mut self, c: char) {
        self.input.push(c);
    }

    pub fn pop_input(&mut self) {
        self.input.pop();
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// `Idle -> Submitting`. Hands back the message to send.
    pub fn begin_submission(&mut self) -> Result<String, SubmitRejected> {
        if self.pending.in_flight {
            return Err(SubmitRejected::InFlight);
        }
        if self.input.is_empty() {
            return Err(SubmitRejected::Empty);
        }
        self.pending = PendingSubmission {
            transaction_id: None,
            in_flight: true,
        };
        Ok(self.input.clone())
    }

    pub fn submission_sent(&mut self, tx_hash: impl Into<String>) {
        if self.pending.in_flight {
            self.pending.transaction_id = Some(tx_hash.into());
        }
    }

    /// `Submitting -> Confirmed -> Idle`: the input is consumed.
    pub fn submission_confirmed(&mut self) {
        self.pending = PendingSubmission::default();
        self.input.clear();
    }

    /// `Submitting -> Failed -> Idle`: the input is kept for another try.
    pub fn submission_failed(&mut self) {
        self.pending = PendingSubmission::default();
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// A message the user must see, such as a missing wallet provider.
    pub fn alert(&mut self, message: impl Into<String>) {
        self.alerts.push(message.into());
        if self.alerts.len() > 5 {
            let drop = self.alerts.len() - 5;
            self.alerts.drain(0..drop);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use alloy::primitives::U256;

    fn entry(address: &str, secs: u64, message: &str) -> Entry {
        Entry::new(address, U256::from(secs), message)
    }

    #[test]
    fn input_editable__requires_identity_and_idle_submission() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        let disconnected = state.input_editable();
        state.connect("0xAA");
        let connected = state.input_editable();
        state.set_input("hi");

        // when
        state.begin_submission().unwrap();

        // then
        assert!(!disconnected);
        assert!(connected);
        assert!(!state.input_editable());
    }

    #[test]
    fn apply_new_wave__appends_to_end_without_touching_existing() {
        // given
        let mut state = PortalState::new(DedupPolicy::KeepDuplicates);
        let existing = vec![entry("0xAA", 1, "one"), entry("0xBB", 2, "two")];
        state.replace_entries(existing.clone());

        // when
        let appended = state.apply_new_wave(entry("0xCC", 3, "three"));

        // then
        assert!(appended);
        assert_eq!(state.entries().len(), 3);
        assert_eq!(&state.entries()[..2], existing.as_slice());
        assert_eq!(state.entries()[2], entry("0xCC", 3, "three"));
    }

    #[test]
    fn apply_new_wave__keeps_replayed_entry_by_default() {
        // given
        let mut state = PortalState::new(DedupPolicy::KeepDuplicates);
        state.replace_entries(vec![entry("0xAA", 1, "hi")]);

        // when
        state.apply_new_wave(entry("0xAA", 1, "hi"));

        // then
        assert_eq!(state.entries().len(), 2);
    }

    #[test]
    fn apply_new_wave__drops_replayed_entry_when_deduplicating() {
        // given
        let mut state = PortalState::new(DedupPolicy::DropReplayed);
        state.replace_entries(vec![entry("0xAA", 1, "hi")]);

        // when
        let appended = state.apply_new_wave(entry("0xaa", 1, "hi"));

        // then
        assert!(!appended);
        assert_eq!(state.entries().len(), 1);
    }

    #[test]
    fn apply_award__matches_identity_case_insensitively() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        state.connect("0xAA");

        // when
        let shown = state.apply_award("0xaa", String::from("5.0"));

        // then
        assert!(shown);
        assert_eq!(
            state.prize(),
            &PrizeNotification {
                amount: String::from("5.0"),
                visible: true,
            }
        );
    }

    #[test]
    fn apply_award__ignores_other_addresses() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        state.connect("0xAA");

        // when
        let shown = state.apply_award("0xBB", String::from("1.0"));

        // then
        assert!(!shown);
        assert_eq!(state.prize(), &PrizeNotification::default());
    }

    #[test]
    fn apply_award__uses_identity_set_after_startup() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        assert!(!state.apply_award("0xAA", String::from("1.0")));

        // when
        state.connect("0xAA");
        let shown = state.apply_award("0xAA", String::from("1.0"));

        // then
        assert!(shown);
    }

    #[test]
    fn dismiss_prize__hides_dialog_and_keeps_amount() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        state.connect("0xAA");
        state.apply_award("0xAA", String::from("0.5"));

        // when
        state.dismiss_prize();

        // then
        assert!(!state.prize().visible);
        assert_eq!(state.prize().amount, "0.5");
    }

    #[test]
    fn begin_submission__rejects_empty_input() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());

        // when
        let result = state.begin_submission();

        // then
        assert_eq!(result, Err(SubmitRejected::Empty));
        assert!(!state.pending().in_flight);
    }

    #[test]
    fn begin_submission__rejects_second_submit_while_in_flight() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        state.set_input("hello");
        state.begin_submission().unwrap();

        // when
        let result = state.begin_submission();

        // then
        assert_eq!(result, Err(SubmitRejected::InFlight));
    }

    #[test]
    fn submission_confirmed__clears_pending_and_input() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        state.set_input("hello");
        state.begin_submission().unwrap();
        state.submission_sent("0xhash");

        // when
        state.submission_confirmed();

        // then
        assert_eq!(state.pending(), &PendingSubmission::default());
        assert_eq!(state.input(), "");
    }

    #[test]
    fn submission_failed__clears_pending_but_keeps_input() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());
        state.set_input("hello");
        state.begin_submission().unwrap();
        state.submission_sent("0xhash");

        // when
        state.submission_failed();

        // then
        assert_eq!(state.pending(), &PendingSubmission::default());
        assert_eq!(state.input(), "hello");
    }

    #[test]
    fn alert__keeps_only_latest_messages() {
        // given
        let mut state = PortalState::new(DedupPolicy::default());

        // when
        for i in 0..8 {
            state.alert(format!("alert {i}"));
        }

        // then
        assert_eq!(state.alerts().len(), 5);
        assert_eq!(state.alerts()[0], "alert 3");
    }
}
