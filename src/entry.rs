use crate::ledger::RemoteWave;
use alloy::primitives::U256;
use chrono::{
    DateTime,
    Utc,
};

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;
const ETHER_DECIMALS: usize = 18;

/// One recorded wave as the client shows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub address: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Entry {
    pub fn new(
        address: impl Into<String>,
        timestamp_secs: U256,
        message: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            timestamp: timestamp_from_secs(timestamp_secs),
            message: message.into(),
        }
    }

    /// Keeps the composite key used when replayed events are dropped.
    pub fn same_wave(&self, other: &Entry) -> bool {
        self.address.eq_ignore_ascii_case(&other.address)
            && self.timestamp == other.timestamp
            && self.message == other.message
    }
}

impl From<RemoteWave> for Entry {
    fn from(wave: RemoteWave) -> Self {
        Entry::new(wave.waver, wave.timestamp, wave.message)
    }
}

/// Ledger timestamps are whole seconds; the instant is built from
/// `seconds * 1000` milliseconds. Values past chrono's range clamp to its
/// maximum so a malformed record still yields an entry.
pub fn timestamp_from_secs(secs: U256) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Formats a wei amount as ether, keeping at least one fractional digit
/// (`5 * 10^18` renders as `"5.0"`).
pub fn format_ether(wei: U256) -> String {
    let unit = U256::from(WEI_PER_ETHER);
    let whole = wei / unit;
    let fractional = wei % unit;
    let digits = format!("{:0>width$}", fractional.to_string(), width = ETHER_DECIMALS);
    let trimmed = digits.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{trimmed}")
    }
}
