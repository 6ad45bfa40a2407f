use crate::{
    entry::Entry,
    error::{
        PortalError,
        Result,
    },
    ledger::Ledger,
};

/// Reads the whole wave history in one call and projects it into entries,
/// preserving ledger order.
///
/// There is no pagination: the full history has to fit in a single
/// `getAllWaves` response. Past that size this call is the limit.
pub async fn load_all<L: Ledger>(ledger: &L) -> Result<Vec<Entry>> {
    let waves = ledger.all_waves().await?;
    let entries: Vec<Entry> = waves.into_iter().map(Entry::from).collect();
    tracing::info!(count = entries.len(), "loaded wave history");
    Ok(entries)
}

pub async fn total_waves<L: Ledger>(ledger: &L) -> Result<u64> {
    let total = ledger.total_waves().await?;
    u64::try_from(total).map_err(PortalError::read)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        ledger::RemoteWave,
        test_helpers::FakeLedger,
    };
    use alloy::primitives::U256;
    use chrono::DateTime;
    use proptest::prelude::*;

    fn remote(waver: &str, secs: u64, message: &str) -> RemoteWave {
        RemoteWave {
            waver: waver.to_owned(),
            timestamp: U256::from(secs),
            message: message.to_owned(),
        }
    }

    #[tokio::test]
    async fn load_all__projects_single_record() {
        // given
        let ledger = FakeLedger::with_waves(vec![remote("0xAA", 1000, "hi")]);

        // when
        let entries = load_all(&ledger).await.unwrap();

        // then
        let expected = vec![Entry {
            address: String::from("0xAA"),
            timestamp: DateTime::from_timestamp_millis(1_000_000).unwrap(),
            message: String::from("hi"),
        }];
        assert_eq!(entries, expected);
    }

    #[tokio::test]
    async fn load_all__maps_failure_to_read_unavailable() {
        // given
        let ledger = FakeLedger::default();
        ledger.fail_reads();

        // when
        let result = load_all(&ledger).await;

        // then
        assert!(matches!(result, Err(PortalError::ReadUnavailable(_))));
    }

    #[tokio::test]
    async fn total_waves__reads_count() {
        // given
        let ledger = FakeLedger::with_waves(vec![
            remote("0xAA", 1, "a"),
            remote("0xBB", 2, "b"),
        ]);

        // when
        let total = total_waves(&ledger).await.unwrap();

        // then
        assert_eq!(total, 2);
    }

    proptest! {
        #[test]
        fn load_all__keeps_length_order_and_scaled_timestamps(
            records in prop::collection::vec(("[a-f0-9]{4}", 0u64..4_000_000_000, ".{0,12}"), 0..20)
        ) {
            let waves: Vec<RemoteWave> = records
                .iter()
                .map(|(addr, secs, msg)| remote(&format!("0x{addr}"), *secs, msg))
                .collect();
            let ledger = FakeLedger::with_waves(waves.clone());
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

            let entries = runtime.block_on(load_all(&ledger)).unwrap();

            prop_assert_eq!(entries.len(), waves.len());
            for (entry, wave) in entries.iter().zip(&waves) {
                prop_assert_eq!(&entry.address, &wave.waver);
                prop_assert_eq!(&entry.message, &wave.message);
                let secs = u64::try_from(wave.timestamp).unwrap() as i64;
                prop_assert_eq!(entry.timestamp.timestamp_millis(), secs * 1000);
            }
        }
    }
}
