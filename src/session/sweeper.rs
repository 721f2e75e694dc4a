use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::store::{Collection, SessionStore, Snapshot, StoreError, StorePath, StoreUpdates};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to read session index: {0}")]
    Read(#[source] StoreError),
    #[error("sweep transaction failed for {count} sessions: {source}")]
    Transaction {
        count: usize,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: Vec<String>,
    pub skipped_malformed: Vec<String>,
}

/// Codes whose age has reached the TTL, plus codes whose stored value is not an integer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredScan {
    pub expired: Vec<String>,
    pub malformed: Vec<String>,
}

pub fn collect_expired(snapshot: &Snapshot, now: i64, ttl: Duration) -> ExpiredScan {
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let mut scan = ExpiredScan::default();

    for (code, value) in snapshot.iter() {
        let Some(stored) = value.as_i64() else {
            scan.malformed.push(code.to_string());
            continue;
        };
        if now.saturating_sub(stored) >= ttl_secs {
            scan.expired.push(code.to_string());
        }
    }

    scan
}

/// Delete every session whose timestamp is at least `ttl` old.
///
/// The index entry and the log of every expired session are removed in a single atomic
/// multi-path update; if that update fails nothing is deleted and the next run retries.
pub fn sweep_expired<S>(store: &S, now: i64, ttl: Duration) -> Result<SweepReport, SweepError>
where
    S: SessionStore + ?Sized,
{
    let snapshot = store
        .read_all(Collection::SessionTimestamps)
        .map_err(SweepError::Read)?;
    if snapshot.is_empty() {
        return Ok(SweepReport::default());
    }

    let scan = collect_expired(&snapshot, now, ttl);
    for code in &scan.malformed {
        tracing::warn!(code = %code, "Skipping session with malformed timestamp");
    }

    let report = SweepReport {
        scanned: snapshot.num_children(),
        removed: scan.expired,
        skipped_malformed: scan.malformed,
    };
    if report.removed.is_empty() {
        return Ok(report);
    }

    let mut updates = StoreUpdates::new();
    for code in &report.removed {
        updates.insert(StorePath::SessionTimestamp(code.clone()), None);
        updates.insert(StorePath::SessionLog(code.clone()), None);
    }

    store
        .atomic_multi_update(updates)
        .map_err(|source| SweepError::Transaction {
            count: report.removed.len(),
            source,
        })?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::store::testing::{open_store, seed_session, ProbeStore};

    use super::*;

    const NOW: i64 = 1_700_000_000;
    const TTL: Duration = Duration::from_secs(28_800);

    #[test]
    fn collect_uses_inclusive_ttl_boundary() {
        let snapshot: Snapshot = [
            ("EXACT1".to_string(), json!(NOW - 28_800)),
            ("YOUNG1".to_string(), json!(NOW - 28_799)),
            ("OLD111".to_string(), json!(NOW - 90_000)),
        ]
        .into_iter()
        .collect();

        let scan = collect_expired(&snapshot, NOW, TTL);
        assert_eq!(scan.expired, vec!["EXACT1".to_string(), "OLD111".to_string()]);
        assert!(scan.malformed.is_empty());
    }

    #[test]
    fn collect_skips_non_integer_values() {
        let snapshot: Snapshot = [
            ("TEXT11".to_string(), json!("yesterday")),
            ("FLOAT1".to_string(), json!(12.5)),
            ("NULL11".to_string(), json!(null)),
            ("OLD111".to_string(), json!(1)),
        ]
        .into_iter()
        .collect();

        let scan = collect_expired(&snapshot, NOW, TTL);
        assert_eq!(scan.expired, vec!["OLD111".to_string()]);
        assert_eq!(scan.malformed.len(), 3);
    }

    #[test]
    fn empty_index_is_a_no_op() {
        let (_dir, store) = open_store("sweep_empty.sled");
        let probe = ProbeStore::new(&store);

        let report = sweep_expired(&probe, NOW, TTL).unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(probe.writes(), 0);
    }

    #[test]
    fn nothing_expired_performs_no_write() {
        let (_dir, store) = open_store("sweep_fresh.sled");
        seed_session(&store, "XY99ZZ", NOW - 10);
        let probe = ProbeStore::new(&store);

        let report = sweep_expired(&probe, NOW, TTL).unwrap();

        assert_eq!(report.scanned, 1);
        assert!(report.removed.is_empty());
        assert_eq!(probe.writes(), 0);
    }

    #[test]
    fn removes_index_and_log_together() {
        let (_dir, store) = open_store("sweep_pair.sled");
        seed_session(&store, "AB12CD", NOW - 30_000);
        seed_session(&store, "XY99ZZ", NOW - 10);
        let probe = ProbeStore::new(&store);

        let report = sweep_expired(&probe, NOW, TTL).unwrap();

        assert_eq!(report.removed, vec!["AB12CD".to_string()]);
        assert_eq!(probe.writes(), 1);
        assert_eq!(store.get(&StorePath::SessionTimestamp("AB12CD".into())).unwrap(), None);
        assert!(store.read_log("AB12CD").unwrap().is_empty());
        assert!(store.get(&StorePath::SessionTimestamp("XY99ZZ".into())).unwrap().is_some());
        assert_eq!(store.read_log("XY99ZZ").unwrap().len(), 1);
    }

    #[test]
    fn malformed_entry_does_not_block_others() {
        let (_dir, store) = open_store("sweep_malformed.sled");
        seed_session(&store, "AB12CD", NOW - 30_000);
        store
            .session_timestamps
            .insert("BADTS1".as_bytes(), "\"soon\"".as_bytes())
            .unwrap();

        let report = sweep_expired(&store, NOW, TTL).unwrap();

        assert_eq!(report.removed, vec!["AB12CD".to_string()]);
        assert_eq!(report.skipped_malformed, vec!["BADTS1".to_string()]);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn failed_transaction_deletes_nothing() {
        let (_dir, store) = open_store("sweep_failure.sled");
        seed_session(&store, "AB12CD", NOW - 30_000);
        seed_session(&store, "CD34EF", NOW - 40_000);
        let probe = ProbeStore::new(&store).failing_updates();

        let err = sweep_expired(&probe, NOW, TTL).unwrap_err();

        assert!(matches!(err, SweepError::Transaction { count: 2, .. }));
        assert_eq!(store.session_count(), 2);
        assert_eq!(store.read_log("AB12CD").unwrap().len(), 1);
        assert_eq!(store.read_log("CD34EF").unwrap().len(), 1);
    }
}
