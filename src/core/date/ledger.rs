use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

/// A day index together with the date it is pinned to and every timestamp
/// it has been shown at.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DayRecord {
    pub day_index: i64,
    pub date: i64,
    pub appearances: BTreeSet<i64>,
}

impl DayRecord {
    pub fn has_appeared(&self) -> bool {
        !self.appearances.is_empty()
    }
}

/// How a rotation-mode resolution arrived at its date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationSource {
    /// The day was already pinned.
    Pinned,
    /// An unseen or matching ledger day was claimed.
    Claimed { day_index: i64 },
    /// Nothing could be claimed; the wrapped candidate was used.
    Wrapped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub record: DayRecord,
    pub source: RotationSource,
}

/// Persisted day-appearance ledger consulted by rotation-mode resolution.
///
/// Every method is a single atomic operation against the store.
#[async_trait]
pub trait DayLedger: Send + Sync {
    async fn find_by_day_index(&self, day_index: i64) -> Result<Option<DayRecord>>;

    /// Find, claim and pin as one atomic step, also across processes sharing
    /// the store. Returns the existing pin for `day_index` if there is one.
    /// Otherwise claims a day for `candidate` (falling back to `wrapped`) and
    /// pins `day_index` to the chosen date.
    async fn assign_rotation(
        &self,
        day_index: i64,
        candidate: i64,
        wrapped: i64,
    ) -> Result<RotationOutcome>;

    /// Pick one record whose appearances are empty or already contain
    /// `candidate`, preferring never-shown records (lowest day index first),
    /// add `candidate` to its appearances and return the updated record.
    async fn claim_unseen_or_matching(&self, candidate: i64) -> Result<Option<DayRecord>>;

    /// Pin `day_index` to `date`, recording an appearance at `shown_at`.
    /// An existing pin is never reassigned; it is returned as stored.
    async fn pin(&self, day_index: i64, date: i64, shown_at: i64) -> Result<DayRecord>;

    /// Seed a known content day with no appearances. Returns false if the
    /// day index is already present.
    async fn register_day(&self, day_index: i64, date: i64) -> Result<bool>;

    async fn list(&self) -> Result<Vec<DayRecord>>;

    /// Newest pinned or registered date, if any.
    async fn latest_date(&self) -> Result<Option<i64>>;
}

/// In-process ledger with the same semantics as the SQLite one.
#[derive(Default)]
pub struct MemoryDayLedger {
    records: Mutex<BTreeMap<i64, DayRecord>>,
}

impl MemoryDayLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn claim_in(records: &mut BTreeMap<i64, DayRecord>, candidate: i64) -> Option<DayRecord> {
    // BTreeMap iterates in day-index order, so the first hit of each kind is the lowest index.
    let unseen = records
        .values()
        .find(|r| !r.has_appeared())
        .map(|r| r.day_index);
    let chosen = unseen.or_else(|| {
        records
            .values()
            .find(|r| r.appearances.contains(&candidate))
            .map(|r| r.day_index)
    })?;

    let record = records.get_mut(&chosen)?;
    record.appearances.insert(candidate);
    Some(record.clone())
}

fn pin_in(
    records: &mut BTreeMap<i64, DayRecord>,
    day_index: i64,
    date: i64,
    shown_at: i64,
) -> DayRecord {
    records
        .entry(day_index)
        .or_insert_with(|| DayRecord {
            day_index,
            date,
            appearances: BTreeSet::from([shown_at]),
        })
        .clone()
}

#[async_trait]
impl DayLedger for MemoryDayLedger {
    async fn find_by_day_index(&self, day_index: i64) -> Result<Option<DayRecord>> {
        let records = self.records.lock().await;
        Ok(records.get(&day_index).cloned())
    }

    async fn assign_rotation(
        &self,
        day_index: i64,
        candidate: i64,
        wrapped: i64,
    ) -> Result<RotationOutcome> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get(&day_index) {
            return Ok(RotationOutcome {
                record: record.clone(),
                source: RotationSource::Pinned,
            });
        }

        let (date, source) = match claim_in(&mut records, candidate) {
            Some(claimed) => (
                claimed.date,
                RotationSource::Claimed {
                    day_index: claimed.day_index,
                },
            ),
            None => (wrapped, RotationSource::Wrapped),
        };
        let record = pin_in(&mut records, day_index, date, candidate);
        Ok(RotationOutcome { record, source })
    }

    async fn claim_unseen_or_matching(&self, candidate: i64) -> Result<Option<DayRecord>> {
        let mut records = self.records.lock().await;
        Ok(claim_in(&mut records, candidate))
    }

    async fn pin(&self, day_index: i64, date: i64, shown_at: i64) -> Result<DayRecord> {
        let mut records = self.records.lock().await;
        Ok(pin_in(&mut records, day_index, date, shown_at))
    }

    async fn register_day(&self, day_index: i64, date: i64) -> Result<bool> {
        let mut records = self.records.lock().await;
        if records.contains_key(&day_index) {
            return Ok(false);
        }
        records.insert(
            day_index,
            DayRecord {
                day_index,
                date,
                appearances: BTreeSet::new(),
            },
        );
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<DayRecord>> {
        let records = self.records.lock().await;
        Ok(records.values().cloned().collect())
    }

    async fn latest_date(&self) -> Result<Option<i64>> {
        let records = self.records.lock().await;
        Ok(records.values().map(|r| r.date).max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_prefers_unseen_days_in_index_order() {
        let ledger = MemoryDayLedger::new();
        ledger.register_day(3, 300).await.unwrap();
        ledger.register_day(1, 100).await.unwrap();

        let first = ledger.claim_unseen_or_matching(42).await.unwrap().unwrap();
        assert_eq!(first.day_index, 1);
        assert!(first.appearances.contains(&42));

        let second = ledger.claim_unseen_or_matching(43).await.unwrap().unwrap();
        assert_eq!(second.day_index, 3);
    }

    #[tokio::test]
    async fn claim_falls_back_to_matching_appearance() {
        let ledger = MemoryDayLedger::new();
        ledger.register_day(0, 10).await.unwrap();
        ledger.claim_unseen_or_matching(500).await.unwrap();

        let again = ledger.claim_unseen_or_matching(500).await.unwrap().unwrap();
        assert_eq!(again.day_index, 0);
        assert_eq!(again.appearances.len(), 1);

        assert!(ledger.claim_unseen_or_matching(501).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pin_never_reassigns() {
        let ledger = MemoryDayLedger::new();
        let first = ledger.pin(2, 1000, 1000).await.unwrap();
        let second = ledger.pin(2, 2000, 2000).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.date, 1000);
    }

    #[tokio::test]
    async fn assign_rotation_claims_then_wraps_then_keeps_pins() {
        let ledger = MemoryDayLedger::new();
        ledger.register_day(0, 100).await.unwrap();

        let claimed = ledger.assign_rotation(7, 700, 100).await.unwrap();
        assert_eq!(claimed.source, RotationSource::Claimed { day_index: 0 });
        assert_eq!(claimed.record.date, 100);
        assert_eq!(claimed.record.appearances, BTreeSet::from([700]));

        let wrapped = ledger.assign_rotation(8, 800, 100).await.unwrap();
        assert_eq!(wrapped.source, RotationSource::Wrapped);
        assert_eq!(wrapped.record.date, 100);

        let again = ledger.assign_rotation(7, 999, 555).await.unwrap();
        assert_eq!(again.source, RotationSource::Pinned);
        assert_eq!(again.record, claimed.record);

        let day0 = ledger.find_by_day_index(0).await.unwrap().unwrap();
        assert_eq!(day0.appearances, BTreeSet::from([700]));
    }

    #[tokio::test]
    async fn register_is_idempotent_and_latest_tracks_max() {
        let ledger = MemoryDayLedger::new();
        assert_eq!(ledger.latest_date().await.unwrap(), None);
        assert!(ledger.register_day(0, 10).await.unwrap());
        assert!(!ledger.register_day(0, 99).await.unwrap());
        ledger.pin(5, 50, 50).await.unwrap();
        assert_eq!(ledger.latest_date().await.unwrap(), Some(50));
        assert_eq!(ledger.list().await.unwrap().len(), 2);
    }
}
