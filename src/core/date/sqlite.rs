use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::ledger::{DayLedger, DayRecord, RotationOutcome, RotationSource};

// How long a connection waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteDayLedger {
    db: Arc<Mutex<Connection>>,
}

impl SqliteDayLedger {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Connection::open(path)?;
        info!("Opened day ledger at {}", path.display());
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.busy_timeout(BUSY_TIMEOUT)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS day_ledger (
                day_index INTEGER PRIMARY KEY,
                date INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS day_appearances (
                day_index INTEGER NOT NULL,
                shown_at INTEGER NOT NULL,
                PRIMARY KEY (day_index, shown_at)
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_day_appearances_shown_at ON day_appearances(shown_at)",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

fn load_record(db: &Connection, day_index: i64) -> rusqlite::Result<Option<DayRecord>> {
    let date: Option<i64> = db
        .query_row(
            "SELECT date FROM day_ledger WHERE day_index = ?1",
            params![day_index],
            |row| row.get(0),
        )
        .optional()?;

    let Some(date) = date else {
        return Ok(None);
    };

    let mut stmt = db.prepare(
        "SELECT shown_at FROM day_appearances WHERE day_index = ?1 ORDER BY shown_at ASC",
    )?;
    let rows = stmt.query_map(params![day_index], |row| row.get::<_, i64>(0))?;

    let mut appearances = BTreeSet::new();
    for row in rows {
        appearances.insert(row?);
    }

    Ok(Some(DayRecord {
        day_index,
        date,
        appearances,
    }))
}

/// Never-shown days sort first, then days already shown at `candidate`.
fn claim_in(db: &Connection, candidate: i64) -> rusqlite::Result<Option<DayRecord>> {
    let chosen: Option<i64> = db
        .query_row(
            "SELECT l.day_index FROM day_ledger l
             WHERE NOT EXISTS (SELECT 1 FROM day_appearances a WHERE a.day_index = l.day_index)
                OR EXISTS (SELECT 1 FROM day_appearances a
                           WHERE a.day_index = l.day_index AND a.shown_at = ?1)
             ORDER BY EXISTS (SELECT 1 FROM day_appearances a WHERE a.day_index = l.day_index) ASC,
                      l.day_index ASC
             LIMIT 1",
            params![candidate],
            |row| row.get(0),
        )
        .optional()?;

    let Some(day_index) = chosen else {
        return Ok(None);
    };

    db.execute(
        "INSERT OR IGNORE INTO day_appearances (day_index, shown_at) VALUES (?1, ?2)",
        params![day_index, candidate],
    )?;
    debug!("Claimed day {} for candidate {}", day_index, candidate);
    load_record(db, day_index)
}

fn pin_in(db: &Connection, day_index: i64, date: i64, shown_at: i64) -> Result<DayRecord> {
    let inserted = db.execute(
        "INSERT OR IGNORE INTO day_ledger (day_index, date) VALUES (?1, ?2)",
        params![day_index, date],
    )?;
    if inserted > 0 {
        db.execute(
            "INSERT OR IGNORE INTO day_appearances (day_index, shown_at) VALUES (?1, ?2)",
            params![day_index, shown_at],
        )?;
    }

    load_record(db, day_index)?
        .ok_or_else(|| anyhow::anyhow!("day {} missing right after pin", day_index))
}

#[async_trait]
impl DayLedger for SqliteDayLedger {
    async fn find_by_day_index(&self, day_index: i64) -> Result<Option<DayRecord>> {
        let db = self.db.lock().await;
        Ok(load_record(&db, day_index)?)
    }

    async fn assign_rotation(
        &self,
        day_index: i64,
        candidate: i64,
        wrapped: i64,
    ) -> Result<RotationOutcome> {
        let mut db = self.db.lock().await;
        // IMMEDIATE takes the write lock up front, so another connection to the
        // same file cannot slip in between the lookup and the claim.
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(record) = load_record(&tx, day_index)? {
            tx.commit()?;
            return Ok(RotationOutcome {
                record,
                source: RotationSource::Pinned,
            });
        }

        let (date, source) = match claim_in(&tx, candidate)? {
            Some(claimed) => (
                claimed.date,
                RotationSource::Claimed {
                    day_index: claimed.day_index,
                },
            ),
            None => (wrapped, RotationSource::Wrapped),
        };
        let record = pin_in(&tx, day_index, date, candidate)?;
        tx.commit()?;
        Ok(RotationOutcome { record, source })
    }

    async fn claim_unseen_or_matching(&self, candidate: i64) -> Result<Option<DayRecord>> {
        let mut db = self.db.lock().await;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let record = claim_in(&tx, candidate)?;
        tx.commit()?;
        Ok(record)
    }

    async fn pin(&self, day_index: i64, date: i64, shown_at: i64) -> Result<DayRecord> {
        let mut db = self.db.lock().await;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let record = pin_in(&tx, day_index, date, shown_at)?;
        tx.commit()?;
        Ok(record)
    }

    async fn register_day(&self, day_index: i64, date: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO day_ledger (day_index, date) VALUES (?1, ?2)",
            params![day_index, date],
        )?;
        Ok(inserted > 0)
    }

    async fn list(&self) -> Result<Vec<DayRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT day_index FROM day_ledger ORDER BY day_index ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut indices = Vec::new();
        for row in rows {
            indices.push(row?);
        }

        let mut results = Vec::with_capacity(indices.len());
        for day_index in indices {
            if let Some(record) = load_record(&db, day_index)? {
                results.push(record);
            }
        }
        Ok(results)
    }

    async fn latest_date(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        let latest: Option<i64> =
            db.query_row("SELECT MAX(date) FROM day_ledger", [], |row| row.get(0))?;
        Ok(latest)
    }
}
