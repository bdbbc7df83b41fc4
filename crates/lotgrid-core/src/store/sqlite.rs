//! SQLite-backed slot store.
//!
//! One row per slot. The occupant is stored as a JSON document and replaced
//! wholesale. Heartbeats are stored as fixed-width RFC 3339 text (UTC,
//! microseconds) so that string comparison in SQL orders them correctly.
//!
//! Every conditional update is a single `UPDATE ... WHERE id = ? AND (...)`,
//! which SQLite applies atomically with its predicate. Relocation reads and
//! writes both rows inside one transaction. If another connection commits in
//! between, SQLite refuses the upgrade to a write lock and nothing is applied.

use std::{path::Path, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqliteConnection, SqlitePool,
};

use super::{AtomicMove, Change, Field, Predicate, SlotPatch, SlotRow, SlotStore};
use crate::{
    notifier::{ChangeNotifier, LocalNotifier},
    types::{ClientId, Occupant, Slot, SlotId, SlotSeed},
    Error, Result,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type RawRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

const SELECT_COLUMNS: &str =
    "SELECT id, label, area, occupant, lease_holder, lease_heartbeat FROM slots";

/// Slot store persisted in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    notifier: Option<Arc<LocalNotifier>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the parent directory cannot be created or the database
    /// cannot be opened or migrated.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io(format!("Failed to create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to open {}: {e}", path.display())))?;

        Self::from_pool(pool).await
    }

    /// A private in-memory database, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection: every connection to :memory: is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self {
            pool,
            notifier: None,
        };
        store.init().await?;
        Ok(store)
    }

    /// Publish a change event after every write that touched rows.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<LocalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS slots (
                id INTEGER PRIMARY KEY,
                label TEXT NOT NULL,
                area TEXT NOT NULL,
                occupant TEXT,
                lease_holder TEXT,
                lease_heartbeat TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    fn announce(&self, affected: u64) {
        if affected > 0 {
            if let Some(notifier) = &self.notifier {
                notifier.publish();
            }
        }
    }
}

#[async_trait::async_trait]
impl SlotStore for SqliteStore {
    async fn select_all(&self) -> Result<Vec<Slot>> {
        let rows: Vec<RawRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter()
            .map(|raw| decode_row(raw).map(SlotRow::into_slot))
            .collect()
    }

    async fn select_one(&self, id: SlotId) -> Result<Option<Slot>> {
        let row: Option<RawRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(|raw| decode_row(raw).map(SlotRow::into_slot))
            .transpose()
    }

    async fn conditional_update(
        &self,
        id: SlotId,
        predicate: &Predicate,
        patch: &SlotPatch,
    ) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE slots SET ");
        push_patch(&mut qb, patch)?;
        qb.push(" WHERE id = ");
        qb.push_bind(id.get());
        qb.push(" AND ");
        push_predicate(&mut qb, predicate);

        let affected = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::write_failed("conditional_update", e))?
            .rows_affected();

        self.announce(affected);
        Ok(affected)
    }

    async fn update(&self, ids: &[SlotId], patch: &SlotPatch) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb = build_update(ids, patch)?;
        let affected = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::write_failed("update", e))?
            .rows_affected();

        self.announce(affected);
        Ok(affected)
    }

    async fn provision(&self, seeds: &[SlotSeed]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::write_failed("provision", e))?;

        let mut inserted = 0;
        for seed in seeds {
            inserted += sqlx::query("INSERT OR IGNORE INTO slots (id, label, area) VALUES (?, ?, ?)")
                .bind(seed.id.get())
                .bind(&seed.label)
                .bind(&seed.area)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::write_failed("provision", e))?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| Error::write_failed("provision", e))?;

        self.announce(inserted);
        Ok(inserted)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn relocate_atomically(&self, source: SlotId, dest: SlotId) -> Result<AtomicMove> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::write_failed("relocate_atomically", e))?;

        let source_row = fetch_row(&mut tx, source).await?;
        let dest_row = fetch_row(&mut tx, dest).await?;
        let Some(occupant) = source_row.occupant else {
            return Ok(AtomicMove::SourceEmpty);
        };

        let mut affected = 0;
        for (id, patch) in [(dest, SlotPatch::place(occupant)), (source, SlotPatch::vacate())] {
            let ids = [id];
            let mut qb = build_update(&ids, &patch)?;
            affected += qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::write_failed("relocate_atomically", e))?
                .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| Error::write_failed("relocate_atomically", e))?;

        self.announce(affected);
        Ok(AtomicMove::Moved {
            bumped: dest_row.occupant,
        })
    }
}

async fn fetch_row(conn: &mut SqliteConnection, id: SlotId) -> Result<SlotRow> {
    let raw: Option<RawRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
    raw.map(decode_row)
        .transpose()?
        .ok_or(Error::SlotNotFound(id))
}

// ═══════════════════════════════════════════════════════════════════════════
// SQL COMPILATION
// ═══════════════════════════════════════════════════════════════════════════

const fn column(field: Field) -> &'static str {
    match field {
        Field::Occupant => "occupant",
        Field::LeaseHolder => "lease_holder",
        Field::LeaseHeartbeat => "lease_heartbeat",
        Field::Area => "area",
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("Invalid heartbeat '{raw}': {e}")))
}

fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) {
    match predicate {
        Predicate::Always => {
            qb.push("1");
        }
        Predicate::IsNull(field) => {
            push_nullable(qb, *field).push(" IS NULL");
        }
        Predicate::IsSet(field) => {
            push_nullable(qb, *field).push(" IS NOT NULL");
        }
        Predicate::Equals(field, value) => {
            qb.push(column(*field)).push(" = ").push_bind(value.clone());
        }
        Predicate::OlderThan(field, instant) => {
            qb.push(column(*field))
                .push(" < ")
                .push_bind(format_timestamp(*instant));
        }
        Predicate::And(terms) => push_group(qb, terms, " AND ", "1"),
        Predicate::Or(terms) => push_group(qb, terms, " OR ", "0"),
    }
}

/// A blank holder counts as no holder, the same as `decode_row` reads it.
fn push_nullable<'q, 'args>(
    qb: &'q mut QueryBuilder<'args, Sqlite>,
    field: Field,
) -> &'q mut QueryBuilder<'args, Sqlite> {
    match field {
        Field::LeaseHolder => qb.push("NULLIF(trim(lease_holder), '')"),
        other => qb.push(column(other)),
    }
}

fn push_group(
    qb: &mut QueryBuilder<'_, Sqlite>,
    terms: &[Predicate],
    joiner: &str,
    identity: &str,
) {
    if terms.is_empty() {
        qb.push(identity);
        return;
    }
    qb.push("(");
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_predicate(qb, term);
    }
    qb.push(")");
}

fn push_patch(qb: &mut QueryBuilder<'_, Sqlite>, patch: &SlotPatch) -> Result<()> {
    let mut assignments = 0;
    let mut assign = |qb: &mut QueryBuilder<'_, Sqlite>, col: &str| {
        if assignments > 0 {
            qb.push(", ");
        }
        assignments += 1;
        qb.push(col).push(" = ");
    };

    match &patch.occupant {
        Change::Keep => {}
        Change::Set(occupant) => {
            let json = serde_json::to_string(occupant)?;
            assign(qb, "occupant");
            qb.push_bind(json);
        }
        Change::Clear => {
            assign(qb, "occupant");
            qb.push("NULL");
        }
    }

    match &patch.lease_holder {
        Change::Keep => {}
        Change::Set(holder) => {
            assign(qb, "lease_holder");
            qb.push_bind(holder.as_str().to_string());
        }
        Change::Clear => {
            assign(qb, "lease_holder");
            qb.push("NULL");
        }
    }

    match &patch.lease_heartbeat {
        Change::Keep => {}
        Change::Set(ts) => {
            assign(qb, "lease_heartbeat");
            qb.push_bind(format_timestamp(*ts));
        }
        Change::Clear => {
            assign(qb, "lease_heartbeat");
            qb.push("NULL");
        }
    }

    if patch.is_empty() {
        // Still a valid statement so the affected count reports matches.
        qb.push("id = id");
    }
    Ok(())
}

fn build_update<'args>(ids: &[SlotId], patch: &SlotPatch) -> Result<QueryBuilder<'args, Sqlite>> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE slots SET ");
    push_patch(&mut qb, patch)?;
    qb.push(" WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.get());
    }
    separated.push_unseparated(")");
    Ok(qb)
}

fn decode_row(raw: RawRow) -> Result<SlotRow> {
    let (id, label, area, occupant, holder, heartbeat) = raw;

    let occupant = occupant
        .map(|json| serde_json::from_str::<Occupant>(&json))
        .transpose()
        .map_err(|e| Error::Parse(format!("Invalid occupant in slot {id}: {e}")))?;

    let lease_holder = holder.and_then(ClientId::from_stored);

    let lease_heartbeat = heartbeat.as_deref().map(parse_timestamp).transpose()?;

    Ok(SlotRow {
        id: SlotId::new(id),
        label,
        area,
        occupant,
        lease_holder,
        lease_heartbeat,
    })
}
