//! Slot store - the persistence boundary for the grid.
//!
//! The coordination layer asks very little of persistence:
//!
//! - read every slot
//! - conditionally update one slot, learning how many rows matched
//! - unconditionally update a batch of slots
//!
//! `Predicate` and `SlotPatch` are small expression types that every backend
//! evaluates the same way. `InMemoryStore` evaluates them natively,
//! `SqliteStore` compiles them to SQL.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use strum::Display;

pub use self::{memory::InMemoryStore, sqlite::SqliteStore};
use crate::{
    types::{ClientId, Lease, Occupant, Slot, SlotId, SlotSeed},
    Error, Result,
};

// ═══════════════════════════════════════════════════════════════════════════
// PREDICATES
// ═══════════════════════════════════════════════════════════════════════════

/// Slot column a predicate can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Occupant,
    LeaseHolder,
    LeaseHeartbeat,
    Area,
}

/// Condition evaluated atomically with a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every row.
    Always,
    IsNull(Field),
    IsSet(Field),
    Equals(Field, String),
    /// Timestamp field is set and strictly earlier than the instant.
    OlderThan(Field, DateTime<Utc>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// The lease may be taken by `client`: free, expired, legacy, or already
    /// held by `client`. `cutoff` is `now - LEASE_TTL`.
    #[must_use]
    pub fn claimable_by(client: &ClientId, cutoff: DateTime<Utc>) -> Self {
        Self::Or(vec![
            Self::IsNull(Field::LeaseHolder),
            Self::IsNull(Field::LeaseHeartbeat),
            Self::OlderThan(Field::LeaseHeartbeat, cutoff),
            Self::held_by(client),
        ])
    }

    #[must_use]
    pub fn held_by(client: &ClientId) -> Self {
        Self::Equals(Field::LeaseHolder, client.as_str().to_string())
    }

    /// A lease is present but no longer honored.
    #[must_use]
    pub fn lease_expired(cutoff: DateTime<Utc>) -> Self {
        Self::And(vec![
            Self::IsSet(Field::LeaseHolder),
            Self::Or(vec![
                Self::IsNull(Field::LeaseHeartbeat),
                Self::OlderThan(Field::LeaseHeartbeat, cutoff),
            ]),
        ])
    }

    /// Evaluate against a raw row.
    #[must_use]
    pub fn matches(&self, row: &SlotRow) -> bool {
        match self {
            Self::Always => true,
            Self::IsNull(field) => row.is_null(*field),
            Self::IsSet(field) => !row.is_null(*field),
            Self::Equals(field, value) => match field {
                Field::LeaseHolder => row
                    .lease_holder
                    .as_ref()
                    .is_some_and(|holder| holder.as_str() == value),
                Field::Area => row.area == *value,
                Field::Occupant | Field::LeaseHeartbeat => false,
            },
            Self::OlderThan(field, instant) => match field {
                Field::LeaseHeartbeat => row.lease_heartbeat.is_some_and(|hb| hb < *instant),
                Field::Occupant | Field::LeaseHolder | Field::Area => false,
            },
            Self::And(terms) => terms.iter().all(|term| term.matches(row)),
            Self::Or(terms) => terms.iter().any(|term| term.matches(row)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PATCHES
// ═══════════════════════════════════════════════════════════════════════════

/// What a patch does to one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Change<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T: Clone> Change<T> {
    fn apply_to(&self, current: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Set(value) => *current = Some(value.clone()),
            Self::Clear => *current = None,
        }
    }

    pub const fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

/// Column writes applied to every matched slot.
///
/// The occupant is always replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotPatch {
    pub occupant: Change<Occupant>,
    pub lease_holder: Change<ClientId>,
    pub lease_heartbeat: Change<DateTime<Utc>>,
}

impl SlotPatch {
    /// Take the lease for `holder` with a fresh heartbeat.
    #[must_use]
    pub fn claim(holder: &ClientId, now: DateTime<Utc>) -> Self {
        Self {
            lease_holder: Change::Set(holder.clone()),
            lease_heartbeat: Change::Set(now),
            ..Self::default()
        }
    }

    /// Drop the lease, both fields together.
    #[must_use]
    pub fn release() -> Self {
        Self {
            lease_holder: Change::Clear,
            lease_heartbeat: Change::Clear,
            ..Self::default()
        }
    }

    /// Refresh liveness only.
    #[must_use]
    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        Self {
            lease_heartbeat: Change::Set(now),
            ..Self::default()
        }
    }

    /// Write an occupant and drop any lease.
    #[must_use]
    pub fn place(occupant: Occupant) -> Self {
        Self {
            occupant: Change::Set(occupant),
            ..Self::release()
        }
    }

    /// Remove the occupant and any lease.
    #[must_use]
    pub fn vacate() -> Self {
        Self {
            occupant: Change::Clear,
            ..Self::release()
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.occupant.is_keep() && self.lease_holder.is_keep() && self.lease_heartbeat.is_keep()
    }

    /// Apply to a raw row in place.
    pub fn apply(&self, row: &mut SlotRow) {
        self.occupant.apply_to(&mut row.occupant);
        self.lease_holder.apply_to(&mut row.lease_holder);
        self.lease_heartbeat.apply_to(&mut row.lease_heartbeat);
    }
}

/// What `relocate_atomically` found when it wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomicMove {
    /// The source held nothing. No row was written.
    SourceEmpty,
    /// The source occupant now sits in the destination. `bumped` is what the
    /// destination held, read inside the same transaction as the writes.
    Moved { bumped: Option<Occupant> },
}

// ═══════════════════════════════════════════════════════════════════════════
// RAW ROWS
// ═══════════════════════════════════════════════════════════════════════════

/// A slot exactly as stored, lease columns independent.
///
/// A heartbeat may outlive its holder (an unconditional heartbeat landing after
/// a release); such a row has no lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRow {
    pub id: SlotId,
    pub label: String,
    pub area: String,
    pub occupant: Option<Occupant>,
    pub lease_holder: Option<ClientId>,
    pub lease_heartbeat: Option<DateTime<Utc>>,
}

impl SlotRow {
    #[must_use]
    pub fn from_seed(seed: &SlotSeed) -> Self {
        Self {
            id: seed.id,
            label: seed.label.clone(),
            area: seed.area.clone(),
            occupant: None,
            lease_holder: None,
            lease_heartbeat: None,
        }
    }

    const fn is_null(&self, field: Field) -> bool {
        match field {
            Field::Occupant => self.occupant.is_none(),
            Field::LeaseHolder => self.lease_holder.is_none(),
            Field::LeaseHeartbeat => self.lease_heartbeat.is_none(),
            Field::Area => false,
        }
    }

    #[must_use]
    pub fn into_slot(self) -> Slot {
        let lease = self.lease_holder.map(|holder| Lease {
            holder,
            heartbeat: self.lease_heartbeat,
        });
        Slot {
            id: self.id,
            label: self.label,
            area: self.area,
            occupant: self.occupant,
            lease,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Shared mutable store of slots.
///
/// Each `conditional_update` must evaluate its predicate and apply its patch
/// atomically; that is the only ordering primitive the protocol relies on.
/// Writes to ids that do not exist are silently ignored.
#[async_trait::async_trait]
pub trait SlotStore: Send + Sync {
    /// Every slot, ordered by id.
    async fn select_all(&self) -> Result<Vec<Slot>>;

    /// One slot by id.
    async fn select_one(&self, id: SlotId) -> Result<Option<Slot>> {
        Ok(self
            .select_all()
            .await?
            .into_iter()
            .find(|slot| slot.id == id))
    }

    /// Apply `patch` to slot `id` if `predicate` holds. Returns rows affected.
    async fn conditional_update(
        &self,
        id: SlotId,
        predicate: &Predicate,
        patch: &SlotPatch,
    ) -> Result<u64>;

    /// Apply `patch` to every listed slot. Returns rows affected.
    async fn update(&self, ids: &[SlotId], patch: &SlotPatch) -> Result<u64>;

    /// Insert seeds whose ids are absent. Existing slots are left untouched.
    async fn provision(&self, seeds: &[SlotSeed]) -> Result<u64>;

    /// Whether `relocate_atomically` is available.
    fn supports_transactions(&self) -> bool {
        false
    }

    /// In one transaction: read both slots, place the source occupant in
    /// `dest` and vacate `source`. Nothing is written if any step fails.
    ///
    /// Returns `Error::SlotNotFound` if either slot is missing.
    async fn relocate_atomically(&self, source: SlotId, dest: SlotId) -> Result<AtomicMove> {
        let _ = (source, dest);
        Err(Error::TransactionsUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn row() -> SlotRow {
        SlotRow::from_seed(&SlotSeed {
            id: SlotId::new(1),
            label: "W-1".to_string(),
            area: "west".to_string(),
        })
    }

    fn client(raw: &str) -> ClientId {
        ClientId::parse(raw).unwrap_or_else(|_| ClientId::generate())
    }

    #[test]
    fn test_claimable_when_free() {
        let now = Utc::now();
        assert!(Predicate::claimable_by(&client("c1"), now).matches(&row()));
    }

    #[test]
    fn test_not_claimable_when_live_elsewhere() {
        let now = Utc::now();
        let mut r = row();
        SlotPatch::claim(&client("c1"), now).apply(&mut r);
        let cutoff = now - Duration::minutes(5);
        assert!(!Predicate::claimable_by(&client("c2"), cutoff).matches(&r));
        assert!(Predicate::claimable_by(&client("c1"), cutoff).matches(&r));
    }

    #[test]
    fn test_legacy_holder_without_heartbeat_is_claimable() {
        let mut r = row();
        r.lease_holder = Some(client("legacy"));
        assert!(Predicate::claimable_by(&client("c2"), Utc::now()).matches(&r));
        assert!(Predicate::lease_expired(Utc::now()).matches(&r));
    }

    #[test]
    fn test_heartbeat_without_holder_has_no_lease() {
        let mut r = row();
        SlotPatch::heartbeat(Utc::now()).apply(&mut r);
        assert!(r.into_slot().lease.is_none());
    }

    #[test]
    fn test_place_replaces_occupant_and_drops_lease() {
        let mut r = row();
        SlotPatch::claim(&client("c1"), Utc::now()).apply(&mut r);
        SlotPatch::place(Occupant::named("van")).apply(&mut r);
        let slot = r.into_slot();
        assert_eq!(slot.occupant, Some(Occupant::named("van")));
        assert!(slot.lease.is_none());
    }

    #[test]
    fn test_area_equality() {
        assert!(Predicate::Equals(Field::Area, "west".into()).matches(&row()));
        assert!(!Predicate::Equals(Field::Area, "east".into()).matches(&row()));
    }

    #[test]
    fn test_empty_patch() {
        assert!(SlotPatch::default().is_empty());
        assert!(!SlotPatch::vacate().is_empty());
    }
}
