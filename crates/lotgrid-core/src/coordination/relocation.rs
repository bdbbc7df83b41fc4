//! Relocation engine: moving occupants between slots.
//!
//! A move is two writes, destination then source. Without multi-row
//! transactions a failure between them leaves the occupant in both slots;
//! that is reported as `PartialFailure` and left for an operator to fix.
//! Nothing is rolled back or retried. Stores that support transactions read
//! and write both slots in one transaction instead.
//!
//! When the destination was occupied, its occupant is bumped into the pool:
//! a client-local, single-occupant buffer that the next `place_pooled` empties
//! (and refills, if that destination was occupied too).

use std::sync::Arc;

use crate::{
    error::RelocationStage,
    store::{AtomicMove, SlotPatch, SlotStore},
    types::{Occupant, Slot, SlotId},
    Error, Result,
};

/// Occupant held client-side after being bumped from a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledOccupant {
    pub occupant: Occupant,
    pub bumped_from: SlotId,
}

/// Result of a move or placement.
#[derive(Debug, Clone)]
pub enum RelocationOutcome {
    /// Every write landed. `pooled` is the occupant now in hand, if any.
    Success { pooled: Option<PooledOccupant> },
    /// The source was empty.
    NothingToMove,
    /// The destination write landed and the source write did not. Whatever
    /// the destination held is already in `pooled`.
    PartialFailure {
        stage: RelocationStage,
        source: SlotId,
        dest: SlotId,
        error: Error,
        pooled: Option<PooledOccupant>,
    },
    /// Nothing was applied. `stage` is `None` when no write was attempted.
    Failure {
        stage: Option<RelocationStage>,
        error: Error,
    },
}

impl RelocationOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Collapse into a `Result`, keeping partial application distinguishable.
    ///
    /// # Errors
    ///
    /// Returns `Error::PartialRelocation` for a partial failure and the
    /// underlying error for a failure.
    pub fn into_result(self) -> Result<Option<PooledOccupant>> {
        match self {
            Self::Success { pooled } => Ok(pooled),
            Self::NothingToMove => Ok(None),
            Self::PartialFailure {
                stage,
                source,
                dest,
                error,
                ..
            } => Err(Error::PartialRelocation {
                stage,
                source_slot: source,
                dest,
                reason: error.to_string(),
            }),
            Self::Failure { error, .. } => Err(error),
        }
    }
}

/// Moves occupants and owns the pool.
pub struct RelocationEngine {
    store: Arc<dyn SlotStore>,
    pool: Option<PooledOccupant>,
}

impl std::fmt::Debug for RelocationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelocationEngine")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl RelocationEngine {
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self { store, pool: None }
    }

    #[must_use]
    pub const fn pool(&self) -> Option<&PooledOccupant> {
        self.pool.as_ref()
    }

    /// Drop the pooled occupant. It is not written anywhere.
    pub fn discard_pool(&mut self) -> Option<PooledOccupant> {
        let discarded = self.pool.take();
        if let Some(pooled) = &discarded {
            tracing::warn!(
                name = %pooled.occupant.name,
                from = %pooled.bumped_from,
                "Discarded pooled occupant"
            );
        }
        discarded
    }

    /// Move the occupant of `source` into `dest`.
    ///
    /// Refuses while the pool is occupied, since a second bump would lose the
    /// first pooled occupant.
    pub async fn move_occupant(&mut self, source: SlotId, dest: SlotId) -> RelocationOutcome {
        if self.pool.is_some() {
            return failure(
                None,
                Error::Validation(
                    "An occupant is pooled; place or discard it before moving another".into(),
                ),
            );
        }
        if source == dest {
            return RelocationOutcome::NothingToMove;
        }

        if self.store.supports_transactions() {
            return self.move_atomically(source, dest).await;
        }

        let (source_slot, dest_slot) = match self.read_pair(source, dest).await {
            Ok(pair) => pair,
            Err(error) => return failure(None, error),
        };
        let Some(occupant) = source_slot.occupant else {
            tracing::debug!(%source, "Nothing to move");
            return RelocationOutcome::NothingToMove;
        };
        self.move_in_two_writes(source, dest, occupant, dest_slot.occupant)
            .await
    }

    /// Place the pooled occupant into `dest`.
    ///
    /// If `dest` was occupied, its occupant becomes the new pool. On failure
    /// the pool is kept.
    pub async fn place_pooled(&mut self, dest: SlotId) -> RelocationOutcome {
        let Some(pooled) = self.pool.clone() else {
            return failure(None, Error::PoolEmpty);
        };

        let dest_slot = match self.read_slot(dest).await {
            Ok(slot) => slot,
            Err(error) => return failure(None, error),
        };

        match self
            .store
            .update(&[dest], &SlotPatch::place(pooled.occupant))
            .await
        {
            Ok(0) => failure(Some(RelocationStage::Destination), Error::SlotNotFound(dest)),
            Ok(_) => {
                self.pool = dest_slot.occupant.map(|occupant| PooledOccupant {
                    occupant,
                    bumped_from: dest,
                });
                tracing::info!(%dest, pooled = self.pool.is_some(), "Pooled occupant placed");
                RelocationOutcome::Success {
                    pooled: self.pool.clone(),
                }
            }
            Err(error) => {
                tracing::warn!(%dest, error = %error, "Pool placement failed");
                failure(Some(RelocationStage::Destination), error)
            }
        }
    }

    /// Once the destination write lands, its old occupant exists only in
    /// the pool, whatever happens to the source write.
    async fn move_in_two_writes(
        &mut self,
        source: SlotId,
        dest: SlotId,
        occupant: Occupant,
        bumped: Option<Occupant>,
    ) -> RelocationOutcome {
        match self.store.update(&[dest], &SlotPatch::place(occupant)).await {
            Ok(0) => {
                return failure(Some(RelocationStage::Destination), Error::SlotNotFound(dest));
            }
            Ok(_) => self.bump(dest, bumped),
            Err(error) => {
                tracing::warn!(%source, %dest, error = %error, "Relocation destination write failed");
                return failure(Some(RelocationStage::Destination), error);
            }
        }

        match self.store.update(&[source], &SlotPatch::vacate()).await {
            Ok(_) => self.moved(source, dest),
            Err(error) => {
                tracing::error!(
                    %source,
                    %dest,
                    error = %error,
                    pooled = self.pool.is_some(),
                    "Relocation partially applied: occupant now in both slots"
                );
                RelocationOutcome::PartialFailure {
                    stage: RelocationStage::Source,
                    source,
                    dest,
                    error,
                    pooled: self.pool.clone(),
                }
            }
        }
    }

    async fn move_atomically(&mut self, source: SlotId, dest: SlotId) -> RelocationOutcome {
        match self.store.relocate_atomically(source, dest).await {
            Ok(AtomicMove::SourceEmpty) => {
                tracing::debug!(%source, "Nothing to move");
                RelocationOutcome::NothingToMove
            }
            Ok(AtomicMove::Moved { bumped }) => {
                self.bump(dest, bumped);
                self.moved(source, dest)
            }
            Err(error @ Error::SlotNotFound(_)) => failure(None, error),
            Err(error) => {
                tracing::warn!(%source, %dest, error = %error, "Atomic relocation failed");
                failure(Some(RelocationStage::Destination), error)
            }
        }
    }

    fn bump(&mut self, dest: SlotId, bumped: Option<Occupant>) {
        self.pool = bumped.map(|occupant| PooledOccupant {
            occupant,
            bumped_from: dest,
        });
    }

    fn moved(&self, source: SlotId, dest: SlotId) -> RelocationOutcome {
        tracing::info!(%source, %dest, pooled = self.pool.is_some(), "Occupant moved");
        RelocationOutcome::Success {
            pooled: self.pool.clone(),
        }
    }

    async fn read_slot(&self, id: SlotId) -> Result<Slot> {
        self.store
            .select_one(id)
            .await?
            .ok_or(Error::SlotNotFound(id))
    }

    async fn read_pair(&self, source: SlotId, dest: SlotId) -> Result<(Slot, Slot)> {
        let slots = self.store.select_all().await?;
        let find = |id: SlotId| {
            slots
                .iter()
                .find(|slot| slot.id == id)
                .cloned()
                .ok_or(Error::SlotNotFound(id))
        };
        Ok((find(source)?, find(dest)?))
    }
}

const fn failure(stage: Option<RelocationStage>, error: Error) -> RelocationOutcome {
    RelocationOutcome::Failure { stage, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::InMemoryStore,
        types::{ClientId, SlotSeed},
    };

    async fn seeded(store: InMemoryStore, n: i64) -> Result<InMemoryStore> {
        let seeds: Vec<SlotSeed> = (1..=n)
            .map(|i| SlotSeed {
                id: SlotId::new(i),
                label: format!("S-{i}"),
                area: "center".into(),
            })
            .collect();
        store.provision(&seeds).await?;
        Ok(store)
    }

    async fn park(store: &InMemoryStore, id: i64, name: &str) -> Result<()> {
        store
            .update(&[SlotId::new(id)], &SlotPatch::place(Occupant::named(name)))
            .await?;
        Ok(())
    }

    async fn occupant_name(store: &InMemoryStore, id: i64) -> Result<Option<String>> {
        Ok(store
            .select_one(SlotId::new(id))
            .await?
            .and_then(|slot| slot.occupant)
            .map(|occupant| occupant.name))
    }

    #[tokio::test]
    async fn test_move_to_empty_slot() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 2).await?;
        park(&store, 1, "sedan").await?;
        store
            .conditional_update(
                SlotId::new(2),
                &crate::store::Predicate::Always,
                &SlotPatch::claim(&ClientId::generate(), chrono::Utc::now()),
            )
            .await?;

        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        let outcome = engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;
        assert!(outcome.is_success());

        assert_eq!(occupant_name(&store, 1).await?, None);
        assert_eq!(occupant_name(&store, 2).await?, Some("sedan".into()));
        let dest = store.select_one(SlotId::new(2)).await?;
        assert!(dest.and_then(|s| s.lease).is_none(), "destination lease cleared");
        assert!(engine.pool().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_move_bumps_into_pool_and_chains() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 3).await?;
        park(&store, 1, "sedan").await?;
        park(&store, 2, "truck").await?;
        park(&store, 3, "bike").await?;

        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        engine
            .move_occupant(SlotId::new(1), SlotId::new(2))
            .await
            .into_result()?;
        assert_eq!(engine.pool().map(|p| p.occupant.name.as_str()), Some("truck"));

        engine.place_pooled(SlotId::new(3)).await.into_result()?;
        assert_eq!(occupant_name(&store, 3).await?, Some("truck".into()));
        assert_eq!(engine.pool().map(|p| p.occupant.name.as_str()), Some("bike"));

        engine.place_pooled(SlotId::new(1)).await.into_result()?;
        assert!(engine.pool().is_none());
        assert_eq!(occupant_name(&store, 1).await?, Some("bike".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_source_is_noop() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 2).await?;
        park(&store, 2, "truck").await?;
        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        let outcome = engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;
        assert!(matches!(outcome, RelocationOutcome::NothingToMove));
        assert_eq!(occupant_name(&store, 2).await?, Some("truck".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_source_write_failure_is_partial() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 2).await?;
        park(&store, 1, "sedan").await?;
        store.fail_write_after(1).await;

        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        let outcome = engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;
        assert!(matches!(
            outcome,
            RelocationOutcome::PartialFailure {
                stage: RelocationStage::Source,
                pooled: None,
                ..
            }
        ));
        // Duplicated until someone fixes it.
        assert_eq!(occupant_name(&store, 1).await?, Some("sedan".into()));
        assert_eq!(occupant_name(&store, 2).await?, Some("sedan".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_still_pools_bumped_occupant() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 2).await?;
        park(&store, 1, "sedan").await?;
        park(&store, 2, "truck").await?;
        store.fail_write_after(1).await;

        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        let outcome = engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;
        let RelocationOutcome::PartialFailure { pooled, .. } = outcome else {
            panic!("expected partial failure, got {outcome:?}");
        };
        let pooled = pooled.map(|p| (p.occupant.name, p.bumped_from));
        assert_eq!(pooled, Some(("truck".to_string(), SlotId::new(2))));
        assert_eq!(engine.pool().map(|p| p.occupant.name.as_str()), Some("truck"));
        Ok(())
    }

    #[tokio::test]
    async fn test_destination_write_failure_applies_nothing() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 2).await?;
        park(&store, 1, "sedan").await?;
        store.fail_write_after(0).await;

        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        let outcome = engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;
        assert!(matches!(
            outcome,
            RelocationOutcome::Failure {
                stage: Some(RelocationStage::Destination),
                ..
            }
        ));
        assert_eq!(occupant_name(&store, 2).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_transactional_store_never_duplicates() -> Result<()> {
        let store = seeded(InMemoryStore::new().transactional(), 2).await?;
        park(&store, 1, "sedan").await?;
        store.fail_write_after(0).await;

        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        let failed = engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;
        assert!(matches!(failed, RelocationOutcome::Failure { .. }));
        assert_eq!(occupant_name(&store, 1).await?, Some("sedan".into()));
        assert_eq!(occupant_name(&store, 2).await?, None);

        engine
            .move_occupant(SlotId::new(1), SlotId::new(2))
            .await
            .into_result()?;
        assert_eq!(occupant_name(&store, 1).await?, None);
        assert_eq!(occupant_name(&store, 2).await?, Some("sedan".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_move_refused_while_pooled() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 3).await?;
        park(&store, 1, "sedan").await?;
        park(&store, 2, "truck").await?;
        park(&store, 3, "bike").await?;
        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;

        let outcome = engine.move_occupant(SlotId::new(3), SlotId::new(1)).await;
        assert!(matches!(
            outcome,
            RelocationOutcome::Failure {
                error: Error::Validation(_),
                ..
            }
        ));
        assert!(engine.discard_pool().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_place_without_pool() {
        let mut engine = RelocationEngine::new(Arc::new(InMemoryStore::new()));
        let outcome = engine.place_pooled(SlotId::new(1)).await;
        assert!(matches!(outcome.into_result(), Err(Error::PoolEmpty)));
    }

    #[tokio::test]
    async fn test_failed_placement_keeps_pool() -> Result<()> {
        let store = seeded(InMemoryStore::new(), 3).await?;
        park(&store, 1, "sedan").await?;
        park(&store, 2, "truck").await?;
        let mut engine = RelocationEngine::new(Arc::new(store.clone()));
        engine.move_occupant(SlotId::new(1), SlotId::new(2)).await;

        store.fail_write_after(0).await;
        assert!(!engine.place_pooled(SlotId::new(3)).await.is_success());
        assert!(engine.pool().is_some());
        Ok(())
    }
}
