//! Selection mode and bulk clear.

use std::collections::BTreeSet;

use crate::{
    store::{SlotPatch, SlotStore},
    types::SlotId,
    Error, Result,
};

/// Client-local set of slots chosen for clearing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    active: bool,
    ids: BTreeSet<SlotId>,
}

impl Selection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub fn enter(&mut self) {
        self.active = true;
    }

    /// Leave selection mode, forgetting the selection.
    pub fn exit(&mut self) {
        self.active = false;
        self.ids.clear();
    }

    /// Flip membership of `id`. Returns whether it is now selected.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` outside selection mode.
    pub fn toggle(&mut self, id: SlotId) -> Result<bool> {
        if !self.active {
            return Err(Error::Validation("Selection mode is off".to_string()));
        }
        if self.ids.remove(&id) {
            Ok(false)
        } else {
            self.ids.insert(id);
            Ok(true)
        }
    }

    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<SlotId> {
        self.ids.iter().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop ids that are not in `existing`. Returns how many were dropped.
    pub fn prune(&mut self, existing: impl IntoIterator<Item = SlotId>) -> usize {
        let existing: BTreeSet<SlotId> = existing.into_iter().collect();
        let before = self.ids.len();
        self.ids.retain(|id| existing.contains(id));
        before - self.ids.len()
    }
}

/// Remove occupant and lease from every listed slot in one write.
///
/// Live leases are overridden. Ids that do not exist are ignored. Callers
/// must confirm with the operator first.
///
/// # Errors
///
/// Returns `Error::WriteFailed` if the store write failed.
pub async fn bulk_clear(store: &dyn SlotStore, ids: &[SlotId]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let cleared = store.update(ids, &SlotPatch::vacate()).await?;
    tracing::info!(requested = ids.len(), cleared, "Bulk clear");
    Ok(cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::InMemoryStore,
        types::{ClientId, Occupant, SlotSeed},
    };

    #[test]
    fn test_toggle_requires_mode() {
        let mut selection = Selection::new();
        assert!(selection.toggle(SlotId::new(1)).is_err());
        selection.enter();
        assert!(matches!(selection.toggle(SlotId::new(1)), Ok(true)));
        assert!(matches!(selection.toggle(SlotId::new(1)), Ok(false)));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_exit_clears() -> Result<()> {
        let mut selection = Selection::new();
        selection.enter();
        selection.toggle(SlotId::new(4))?;
        selection.exit();
        assert!(!selection.is_active());
        assert!(selection.is_empty());
        Ok(())
    }

    #[test]
    fn test_prune() -> Result<()> {
        let mut selection = Selection::new();
        selection.enter();
        selection.toggle(SlotId::new(1))?;
        selection.toggle(SlotId::new(9))?;
        assert_eq!(selection.prune([SlotId::new(1), SlotId::new(2)]), 1);
        assert_eq!(selection.ids(), vec![SlotId::new(1)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_clear_overrides_leases() -> Result<()> {
        let store = InMemoryStore::new();
        let seeds: Vec<SlotSeed> = (1..=3)
            .map(|i| SlotSeed {
                id: SlotId::new(i),
                label: "V".into(),
                area: "center".into(),
            })
            .collect();
        store.provision(&seeds).await?;
        store
            .update(&[SlotId::new(2)], &SlotPatch::place(Occupant::named("van")))
            .await?;
        store
            .update(
                &[SlotId::new(2)],
                &SlotPatch::claim(&ClientId::generate(), chrono::Utc::now()),
            )
            .await?;

        let cleared = bulk_clear(&store, &[SlotId::new(2), SlotId::new(77)]).await?;
        assert_eq!(cleared, 1);
        let slot = store.select_one(SlotId::new(2)).await?;
        assert!(slot.is_some_and(|s| s.occupant.is_none() && s.lease.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_clear_nothing() -> Result<()> {
        assert_eq!(bulk_clear(&InMemoryStore::new(), &[]).await?, 0);
        Ok(())
    }
}
