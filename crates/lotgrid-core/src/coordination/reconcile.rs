//! Reconciliation: keeping the local view equal to the store.
//!
//! There is no delta merge. Every trigger (a local mutation or any change
//! notification) re-reads every slot and replaces the local copy. Duplicate,
//! lost, or reordered notifications are harmless because each re-read is
//! self-sufficient. Notifications that queue up while a read is pending are
//! drained and served by a single read.

use std::sync::Arc;

use crate::{
    notifier::Subscription,
    store::SlotStore,
    types::{ClientId, Slot, SlotId},
    Result,
};

/// How the open session's lease looks after a re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleLease {
    /// The lease (or the slot) is gone.
    Cleared { slot: SlotId },
    /// Someone else holds it now.
    Reassigned { slot: SlotId, holder: ClientId },
}

impl StaleLease {
    #[must_use]
    pub const fn slot(&self) -> SlotId {
        match self {
            Self::Cleared { slot } | Self::Reassigned { slot, .. } => *slot,
        }
    }
}

impl std::fmt::Display for StaleLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cleared { slot } => write!(f, "lease on slot {slot} was cleared"),
            Self::Reassigned { slot, holder } => {
                write!(f, "lease on slot {slot} was taken over by {holder}")
            }
        }
    }
}

/// What one re-read found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Incremented on every successful re-read.
    pub generation: u64,
    /// Whether the slot collection differs from the previous read.
    pub changed: bool,
    /// Set when the open session's lease no longer belongs to this client.
    pub stale: Option<StaleLease>,
}

/// Local cache of the slot collection.
pub struct Reconciler {
    store: Arc<dyn SlotStore>,
    me: ClientId,
    slots: Vec<Slot>,
    generation: u64,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("me", &self.me)
            .field("slots", &self.slots.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>, me: ClientId) -> Self {
        Self {
            store,
            me,
            slots: Vec::new(),
            generation: 0,
        }
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the local view with a full read of the store.
    ///
    /// `open_slot` is the slot this client is editing, if any; its lease is
    /// checked against the fresh read.
    ///
    /// # Errors
    ///
    /// Returns error if the read failed. The previous view is kept.
    pub async fn resync(&mut self, open_slot: Option<SlotId>) -> Result<ReconcileReport> {
        let fresh = self.store.select_all().await?;
        let changed = fresh != self.slots;
        self.slots = fresh;
        self.generation += 1;

        let stale = open_slot.and_then(|slot| self.stale_lease(slot));
        if let Some(stale) = &stale {
            tracing::warn!(%stale, "Stale lease observed");
        }
        tracing::debug!(generation = self.generation, changed, "Reconciled");

        Ok(ReconcileReport {
            generation: self.generation,
            changed,
            stale,
        })
    }

    /// Wait for a change notification, then re-read.
    ///
    /// Returns `Ok(None)` when the notifier has shut down.
    ///
    /// # Errors
    ///
    /// Returns error if the read failed.
    pub async fn next_change(
        &mut self,
        subscription: &mut Subscription,
        open_slot: Option<SlotId>,
    ) -> Result<Option<ReconcileReport>> {
        if !subscription.changed().await {
            return Ok(None);
        }
        let coalesced = subscription.drain();
        if coalesced > 0 {
            tracing::debug!(coalesced, "Coalesced change notifications");
        }
        self.resync(open_slot).await.map(Some)
    }

    fn stale_lease(&self, slot: SlotId) -> Option<StaleLease> {
        match self.slot(slot).and_then(|s| s.lease.as_ref()) {
            None => Some(StaleLease::Cleared { slot }),
            Some(lease) if lease.holder == self.me => None,
            Some(lease) => Some(StaleLease::Reassigned {
                slot,
                holder: lease.holder.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        notifier::{ChangeNotifier, LocalNotifier},
        store::{InMemoryStore, SlotPatch},
        types::{Occupant, SlotSeed},
    };

    async fn seeded(store: &InMemoryStore, n: i64) -> Result<()> {
        let seeds: Vec<SlotSeed> = (1..=n)
            .map(|i| SlotSeed {
                id: SlotId::new(i),
                label: format!("S-{i}"),
                area: "center".into(),
            })
            .collect();
        store.provision(&seeds).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() -> Result<()> {
        let store = InMemoryStore::new();
        seeded(&store, 3).await?;
        let mut reconciler = Reconciler::new(Arc::new(store), ClientId::generate());

        let first = reconciler.resync(None).await?;
        let view = reconciler.slots().to_vec();
        let second = reconciler.resync(None).await?;

        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(reconciler.slots(), view.as_slice());
        assert_eq!(second.generation, first.generation + 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_read_keeps_previous_view() -> Result<()> {
        let store = InMemoryStore::new();
        seeded(&store, 2).await?;
        let mut reconciler = Reconciler::new(Arc::new(store.clone()), ClientId::generate());
        reconciler.resync(None).await?;

        store.set_offline(true).await;
        assert!(reconciler.resync(None).await.is_err());
        assert_eq!(reconciler.slots().len(), 2);
        assert_eq!(reconciler.generation(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_detects_reassigned_and_cleared_lease() -> Result<()> {
        let store = InMemoryStore::new();
        seeded(&store, 1).await?;
        let me = ClientId::generate();
        let other = ClientId::generate();
        let id = SlotId::new(1);
        let mut reconciler = Reconciler::new(Arc::new(store.clone()), me.clone());

        store.update(&[id], &SlotPatch::claim(&me, Utc::now())).await?;
        assert_eq!(reconciler.resync(Some(id)).await?.stale, None);

        store.update(&[id], &SlotPatch::claim(&other, Utc::now())).await?;
        assert_eq!(
            reconciler.resync(Some(id)).await?.stale,
            Some(StaleLease::Reassigned {
                slot: id,
                holder: other
            })
        );

        store.update(&[id], &SlotPatch::release()).await?;
        assert_eq!(
            reconciler.resync(Some(id)).await?.stale,
            Some(StaleLease::Cleared { slot: id })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_burst_of_notifications_is_one_read() -> Result<()> {
        let notifier = Arc::new(LocalNotifier::new());
        let store = InMemoryStore::new().with_notifier(Arc::clone(&notifier));
        seeded(&store, 2).await?;
        let mut sub = notifier.subscribe();
        let mut reconciler = Reconciler::new(Arc::new(store.clone()), ClientId::generate());

        for name in ["a", "b", "c"] {
            store
                .update(&[SlotId::new(1)], &SlotPatch::place(Occupant::named(name)))
                .await?;
        }

        let report = reconciler.next_change(&mut sub, None).await?;
        assert_eq!(report.map(|r| r.generation), Some(1));
        assert_eq!(sub.drain(), 0);
        let name = reconciler
            .slot(SlotId::new(1))
            .and_then(|slot| slot.occupant.as_ref())
            .map(|occupant| occupant.name.clone());
        assert_eq!(name.as_deref(), Some("c"));
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_notifier_ends_loop() -> Result<()> {
        let notifier = LocalNotifier::new();
        let mut sub = notifier.subscribe();
        drop(notifier);
        let mut reconciler = Reconciler::new(Arc::new(InMemoryStore::new()), ClientId::generate());
        assert_eq!(reconciler.next_change(&mut sub, None).await?, None);
        Ok(())
    }
}
