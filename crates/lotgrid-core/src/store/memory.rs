//! In-process slot store.
//!
//! Rows live behind one async mutex, so each call is atomic with respect to
//! every other call. Used by tests to simulate many clients against one
//! shared store, and as a reference for how predicates must evaluate.
//!
//! Fault injection lets tests fail a specific write, or take the store
//! offline entirely, to exercise indeterminate and partial outcomes.

use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::Mutex;

use super::{AtomicMove, Predicate, SlotPatch, SlotRow, SlotStore};
use crate::{
    notifier::{ChangeNotifier, LocalNotifier},
    types::{Slot, SlotId, SlotSeed},
    Error, Result,
};

#[derive(Debug, Default)]
struct Faults {
    /// Writes that succeed before the next injected failure.
    fail_after: Option<usize>,
    offline: bool,
}

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<SlotId, SlotRow>,
    faults: Faults,
}

impl State {
    fn check_read(&self) -> Result<()> {
        if self.faults.offline {
            return Err(Error::Database("store offline".to_string()));
        }
        Ok(())
    }

    fn check_write(&mut self, operation: &str) -> Result<()> {
        if self.faults.offline {
            return Err(Error::write_failed(operation, "store offline"));
        }
        match self.faults.fail_after {
            Some(0) => {
                self.faults.fail_after = None;
                Err(Error::write_failed(operation, "injected write failure"))
            }
            Some(n) => {
                self.faults.fail_after = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn apply(&mut self, ids: &[SlotId], patch: &SlotPatch) -> u64 {
        let mut affected = 0;
        for id in ids {
            if let Some(row) = self.rows.get_mut(id) {
                patch.apply(row);
                affected += 1;
            }
        }
        affected
    }
}

/// Shared in-memory store. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    notifier: Option<Arc<LocalNotifier>>,
    transactional: bool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a change event after every write that touched rows.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<LocalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Offer `relocate_atomically`.
    #[must_use]
    pub const fn transactional(mut self) -> Self {
        self.transactional = true;
        self
    }

    /// Let `successes` more writes through, then fail exactly one.
    pub async fn fail_write_after(&self, successes: usize) {
        self.state.lock().await.faults.fail_after = Some(successes);
    }

    /// Fail every read and write until brought back online.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.faults.offline = offline;
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
impl SlotStore for InMemoryStore {
    async fn select_all(&self) -> Result<Vec<Slot>> {
        let state = self.state.lock().await;
        state.check_read()?;
        Ok(state.rows.values().cloned().map(SlotRow::into_slot).collect())
    }

    async fn select_one(&self, id: SlotId) -> Result<Option<Slot>> {
        let state = self.state.lock().await;
        state.check_read()?;
        Ok(state.rows.get(&id).cloned().map(SlotRow::into_slot))
    }

    async fn conditional_update(
        &self,
        id: SlotId,
        predicate: &Predicate,
        patch: &SlotPatch,
    ) -> Result<u64> {
        let affected = {
            let mut state = self.state.lock().await;
            state.check_write("conditional_update")?;
            match state.rows.get_mut(&id) {
                Some(row) if predicate.matches(row) => {
                    patch.apply(row);
                    1
                }
                _ => 0,
            }
        };
        self.announce(affected);
        Ok(affected)
    }

    async fn update(&self, ids: &[SlotId], patch: &SlotPatch) -> Result<u64> {
        let affected = {
            let mut state = self.state.lock().await;
            state.check_write("update")?;
            state.apply(ids, patch)
        };
        self.announce(affected);
        Ok(affected)
    }

    async fn provision(&self, seeds: &[SlotSeed]) -> Result<u64> {
        let inserted = {
            let mut state = self.state.lock().await;
            state.check_write("provision")?;
            let mut inserted = 0;
            for seed in seeds {
                if !state.rows.contains_key(&seed.id) {
                    state.rows.insert(seed.id, SlotRow::from_seed(seed));
                    inserted += 1;
                }
            }
            inserted
        };
        self.announce(inserted);
        Ok(inserted)
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn relocate_atomically(&self, source: SlotId, dest: SlotId) -> Result<AtomicMove> {
        if !self.transactional {
            return Err(Error::TransactionsUnsupported);
        }
        let moved = {
            let mut state = self.state.lock().await;
            state.check_read()?;
            let source_row = state.rows.get(&source).ok_or(Error::SlotNotFound(source))?;
            let dest_row = state.rows.get(&dest).ok_or(Error::SlotNotFound(dest))?;
            let Some(occupant) = source_row.occupant.clone() else {
                return Ok(AtomicMove::SourceEmpty);
            };
            let bumped = dest_row.occupant.clone();

            state.check_write("relocate_atomically")?;
            state.apply(&[dest], &SlotPatch::place(occupant));
            state.apply(&[source], &SlotPatch::vacate());
            AtomicMove::Moved { bumped }
        };
        self.announce(2);
        Ok(moved)
    }
}
