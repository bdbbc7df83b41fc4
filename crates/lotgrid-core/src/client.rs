//! One client's view of the lot.
//!
//! `LotClient` wires the coordination pieces together and enforces the one
//! rule they share: after any mutation, successful or not, and after any
//! change notification, the local view is replaced by a full re-read.
//! Client-local state (the open edit session, the pool, the selection)
//! survives re-reads unless the fresh data invalidates it.

use std::{sync::Arc, time::Duration};

use crate::{
    clock::{Clock, SystemClock},
    coordination::{
        bulk_clear, EditSession, HeartbeatEmitter, LeaseManager, LeaseView, PooledOccupant,
        ReconcileReport, Reconciler, RelocationEngine, RelocationOutcome, Selection,
    },
    notifier::{ChangeNotifier, Subscription},
    store::SlotStore,
    types::{ClientId, Occupant, Slot, SlotId},
    Error, Result,
};

/// A single client of the shared store.
pub struct LotClient {
    me: ClientId,
    store: Arc<dyn SlotStore>,
    leases: LeaseManager,
    emitter: HeartbeatEmitter,
    relocation: RelocationEngine,
    selection: Selection,
    reconciler: Reconciler,
    session: Option<EditSession>,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for LotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LotClient")
            .field("me", &self.me)
            .field("reconciler", &self.reconciler)
            .field("session", &self.session.as_ref().map(EditSession::slot))
            .field("pool", &self.relocation.pool())
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl LotClient {
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>, me: ClientId) -> Self {
        Self::with_clock(store, me, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(store: Arc<dyn SlotStore>, me: ClientId, clock: Arc<dyn Clock>) -> Self {
        let leases = LeaseManager::new(Arc::clone(&store), clock);
        Self {
            emitter: HeartbeatEmitter::new(leases.clone()),
            relocation: RelocationEngine::new(Arc::clone(&store)),
            reconciler: Reconciler::new(Arc::clone(&store), me.clone()),
            selection: Selection::new(),
            session: None,
            subscription: None,
            leases,
            store,
            me,
        }
    }

    /// Override the heartbeat period for sessions opened from now on.
    #[must_use]
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.emitter = HeartbeatEmitter::with_period(self.leases.clone(), period);
        self
    }

    /// Receive change notifications from `notifier`.
    pub fn subscribe(&mut self, notifier: &dyn ChangeNotifier) {
        self.subscription = Some(notifier.subscribe());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOCAL VIEW
    // ═══════════════════════════════════════════════════════════════════════

    #[must_use]
    pub const fn me(&self) -> &ClientId {
        &self.me
    }

    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        self.reconciler.slots()
    }

    #[must_use]
    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.reconciler.slot(id)
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.reconciler.generation()
    }

    #[must_use]
    pub fn lease_view(&self, id: SlotId) -> Option<LeaseView> {
        let now = self.leases.now();
        self.slot(id)
            .map(|slot| LeaseView::of(slot, &self.me, now))
    }

    #[must_use]
    pub fn open_slot(&self) -> Option<SlotId> {
        self.session.as_ref().map(EditSession::slot)
    }

    #[must_use]
    pub const fn pool(&self) -> Option<&PooledOccupant> {
        self.relocation.pool()
    }

    #[must_use]
    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    #[must_use]
    pub const fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RECONCILIATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Re-read the store now.
    ///
    /// # Errors
    ///
    /// Returns error if the read failed; the previous view is kept.
    pub async fn refresh(&mut self) -> Result<ReconcileReport> {
        let report = self.reconciler.resync(self.open_slot()).await?;
        self.settle(&report).await;
        Ok(report)
    }

    /// Wait for the next change notification and re-read.
    ///
    /// Returns `Ok(None)` if not subscribed or the notifier shut down. A
    /// report with `stale` set means the open session was closed.
    ///
    /// # Errors
    ///
    /// Returns error if the read failed.
    pub async fn next_change(&mut self) -> Result<Option<ReconcileReport>> {
        let open_slot = self.open_slot();
        let Some(subscription) = self.subscription.as_mut() else {
            return Ok(None);
        };
        let report = self.reconciler.next_change(subscription, open_slot).await?;
        if let Some(report) = &report {
            self.settle(report).await;
        }
        Ok(report)
    }

    async fn settle(&mut self, report: &ReconcileReport) {
        if let Some(stale) = &report.stale {
            if self.open_slot() == Some(stale.slot()) {
                if let Some(session) = self.session.take() {
                    session.abandon().await;
                }
            }
        }

        let pruned = self
            .selection
            .prune(self.reconciler.slots().iter().map(|slot| slot.id));
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned selection");
        }
    }

    /// Re-read after a mutation. A failed re-read does not replace the
    /// mutation's own result.
    async fn after_mutation<T>(&mut self, result: T) -> T {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Reconciliation after mutation failed");
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EDITING
    // ═══════════════════════════════════════════════════════════════════════

    /// Claim `slot` and open an edit session on it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if a session is already open,
    /// `Error::ClaimRejected` if another client holds the slot, or
    /// `Error::ClaimIndeterminate` if the claim write failed.
    pub async fn begin_edit(&mut self, slot: SlotId) -> Result<()> {
        self.ensure_no_session()?;
        let opened = EditSession::open(&self.emitter, &self.leases, slot, &self.me).await;
        let result = opened.map(|session| self.session = Some(session));
        self.after_mutation(result).await
    }

    /// Open an edit session regardless of who holds `slot`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if a session is already open, or
    /// `Error::ClaimIndeterminate` if the write failed.
    pub async fn force_edit(&mut self, slot: SlotId) -> Result<()> {
        self.ensure_no_session()?;
        let opened = EditSession::open_forced(&self.emitter, &self.leases, slot, &self.me).await;
        let result = opened.map(|session| self.session = Some(session));
        self.after_mutation(result).await
    }

    /// Save `occupant` into the open slot and close the session.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoOpenSession`, `Error::LeaseSuperseded`, or
    /// `Error::WriteFailed`.
    pub async fn save(&mut self, occupant: Occupant) -> Result<()> {
        let session = self.session.take().ok_or(Error::NoOpenSession)?;
        let result = session.save(occupant).await;
        self.after_mutation(result).await
    }

    /// Close the open session, releasing its lease best-effort.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoOpenSession` if nothing is open.
    pub async fn cancel_edit(&mut self) -> Result<bool> {
        let session = self.session.take().ok_or(Error::NoOpenSession)?;
        let released = session.cancel().await;
        self.after_mutation(Ok(released)).await
    }

    /// Release this client's lease on `slot`. Closes the session if it is
    /// the open one.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriteFailed` if the store write failed.
    pub async fn release(&mut self, slot: SlotId) -> Result<bool> {
        if self.open_slot() == Some(slot) {
            return self.cancel_edit().await;
        }
        let result = self.leases.release(slot, &self.me).await;
        self.after_mutation(result).await
    }

    /// Clear every lease in the store. Requires operator confirmation.
    ///
    /// # Errors
    ///
    /// Returns error if the read or write failed.
    pub async fn force_release_all(&mut self) -> Result<u64> {
        let result = self.leases.force_release_all().await;
        self.after_mutation(result).await
    }

    /// Clear expired leases.
    ///
    /// # Errors
    ///
    /// Returns error if the read or a write failed.
    pub async fn sweep_expired(&mut self) -> Result<u64> {
        let result = self.leases.sweep_expired().await;
        self.after_mutation(result).await
    }

    fn ensure_no_session(&self) -> Result<()> {
        match self.open_slot() {
            Some(open) => Err(Error::Validation(format!(
                "An edit session is already open on slot {open}"
            ))),
            None => Ok(()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RELOCATION
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn move_occupant(&mut self, source: SlotId, dest: SlotId) -> RelocationOutcome {
        let outcome = self.relocation.move_occupant(source, dest).await;
        self.after_mutation(outcome).await
    }

    pub async fn place_pooled(&mut self, dest: SlotId) -> RelocationOutcome {
        let outcome = self.relocation.place_pooled(dest).await;
        self.after_mutation(outcome).await
    }

    pub fn discard_pool(&mut self) -> Option<PooledOccupant> {
        self.relocation.discard_pool()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SELECTION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn enter_selection(&mut self) {
        self.selection.enter();
    }

    pub fn exit_selection(&mut self) {
        self.selection.exit();
    }

    /// # Errors
    ///
    /// Returns `Error::Validation` outside selection mode.
    pub fn toggle_selected(&mut self, id: SlotId) -> Result<bool> {
        self.selection.toggle(id)
    }

    /// Bulk-clear the selected slots and leave selection mode.
    ///
    /// The selection is kept if the write failed.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriteFailed` if the store write failed.
    pub async fn clear_selected(&mut self) -> Result<u64> {
        let ids = self.selection.ids();
        let result = bulk_clear(self.store.as_ref(), &ids).await;
        if result.is_ok() {
            self.selection.exit();
        }
        self.after_mutation(result).await
    }

    /// Close any open session, releasing best-effort.
    pub async fn shutdown(mut self) {
        if let Some(session) = self.session.take() {
            session.cancel().await;
        }
    }
}
