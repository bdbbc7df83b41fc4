//! Edit sessions.
//!
//! An open session means this client holds the slot's lease and a heartbeat
//! task is keeping it alive. The session ends in one of three ways:
//!
//! - `save`: write the full occupant and drop the lease in one conditional
//!   update guarded by `holder == me`
//! - `cancel`: stop the heartbeat and release, best effort
//! - `abandon`: stop the heartbeat only, after the lease was observed to
//!   belong to someone else

use crate::{
    coordination::{
        heartbeat::{HeartbeatEmitter, HeartbeatHandle},
        lease::LeaseManager,
    },
    store::{Predicate, SlotPatch},
    types::{ClientId, Occupant, SlotId},
    Error, Result,
};

/// A claimed slot with a running heartbeat.
#[derive(Debug)]
pub struct EditSession {
    slot: SlotId,
    client: ClientId,
    leases: LeaseManager,
    heartbeat: HeartbeatHandle,
    forced: bool,
}

impl EditSession {
    /// Claim `slot` and start its heartbeat.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClaimRejected` if another client holds a live lease,
    /// or `Error::ClaimIndeterminate` if the claim write failed.
    pub async fn open(
        emitter: &HeartbeatEmitter,
        leases: &LeaseManager,
        slot: SlotId,
        client: &ClientId,
    ) -> Result<Self> {
        leases.claim(slot, client).await?.into_result(slot)?;
        Ok(Self::start(emitter, leases, slot, client, false))
    }

    /// Take the lease regardless of its holder and start the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClaimIndeterminate` if the write failed.
    pub async fn open_forced(
        emitter: &HeartbeatEmitter,
        leases: &LeaseManager,
        slot: SlotId,
        client: &ClientId,
    ) -> Result<Self> {
        leases.force_claim(slot, client).await?;
        Ok(Self::start(emitter, leases, slot, client, true))
    }

    fn start(
        emitter: &HeartbeatEmitter,
        leases: &LeaseManager,
        slot: SlotId,
        client: &ClientId,
        forced: bool,
    ) -> Self {
        tracing::info!(%slot, forced, "Edit session opened");
        Self {
            slot,
            client: client.clone(),
            leases: leases.clone(),
            heartbeat: emitter.start(slot),
            forced,
        }
    }

    #[must_use]
    pub const fn slot(&self) -> SlotId {
        self.slot
    }

    #[must_use]
    pub const fn was_forced(&self) -> bool {
        self.forced
    }

    #[must_use]
    pub fn heartbeats(&self) -> u64 {
        self.heartbeat.beats()
    }

    /// Write `occupant` to the slot and release the lease.
    ///
    /// Nothing is written if this client no longer holds the lease.
    ///
    /// # Errors
    ///
    /// Returns `Error::LeaseSuperseded` if the lease was lost, or
    /// `Error::WriteFailed` if the store write failed.
    pub async fn save(self, occupant: Occupant) -> Result<()> {
        let Self {
            slot,
            client,
            leases,
            heartbeat,
            ..
        } = self;
        heartbeat.stop().await;

        let affected = leases
            .store()
            .conditional_update(slot, &Predicate::held_by(&client), &SlotPatch::place(occupant))
            .await?;

        if affected == 0 {
            let holder = leases
                .store()
                .select_one(slot)
                .await
                .ok()
                .flatten()
                .and_then(|current| current.holder().cloned());
            tracing::warn!(%slot, holder = ?holder.as_ref().map(ClientId::as_str), "Save rejected, lease superseded");
            return Err(Error::LeaseSuperseded { slot, holder });
        }

        tracing::info!(%slot, "Occupant saved");
        Ok(())
    }

    /// Stop the heartbeat and release the lease.
    ///
    /// A failed release is logged and left to expire. Returns whether a lease
    /// was released.
    pub async fn cancel(self) -> bool {
        let Self {
            slot,
            client,
            leases,
            heartbeat,
            ..
        } = self;
        heartbeat.stop().await;

        match leases.release(slot, &client).await {
            Ok(released) => {
                tracing::info!(%slot, released, "Edit session cancelled");
                released
            }
            Err(e) => {
                tracing::warn!(%slot, error = %e, "Release failed; lease will expire");
                false
            }
        }
    }

    /// Stop the heartbeat without touching the store.
    pub async fn abandon(self) {
        tracing::info!(slot = %self.slot, "Edit session abandoned");
        self.heartbeat.stop().await;
    }
}
