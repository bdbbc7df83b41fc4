//! Lease manager for slot edit rights.
//!
//! A lease is a holder id plus a heartbeat timestamp stored on the slot row.
//! There is no lock service: a claim is a single conditional update whose
//! predicate admits a free, expired, legacy, or self-held lease, and the
//! affected-row count decides who won.
//!
//! Expiry is lazy. Nobody clears an expired lease; the claim predicate simply
//! stops honoring it. `sweep_expired` exists as an optional tidy-up that
//! issues the same conditional clear.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    clock::Clock,
    store::{Field, Predicate, SlotPatch, SlotStore},
    types::{ClientId, Lease, Slot, SlotId},
    Error, Result,
};

/// Heartbeat age after which a lease is no longer honored (5 minutes).
pub const LEASE_TTL: Duration = Duration::seconds(300);

/// Whether a lease no longer grants edit rights at `now`.
///
/// No lease and a lease without a heartbeat both count as expired. A
/// heartbeat exactly `LEASE_TTL` old is still live.
#[must_use]
pub fn is_expired(lease: Option<&Lease>, now: DateTime<Utc>) -> bool {
    match lease {
        None
        | Some(Lease {
            heartbeat: None, ..
        }) => true,
        Some(Lease {
            heartbeat: Some(heartbeat),
            ..
        }) => now.signed_duration_since(*heartbeat) > LEASE_TTL,
    }
}

/// Result of a claim attempt that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(Lease),
    /// Another client holds a live lease. `holder` is best-effort.
    Rejected { holder: Option<ClientId> },
}

impl ClaimOutcome {
    /// Turn a rejection into `Error::ClaimRejected`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClaimRejected` if the claim was rejected.
    pub fn into_result(self, slot: SlotId) -> Result<Lease> {
        match self {
            Self::Claimed(lease) => Ok(lease),
            Self::Rejected { holder } => Err(Error::ClaimRejected { slot, holder }),
        }
    }
}

/// Lease state of one slot as seen by one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseView {
    Free,
    HeldByMe,
    HeldByOther(ClientId),
    /// A lease is recorded but no longer honored; anyone may claim.
    Expired(ClientId),
}

impl LeaseView {
    #[must_use]
    pub fn of(slot: &Slot, me: &ClientId, now: DateTime<Utc>) -> Self {
        match &slot.lease {
            None => Self::Free,
            Some(lease) if is_expired(Some(lease), now) => Self::Expired(lease.holder.clone()),
            Some(lease) if lease.holder == *me => Self::HeldByMe,
            Some(lease) => Self::HeldByOther(lease.holder.clone()),
        }
    }

    /// Whether `claim` would currently succeed for the viewing client.
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        !matches!(self, Self::HeldByOther(_))
    }
}

/// Claim, release, and force operations against a slot store.
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn SlotStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager").finish_non_exhaustive()
    }
}

impl LeaseManager {
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<dyn SlotStore> {
        &self.store
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Claim slot `slot` for `client`.
    ///
    /// Succeeds if the slot has no lease, its heartbeat is missing or older
    /// than `LEASE_TTL`, or `client` already holds it. A rejected claim is
    /// never retried here.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClaimIndeterminate` if the store write failed; the
    /// caller must not open an edit session. Returns `Error::SlotNotFound`
    /// if the slot does not exist.
    pub async fn claim(&self, slot: SlotId, client: &ClientId) -> Result<ClaimOutcome> {
        let now = self.clock.now();
        let predicate = Predicate::claimable_by(client, now - LEASE_TTL);
        let patch = SlotPatch::claim(client, now);

        let affected = self
            .store
            .conditional_update(slot, &predicate, &patch)
            .await
            .map_err(|e| Error::ClaimIndeterminate {
                slot,
                reason: e.to_string(),
            })?;

        if affected > 0 {
            tracing::debug!(%slot, %client, "Lease claimed");
            return Ok(ClaimOutcome::Claimed(Lease {
                holder: client.clone(),
                heartbeat: Some(now),
            }));
        }

        // Zero rows: either someone else holds it or the slot is gone.
        match self.store.select_one(slot).await {
            Ok(Some(current)) => {
                let holder = current.holder().cloned();
                tracing::info!(%slot, holder = ?holder.as_ref().map(ClientId::as_str), "Claim rejected");
                Ok(ClaimOutcome::Rejected { holder })
            }
            Ok(None) => Err(Error::SlotNotFound(slot)),
            Err(e) => {
                tracing::warn!(%slot, error = %e, "Claim rejected, holder lookup failed");
                Ok(ClaimOutcome::Rejected { holder: None })
            }
        }
    }

    /// Take the lease unconditionally, discarding whoever held it.
    ///
    /// This is the human override for a lease whose holder went away.
    ///
    /// # Errors
    ///
    /// Returns `Error::ClaimIndeterminate` if the write failed, or
    /// `Error::SlotNotFound` if the slot does not exist.
    pub async fn force_claim(&self, slot: SlotId, client: &ClientId) -> Result<Lease> {
        let now = self.clock.now();
        let affected = self
            .store
            .update(&[slot], &SlotPatch::claim(client, now))
            .await
            .map_err(|e| Error::ClaimIndeterminate {
                slot,
                reason: e.to_string(),
            })?;

        if affected == 0 {
            return Err(Error::SlotNotFound(slot));
        }

        tracing::warn!(%slot, %client, "Lease force-claimed");
        Ok(Lease {
            holder: client.clone(),
            heartbeat: Some(now),
        })
    }

    /// Release `client`'s lease on `slot`.
    ///
    /// Returns whether a lease was released. Releasing a lease held by
    /// someone else (or nobody) changes nothing and is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriteFailed` if the store write failed.
    pub async fn release(&self, slot: SlotId, client: &ClientId) -> Result<bool> {
        let affected = self
            .store
            .conditional_update(slot, &Predicate::held_by(client), &SlotPatch::release())
            .await?;

        tracing::debug!(%slot, %client, affected, "Lease release");
        Ok(affected > 0)
    }

    /// Clear every lease on every slot.
    ///
    /// Each slot is cleared with its own conditional write rather than from a
    /// list of leases read beforehand, so a lease claimed mid-sweep is cleared
    /// too. Only slots provisioned after the read are missed.
    ///
    /// Discards other clients' in-progress edits; callers must confirm with
    /// the operator first.
    ///
    /// # Errors
    ///
    /// Returns error if the read or a conditional clear failed.
    pub async fn force_release_all(&self) -> Result<u64> {
        let leased = Predicate::IsSet(Field::LeaseHolder);
        let mut affected = 0;
        for slot in self.store.select_all().await? {
            affected += self
                .store
                .conditional_update(slot.id, &leased, &SlotPatch::release())
                .await?;
        }

        tracing::warn!(affected, "Force-released all leases");
        Ok(affected)
    }

    /// Clear leases that are expired right now.
    ///
    /// Each clear is conditional on the lease still being expired, so a lease
    /// renewed or reclaimed since the read is left alone.
    ///
    /// # Errors
    ///
    /// Returns error if the read or a conditional clear failed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let predicate = Predicate::lease_expired(now - LEASE_TTL);

        let expired: Vec<SlotId> = self
            .store
            .select_all()
            .await?
            .into_iter()
            .filter(|slot| slot.lease.is_some() && is_expired(slot.lease.as_ref(), now))
            .map(|slot| slot.id)
            .collect();

        let mut cleared = 0;
        for slot in expired {
            cleared += self
                .store
                .conditional_update(slot, &predicate, &SlotPatch::release())
                .await?;
        }

        if cleared > 0 {
            tracing::info!(cleared, "Swept expired leases");
        }
        Ok(cleared)
    }

    /// Refresh the heartbeat on `slot`, not conditioned on the holder.
    ///
    /// # Errors
    ///
    /// Returns `Error::WriteFailed` if the store write failed.
    pub async fn touch(&self, slot: SlotId) -> Result<u64> {
        self.store
            .update(&[slot], &SlotPatch::heartbeat(self.clock.now()))
            .await
    }
}
