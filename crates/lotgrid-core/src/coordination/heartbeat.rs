//! Periodic lease refresh for an open edit session.
//!
//! One task per open session. Each tick writes a fresh heartbeat to the slot,
//! unconditioned on the holder. A failed tick is logged and not retried; the
//! next tick tries again. Stopping the emitter waits for the task to exit, so
//! no heartbeat lands after `stop` returns.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use super::lease::LeaseManager;
use crate::types::SlotId;

/// Time between heartbeats. Well under `LEASE_TTL` so a few missed ticks do
/// not lose the lease.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Spawns heartbeat tasks.
#[derive(Debug, Clone)]
pub struct HeartbeatEmitter {
    leases: LeaseManager,
    period: Duration,
}

impl HeartbeatEmitter {
    #[must_use]
    pub const fn new(leases: LeaseManager) -> Self {
        Self {
            leases,
            period: HEARTBEAT_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_period(leases: LeaseManager, period: Duration) -> Self {
        Self { leases, period }
    }

    /// Start refreshing `slot`. The first heartbeat is one period from now;
    /// the claim itself wrote the initial one.
    #[must_use]
    pub fn start(&self, slot: SlotId) -> HeartbeatHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let beats = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&beats);
        let leases = self.leases.clone();
        let period = self.period;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        match leases.touch(slot).await {
                            Ok(_) => {
                                counter.fetch_add(1, Ordering::Relaxed);
                                tracing::trace!(%slot, "Heartbeat");
                            }
                            Err(e) => tracing::warn!(%slot, error = %e, "Heartbeat failed"),
                        }
                    }
                }
            }
        });

        HeartbeatHandle {
            slot,
            beats,
            stop: stop_tx,
            task: Some(task),
        }
    }
}

/// Running heartbeat task. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct HeartbeatHandle {
    slot: SlotId,
    beats: Arc<AtomicU64>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    #[must_use]
    pub const fn slot(&self) -> SlotId {
        self.slot
    }

    /// Heartbeats written successfully so far.
    #[must_use]
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the task and wait for it to exit.
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(slot = %self.slot, error = %e, "Heartbeat task ended abnormally");
                }
            }
        }
        tracing::debug!(slot = %self.slot, beats = self.beats(), "Heartbeat stopped");
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::{
        clock::ManualClock,
        store::{InMemoryStore, SlotStore},
        types::{ClientId, SlotSeed},
        Result,
    };

    async fn setup() -> Result<(LeaseManager, InMemoryStore, ManualClock)> {
        let store = InMemoryStore::new();
        store
            .provision(&[SlotSeed {
                id: SlotId::new(1),
                label: "V".into(),
                area: "center".into(),
            }])
            .await?;
        let clock = ManualClock::default();
        let leases = LeaseManager::new(Arc::new(store.clone()), Arc::new(clock.clone()));
        Ok((leases, store, clock))
    }

    async fn heartbeat_of(store: &InMemoryStore) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        Ok(store
            .select_one(SlotId::new(1))
            .await?
            .and_then(|slot| slot.lease)
            .and_then(|lease| lease.heartbeat))
    }

    #[tokio::test(start_paused = true)]
    async fn test_beats_every_interval() -> Result<()> {
        let (leases, store, clock) = setup().await?;
        let me = ClientId::generate();
        leases.claim(SlotId::new(1), &me).await?;
        let claimed_at = heartbeat_of(&store).await?;

        let handle = HeartbeatEmitter::new(leases).start(SlotId::new(1));
        clock.advance(ChronoDuration::seconds(30));
        tokio::time::sleep(HEARTBEAT_INTERVAL * 2 + Duration::from_secs(1)).await;

        assert_eq!(handle.beats(), 2);
        assert_ne!(heartbeat_of(&store).await?, claimed_at);
        handle.stop().await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeat_after_stop() -> Result<()> {
        let (leases, store, clock) = setup().await?;
        leases.claim(SlotId::new(1), &ClientId::generate()).await?;

        let handle = HeartbeatEmitter::new(leases).start(SlotId::new(1));
        handle.stop().await;
        let before = heartbeat_of(&store).await?;

        clock.advance(ChronoDuration::minutes(2));
        tokio::time::sleep(HEARTBEAT_INTERVAL * 4).await;
        assert_eq!(heartbeat_of(&store).await?, before);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_keeps_running() -> Result<()> {
        let (leases, store, _) = setup().await?;
        leases.claim(SlotId::new(1), &ClientId::generate()).await?;
        store.fail_write_after(0).await;

        let handle = HeartbeatEmitter::new(leases).start(SlotId::new(1));
        tokio::time::sleep(HEARTBEAT_INTERVAL * 2 + Duration::from_secs(1)).await;

        assert_eq!(handle.beats(), 1, "first tick failed, second landed");
        assert!(handle.is_running());
        handle.stop().await;
        Ok(())
    }
}
