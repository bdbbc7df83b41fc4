//! Property tests for the lease expiry rule and relocation conservation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use lotgrid_core::{
    coordination::{is_expired, RelocationEngine, LEASE_TTL},
    store::{InMemoryStore, SlotPatch, SlotStore},
    ClientId, GridLayout, Lease, Occupant, SlotId,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Move(i64, i64),
    Place(i64),
}

fn step(slots: i64) -> impl Strategy<Value = Step> {
    prop_oneof![
        (1..=slots, 1..=slots).prop_map(|(a, b)| Step::Move(a, b)),
        (1..=slots).prop_map(Step::Place),
    ]
}

proptest! {
    #[test]
    fn expiry_matches_ttl_boundary(age_ms in 0_i64..600_000, base in 0_i64..2_000_000_000) {
        let now = Utc.timestamp_opt(base, 0).single().expect("valid timestamp");
        let lease = Lease {
            holder: ClientId::generate(),
            heartbeat: Some(now - Duration::milliseconds(age_ms)),
        };
        prop_assert_eq!(
            is_expired(Some(&lease), now),
            Duration::milliseconds(age_ms) > LEASE_TTL
        );
    }

    #[test]
    fn relocation_never_loses_or_duplicates(
        parked in proptest::collection::btree_set(1_i64..=10, 0..10),
        steps in proptest::collection::vec(step(10), 1..30),
    ) {
        tokio_test::block_on(async {
            let store = InMemoryStore::new();
            lotgrid_core::provision(&store, &GridLayout::new(10, 5).expect("layout"))
                .await
                .expect("provision");
            for id in &parked {
                store
                    .update(&[SlotId::new(*id)], &SlotPatch::place(Occupant::named(format!("car-{id}"))))
                    .await
                    .expect("park");
            }

            let shared: Arc<dyn SlotStore> = Arc::new(store.clone());
            let mut engine = RelocationEngine::new(shared);
            for step in steps {
                match step {
                    Step::Move(a, b) => {
                        engine.move_occupant(SlotId::new(a), SlotId::new(b)).await;
                    }
                    Step::Place(dest) => {
                        engine.place_pooled(SlotId::new(dest)).await;
                    }
                }
            }

            let mut names: Vec<String> = store
                .select_all()
                .await
                .expect("read")
                .into_iter()
                .filter_map(|slot| slot.occupant.map(|o| o.name))
                .collect();
            if let Some(pooled) = engine.pool() {
                names.push(pooled.occupant.name.clone());
            }
            names.sort();

            let mut expected: Vec<String> = parked.iter().map(|id| format!("car-{id}")).collect();
            expected.sort();
            assert_eq!(names, expected);
        });
    }
}
