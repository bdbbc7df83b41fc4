//! Coordination between clients sharing one slot store.
//!
//! Every module here talks to the store only through `SlotStore`; none of
//! them hold locks across clients or assume notification delivery.

pub mod heartbeat;
pub mod lease;
pub mod reconcile;
pub mod relocation;
pub mod selection;
pub mod session;

pub use heartbeat::{HeartbeatEmitter, HeartbeatHandle, HEARTBEAT_INTERVAL};
pub use lease::{is_expired, ClaimOutcome, LeaseManager, LeaseView, LEASE_TTL};
pub use reconcile::{ReconcileReport, Reconciler, StaleLease};
pub use relocation::{PooledOccupant, RelocationEngine, RelocationOutcome};
pub use selection::{bulk_clear, Selection};
pub use session::EditSession;
