//! # Lotgrid Core
//!
//! Coordination for many independent clients editing one shared grid of
//! slots. There is no coordinator process; the store's atomic conditional
//! update is the only ordering primitive, and change notifications are
//! best-effort hints to re-read.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Layout
//!
//! - [`store`]: the `SlotStore` boundary with in-memory and SQLite backends
//! - [`coordination`]: leases, heartbeats, relocation, reconciliation,
//!   selection and edit sessions
//! - [`client`]: `LotClient`, one client's reconciled view plus its
//!   client-local state
//! - [`notifier`] / [`watcher`]: change signals, in-process or from the
//!   database file
//! - [`config`], [`identity`], [`provision`]: ambient setup

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod client;
pub mod clock;
pub mod config;
pub mod coordination;
mod error;
pub mod identity;
pub mod notifier;
pub mod provision;
pub mod store;
pub mod types;
pub mod watcher;

pub use client::LotClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use coordination::{
    ClaimOutcome, EditSession, LeaseManager, LeaseView, ReconcileReport, RelocationOutcome,
    StaleLease, HEARTBEAT_INTERVAL, LEASE_TTL,
};
pub use error::{Error, RelocationStage, Result};
pub use notifier::{ChangeNotifier, LocalNotifier, Subscription};
pub use provision::{provision, GridLayout};
pub use store::{InMemoryStore, SlotStore, SqliteStore};
pub use types::{ClientId, Lease, Occupant, Slot, SlotId, SlotSeed};
pub use watcher::FileWatchNotifier;
