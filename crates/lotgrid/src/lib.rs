//! Lotgrid - command-line front end for the shared slot grid.
//!
//! Each invocation is one client: it loads the layered config, reads its
//! durable client id, opens the shared SQLite store and runs a single
//! command through [`lotgrid_core::LotClient`].

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod cli;
pub mod commands;
pub mod context;
pub mod prompt;
pub mod render;
pub mod shutdown;

pub use context::Context;
