//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: ~/.config/lotgrid/config.toml
//! 3. Project config: .lotgrid/config.toml
//! 4. Environment variables: LOTGRID_*
//! 5. CLI flags (command-specific)
//!
//! # Example Config
//!
//! ```toml
//! [store]
//! path = "/srv/lot/lot.db"
//!
//! [watch]
//! debounce_ms = 250
//!
//! [layout]
//! slots = 60
//! columns = 6
//! ```
//!
//! Lease timing is not configurable; see `coordination::lease::LEASE_TTL`.

mod load;
mod types;
mod validate;

pub use load::{global_config_path, load_config, load_config_from, project_config_path};
pub use types::{Config, IdentityConfig, LayoutConfig, StoreConfig, WatchConfig};
