//! Configuration type definitions and their defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure
///
/// Loaded from defaults → global → project → env vars → CLI flags
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub watch: WatchConfig,
    pub layout: LayoutConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database shared by every client.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub debounce_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    pub slots: u32,
    pub columns: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    /// Where the durable client id is kept. Defaults to the user data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".lotgrid/lot.db"),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 100,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            slots: 50,
            columns: 5,
        }
    }
}
