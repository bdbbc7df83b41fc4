//! Domain types for the slot grid
//!
//! # Parse-at-Boundaries
//!
//! `ClientId` validates on construction and cannot hold an empty or
//! whitespace-only value. `SlotId` is a plain integer newtype; ids are
//! assigned at provisioning and never reused.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum length of a client identifier.
const MAX_CLIENT_ID_LEN: usize = 128;

// ═══════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════

/// Stable integer identity of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(i64);

impl SlotId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SlotId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| Error::Validation(format!("Invalid slot id '{s}': {e}")))
    }
}

/// Opaque per-client identifier, durable across that client's sessions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Parse a client id, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the id is empty, too long, or contains
    /// control characters.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation(
                "Client id cannot be empty or whitespace-only".to_string(),
            ));
        }
        if trimmed.len() > MAX_CLIENT_ID_LEN {
            return Err(Error::Validation(format!(
                "Client id exceeds {MAX_CLIENT_ID_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(Error::Validation(
                "Client id cannot contain control characters".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Generate a fresh random client id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// A holder exactly as a store recorded it, unvalidated, so the local view
    /// matches what the store's predicates compare against. Empty or
    /// space-only text is no holder.
    #[must_use]
    pub fn from_stored(raw: String) -> Option<Self> {
        (!raw.trim_matches(' ').is_empty()).then_some(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ClientId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// OCCUPANT
// ═══════════════════════════════════════════════════════════════════════════

/// The record parked in a slot.
///
/// Fields are opaque to the coordination layer. An occupant is always written
/// wholesale, never patched field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Occupant {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub memo: String,
    pub staff: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamped_at: Option<String>,
}

impl Occupant {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the display timestamp, formatted `YYYY/M/D H:MM`.
    #[must_use]
    pub fn stamp(mut self, now: DateTime<Utc>) -> Self {
        self.stamped_at = Some(format!(
            "{}/{}/{} {}:{:02}",
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute()
        ));
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LEASE AND SLOT
// ═══════════════════════════════════════════════════════════════════════════

/// Edit lease on a slot.
///
/// A holder with no heartbeat is a foreign or legacy lease and is always
/// treated as expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub holder: ClientId,
    pub heartbeat: Option<DateTime<Utc>>,
}

/// A slot as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub label: String,
    pub area: String,
    pub occupant: Option<Occupant>,
    pub lease: Option<Lease>,
}

impl Slot {
    #[must_use]
    pub const fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }

    #[must_use]
    pub fn holder(&self) -> Option<&ClientId> {
        self.lease.as_ref().map(|lease| &lease.holder)
    }
}

/// Initial definition of a slot, used when provisioning the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSeed {
    pub id: SlotId,
    pub label: String,
    pub area: String,
}
