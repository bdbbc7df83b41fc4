//! Error types for lotgrid-core
//!
//! Errors fall into three groups:
//!
//! - **Protocol outcomes**: a claim was rejected, a lease was superseded, a
//!   relocation was only half applied. Recoverable; the caller decides.
//! - **Store failures**: a read or write did not complete. The caller must
//!   assume the write may or may not have landed and re-reconcile.
//! - **Ambient errors**: configuration, parsing, IO.
//!
//! Nothing here is fatal to the process; every failure is scoped to one
//! operation.

use strum::Display;
use thiserror::Error;

use crate::types::{ClientId, SlotId};

/// Which half of a two-write relocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RelocationStage {
    /// Writing the occupant into the destination slot.
    Destination,
    /// Vacating the source slot after the destination was written.
    Source,
}

/// Core error type for lotgrid operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Another client holds a live lease on the slot.
    #[error("Slot {slot} is being edited by {}", .holder.as_ref().map_or("another client", ClientId::as_str))]
    ClaimRejected {
        slot: SlotId,
        holder: Option<ClientId>,
    },

    /// The claim write failed at the store layer; treat as not claimed.
    #[error("Claim on slot {slot} is indeterminate: {reason}")]
    ClaimIndeterminate { slot: SlotId, reason: String },

    /// A mutation failed at the store layer and may or may not have applied.
    #[error("Write failed during {operation}: {reason}")]
    WriteFailed { operation: String, reason: String },

    /// One relocation write landed and the other did not.
    #[error(
        "Relocation {source_slot} -> {dest} partially applied: {stage} write failed: {reason}"
    )]
    PartialRelocation {
        stage: RelocationStage,
        source_slot: SlotId,
        dest: SlotId,
        reason: String,
    },

    /// The client's lease was taken over before it saved.
    #[error("Lease on slot {slot} was superseded{}", .holder.as_ref().map_or_else(String::new, |h| format!(" by {h}")))]
    LeaseSuperseded {
        slot: SlotId,
        holder: Option<ClientId>,
    },

    /// No edit session is open.
    #[error("No edit session is open")]
    NoOpenSession,

    /// Placement was requested with nothing in the pool.
    #[error("No pooled occupant to place")]
    PoolEmpty,

    /// Slot does not exist in the store.
    #[error("Slot {0} not found")]
    SlotNotFound(SlotId),

    /// The store has no multi-row transactions.
    #[error("Store does not support atomic multi-row writes")]
    TransactionsUnsupported,

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Input validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parse failure (JSON, TOML, timestamps)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(String),

    /// Store read failure
    #[error("Database error: {0}")]
    Database(String),
}

impl Error {
    /// Create a write failure for the named operation.
    pub fn write_failed(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::WriteFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the store may be in a state the local view does not know about.
    ///
    /// Callers seeing `true` must reconcile before trusting local state.
    pub const fn requires_reconcile(&self) -> bool {
        matches!(
            self,
            Self::ClaimIndeterminate { .. }
                | Self::WriteFailed { .. }
                | Self::PartialRelocation { .. }
                | Self::LeaseSuperseded { .. }
        )
    }

    /// Returns the process exit code for this error.
    ///
    /// - 1: user error (validation, bad configuration, empty pool)
    /// - 2: system error (IO, store transport)
    /// - 3: not found
    /// - 4: conflict or inconsistent state
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig(_)
            | Self::Validation(_)
            | Self::Parse(_)
            | Self::PoolEmpty
            | Self::NoOpenSession => 1,
            Self::Io(_)
            | Self::Database(_)
            | Self::WriteFailed { .. }
            | Self::ClaimIndeterminate { .. }
            | Self::TransactionsUnsupported => 2,
            Self::SlotNotFound(_) => 3,
            Self::ClaimRejected { .. }
            | Self::LeaseSuperseded { .. }
            | Self::PartialRelocation { .. } => 4,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(format!("Failed to parse config: {err}"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for lotgrid-core operations
pub type Result<T> = std::result::Result<T, Error>;
