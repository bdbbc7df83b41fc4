//! Initial grid layout.
//!
//! Slots are numbered row by row. The first column is the west edge, the last
//! column the east edge, everything between is the center block.

use strum::{Display, EnumString};

use crate::{
    config::LayoutConfig,
    store::SlotStore,
    types::{SlotId, SlotSeed},
    Error, Result,
};

/// Grouping key of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Area {
    West,
    Center,
    East,
}

/// Rectangular grid of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub slots: u32,
    pub columns: u32,
}

impl GridLayout {
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if there are no slots or fewer than two
    /// columns.
    pub fn new(slots: u32, columns: u32) -> Result<Self> {
        if slots == 0 {
            return Err(Error::InvalidConfig("layout needs at least one slot".into()));
        }
        if columns < 2 {
            return Err(Error::InvalidConfig(format!(
                "layout needs at least 2 columns, got {columns}"
            )));
        }
        Ok(Self { slots, columns })
    }

    /// Area and label of slot `id` (1-based).
    #[must_use]
    pub fn place(&self, id: u32) -> (Area, String) {
        let index = id.saturating_sub(1);
        let row = index / self.columns + 1;
        match index % self.columns {
            0 => (Area::West, format!("W-{row}")),
            col if col == self.columns - 1 => (Area::East, format!("E-{row}")),
            _ => (Area::Center, "V".to_string()),
        }
    }

    #[must_use]
    pub fn seeds(&self) -> Vec<SlotSeed> {
        (1..=self.slots)
            .map(|id| {
                let (area, label) = self.place(id);
                SlotSeed {
                    id: SlotId::new(i64::from(id)),
                    label,
                    area: area.to_string(),
                }
            })
            .collect()
    }
}

impl TryFrom<&LayoutConfig> for GridLayout {
    type Error = Error;

    fn try_from(config: &LayoutConfig) -> Result<Self> {
        Self::new(config.slots, config.columns)
    }
}

/// Insert every slot of `layout` that the store does not have yet.
///
/// Returns how many were inserted.
///
/// # Errors
///
/// Returns `Error::WriteFailed` if the store write failed.
pub async fn provision(store: &dyn SlotStore, layout: &GridLayout) -> Result<u64> {
    let inserted = store.provision(&layout.seeds()).await?;
    tracing::info!(slots = layout.slots, inserted, "Provisioned grid");
    Ok(inserted)
}
