//! Bulk clear.

use anyhow::Result;
use itertools::Itertools;
use lotgrid_core::SlotId;

use crate::{prompt, Context};

/// Clear occupants and leases from `slots`, live leases included.
pub async fn run(ctx: &Context, slots: &[SlotId], yes: bool) -> Result<()> {
    let ids: Vec<SlotId> = slots.iter().copied().unique().collect();
    let listed = ids.iter().join(", ");

    if !yes && !prompt::confirm(&format!("Clear slot(s) {listed}? Live edits will be lost."))? {
        println!("Aborted; nothing cleared");
        return Ok(());
    }

    let mut client = ctx.client().await?;
    client.enter_selection();
    for id in &ids {
        client.toggle_selected(*id)?;
    }
    let cleared = client.clear_selected().await?;
    println!("✓ Cleared {cleared} slot(s): {listed}");
    Ok(())
}
