//! Release this client's lease on a slot.

use anyhow::Result;
use lotgrid_core::SlotId;

use crate::Context;

pub async fn run(ctx: &Context, slot: SlotId) -> Result<()> {
    let mut client = ctx.client().await?;
    if client.release(slot).await? {
        println!("✓ Released slot {slot}");
    } else {
        // Not an error: the lease may have expired and been reclaimed.
        println!("Slot {slot} is not leased by you; nothing released");
    }
    Ok(())
}
