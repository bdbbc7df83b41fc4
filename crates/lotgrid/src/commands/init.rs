//! Provision the grid.

use anyhow::Result;
use lotgrid_core::{provision, GridLayout, SlotStore};

use crate::Context;

pub async fn run(ctx: &Context) -> Result<()> {
    let layout = GridLayout::try_from(&ctx.config.layout)?;
    let added = provision(ctx.store(), &layout).await?;
    let total = ctx.store().select_all().await?.len();
    println!("✓ Provisioned {added} new slot(s), {total} total");
    println!("  Database: {}", ctx.config.store.path.display());
    Ok(())
}
