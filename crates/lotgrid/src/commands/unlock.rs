//! Force-release every lease.

use anyhow::Result;

use crate::{prompt, Context};

pub async fn run(ctx: &Context, yes: bool) -> Result<()> {
    if !yes && !prompt::confirm("Release every lease, discarding other clients' edits?")? {
        println!("Aborted; no lease released");
        return Ok(());
    }

    let mut client = ctx.client().await?;
    let released = client.force_release_all().await?;
    tracing::warn!(released, "Force-released all leases");
    println!("✓ Released {released} lease(s)");
    Ok(())
}
