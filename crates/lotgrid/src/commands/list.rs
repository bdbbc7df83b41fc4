//! Show the grid.

use anyhow::Result;

use crate::{render, Context};

pub async fn run(ctx: &Context, json: bool) -> Result<()> {
    let client = ctx.client().await?;
    let now = client.leases().now();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&render::json(client.slots(), client.me(), now))?
        );
    } else if client.slots().is_empty() {
        println!("No slots. Run 'lotgrid init' first.");
    } else {
        println!("{}", render::table(client.slots(), client.me(), now));
    }
    Ok(())
}
