//! Redraw the grid whenever the database changes.

use anyhow::Result;
use lotgrid_core::LotClient;

use crate::{render, shutdown::wait_for_shutdown, Context};

pub async fn run(ctx: &Context) -> Result<()> {
    let notifier = ctx.watch()?;
    let mut client = ctx.client_watching(&notifier).await?;
    draw(&client);

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => return result,
            report = client.next_change() => match report? {
                Some(report) if report.changed => draw(&client),
                Some(_) => {}
                None => {
                    tracing::warn!("Change notifications stopped");
                    return Ok(());
                }
            },
        }
    }
}

fn draw(client: &LotClient) {
    println!("── generation {} ──", client.generation());
    println!(
        "{}",
        render::table(client.slots(), client.me(), client.leases().now())
    );
}
