//! Hold a slot's lease until interrupted.

use anyhow::Result;
use lotgrid_core::{Error, LotClient, SlotId, StaleLease};

use super::claim;
use crate::{shutdown::wait_for_shutdown, Context};

pub async fn run(ctx: &Context, slot: SlotId, force: bool) -> Result<()> {
    // Without the file watcher a takeover goes unnoticed until release.
    let notifier = if ctx.config.watch.enabled {
        Some(ctx.watch()?)
    } else {
        None
    };
    let mut client = match &notifier {
        Some(notifier) => ctx.client_watching(notifier).await?,
        None => ctx.client().await?,
    };

    claim(&mut client, slot, force).await?;
    println!("✓ Holding slot {slot} as {}; press Ctrl-C to release", client.me());

    hold_until_shutdown(&mut client).await?;

    if client.cancel_edit().await? {
        println!("✓ Released slot {slot}");
    } else {
        println!("Slot {slot} was no longer held by you");
    }
    Ok(())
}

async fn hold_until_shutdown(client: &mut LotClient) -> Result<()> {
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => return result,
            report = client.next_change() => {
                match report? {
                    Some(report) => {
                        if let Some(stale) = report.stale {
                            return Err(superseded(stale).into());
                        }
                    }
                    // Not subscribed or the watcher stopped.
                    None => break,
                }
            }
        }
    }

    shutdown.await
}

fn superseded(stale: StaleLease) -> Error {
    match stale {
        StaleLease::Cleared { slot } => Error::LeaseSuperseded { slot, holder: None },
        StaleLease::Reassigned { slot, holder } => Error::LeaseSuperseded {
            slot,
            holder: Some(holder),
        },
    }
}
