//! Move command implementation
//!
//! Moves an occupant and then places whatever it bumped. Placements given with
//! `--place` are applied in order; anything still pooled afterwards is asked
//! about interactively until it is placed or discarded.

use anyhow::Result;
use lotgrid_core::{coordination::PooledOccupant, LotClient, RelocationOutcome, SlotId};

use crate::{prompt, Context};

/// Move command options
#[derive(Debug, Clone)]
pub struct MoveOptions {
    pub from: SlotId,
    pub to: SlotId,
    pub place: Vec<SlotId>,
}

/// Run the move command
///
/// # Errors
///
/// Returns an error if the move or a `--place` fails, or if a write failed
/// after another had already landed (the occupant may then be in two slots).
pub async fn run(ctx: &Context, options: &MoveOptions) -> Result<()> {
    let mut client = ctx.client().await?;

    match client.move_occupant(options.from, options.to).await {
        RelocationOutcome::NothingToMove => {
            println!("Slot {} is empty; nothing to move", options.from);
            return Ok(());
        }
        // The destination was overwritten. Find its old occupant a home
        // before reporting the failure.
        outcome @ RelocationOutcome::PartialFailure { .. } => {
            place_interactively(&mut client).await?;
            outcome.into_result()?;
            return Ok(());
        }
        outcome => announce(
            &format!("Moved slot {} to {}", options.from, options.to),
            outcome.into_result()?,
        ),
    }

    for dest in &options.place {
        if client.pool().is_none() {
            tracing::warn!(%dest, "Nothing pooled; ignoring --place");
            continue;
        }
        let outcome = client.place_pooled(*dest).await;
        announce(&format!("Placed pooled occupant in slot {dest}"), outcome.into_result()?);
    }

    place_interactively(&mut client).await
}

async fn place_interactively(client: &mut LotClient) -> Result<()> {
    while let Some(pooled) = client.pool() {
        let question = format!(
            "Slot for pooled '{}' (bumped from {}), empty to discard:",
            pooled.occupant.name, pooled.bumped_from
        );
        let answer = prompt::ask(&question)?;

        if answer.is_empty() {
            if let Some(discarded) = client.discard_pool() {
                println!(
                    "✗ Discarded '{}'; it is no longer in any slot",
                    discarded.occupant.name
                );
            }
            break;
        }

        let dest: SlotId = match answer.parse() {
            Ok(dest) => dest,
            Err(e) => {
                #[allow(clippy::print_stderr)]
                {
                    eprintln!("{e}");
                }
                continue;
            }
        };

        match client.place_pooled(dest).await {
            outcome @ RelocationOutcome::PartialFailure { .. } => {
                outcome.into_result()?;
            }
            outcome => match outcome.into_result() {
                Ok(bumped) => announce(&format!("Placed pooled occupant in slot {dest}"), bumped),
                // The pool is kept; ask again.
                Err(e) => {
                    #[allow(clippy::print_stderr)]
                    {
                        eprintln!("Error: {e}");
                    }
                }
            },
        }
    }
    Ok(())
}

fn announce(done: &str, bumped: Option<PooledOccupant>) {
    match bumped {
        Some(pooled) => println!(
            "✓ {done}; '{}' bumped from slot {} is now pooled",
            pooled.occupant.name, pooled.bumped_from
        ),
        None => println!("✓ {done}"),
    }
}
