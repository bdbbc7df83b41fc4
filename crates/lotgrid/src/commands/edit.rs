//! Edit command implementation
//!
//! Claims a slot, merges the given fields into its current occupant and saves
//! the full occupant, which also releases the lease. The heartbeat runs for as
//! long as the session is open.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use lotgrid_core::{Error, Occupant, SlotId};

use super::claim;
use crate::Context;

/// Edit command options
#[derive(Debug, Clone)]
pub struct EditOptions {
    pub slot: SlotId,
    pub name: Option<String>,
    pub attrs: Vec<(String, String)>,
    pub memo: Option<String>,
    /// Replaces the staff list when non-empty
    pub staff: Vec<String>,
    pub stamp: bool,
    pub force: bool,
}

/// Parse one `KEY=VALUE` attribute.
pub fn parse_attr(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid attribute '{raw}': expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid attribute '{raw}': key is empty");
    }
    Ok((key.to_string(), value.to_string()))
}

/// Run the edit command
///
/// # Errors
///
/// Returns an error if:
/// - The slot does not exist
/// - Another client holds a live lease and `--force` was not given
/// - The result would have no occupant name
/// - The lease was taken over before the save landed
pub async fn run(ctx: &Context, options: &EditOptions) -> Result<()> {
    let mut client = ctx.client().await?;
    if client.slot(options.slot).is_none() {
        return Err(Error::SlotNotFound(options.slot).into());
    }

    claim(&mut client, options.slot, options.force).await?;

    // The claim re-read the store, so this is the occupant under our lease.
    let current = client
        .slot(options.slot)
        .and_then(|slot| slot.occupant.clone())
        .unwrap_or_default();
    let occupant = merge(current, options, client.leases().now());

    if occupant.name.trim().is_empty() {
        client.cancel_edit().await?;
        bail!("Slot {} is empty; give the occupant a --name", options.slot);
    }

    let name = occupant.name.clone();
    client.save(occupant).await?;
    println!("✓ Saved slot {}: {name}", options.slot);
    Ok(())
}

fn merge(mut occupant: Occupant, options: &EditOptions, now: DateTime<Utc>) -> Occupant {
    if let Some(name) = &options.name {
        occupant.name.clone_from(name);
    }
    occupant.attributes.extend(options.attrs.iter().cloned());
    if let Some(memo) = &options.memo {
        occupant.memo.clone_from(memo);
    }
    if !options.staff.is_empty() {
        occupant.staff.clone_from(&options.staff);
    }
    if options.stamp {
        occupant = occupant.stamp(now);
    }
    occupant
}
