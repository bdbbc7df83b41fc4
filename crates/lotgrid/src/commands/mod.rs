//! One module per subcommand.

pub mod clear;
pub mod edit;
pub mod hold;
pub mod init;
pub mod list;
pub mod relocate;
pub mod release;
pub mod unlock;
pub mod watch;
pub mod whoami;

use anyhow::Result;
use lotgrid_core::{Error, LotClient, SlotId};

/// Open an edit session on `slot`, force-claiming when asked.
///
/// A plain rejection is annotated with how to override it; retrying is left
/// to the user.
pub(crate) async fn claim(client: &mut LotClient, slot: SlotId, force: bool) -> Result<()> {
    if force {
        client.force_edit(slot).await?;
        tracing::warn!(%slot, "Force-claimed slot");
        return Ok(());
    }
    match client.begin_edit(slot).await {
        Ok(()) => Ok(()),
        Err(e @ Error::ClaimRejected { .. }) => Err(anyhow::Error::new(e).context(format!(
            "Cannot claim slot {slot} (use --force to take it over)"
        ))),
        Err(e) => Err(e.into()),
    }
}
