//! Print the durable client id.

use std::path::PathBuf;

use anyhow::Result;

use crate::context::{resolve_identity, settings};

/// Does not open the store.
pub fn run(db: Option<PathBuf>) -> Result<()> {
    let config = settings(db)?;
    println!("{}", resolve_identity(&config)?);
    Ok(())
}
