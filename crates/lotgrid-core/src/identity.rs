//! Durable client identity.
//!
//! Each client generates its id once and reuses it on every later run, so a
//! lease taken before a restart is still recognised as its own. The id has no
//! server-side registration; the file is the only record of it.

use std::path::{Path, PathBuf};

use crate::{types::ClientId, Error, Result};

/// Default location of the client id file in the user data dir.
pub fn default_identity_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lotgrid")
        .map(|dirs| dirs.data_local_dir().join("client-id"))
}

/// Read the client id at `path`, generating and persisting one if absent.
///
/// # Errors
///
/// Returns error if the file exists but is unreadable or holds an invalid id,
/// or if a new id cannot be written.
pub fn load_or_create(path: &Path) -> Result<ClientId> {
    match std::fs::read_to_string(path) {
        Ok(content) => ClientId::parse(&content).map_err(|e| {
            Error::Validation(format!("Corrupt client id file {}: {e}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let id = ClientId::generate();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Io(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
            std::fs::write(path, format!("{id}\n"))
                .map_err(|e| Error::Io(format!("Failed to write {}: {e}", path.display())))?;
            tracing::info!(client = %id, path = %path.display(), "Generated new client id");
            Ok(id)
        }
        Err(e) => Err(Error::Io(format!(
            "Failed to read client id {}: {e}",
            path.display()
        ))),
    }
}
