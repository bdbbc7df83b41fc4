//! File watching for the shared database.
//!
//! Separate processes writing the same SQLite file cannot see each other's
//! in-process notifications. `FileWatchNotifier` watches the database file and
//! its `-wal` / `-shm` siblings and republishes every debounced filesystem
//! event as a change signal.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use lotgrid_core::{
//!     config::WatchConfig,
//!     notifier::ChangeNotifier,
//!     watcher::FileWatchNotifier,
//! };
//!
//! # async fn example() -> lotgrid_core::Result<()> {
//! let notifier = FileWatchNotifier::watch(Path::new(".lotgrid/lot.db"), &WatchConfig::default())?;
//! let mut changes = notifier.subscribe();
//! while changes.changed().await {
//!     // re-read the store
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};

use crate::{
    config::WatchConfig,
    notifier::{ChangeNotifier, LocalNotifier, Subscription},
    Error, Result,
};

/// Change notifier fed by filesystem events on the database file.
pub struct FileWatchNotifier {
    local: LocalNotifier,
    // Dropping the debouncer stops the watch.
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

impl FileWatchNotifier {
    /// Watch the database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Watching is disabled in config
    /// - `debounce_ms` is outside 10-5000
    /// - The parent directory cannot be watched
    pub fn watch(db_path: &Path, config: &WatchConfig) -> Result<Self> {
        if !config.enabled {
            return Err(Error::InvalidConfig("File watcher is disabled".to_string()));
        }
        if config.debounce_ms < 10 || config.debounce_ms > 5000 {
            return Err(Error::InvalidConfig(format!(
                "debounce_ms must be between 10 and 5000, got {}",
                config.debounce_ms
            )));
        }

        let file_name = db_path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| Error::InvalidConfig(format!("Not a file: {}", db_path.display())))?;
        let dir = watch_dir(db_path);

        let local = LocalNotifier::new();
        let publisher = local.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(u64::from(config.debounce_ms)),
            move |res: notify_debouncer_mini::DebounceEventResult| match res {
                Ok(events) => {
                    if events.iter().any(|event| touches_db(event, &file_name)) {
                        publisher.publish();
                    }
                }
                Err(e) => tracing::warn!("File watcher error: {e}"),
            },
        )
        .map_err(|e| Error::Io(format!("Failed to create file watcher: {e}")))?;

        // Watch the directory: SQLite replaces WAL/SHM files as it goes.
        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Io(format!("Failed to watch {}: {e}", dir.display())))?;

        tracing::debug!(path = %db_path.display(), "Watching database for changes");

        Ok(Self {
            local,
            _debouncer: debouncer,
        })
    }
}

impl ChangeNotifier for FileWatchNotifier {
    fn subscribe(&self) -> Subscription {
        self.local.subscribe()
    }

    fn publish(&self) {
        self.local.publish();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════

fn watch_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Whether the event is for the database file or one of its journal files.
fn touches_db(event: &DebouncedEvent, db_file: &OsString) -> bool {
    let prefix = db_file.to_string_lossy();
    event
        .path
        .file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| name.starts_with(prefix.as_ref()))
}

#[cfg(test)]
mod tests {
    use notify_debouncer_mini::DebouncedEventKind;

    use super::*;

    fn event(path: &str) -> DebouncedEvent {
        DebouncedEvent {
            path: PathBuf::from(path),
            kind: DebouncedEventKind::Any,
        }
    }

    #[test]
    fn test_touches_db_matches_journal_files() {
        let name = OsString::from("lot.db");
        assert!(touches_db(&event("/x/lot.db"), &name));
        assert!(touches_db(&event("/x/lot.db-wal"), &name));
        assert!(touches_db(&event("/x/lot.db-shm"), &name));
        assert!(!touches_db(&event("/x/config.toml"), &name));
    }

    #[test]
    fn test_watch_dir_for_bare_file() {
        assert_eq!(watch_dir(Path::new("lot.db")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/a/lot.db")), PathBuf::from("/a"));
    }

    #[test]
    fn test_disabled_watch_is_rejected() {
        let config = WatchConfig {
            enabled: false,
            ..WatchConfig::default()
        };
        let result = FileWatchNotifier::watch(Path::new("lot.db"), &config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_debounce_range_enforced() {
        let config = WatchConfig {
            enabled: true,
            debounce_ms: 1,
        };
        let result = FileWatchNotifier::watch(Path::new("lot.db"), &config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_write_to_db_file_publishes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = dir.path().join("lot.db");
        std::fs::write(&db, b"seed")?;
        let notifier = FileWatchNotifier::watch(
            &db,
            &WatchConfig {
                enabled: true,
                debounce_ms: 20,
            },
        )?;
        let mut sub = notifier.subscribe();
        std::fs::write(&db, b"changed")?;
        let got = tokio::time::timeout(Duration::from_secs(5), sub.changed()).await;
        assert!(matches!(got, Ok(true)));
        Ok(())
    }
}
