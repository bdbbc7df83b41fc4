//! Per-invocation setup: config, identity and the shared store.

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use lotgrid_core::{
    config::load_config, identity, ChangeNotifier, ClientId, Config, FileWatchNotifier, LotClient,
    SqliteStore,
};

/// Everything a command needs to act as this client.
pub struct Context {
    pub config: Config,
    pub me: ClientId,
    store: Arc<SqliteStore>,
}

impl Context {
    /// Load config, read the client id and open the store.
    ///
    /// `db` is the `--db` flag, the last config layer.
    pub async fn open(db: Option<PathBuf>) -> Result<Self> {
        let config = settings(db)?;
        let me = resolve_identity(&config)?;
        let store = SqliteStore::open(&config.store.path).await?;
        tracing::debug!(client = %me, db = %config.store.path.display(), "Opened store");
        Ok(Self {
            config,
            me,
            store: Arc::new(store),
        })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// A client with a fresh view of the grid.
    pub async fn client(&self) -> Result<LotClient> {
        let mut client = LotClient::new(self.store.clone(), self.me.clone());
        client.refresh().await?;
        Ok(client)
    }

    /// A client subscribed to `notifier` before its first read, so no change
    /// between the read and the subscription is missed.
    pub async fn client_watching(&self, notifier: &dyn ChangeNotifier) -> Result<LotClient> {
        let mut client = LotClient::new(self.store.clone(), self.me.clone());
        client.subscribe(notifier);
        client.refresh().await?;
        Ok(client)
    }

    /// Watch the database file so other processes' writes wake us.
    pub fn watch(&self) -> Result<FileWatchNotifier> {
        Ok(FileWatchNotifier::watch(
            &self.config.store.path,
            &self.config.watch,
        )?)
    }
}

/// Layered config with the `--db` flag applied on top.
pub fn settings(db: Option<PathBuf>) -> Result<Config> {
    let mut config = load_config()?;
    if let Some(db) = db {
        config.store.path = db;
    }
    Ok(config)
}

/// Read or create the durable client id named by `identity.path`, falling
/// back to the user data dir.
pub fn resolve_identity(config: &Config) -> Result<ClientId> {
    let path = config
        .identity
        .path
        .clone()
        .or_else(identity::default_identity_path)
        .ok_or_else(|| {
            anyhow!("No home directory for the client id file; set identity.path or LOTGRID_IDENTITY_PATH")
        })?;
    Ok(identity::load_or_create(&path)?)
}
