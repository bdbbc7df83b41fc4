//! Configuration loading from files and environment
//!
//! Files are merged as TOML tables before deserializing, so a project file
//! that sets only `[watch] debounce_ms` keeps every other global setting.

use std::path::{Path, PathBuf};

use super::types::Config;
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy
///
/// # Errors
///
/// Returns error if:
/// - A config file is malformed TOML
/// - An environment override cannot be parsed
/// - Config values fail validation
pub fn load_config() -> Result<Config> {
    let global = global_config_path();
    let project = project_config_path()?;
    load_config_from(global.as_deref(), Some(&project))
}

/// Load configuration from explicit file locations, then apply environment
/// overrides. Missing files are skipped.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(global: Option<&Path>, project: Option<&Path>) -> Result<Config> {
    let merged = [global, project]
        .into_iter()
        .flatten()
        .filter(|path| path.exists())
        .try_fold(toml::Table::new(), |acc, path| {
            load_toml_table(path).map(|table| merge_tables(acc, table))
        })?;

    let config: Config = toml::Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| Error::Parse(format!("Invalid config: {e}")))?;

    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lotgrid")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Get path to project config file
///
/// # Errors
///
/// Returns error if current directory cannot be determined
pub fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".lotgrid/config.toml"))
        .map_err(|e| Error::Io(format!("Failed to get current directory: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE LOADING AND MERGING
// ═══════════════════════════════════════════════════════════════════════════

fn load_toml_table(path: &Path) -> Result<toml::Table> {
    if path.is_dir() {
        return Err(Error::Io(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("Failed to read config file {}: {e}", path.display())))?;

    content.parse::<toml::Table>().map_err(|e| {
        Error::Parse(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

/// Deep-merge `overlay` into `base`; overlay wins on conflicting scalars.
fn merge_tables(mut base: toml::Table, overlay: toml::Table) -> toml::Table {
    for (key, value) in overlay {
        let merged = match (base.remove(&key), value) {
            (Some(toml::Value::Table(lower)), toml::Value::Table(upper)) => {
                toml::Value::Table(merge_tables(lower, upper))
            }
            (_, value) => value,
        };
        base.insert(key, merged);
    }
    base
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT OVERRIDES
// ═══════════════════════════════════════════════════════════════════════════

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    std::env::var(name).ok().map_or(Ok(None), |value| {
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("Invalid {name} value '{value}': {e}")))
    })
}

impl Config {
    /// Apply `LOTGRID_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an unparsable value
    pub fn apply_env_vars(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("LOTGRID_DB") {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "LOTGRID_DB cannot be empty - unset the variable or provide a path".into(),
                ));
            }
            self.store.path = PathBuf::from(value);
        }

        if let Some(enabled) = env_parse("LOTGRID_WATCH_ENABLED")? {
            self.watch.enabled = enabled;
        }

        if let Some(debounce) = env_parse("LOTGRID_WATCH_DEBOUNCE_MS")? {
            self.watch.debounce_ms = debounce;
        }

        if let Some(slots) = env_parse("LOTGRID_LAYOUT_SLOTS")? {
            self.layout.slots = slots;
        }

        if let Some(columns) = env_parse("LOTGRID_LAYOUT_COLUMNS")? {
            self.layout.columns = columns;
        }

        if let Ok(value) = std::env::var("LOTGRID_IDENTITY_PATH") {
            self.identity.path = Some(PathBuf::from(value));
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    #[test]
    #[serial]
    fn test_no_files_gives_defaults() -> Result<()> {
        let config = load_config_from(None, None)?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[test]
    #[serial]
    fn test_project_overrides_global_per_key() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let global = write(
            dir.path(),
            "global.toml",
            "[watch]\ndebounce_ms = 300\n[layout]\nslots = 60\n",
        )?;
        let project = write(dir.path(), "project.toml", "[watch]\ndebounce_ms = 40\n")?;

        let config = load_config_from(Some(&global), Some(&project))?;
        assert_eq!(config.watch.debounce_ms, 40);
        assert_eq!(config.layout.slots, 60, "global key survives");
        assert!(config.watch.enabled);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_parse_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let project = write(dir.path(), "bad.toml", "[watch\n")?;
        let result = load_config_from(None, Some(&project));
        assert!(matches!(result, Err(Error::Parse(_))));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_directory_path_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = load_config_from(None, Some(dir.path()));
        assert!(matches!(result, Err(Error::Io(_))));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_overrides_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let project = write(dir.path(), "p.toml", "[store]\npath = \"a.db\"\n")?;
        std::env::set_var("LOTGRID_DB", "b.db");
        std::env::set_var("LOTGRID_LAYOUT_COLUMNS", "4");
        let result = load_config_from(None, Some(&project));
        std::env::remove_var("LOTGRID_DB");
        std::env::remove_var("LOTGRID_LAYOUT_COLUMNS");

        let config = result?;
        assert_eq!(config.store.path, PathBuf::from("b.db"));
        assert_eq!(config.layout.columns, 4);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_bad_env_value() {
        std::env::set_var("LOTGRID_WATCH_DEBOUNCE_MS", "soon");
        let result = load_config_from(None, None);
        std::env::remove_var("LOTGRID_WATCH_DEBOUNCE_MS");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_merge_tables_is_deep() -> Result<()> {
        let base: toml::Table = "[a]\nx = 1\ny = 2\n".parse().map_err(Error::from)?;
        let overlay: toml::Table = "[a]\ny = 3\n".parse().map_err(Error::from)?;
        let merged = merge_tables(base, overlay);
        let a = merged.get("a").and_then(toml::Value::as_table);
        assert_eq!(a.and_then(|t| t.get("x")).and_then(toml::Value::as_integer), Some(1));
        assert_eq!(a.and_then(|t| t.get("y")).and_then(toml::Value::as_integer), Some(3));
        Ok(())
    }
}
