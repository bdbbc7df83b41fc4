//! Configuration validation

use super::types::Config;
use crate::{Error, Result};

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range or invalid
    pub fn validate(&self) -> Result<()> {
        if self.store.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("store.path cannot be empty".to_string()));
        }

        if self.watch.debounce_ms < 10 || self.watch.debounce_ms > 5000 {
            return Err(Error::InvalidConfig(
                "watch.debounce_ms must be 10-5000".to_string(),
            ));
        }

        if self.layout.slots == 0 {
            return Err(Error::InvalidConfig(
                "layout.slots must be at least 1".to_string(),
            ));
        }

        // West and east edge columns need distinct columns.
        if self.layout.columns < 2 {
            return Err(Error::InvalidConfig(
                "layout.columns must be at least 2".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_debounce_out_of_range() {
        let mut config = Config::default();
        config.watch.debounce_ms = 5;
        assert!(config.validate().is_err());
        config.watch.debounce_ms = 5001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layout_bounds() {
        let mut config = Config::default();
        config.layout.slots = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.layout.columns = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_store_path() {
        let mut config = Config::default();
        config.store.path = std::path::PathBuf::new();
        assert!(config.validate().is_err());
    }
}
