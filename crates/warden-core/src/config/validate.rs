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
        if self.root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("root cannot be empty".to_string()));
        }

        let nonzero = [
            ("lock.lease_secs", self.lock.lease_secs),
            ("lock.timeout_secs", self.lock.timeout_secs),
            ("lock.max_backoff_secs", self.lock.max_backoff_secs),
            (
                "registry.stale_threshold_secs",
                self.registry.stale_threshold_secs,
            ),
            ("budget.default_limit", self.budget.default_limit),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be > 0")));
        }

        if self.lock.max_retries == 0 {
            return Err(Error::InvalidConfig("lock.max_retries must be > 0".into()));
        }
        if self.occ.max_attempts == 0 || self.registry.update_attempts == 0 {
            return Err(Error::InvalidConfig(
                "occ.max_attempts and registry.update_attempts must be > 0".into(),
            ));
        }
        if self.occ.backoff_min_ms > self.occ.backoff_max_ms {
            return Err(Error::InvalidConfig(format!(
                "occ.backoff_min_ms ({}) must not exceed occ.backoff_max_ms ({})",
                self.occ.backoff_min_ms, self.occ.backoff_max_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_lease_rejected() {
        let mut config = Config::default();
        config.lock.lease_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lock.lease_secs"));
    }

    #[test]
    fn test_inverted_backoff_rejected() {
        let mut config = Config::default();
        config.occ.backoff_min_ms = 5000;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
