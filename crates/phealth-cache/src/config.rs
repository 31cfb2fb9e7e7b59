//! Cache configuration.

use std::time::Duration;

use phealth_error::{HealthError, Result};
use serde::{Deserialize, Serialize};

/// Default fetch timeout (30 seconds).
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Default bound on queued refresh jobs.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Tunables for [`crate::PartitionHealthCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on one fetch round trip in milliseconds; 0 disables it.
    pub fetch_timeout_ms: u64,
    /// Maximum number of queued (not yet in-flight) refresh jobs.
    pub max_pending: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl CacheConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| HealthError::config(format!("cannot parse cache config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pending == 0 {
            return Err(HealthError::config("max_pending must be > 0"));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout_ms =
            timeout.map_or(0, |limit| u64::try_from(limit.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Option<Duration> {
        if self.fetch_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.fetch_timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = CacheConfig::from_json_str(r#"{"fetch_timeout_ms": 0}"#).expect("config");
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
    }

    #[test]
    fn zero_pending_rejected() {
        let err = CacheConfig::from_json_str(r#"{"max_pending": 0}"#).expect_err("invalid");
        assert!(matches!(err, HealthError::Config { .. }), "{err}");
    }

    #[test]
    fn unparseable_json_rejected() {
        let err = CacheConfig::from_json_str("{").expect_err("invalid JSON");
        assert!(err.to_string().contains("cannot parse"), "{err}");
    }

    #[test]
    fn builder_round_trips_timeout() {
        let config = CacheConfig::default().with_fetch_timeout(Some(Duration::from_millis(250)));
        assert_eq!(config.fetch_timeout_ms, 250);
        assert_eq!(
            CacheConfig::default().with_fetch_timeout(None).fetch_timeout(),
            None
        );
    }
}
