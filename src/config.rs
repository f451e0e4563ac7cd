//! Run settings.
//!
//! Every tunable has a default matching the behavior operators expect from
//! the CBC scripts (30000-row pages, batches of 50, 5 s settle, 10 s pause
//! between batches). A TOML file can override any subset:
//!
//! ```toml
//! base_url = "https://defense-prod05.conferdeploy.net/"
//! page_size = 10000
//! batch_size = 25
//! settle_secs = 5
//! batch_pause_secs = 10
//! request_timeout_secs = 300
//! inactive_threshold_days = 90
//! ```
//!
//! CLI flags and environment variables are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CbcError, Result};

/// Default API host. The trailing slash matters: request paths are appended
/// without a leading slash.
pub const DEFAULT_BASE_URL: &str = "https://defense-prod05.conferdeploy.net/";

/// Maximum rows CBC returns per search call. Reduce it if searches come
/// back with 400.
pub const DEFAULT_PAGE_SIZE: u64 = 30_000;

/// Maximum number of devices per bulk device action.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Days without contact before a device counts as inactive.
pub const DEFAULT_INACTIVE_THRESHOLD_DAYS: u32 = 90;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub base_url: String,
    pub page_size: u64,
    pub batch_size: usize,
    /// Blind wait between the uninstall and the delete action.
    pub settle_secs: u64,
    /// Pause between consecutive bulk batches.
    pub batch_pause_secs: u64,
    /// Full round-trip limit for one API request.
    pub request_timeout_secs: u64,
    pub inactive_threshold_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            settle_secs: 5,
            batch_pause_secs: 10,
            request_timeout_secs: 300,
            inactive_threshold_days: DEFAULT_INACTIVE_THRESHOLD_DAYS,
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CbcError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| CbcError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values that would make the scanner or the batcher loop
    /// forever or do nothing.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CbcError::Config("page_size must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(CbcError::Config("batch_size must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(CbcError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.base_url.ends_with('/') {
            return Err(CbcError::Config(format!(
                "base_url must end with '/': {}",
                self.base_url
            )));
        }
        Ok(())
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_script_constants() {
        let s = Settings::default();
        assert_eq!(s.page_size, 30_000);
        assert_eq!(s.batch_size, 50);
        assert_eq!(s.settle(), Duration::from_secs(5));
        assert_eq!(s.batch_pause(), Duration::from_secs(10));
        assert_eq!(s.request_timeout(), Duration::from_secs(300));
        assert_eq!(s.inactive_threshold_days, 90);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let s = Settings::from_toml("page_size = 1000\nbatch_size = 10\n").unwrap();
        assert_eq!(s.page_size, 1000);
        assert_eq!(s.batch_size, 10);
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.settle_secs, 5);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_toml("pagesize = 10").unwrap_err();
        assert!(matches!(err, CbcError::Config(_)));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = Settings::from_toml("page_size = 0").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(Settings::from_toml("batch_size = 0").is_err());
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        assert!(Settings::from_toml("request_timeout_secs = 0").is_err());
    }

    #[test]
    fn base_url_without_trailing_slash_is_rejected() {
        assert!(Settings::from_toml(r#"base_url = "https://example.test""#).is_err());
    }
}
