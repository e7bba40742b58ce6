// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! JSON configuration provider.
//!
//! Reads one top level section per component:
//!
//! ```json
//! {
//!     "retry": { "initial_delay": 500, "max_attempts": 5 },
//!     "rollup": { "commitment_period": 2, "challenge_window": 3 }
//! }
//! ```
//!
//! Missing sections fall back to defaults.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{ConfigProvider, ConfigProviderError};

#[derive(Debug, Clone, Default)]
pub struct JsonConfigProvider {
    document: Value,
}

impl JsonConfigProvider {
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    pub fn parse(document: &str) -> Result<Self, ConfigProviderError> {
        Ok(Self::new(serde_json::from_str(document)?))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigProviderError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        debug!("Loaded configuration from {}", path.as_ref().display());
        Self::parse(&raw)
    }
}

impl ConfigProvider for JsonConfigProvider {
    fn get_config<T: DeserializeOwned + Default>(
        &self,
        name: &'static str,
    ) -> Result<T, ConfigProviderError> {
        match self.document.get(name) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(section) => T::deserialize(section)
                .map_err(|source| ConfigProviderError::InvalidSection { name, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{
        RetryConfig, RollupConfig, TrackerConfig, RETRY_CONFIG, ROLLUP_CONFIG, TRACKER_CONFIG,
    };

    #[test]
    fn reads_named_sections() {
        let provider = JsonConfigProvider::parse(
            r#"{
                "retry": { "initial_delay": 500, "max_attempts": 5 },
                "rollup": { "commitment_period": 2, "challenge_window": 3, "block_time": 100 }
            }"#,
        )
        .unwrap();

        let retry: RetryConfig = provider.get_config(RETRY_CONFIG).unwrap();
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.multiplier, 1.4);

        let rollup: RollupConfig = provider.get_config(ROLLUP_CONFIG).unwrap();
        assert_eq!(rollup.cementing_delay(), 5);

        let tracker: TrackerConfig = provider.get_config(TRACKER_CONFIG).unwrap();
        assert_eq!(tracker, TrackerConfig::default());
    }

    #[test]
    fn invalid_section_is_reported() {
        let provider =
            JsonConfigProvider::new(serde_json::json!({ "retry": { "max_attempts": "ten" } }));
        let err = provider.get_config::<RetryConfig>(RETRY_CONFIG).unwrap_err();
        assert!(matches!(err, ConfigProviderError::InvalidSection { name: "retry", .. }));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "tracker": { "poll_interval": 20 } }"#).unwrap();

        let tracker: TrackerConfig = JsonConfigProvider::from_path(&path)
            .unwrap()
            .get_config(TRACKER_CONFIG)
            .unwrap();
        assert_eq!(tracker.poll_interval, Duration::from_millis(20));
    }
}
