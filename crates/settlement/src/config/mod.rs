// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Settlement config interface.
//!
//! Components load their typed configuration by name from a shared provider,
//! with lazy deserialization. Configuration provider requires all types to
//! implement Default so that it can be used for the trivial default provider,
//! and Deserialize. Missing fields fall back to defaults through
//! `#[serde(default)]`.
//!
//! How to use:
//! 1. Instantiate the ConfigProvider implementation on the top level of your application
//! 2. Let your components accept that instance:
//!         - `pub fn with_config(config_provider: &impl ConfigProvider)`

pub mod default;
pub mod json;

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use default::DefaultConfigProvider;
pub use json::JsonConfigProvider;

pub const RETRY_CONFIG: &str = "retry";
pub const ROLLUP_CONFIG: &str = "rollup";
pub const TRACKER_CONFIG: &str = "tracker";

#[derive(Debug, thiserror::Error)]
pub enum ConfigProviderError {
    /// Unreadable configuration source.
    #[error("Internal config provider error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("Invalid config section {name}: {source}")]
    InvalidSection {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl From<std::io::Error> for ConfigProviderError {
    fn from(value: std::io::Error) -> Self {
        Self::Internal(Box::new(value))
    }
}

impl From<serde_json::Error> for ConfigProviderError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(Box::new(value))
    }
}

pub trait ConfigProvider: Send + Sync + 'static {
    /// Get configuration for a particular component given its name.
    fn get_config<T: DeserializeOwned + Default>(
        &self,
        name: &'static str,
    ) -> Result<T, ConfigProviderError>;
}

/// Bounded exponential backoff applied to every remote read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(with = "duration_ms")]
    pub initial_delay: Duration,
    pub multiplier: f64,
    /// Total number of attempts, the first one included
    pub max_attempts: usize,
    #[serde(with = "option_duration_ms")]
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 1.4,
            max_attempts: 10,
            max_delay: None,
        }
    }
}

/// Rollup protocol constants, in L1 blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    pub commitment_period: u32,
    pub challenge_window: u32,
    /// Expected L1 block time, used to sleep until the earliest cementing level
    #[serde(with = "duration_ms")]
    pub block_time: Duration,
}

impl Default for RollupConfig {
    fn default() -> Self {
        // Ghostnet
        Self {
            commitment_period: 20,
            challenge_window: 40,
            block_time: Duration::from_secs(8),
        }
    }
}

impl RollupConfig {
    /// Number of L1 blocks between an outbox level and the earliest cementing level.
    pub fn cementing_delay(&self) -> u32 {
        self.commitment_period.saturating_add(self.challenge_window)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    pub store_path: PathBuf,
    /// Storage slot of the ticket hash in the L2 proxy (ERC wrapper) contract
    pub proxy_ticket_hash_slot: Option<u64>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            store_path: PathBuf::from("fa-bridge-transfers.json"),
            proxy_ticket_hash_slot: None,
        }
    }
}

/// Caller-owned generator of unique names (test prefixes, aliases).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSequence {
    prefix: String,
    next: u64,
}

impl NameSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::starting_at(prefix, 0)
    }

    pub fn starting_at(prefix: impl Into<String>, next: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next,
        }
    }

    pub fn next_name(&mut self) -> String {
        let name = format!("{}_{}", self.prefix, self.next);
        self.next += 1;
        name
    }

    /// Value the next name will use, persist it to resume the sequence.
    pub fn position(&self) -> u64 {
        self.next
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub(crate) mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&(value.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_milliseconds() {
        let config = RetryConfig {
            max_delay: Some(Duration::from_millis(2500)),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["initial_delay"], 1000);
        assert_eq!(json["max_delay"], 2500);
        assert_eq!(serde_json::from_value::<RetryConfig>(json).unwrap(), config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: RollupConfig =
            serde_json::from_str(r#"{ "challenge_window": 3 }"#).unwrap();
        assert_eq!(config.challenge_window, 3);
        assert_eq!(config.commitment_period, RollupConfig::default().commitment_period);
        assert_eq!(config.cementing_delay(), 23);
    }

    #[test]
    fn name_sequence_is_caller_owned() {
        let mut names = NameSequence::new("fa_test");
        assert_eq!(names.next_name(), "fa_test_0");
        assert_eq!(names.next_name(), "fa_test_1");

        let mut resumed = NameSequence::starting_at("fa_test", names.position());
        assert_eq!(resumed.next_name(), "fa_test_2");
        // independent sequences do not interfere
        assert_eq!(NameSequence::new("other").next_name(), "other_0");
    }
}
