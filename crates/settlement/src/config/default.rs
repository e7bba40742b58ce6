// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ConfigProvider, ConfigProviderError};

/// Every section at its default value: 1s initial backoff, 20 + 40 blocks
/// to cement, 10s tracker poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfigProvider;

impl ConfigProvider for DefaultConfigProvider {
    fn get_config<T: DeserializeOwned + Default>(
        &self,
        name: &'static str,
    ) -> Result<T, ConfigProviderError> {
        debug!("Using default {} config", name);
        Ok(T::default())
    }
}
