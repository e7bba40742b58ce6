// SPDX-FileCopyrightText: 2024 Nomadic Labs <contact@nomadic-labs.com>
//
// SPDX-License-Identifier: MIT

//! `0x`-prefixed hex rendering of raw payloads (routing info, ticket
//! content, proofs) in persisted transfers and indexer records.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct HexString(pub Vec<u8>);

impl HexString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for HexString {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for HexString {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for HexString {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl fmt::Display for HexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl Serialize for HexString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HexString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: String = Deserialize::deserialize(deserializer)?;
        if let Some(hex) = value.strip_prefix("0x") {
            let bytes = hex::decode(hex).map_err(serde::de::Error::custom)?;
            Ok(Self(bytes))
        } else {
            Err(serde::de::Error::custom(
                "Hex string is missing '0x' prefix",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_requires_prefix() {
        let value = HexString(vec![0xde, 0xad]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"0xdead\"");
        assert_eq!(
            serde_json::from_str::<HexString>("\"0xdead\"").unwrap(),
            value
        );
        assert!(serde_json::from_str::<HexString>("\"dead\"").is_err());
        assert!(serde_json::from_str::<HexString>("\"0xzz\"").is_err());
    }
}
