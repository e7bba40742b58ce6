// SPDX-FileCopyrightText: [2023] Serokell <hi@serokell.io>
// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Target entrypoint of a ticket transfer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FaBridgeError;

/// Entrypoint used when the caller does not name one: the generic receive handler.
pub const DEFAULT_EP_NAME: &str = "default";
const MAX_EP_LEN: usize = 31;

/// Part after `%` in `KT1BRd2ka5q2cPRdXALtXD1QZ38CPam2j1ye%foo`.
/// ASCII string of at most 31 characters.
#[derive(Debug, Clone, Eq, PartialOrd, Ord, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Entrypoint(String);

impl Default for Entrypoint {
    fn default() -> Self {
        Entrypoint(DEFAULT_EP_NAME.to_owned())
    }
}

impl fmt::Display for Entrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Entrypoint {
    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_EP_NAME
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts a name to an Entrypoint without checking its validity.
    ///
    /// Only meant for well-known entrypoint names.
    pub(crate) fn from_static_unchecked(name: &'static str) -> Self {
        Self(name.to_owned())
    }
}

impl TryFrom<&str> for Entrypoint {
    type Error = FaBridgeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Entrypoint::try_from(s.to_owned())
    }
}

impl TryFrom<String> for Entrypoint {
    type Error = FaBridgeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            Ok(Entrypoint::default())
        } else {
            check_ep_name(s.as_bytes())?;
            Ok(Entrypoint(s))
        }
    }
}

impl From<Entrypoint> for String {
    fn from(value: Entrypoint) -> Self {
        value.0
    }
}

fn check_ep_name(ep: &[u8]) -> Result<(), FaBridgeError> {
    if ep.len() > MAX_EP_LEN {
        return Err(FaBridgeError::InvalidEntrypoint(format!(
            "entrypoint name must be at most {} characters long, but it is {} characters long",
            MAX_EP_LEN,
            ep.len()
        )));
    }
    let mut first_char = true;
    for c in ep {
        // https://tezos.gitlab.io/alpha/michelson.html#syntax
        match c {
            b'_' | b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' => Ok(()),
            b'.' | b'%' | b'@' if !first_char => Ok(()),
            c => Err(FaBridgeError::InvalidEntrypoint(format!(
                "forbidden byte in entrypoint name: {}",
                hex::encode([*c])
            ))),
        }?;
        first_char = false;
    }
    Ok(())
}
