// SPDX-FileCopyrightText: 2023 PK Lab <contact@pklab.io>
// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Cross-ledger asset identity.
//!
//! The same digest is computed by the L1 ticketer tooling, by the L2 kernel
//! when it mints or burns wrapped tokens, and by the indexer that joins L1
//! and L2 transactions, so every side must agree bit for bit.

use std::fmt;
use std::str::FromStr;

use primitive_types::{H256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use tezos_data_encoding::enc::BinWriter;
use tezos_smart_rollup_encoding::michelson::ticket::FA2_1Ticket;

use crate::address::{L1Address, L1_ADDRESS_SIZE};
use crate::error::FaBridgeError;

/// Upper bound of a forged ticketer plus a typical forged FA2.1 content.
pub(crate) const TICKET_PAYLOAD_SIZE_HINT: usize = 200;

/// Asset identifier shared by both ledgers.
///
/// Rendered as a decimal `uint256` in every external query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TicketHash(pub H256);

impl TicketHash {
    /// Keccak256 over the forged ticketer (22 bytes, `0x01 | hash | 0x00`
    /// for a KT1) directly followed by the forged content, i.e.
    /// `keccak256(abi.encodePacked(ticketer, content))` on the EVM side.
    pub fn new(ticketer: &[u8], content: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(ticketer);
        hasher.update(content);
        Self(H256(hasher.finalize().into()))
    }

    /// Hash of an already concatenated `ticketer || content` payload.
    pub fn digest(payload: &[u8]) -> Self {
        Self(H256(Keccak256::digest(payload).into()))
    }

    /// Same as [TicketHash::new] but checks the ticketer is a well-formed forged contract.
    pub fn from_raw_parts(ticketer: &[u8], content: &[u8]) -> Result<Self, FaBridgeError> {
        if ticketer.len() != L1_ADDRESS_SIZE {
            return Err(FaBridgeError::InvalidLength {
                what: "ticketer",
                expected: L1_ADDRESS_SIZE,
                actual: ticketer.len(),
            });
        }
        L1Address::from_forged(ticketer)?;
        Ok(Self::new(ticketer, content))
    }

    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(self.0.as_bytes())
    }

    pub fn from_u256(value: U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Self(H256(bytes))
    }
}

/// Hash of the ticket carried by an L1 transfer, its amount is not part of it.
pub fn ticket_hash(ticket: &FA2_1Ticket) -> Result<TicketHash, FaBridgeError> {
    let mut payload = Vec::with_capacity(TICKET_PAYLOAD_SIZE_HINT);
    ticket.creator().0.bin_write(&mut payload)?;
    ticket.contents().bin_write(&mut payload)?;
    Ok(TicketHash::digest(&payload))
}

impl fmt::Display for TicketHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u256())
    }
}

impl FromStr for TicketHash {
    type Err = FaBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_dec_str(s)
            .map(Self::from_u256)
            .map_err(|_| {
                FaBridgeError::InvalidTicketContent("ticket hash is not a decimal uint256")
            })
    }
}

impl Serialize for TicketHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TicketHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
