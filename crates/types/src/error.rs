// SPDX-FileCopyrightText: 2023 PK Lab <contact@pklab.io>
// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! FA bridge input validation errors.
//!
//! All of them are detected locally, before any remote call is issued,
//! and must never be retried.

use primitive_types::U256;
use tezos_data_encoding::enc::BinError;

#[derive(Debug, thiserror::Error)]
pub enum FaBridgeError {
    #[error("Invalid length of {what}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed address {address}: {reason}")]
    MalformedAddress { address: String, reason: String },

    #[error("Insufficient ticket amount: requested {requested}, available {available}")]
    InsufficientAmount { requested: U256, available: U256 },

    #[error("Unsupported reference type: {0}")]
    UnsupportedReferenceType(&'static str),

    #[error("Invalid router {0}: must be an originated contract")]
    InvalidRouter(String),

    #[error("Invalid entrypoint: {0}")]
    InvalidEntrypoint(String),

    #[error("Invalid ticket content: {0}")]
    InvalidTicketContent(&'static str),

    #[error("ABI decoding error: {0}")]
    AbiDecode(&'static str),

    #[error("Binary codec error: {0}")]
    BinaryCodec(#[from] BinError),
}

impl FaBridgeError {
    pub(crate) fn malformed(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedAddress {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}
