// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Data model of the Tezos <-> Etherlink FA bridge.
//!
//! Everything in this crate is pure: addresses and their binary forms,
//! ticket identity and content encoding, ticket hashes, routing info and
//! the operation descriptors built from them. Talking to the ledgers is
//! the job of `fa-bridge-settlement`.

pub mod address;
pub mod asset;
pub mod entrypoint;
pub mod error;
pub mod hex_string;
pub mod intent;
pub mod michelson;
pub mod routing_info;
pub mod ticket;
pub mod ticket_hash;

pub use address::{
    resolve, Address, FixedBytes, L1Address, L2Address, Namespace, Reference,
    SmartRollupAddress,
};
pub use asset::{AssetKey, AssetStandard, StandardTag, TokenStandard};
pub use entrypoint::Entrypoint;
pub use error::FaBridgeError;
pub use hex_string::HexString;
pub use intent::{TransferIntent, WithdrawalIntent};
pub use routing_info::{DepositRoutingInfo, WithdrawalRoutingInfo};
pub use ticket::{
    decode_content_bytes, make_content_bytes, Fa21Content, TicketContent, TicketRef,
    TicketSnapshot, TokenInfo,
};
pub use ticket_hash::{ticket_hash, TicketHash};
