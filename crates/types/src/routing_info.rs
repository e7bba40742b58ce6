// SPDX-FileCopyrightText: 2023 PK Lab <contact@pklab.io>
// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Routing info: raw bytes passed along with the ticket.
//!
//! Deposit (L1 -> L2), 40 bytes:
//!     [ receiver: 20 bytes | proxy: 20 bytes ]
//! Withdrawal (L2 -> L1), 44 bytes:
//!     [ receiver: 22 bytes forged contract | router: 22 bytes forged KT1 ]
//!
//! Lengths are never corrected: a payload of the wrong size is rejected
//! before anything is submitted.

use crate::address::{L1Address, L2Address, L1_ADDRESS_SIZE, L2_ADDRESS_SIZE};
use crate::error::FaBridgeError;

pub const DEPOSIT_ROUTING_INFO_SIZE: usize = 2 * L2_ADDRESS_SIZE;

pub const WITHDRAWAL_ROUTING_INFO_SIZE: usize = 2 * L1_ADDRESS_SIZE;

/// Decoded deposit routing info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositRoutingInfo {
    /// Final deposit receiver address on L2
    pub receiver: L2Address,
    /// Optional proxy contract address on L2 (ERC wrapper)
    pub proxy: Option<L2Address>,
}

impl DepositRoutingInfo {
    pub fn new(receiver: L2Address, proxy: Option<L2Address>) -> Self {
        Self { receiver, proxy }
    }

    pub fn encode(&self) -> [u8; DEPOSIT_ROUTING_INFO_SIZE] {
        encode_deposit(&self.receiver, self.proxy.as_ref())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FaBridgeError> {
        let (receiver, proxy) = decode_deposit(bytes)?;
        Ok(Self { receiver, proxy })
    }
}

/// Decoded withdrawal routing info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRoutingInfo {
    /// Contract (either implicit or originated) that will receive tokens or tickets
    pub receiver: L1Address,
    /// Router contract on L1 that unwraps the ticket for the receiver
    pub router: L1Address,
}

impl WithdrawalRoutingInfo {
    pub fn new(receiver: L1Address, router: L1Address) -> Result<Self, FaBridgeError> {
        check_router(&router)?;
        Ok(Self { receiver, router })
    }

    pub fn encode(&self) -> Result<[u8; WITHDRAWAL_ROUTING_INFO_SIZE], FaBridgeError> {
        let mut bytes = [0u8; WITHDRAWAL_ROUTING_INFO_SIZE];
        bytes[..L1_ADDRESS_SIZE].copy_from_slice(&self.receiver.forge()?);
        bytes[L1_ADDRESS_SIZE..].copy_from_slice(&self.router.forge()?);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FaBridgeError> {
        decode_withdrawal(bytes)
    }
}

/// Concatenates receiver and proxy, a missing proxy is encoded as the zero address.
pub fn encode_deposit(
    receiver: &L2Address,
    proxy: Option<&L2Address>,
) -> [u8; DEPOSIT_ROUTING_INFO_SIZE] {
    let mut bytes = [0u8; DEPOSIT_ROUTING_INFO_SIZE];
    bytes[..L2_ADDRESS_SIZE].copy_from_slice(&receiver.to_bytes());
    if let Some(proxy) = proxy {
        bytes[L2_ADDRESS_SIZE..].copy_from_slice(&proxy.to_bytes());
    }
    bytes
}

/// Split routing info into receiver and optional proxy address.
pub fn decode_deposit(
    routing_info: &[u8],
) -> Result<(L2Address, Option<L2Address>), FaBridgeError> {
    check_length("deposit routing info", routing_info, DEPOSIT_ROUTING_INFO_SIZE)?;
    let receiver = L2Address::from_slice(&routing_info[..L2_ADDRESS_SIZE])?;
    let proxy = L2Address::from_slice(&routing_info[L2_ADDRESS_SIZE..])?;
    Ok((receiver, (!proxy.is_zero()).then_some(proxy)))
}

pub fn encode_withdrawal(
    receiver: &L1Address,
    router: &L1Address,
) -> Result<[u8; WITHDRAWAL_ROUTING_INFO_SIZE], FaBridgeError> {
    WithdrawalRoutingInfo::new(receiver.clone(), router.clone())?.encode()
}

pub fn decode_withdrawal(routing_info: &[u8]) -> Result<WithdrawalRoutingInfo, FaBridgeError> {
    check_length(
        "withdrawal routing info",
        routing_info,
        WITHDRAWAL_ROUTING_INFO_SIZE,
    )?;
    let (rest, receiver) = L1Address::nom_read(routing_info)
        .map_err(|_| FaBridgeError::malformed(hex::encode(routing_info), "receiver"))?;
    let (rest, router) = L1Address::nom_read(rest)
        .map_err(|_| FaBridgeError::malformed(hex::encode(routing_info), "router"))?;
    if !rest.is_empty() {
        return Err(FaBridgeError::malformed(
            hex::encode(routing_info),
            "trailing bytes",
        ));
    }
    WithdrawalRoutingInfo::new(receiver, router)
}

fn check_router(router: &L1Address) -> Result<(), FaBridgeError> {
    // Implicit accounts cannot receive tickets with a payload
    if router.is_originated() {
        Ok(())
    } else {
        Err(FaBridgeError::InvalidRouter(router.to_b58check()))
    }
}

fn check_length(what: &'static str, bytes: &[u8], expected: usize) -> Result<(), FaBridgeError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(FaBridgeError::InvalidLength {
            what,
            expected,
            actual: bytes.len(),
        })
    }
}
