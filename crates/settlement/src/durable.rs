// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Read-only view of the EVM world state kept in the rollup durable storage.

use fa_bridge_types::{L2Address, TicketHash};
use primitive_types::{H160, H256, U256};
use tezos_smart_rollup_host::path::{concat, OwnedPath, RefPath};

use crate::error::SettlementError;
use crate::outbox::RollupNode;

pub const EVM_ACCOUNTS_PATH: RefPath = RefPath::assert_from(b"/evm/world_state/eth_accounts");

const CODE_PATH: RefPath = RefPath::assert_from(b"/code");

const STORAGE_PATH: RefPath = RefPath::assert_from(b"/storage");

const TICKET_TABLE_PATH: RefPath = RefPath::assert_from(b"/ticket_table");

/// The ticket table is stored in the system account storage.
pub const SYSTEM_ACCOUNT_ADDRESS: H160 = H160::zero();

const WORD_SIZE: usize = 32;

fn hex_path(bytes: &[u8]) -> Result<OwnedPath, SettlementError> {
    Ok(OwnedPath::try_from(format!("/{}", hex::encode(bytes)))?)
}

pub fn account_path(address: &H160) -> Result<OwnedPath, SettlementError> {
    Ok(concat(&EVM_ACCOUNTS_PATH, &hex_path(address.as_bytes())?)?)
}

pub fn code_path(address: &H160) -> Result<OwnedPath, SettlementError> {
    Ok(concat(&account_path(address)?, &CODE_PATH)?)
}

pub fn storage_path(address: &H160, index: &H256) -> Result<OwnedPath, SettlementError> {
    let storage = concat(&account_path(address)?, &STORAGE_PATH)?;
    Ok(concat(&storage, &hex_path(index.as_bytes())?)?)
}

pub fn ticket_balance_path(
    ticket_hash: &TicketHash,
    owner: &H160,
) -> Result<OwnedPath, SettlementError> {
    let table = concat(&account_path(&SYSTEM_ACCOUNT_ADDRESS)?, &TICKET_TABLE_PATH)?;
    let ticket = concat(&table, &hex_path(ticket_hash.0.as_bytes())?)?;
    Ok(concat(&ticket, &hex_path(owner.as_bytes())?)?)
}

/// Index of a storage slot, as the EVM addresses it.
pub fn slot_index(slot: u64) -> H256 {
    H256::from_low_u64_be(slot)
}

/// Ticket balances are little endian, a missing value is zero.
pub fn decode_u256_le(bytes: Option<&[u8]>) -> U256 {
    match bytes {
        Some(bytes) if bytes.len() == WORD_SIZE => U256::from_little_endian(bytes),
        _ => U256::zero(),
    }
}

pub fn encode_u256_le(value: &U256) -> [u8; WORD_SIZE] {
    let mut bytes = [0u8; WORD_SIZE];
    value.to_little_endian(&mut bytes);
    bytes
}

/// Storage words are big endian, a missing value is zero.
pub fn decode_h256_be(bytes: Option<&[u8]>) -> H256 {
    match bytes {
        Some(bytes) if bytes.len() == WORD_SIZE => H256::from_slice(bytes),
        _ => H256::zero(),
    }
}

pub async fn has_code<R: RollupNode + ?Sized>(
    rollup: &R,
    address: &L2Address,
) -> Result<bool, SettlementError> {
    let code = rollup.durable_value(&code_path(&address.0)?).await?;
    Ok(code.is_some_and(|code| !code.is_empty()))
}

pub async fn storage_value<R: RollupNode + ?Sized>(
    rollup: &R,
    address: &L2Address,
    index: &H256,
) -> Result<H256, SettlementError> {
    let value = rollup
        .durable_value(&storage_path(&address.0, index)?)
        .await?;
    Ok(decode_h256_be(value.as_deref()))
}

pub async fn ticket_balance<R: RollupNode + ?Sized>(
    rollup: &R,
    ticket_hash: &TicketHash,
    owner: &L2Address,
) -> Result<U256, SettlementError> {
    let value = rollup
        .durable_value(&ticket_balance_path(ticket_hash, &owner.0)?)
        .await?;
    Ok(decode_u256_le(value.as_deref()))
}
