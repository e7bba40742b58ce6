// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Addresses on both sides of the bridge.
//!
//! Tezos (L1) and Etherlink (L2) addresses live in two distinct namespaces
//! and are never compared directly. Before being embedded into a payload
//! destined for the other ledger (routing info, ticketer bytes) they are
//! converted into their fixed-width binary form:
//!     * L1: forged `contract` encoding, 22 bytes
//!         - implicit: [ 0x00 | curve tag | 20 bytes ]
//!         - originated: [ 0x01 | 20 bytes | 0x00 ]
//!     * L2: raw 20 bytes account

use std::fmt;
use std::str::FromStr;

use primitive_types::H160;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tezos_data_encoding::enc::BinWriter;
use tezos_data_encoding::nom::NomReader;
use tezos_smart_rollup_encoding::contract::Contract;
use tezos_smart_rollup_encoding::smart_rollup::SmartRollupAddress as RollupHash;

use crate::error::FaBridgeError;

/// Size of a forged L1 contract.
pub const L1_ADDRESS_SIZE: usize = 22;

/// Size of an L2 account.
pub const L2_ADDRESS_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    L1,
    L2,
}

impl Namespace {
    /// Width of the canonical binary form.
    pub const fn width(&self) -> usize {
        match self {
            Self::L1 => L1_ADDRESS_SIZE,
            Self::L2 => L2_ADDRESS_SIZE,
        }
    }
}

/// Tezos contract: either an implicit account or an originated contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L1Address(Contract);

impl L1Address {
    /// Converts from a *base58-encoded* string, checking for the prefix.
    pub fn from_b58check(data: &str) -> Result<Self, FaBridgeError> {
        Contract::from_b58check(data)
            .map(Self)
            .map_err(|err| FaBridgeError::malformed(data, err))
    }

    pub fn to_b58check(&self) -> String {
        self.0.to_b58check()
    }

    pub fn contract(&self) -> &Contract {
        &self.0
    }

    /// Forged `contract` encoding, as expected by L1 and by the FA bridge precompile.
    pub fn forge(&self) -> Result<[u8; L1_ADDRESS_SIZE], FaBridgeError> {
        let mut bytes = Vec::with_capacity(L1_ADDRESS_SIZE);
        self.0.bin_write(&mut bytes)?;
        let actual = bytes.len();
        bytes.try_into().map_err(|_| FaBridgeError::InvalidLength {
            what: "forged L1 address",
            expected: L1_ADDRESS_SIZE,
            actual,
        })
    }

    /// Inverse of [L1Address::forge], rejects anything but exactly one forged contract.
    pub fn from_forged(bytes: &[u8]) -> Result<Self, FaBridgeError> {
        let (rest, contract) = Self::nom_read(bytes)
            .map_err(|_| FaBridgeError::malformed(hex::encode(bytes), "not a forged contract"))?;
        if !rest.is_empty() {
            return Err(FaBridgeError::InvalidLength {
                what: "forged L1 address",
                expected: L1_ADDRESS_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(contract)
    }

    /// Reads one forged contract, returns the remaining input.
    pub fn nom_read(input: &[u8]) -> tezos_data_encoding::nom::NomResult<Self> {
        let (rest, contract) = Contract::nom_read(input)?;
        Ok((rest, Self(contract)))
    }

    pub fn is_originated(&self) -> bool {
        matches!(self.0, Contract::Originated(_))
    }
}

impl From<Contract> for L1Address {
    fn from(contract: Contract) -> Self {
        Self(contract)
    }
}

impl From<L1Address> for Contract {
    fn from(address: L1Address) -> Self {
        address.0
    }
}

impl FromStr for L1Address {
    type Err = FaBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_b58check(s)
    }
}

impl fmt::Display for L1Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58check())
    }
}

/// Smart rollup address (`sr1...`), deposit destination on L1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartRollupAddress(RollupHash);

impl SmartRollupAddress {
    pub fn from_b58check(data: &str) -> Result<Self, FaBridgeError> {
        RollupHash::from_b58check(data)
            .map(Self)
            .map_err(|err| FaBridgeError::malformed(data, err))
    }

    pub fn to_b58check(&self) -> String {
        self.0.to_b58check()
    }
}

impl FromStr for SmartRollupAddress {
    type Err = FaBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_b58check(s)
    }
}

impl fmt::Display for SmartRollupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_b58check())
    }
}

/// Etherlink account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct L2Address(pub H160);

impl L2Address {
    pub fn zero() -> Self {
        Self(H160::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_bytes(&self) -> [u8; L2_ADDRESS_SIZE] {
        self.0 .0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FaBridgeError> {
        if bytes.len() != L2_ADDRESS_SIZE {
            return Err(FaBridgeError::InvalidLength {
                what: "L2 address",
                expected: L2_ADDRESS_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self(H160::from_slice(bytes)))
    }
}

impl FromStr for L2Address {
    type Err = FaBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| FaBridgeError::malformed(s, "missing 0x prefix"))?;
        if digits.len() != 2 * L2_ADDRESS_SIZE {
            return Err(FaBridgeError::malformed(s, "expected 40 hex digits"));
        }
        let bytes = hex::decode(digits).map_err(|e| FaBridgeError::malformed(s, e))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for L2Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // H160 Display is abbreviated, always print the full account
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl From<H160> for L2Address {
    fn from(value: H160) -> Self {
        Self(value)
    }
}

/// Canonical fixed-width binary form of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedBytes {
    L1([u8; L1_ADDRESS_SIZE]),
    L2([u8; L2_ADDRESS_SIZE]),
}

impl FixedBytes {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::L1(bytes) => bytes,
            Self::L2(bytes) => bytes,
        }
    }
}

/// Opaque address string, as found in operations, receipts and indexer records.
///
/// It is only interpreted when converted into a namespace specific form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Best effort namespace guess, `None` if the address is not well-formed in either.
    pub fn namespace(&self) -> Option<Namespace> {
        if self.to_l2().is_ok() {
            Some(Namespace::L2)
        } else if self.to_l1().is_ok() {
            Some(Namespace::L1)
        } else {
            None
        }
    }

    pub fn to_l1(&self) -> Result<L1Address, FaBridgeError> {
        L1Address::from_b58check(&self.0)
    }

    pub fn to_l2(&self) -> Result<L2Address, FaBridgeError> {
        self.0.parse()
    }

    /// Converts the address into the binary form of the given namespace.
    pub fn to_fixed_bytes(&self, namespace: Namespace) -> Result<FixedBytes, FaBridgeError> {
        match namespace {
            Namespace::L1 => Ok(FixedBytes::L1(self.to_l1()?.forge()?)),
            Namespace::L2 => Ok(FixedBytes::L2(self.to_l2()?.to_bytes())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<L1Address> for Address {
    fn from(value: L1Address) -> Self {
        Self(value.to_b58check())
    }
}

impl From<L2Address> for Address {
    fn from(value: L2Address) -> Self {
        Self(value.to_string())
    }
}

impl From<&L1Address> for Address {
    fn from(value: &L1Address) -> Self {
        Self(value.to_b58check())
    }
}

impl From<SmartRollupAddress> for Address {
    fn from(value: SmartRollupAddress) -> Self {
        Self(value.to_b58check())
    }
}

impl From<&SmartRollupAddress> for Address {
    fn from(value: &SmartRollupAddress) -> Self {
        Self(value.to_b58check())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Handle of an originated contract known to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    pub address: Address,
}

/// Handle of an account known to the caller (L1 implicit or L2 EOA).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHandle {
    pub address: Address,
}

/// Anything a caller may use to designate an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Raw(String),
    Contract(ContractHandle),
    Account(AccountHandle),
    /// Wallet alias, can only be resolved by a wallet.
    Alias(String),
}

/// Normalizes a reference into an address.
pub fn resolve(reference: &Reference) -> Result<Address, FaBridgeError> {
    match reference {
        Reference::Raw(raw) => Ok(Address::new(raw.as_str())),
        Reference::Contract(handle) => Ok(handle.address.clone()),
        Reference::Account(handle) => Ok(handle.address.clone()),
        Reference::Alias(_) => Err(FaBridgeError::UnsupportedReferenceType("wallet alias")),
    }
}
