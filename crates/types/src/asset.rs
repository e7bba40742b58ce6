// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Token standards bridged through tickets.
//!
//! The set of standards is closed: an FA token is either FA1.2 (single
//! asset ledger) or FA2 (multi asset ledger). The standard is picked once,
//! from its [StandardTag], and every standard specific behaviour is an
//! exhaustive match from then on.

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::address::{Address, L1Address, L2Address};
use crate::entrypoint::Entrypoint;
use crate::error::FaBridgeError;
use tezos_data_encoding::types::Zarith;
use tezos_smart_rollup_encoding::michelson::{
    MichelsonBytes, MichelsonNat, MichelsonOr, MichelsonPair,
};

use crate::hex_string::HexString;
use crate::michelson::{self, MichelsonList};
use crate::ticket::{u256_to_bigint, TicketRef, TokenInfo};

const CONTRACT_ADDRESS_KEY: &str = "contract_address";
const TOKEN_TYPE_KEY: &str = "token_type";
const TOKEN_ID_KEY: &str = "token_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StandardTag {
    #[serde(rename = "FA1.2")]
    Fa12,
    #[serde(rename = "FA2")]
    Fa2,
}

impl StandardTag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fa12 => "FA1.2",
            Self::Fa2 => "FA2",
        }
    }
}

impl fmt::Display for StandardTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StandardTag {
    type Err = FaBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FA1.2" => Ok(Self::Fa12),
            "FA2" => Ok(Self::Fa2),
            _ => Err(FaBridgeError::InvalidTicketContent("unknown token standard")),
        }
    }
}

/// Ledger specific key of a balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKey {
    /// Ticket balance in the L1 ticket table
    Ticket(TicketRef),
    /// FA token balance on L1
    Token(AssetStandard),
    /// Wrapped token (ERC wrapper) balance on L2
    Erc20(L2Address),
}

/// Michelson contract call descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub destination: Address,
    pub entrypoint: Entrypoint,
    /// Forged Michelson parameter.
    pub parameter: HexString,
}

/// Operations every supported standard provides.
pub trait TokenStandard {
    fn tag(&self) -> StandardTag;

    fn contract(&self) -> &L1Address;

    /// Lets `operator` move tokens of `owner` (up to `amount` where the standard has allowances).
    fn allow(
        &self,
        owner: &L1Address,
        operator: &L1Address,
        amount: U256,
    ) -> Result<ContractCall, FaBridgeError>;

    /// Revokes a previous [TokenStandard::allow].
    fn disallow(
        &self,
        owner: &L1Address,
        operator: &L1Address,
    ) -> Result<ContractCall, FaBridgeError>;

    fn balance_of(&self) -> AssetKey;

    fn describe(&self) -> String;

    /// Token info a ticketer wrapping this token puts in its tickets.
    fn token_info(&self) -> TokenInfo;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fa12Token {
    pub contract: L1Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fa2Token {
    pub contract: L1Address,
    pub token_id: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStandard {
    Fa12(Fa12Token),
    Fa2(Fa2Token),
}

impl AssetStandard {
    /// Registry of the known standards: the tag fully determines the variant.
    pub fn resolve(
        tag: StandardTag,
        contract: L1Address,
        token_id: Option<U256>,
    ) -> Result<Self, FaBridgeError> {
        if !contract.is_originated() {
            return Err(FaBridgeError::malformed(
                contract.to_b58check(),
                "token must be an originated contract",
            ));
        }
        match (tag, token_id) {
            (StandardTag::Fa12, None) => Ok(Self::Fa12(Fa12Token { contract })),
            (StandardTag::Fa12, Some(_)) => Err(FaBridgeError::InvalidTicketContent(
                "FA1.2 tokens have no token id",
            )),
            (StandardTag::Fa2, token_id) => Ok(Self::Fa2(Fa2Token {
                contract,
                token_id: token_id.unwrap_or_default(),
            })),
        }
    }

    /// Inverse of [TokenStandard::token_info].
    pub fn from_token_info(info: &TokenInfo) -> Result<Self, FaBridgeError> {
        let field = |key: &'static str| {
            info.get(key)
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .ok_or(FaBridgeError::InvalidTicketContent(key))
        };
        let tag: StandardTag = field(TOKEN_TYPE_KEY)?.parse()?;
        let contract = L1Address::from_b58check(field(CONTRACT_ADDRESS_KEY)?)?;
        let token_id = match tag {
            StandardTag::Fa12 => None,
            StandardTag::Fa2 => Some(
                U256::from_dec_str(field(TOKEN_ID_KEY)?)
                    .map_err(|_| FaBridgeError::InvalidTicketContent(TOKEN_ID_KEY))?,
            ),
        };
        Self::resolve(tag, contract, token_id)
    }

    fn inner(&self) -> &dyn TokenStandard {
        match self {
            Self::Fa12(token) => token,
            Self::Fa2(token) => token,
        }
    }
}

impl TokenStandard for AssetStandard {
    fn tag(&self) -> StandardTag {
        self.inner().tag()
    }

    fn contract(&self) -> &L1Address {
        match self {
            Self::Fa12(token) => &token.contract,
            Self::Fa2(token) => &token.contract,
        }
    }

    fn allow(
        &self,
        owner: &L1Address,
        operator: &L1Address,
        amount: U256,
    ) -> Result<ContractCall, FaBridgeError> {
        self.inner().allow(owner, operator, amount)
    }

    fn disallow(
        &self,
        owner: &L1Address,
        operator: &L1Address,
    ) -> Result<ContractCall, FaBridgeError> {
        self.inner().disallow(owner, operator)
    }

    fn balance_of(&self) -> AssetKey {
        AssetKey::Token(self.clone())
    }

    fn describe(&self) -> String {
        self.inner().describe()
    }

    fn token_info(&self) -> TokenInfo {
        self.inner().token_info()
    }
}

impl TokenStandard for Fa12Token {
    fn tag(&self) -> StandardTag {
        StandardTag::Fa12
    }

    fn contract(&self) -> &L1Address {
        &self.contract
    }

    /// `approve (pair (address :spender) (nat :value))`
    ///
    /// FA1.2 forbids changing a non zero allowance to another non zero value,
    /// callers go through [TokenStandard::disallow] first.
    fn allow(
        &self,
        _owner: &L1Address,
        operator: &L1Address,
        amount: U256,
    ) -> Result<ContractCall, FaBridgeError> {
        approve(&self.contract, operator, amount)
    }

    fn disallow(
        &self,
        _owner: &L1Address,
        operator: &L1Address,
    ) -> Result<ContractCall, FaBridgeError> {
        approve(&self.contract, operator, U256::zero())
    }

    fn balance_of(&self) -> AssetKey {
        AssetKey::Token(AssetStandard::Fa12(self.clone()))
    }

    fn describe(&self) -> String {
        format!("FA1.2 token {}", self.contract)
    }

    fn token_info(&self) -> TokenInfo {
        TokenInfo::new()
            .with(CONTRACT_ADDRESS_KEY, self.contract.to_b58check())
            .with(TOKEN_TYPE_KEY, StandardTag::Fa12.as_str())
    }
}

impl TokenStandard for Fa2Token {
    fn tag(&self) -> StandardTag {
        StandardTag::Fa2
    }

    fn contract(&self) -> &L1Address {
        &self.contract
    }

    fn allow(
        &self,
        owner: &L1Address,
        operator: &L1Address,
        _amount: U256,
    ) -> Result<ContractCall, FaBridgeError> {
        update_operators(&self.contract, owner, operator, self.token_id, true)
    }

    fn disallow(
        &self,
        owner: &L1Address,
        operator: &L1Address,
    ) -> Result<ContractCall, FaBridgeError> {
        update_operators(&self.contract, owner, operator, self.token_id, false)
    }

    fn balance_of(&self) -> AssetKey {
        AssetKey::Token(AssetStandard::Fa2(self.clone()))
    }

    fn describe(&self) -> String {
        format!("FA2 token {} #{}", self.contract, self.token_id)
    }

    fn token_info(&self) -> TokenInfo {
        TokenInfo::new()
            .with(CONTRACT_ADDRESS_KEY, self.contract.to_b58check())
            .with(TOKEN_ID_KEY, self.token_id.to_string())
            .with(TOKEN_TYPE_KEY, StandardTag::Fa2.as_str())
    }
}

type OperatorParam = MichelsonPair<MichelsonBytes, MichelsonPair<MichelsonBytes, MichelsonNat>>;

type OperatorUpdate = MichelsonOr<OperatorParam, OperatorParam>;

// Optimized form of the `address` type
fn address_value(address: &L1Address) -> Result<MichelsonBytes, FaBridgeError> {
    Ok(MichelsonBytes(address.forge()?.to_vec()))
}

fn nat_value(value: U256) -> Result<MichelsonNat, FaBridgeError> {
    MichelsonNat::new(Zarith(u256_to_bigint(&value)))
        .ok_or(FaBridgeError::InvalidTicketContent("amount is not a nat"))
}

fn approve(
    contract: &L1Address,
    spender: &L1Address,
    value: U256,
) -> Result<ContractCall, FaBridgeError> {
    let parameter = MichelsonPair(address_value(spender)?, nat_value(value)?);
    Ok(ContractCall {
        destination: Address::from(contract),
        entrypoint: Entrypoint::from_static_unchecked("approve"),
        parameter: HexString(michelson::forge(&parameter)?),
    })
}

/// `update_operators (list (or (pair %add_operator ...) (pair %remove_operator ...)))`
/// with `pair (address %owner) (pair (address %operator) (nat %token_id))`.
fn update_operators(
    contract: &L1Address,
    owner: &L1Address,
    operator: &L1Address,
    token_id: U256,
    add: bool,
) -> Result<ContractCall, FaBridgeError> {
    let operator_param = MichelsonPair(
        address_value(owner)?,
        MichelsonPair(address_value(operator)?, nat_value(token_id)?),
    );
    let update: OperatorUpdate = if add {
        MichelsonOr::Left(operator_param)
    } else {
        MichelsonOr::Right(operator_param)
    };
    Ok(ContractCall {
        destination: Address::from(contract),
        entrypoint: Entrypoint::from_static_unchecked("update_operators"),
        parameter: HexString(michelson::forge(&MichelsonList(vec![update]))?),
    })
}
