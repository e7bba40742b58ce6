// SPDX-FileCopyrightText: 2023 PK Lab <contact@pklab.io>
// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! FA2.1 compatible tickets.
//!
//! Ticket content has type `pair nat (option bytes)` where the optional
//! bytes are a packed `map string bytes` (token info). A ticket is
//! identified by its ticketer and content only: the amount is a balance,
//! read from a ledger at a given level, see [TicketSnapshot].

use std::collections::BTreeMap;

use num_bigint::{BigInt, Sign};
use primitive_types::U256;
use tezos_data_encoding::enc::BinWriter;
use tezos_data_encoding::types::Zarith;
use tezos_smart_rollup_encoding::michelson::ticket::FA2_1Ticket;
use tezos_smart_rollup_encoding::michelson::{
    MichelsonBytes, MichelsonInt, MichelsonNat, MichelsonOption, MichelsonPair, MichelsonString,
};

use crate::address::{Address, L1Address};
use crate::entrypoint::Entrypoint;
use crate::error::FaBridgeError;
use crate::hex_string::HexString;
use crate::intent::TransferIntent;
use crate::michelson::{self, MichelsonElt, MichelsonList, MichelsonMap};
use crate::ticket_hash::{TicketHash, TICKET_PAYLOAD_SIZE_HINT};

/// Content of an FA2.1 ticket: `pair nat (option bytes)`.
pub type Fa21Content = MichelsonPair<MichelsonNat, MichelsonOption<MichelsonBytes>>;

/// Same wire form as [Fa21Content], the token id is checked for sign afterwards.
type RawContent = MichelsonPair<MichelsonInt, MichelsonOption<MichelsonBytes>>;

/// Token metadata embedded in the ticket content.
///
/// Keys are kept sorted so that the packed form does not depend on the
/// insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenInfo(BTreeMap<String, Vec<u8>>);

impl TokenInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_michelson(&self) -> MichelsonMap<MichelsonString, MichelsonBytes> {
        MichelsonList(
            self.0
                .iter()
                .map(|(key, value)| {
                    MichelsonElt(MichelsonString(key.clone()), MichelsonBytes(value.clone()))
                })
                .collect(),
        )
    }

    /// Packed `map string bytes`, as stored in the ticket content.
    pub fn pack(&self) -> Result<Vec<u8>, FaBridgeError> {
        Ok(michelson::pack(&self.to_michelson())?)
    }

    /// Inverse of [TokenInfo::pack]. Michelson maps are strictly sorted, anything else is rejected.
    pub fn unpack(bytes: &[u8]) -> Result<Self, FaBridgeError> {
        let MichelsonList(items) =
            michelson::unpack::<MichelsonMap<MichelsonString, MichelsonBytes>>(bytes).ok_or(
                FaBridgeError::InvalidTicketContent("token info is not a packed map string bytes"),
            )?;
        let mut map = BTreeMap::new();
        let mut previous: Option<String> = None;
        for MichelsonElt(MichelsonString(key), MichelsonBytes(value)) in items {
            if previous.as_ref().is_some_and(|prev| prev >= &key) {
                return Err(FaBridgeError::InvalidTicketContent("token info keys are not sorted"));
            }
            previous = Some(key.clone());
            map.insert(key, value);
        }
        Ok(Self(map))
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for TokenInfo {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Ticket payload: `Pair token_id token_info`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TicketContent {
    pub token_id: U256,
    pub token_info: Option<HexString>,
}

impl TicketContent {
    pub fn new(token_id: U256, token_info: Option<&TokenInfo>) -> Result<Self, FaBridgeError> {
        let token_info = token_info.map(TokenInfo::pack).transpose()?;
        Ok(Self {
            token_id,
            token_info: token_info.map(HexString),
        })
    }

    /// Content with arbitrary (not necessarily packed map) info bytes.
    pub fn raw(token_id: U256, token_info: Option<Vec<u8>>) -> Self {
        Self {
            token_id,
            token_info: token_info.map(HexString),
        }
    }

    pub fn token_info_map(&self) -> Result<Option<TokenInfo>, FaBridgeError> {
        self.token_info
            .as_ref()
            .map(|bytes| TokenInfo::unpack(bytes.as_bytes()))
            .transpose()
    }

    pub fn to_michelson(&self) -> Result<Fa21Content, FaBridgeError> {
        let token_id = MichelsonNat::new(Zarith(u256_to_bigint(&self.token_id)))
            .ok_or(FaBridgeError::InvalidTicketContent("token id is not a nat"))?;
        let token_info = self
            .token_info
            .as_ref()
            .map(|bytes| MichelsonBytes(bytes.0.clone()));
        Ok(MichelsonPair(token_id, MichelsonOption(token_info)))
    }
}

/// Canonical serialization of the content: forged Micheline.
pub fn make_content_bytes(content: &TicketContent) -> Result<Vec<u8>, FaBridgeError> {
    Ok(michelson::forge(&content.to_michelson()?)?)
}

/// Inverse of [make_content_bytes].
pub fn decode_content_bytes(bytes: &[u8]) -> Result<TicketContent, FaBridgeError> {
    let MichelsonPair(MichelsonInt(Zarith(token_id)), MichelsonOption(token_info)) =
        michelson::unforge::<RawContent>(bytes).ok_or(FaBridgeError::InvalidTicketContent(
            "content is not a forged pair nat (option bytes)",
        ))?;
    let token_id = bigint_to_u256(&token_id)?;
    Ok(TicketContent::raw(
        token_id,
        token_info.map(|MichelsonBytes(bytes)| bytes),
    ))
}

/// Ticket identity: who issued it and what it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRef {
    pub ticketer: L1Address,
    pub content: TicketContent,
}

impl TicketRef {
    pub fn new(ticketer: L1Address, content: TicketContent) -> Result<Self, FaBridgeError> {
        if !ticketer.is_originated() {
            return Err(FaBridgeError::malformed(
                ticketer.to_b58check(),
                "ticketer must be an originated contract",
            ));
        }
        Ok(Self { ticketer, content })
    }

    pub fn content_bytes(&self) -> Result<Vec<u8>, FaBridgeError> {
        make_content_bytes(&self.content)
    }

    /// Keccak256 of the forged ticketer followed by the forged content.
    pub fn ticket_hash(&self) -> Result<TicketHash, FaBridgeError> {
        let mut payload = Vec::with_capacity(TICKET_PAYLOAD_SIZE_HINT);
        self.ticketer.contract().bin_write(&mut payload)?;
        self.content.to_michelson()?.bin_write(&mut payload)?;
        Ok(TicketHash::digest(&payload))
    }

    /// FA2.1 ticket of `amount` units, as carried by an L1 transfer.
    pub fn to_ticket(&self, amount: U256) -> Result<FA2_1Ticket, FaBridgeError> {
        FA2_1Ticket::new(
            self.ticketer.contract().clone(),
            self.content.to_michelson()?,
            u256_to_bigint(&amount),
        )
        .map_err(|_| FaBridgeError::InvalidTicketContent("ticket amount out of range"))
    }
}

/// Ticket balance of an owner, as observed at a given level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketSnapshot {
    pub ticket: TicketRef,
    pub owner: Address,
    pub amount: U256,
    pub level: u32,
}

impl TicketSnapshot {
    /// Splits off `amount`, returns `(split, rest)`.
    pub fn split(&self, amount: U256) -> Result<(Self, Self), FaBridgeError> {
        let rest = self
            .amount
            .checked_sub(amount)
            .ok_or(FaBridgeError::InsufficientAmount {
                requested: amount,
                available: self.amount,
            })?;
        let with_amount = |amount| Self {
            amount,
            ..self.clone()
        };
        Ok((with_amount(amount), with_amount(rest)))
    }

    /// Transfer of the whole snapshot to `destination`, the operation is not submitted.
    pub fn transfer(&self, destination: Address, entrypoint: Option<Entrypoint>) -> TransferIntent {
        TransferIntent {
            ticket: self.ticket.clone(),
            amount: self.amount,
            source: self.owner.clone(),
            destination,
            entrypoint: entrypoint.unwrap_or_default(),
            routing_info: None,
        }
    }
}

pub(crate) fn u256_to_bigint(value: &U256) -> BigInt {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigInt::from_bytes_be(Sign::Plus, &bytes)
}

fn bigint_to_u256(value: &BigInt) -> Result<U256, FaBridgeError> {
    let (sign, bytes) = value.to_bytes_le();
    if sign == Sign::Minus {
        return Err(FaBridgeError::InvalidTicketContent("token id is not a nat"));
    }
    if bytes.len() > 32 {
        return Err(FaBridgeError::InvalidTicketContent("token id does not fit in uint256"));
    }
    Ok(U256::from_little_endian(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket_hash::ticket_hash;
    use pretty_assertions::assert_eq;
    use tezos_smart_rollup_encoding::michelson::MichelsonUnit;

    const TICKETER: &str = "KT18amZmM5W7qDWVt2pH6uj7sCEd3kbzLrHT";

    fn ticketer() -> L1Address {
        TICKETER.parse().unwrap()
    }

    fn snapshot(amount: u64) -> TicketSnapshot {
        TicketSnapshot {
            ticket: TicketRef::new(ticketer(), TicketContent::raw(1.into(), Some(vec![0])))
                .unwrap(),
            owner: Address::new("tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU"),
            amount: amount.into(),
            level: 12,
        }
    }

    #[test]
    fn content_bytes_vector() {
        let content = TicketContent::raw(1.into(), Some(vec![0]));
        let bytes = make_content_bytes(&content).unwrap();
        assert_eq!(hex::encode(&bytes), "0707000105090a0000000100");
        assert_eq!(decode_content_bytes(&bytes).unwrap(), content);
    }

    #[test]
    fn content_without_info() {
        let content = TicketContent::raw(U256::MAX, None);
        let bytes = make_content_bytes(&content).unwrap();
        assert_eq!(&bytes[bytes.len() - 2..], &[0x03, 0x06]);
        assert_eq!(decode_content_bytes(&bytes).unwrap(), content);
    }

    #[test]
    fn decode_content_rejects_other_shapes() {
        let unit = michelson::forge(&MichelsonUnit).unwrap();
        assert!(decode_content_bytes(&unit).is_err());

        let negative = michelson::forge(&MichelsonPair(
            MichelsonInt::from(-1),
            MichelsonOption::<MichelsonBytes>(None),
        ))
        .unwrap();
        assert!(matches!(
            decode_content_bytes(&negative),
            Err(FaBridgeError::InvalidTicketContent("token id is not a nat"))
        ));

        let string_info = michelson::forge(&MichelsonPair(
            MichelsonInt::from(0),
            MichelsonOption(Some(MichelsonString("x".into()))),
        ))
        .unwrap();
        assert!(decode_content_bytes(&string_info).is_err());

        let mut trailing = make_content_bytes(&TicketContent::raw(0.into(), None)).unwrap();
        trailing.push(0);
        assert!(decode_content_bytes(&trailing).is_err());
    }

    #[test]
    fn token_info_is_order_independent() {
        let a = TokenInfo::new()
            .with("symbol", b"TST".to_vec())
            .with("decimals", b"6".to_vec())
            .with("contract_address", b"KT1".to_vec());
        let b: TokenInfo = [
            ("contract_address", b"KT1".to_vec()),
            ("decimals", b"6".to_vec()),
            ("symbol", b"TST".to_vec()),
        ]
        .into_iter()
        .collect();

        assert_eq!(a.pack().unwrap(), b.pack().unwrap());

        let hash = |info: &TokenInfo| {
            TicketRef::new(ticketer(), TicketContent::new(0.into(), Some(info)).unwrap())
                .unwrap()
                .ticket_hash()
                .unwrap()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn token_info_unpack() {
        let info = TokenInfo::new().with("a", vec![1]).with("b", vec![]);
        let content = TicketContent::new(5.into(), Some(&info)).unwrap();
        assert_eq!(content.token_info_map().unwrap(), Some(info));

        let unsorted = michelson::pack(&MichelsonList(vec![
            MichelsonElt(MichelsonString("b".into()), MichelsonBytes(vec![])),
            MichelsonElt(MichelsonString("a".into()), MichelsonBytes(vec![])),
        ]))
        .unwrap();
        assert!(TokenInfo::unpack(&unsorted).is_err());
        assert!(TokenInfo::unpack(&[0x05, 0x03, 0x0b]).is_err());
    }

    #[test]
    fn ticket_hash_matches_kernel() {
        let ticket = snapshot(1).ticket;
        assert_eq!(
            hex::encode(ticket.ticket_hash().unwrap().0.as_bytes()),
            "e0027297584c9e4162c872e072f1cc75b527023f9c0eda44ad4c732762b0b897"
        );
    }

    #[test]
    fn ticket_hash_ignores_amount() {
        let ticket = snapshot(1).ticket;
        let small = ticket.to_ticket(1.into()).unwrap();
        let large = ticket.to_ticket(U256::MAX).unwrap();

        assert_eq!(ticket_hash(&small).unwrap(), ticket.ticket_hash().unwrap());
        assert_eq!(ticket_hash(&large).unwrap(), ticket.ticket_hash().unwrap());
        assert_eq!(small.creator().0, *ticket.ticketer.contract());
    }

    #[test]
    fn ticketer_must_be_originated() {
        let implicit = L1Address::from_b58check("tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU").unwrap();
        assert!(matches!(
            TicketRef::new(implicit, TicketContent::raw(0.into(), None)),
            Err(FaBridgeError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn split_conserves_amount() {
        let ticket = snapshot(10);
        for n in 0..=10u64 {
            let (first, second) = ticket.split(n.into()).unwrap();
            assert_eq!(first.amount, U256::from(n));
            assert_eq!(first.amount + second.amount, ticket.amount);
            assert_eq!(first.ticket, ticket.ticket);
            assert_eq!(second.level, ticket.level);
        }
    }

    #[test]
    fn split_too_much() {
        assert!(matches!(
            snapshot(3).split(4.into()),
            Err(FaBridgeError::InsufficientAmount { .. })
        ));
    }

    #[test]
    fn transfer_defaults_to_default_entrypoint() {
        let ticket = snapshot(3);
        let destination = Address::new("KT1TxqZ8QtKvLu3V3JH7Gx58n7Co8pgtpQU5");
        let intent = ticket.transfer(destination.clone(), None);
        assert!(intent.entrypoint.is_default());
        assert_eq!(intent.destination, destination);
        assert_eq!(intent.amount, U256::from(3));
        assert_eq!(intent.source, ticket.owner);

        let intent = ticket.transfer(destination, Entrypoint::try_from("deposit").ok());
        assert_eq!(intent.entrypoint.as_str(), "deposit");
    }
}
