// SPDX-FileCopyrightText: 2023 PK Lab <contact@pklab.io>
// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Operation descriptors, built locally and handed to a ledger client.
//!
//! Deposit: a ticket transfer on L1, from the owner to the rollup, carrying
//! the deposit routing info.
//! Withdrawal: a call to the FA bridge precompile on L2.
//!
//! Nothing in this module submits anything.

use alloy_primitives::{Address as AlloyAddress, Bytes, FixedBytes, U256 as AlloyU256};
use alloy_sol_types::SolEvent;
use primitive_types::{H160, U256};

use crate::address::{Address, L1Address, L2Address, SmartRollupAddress, L1_ADDRESS_SIZE};
use crate::entrypoint::Entrypoint;
use crate::error::FaBridgeError;
use crate::hex_string::HexString;
use crate::routing_info::{DepositRoutingInfo, WithdrawalRoutingInfo};
use crate::ticket::{decode_content_bytes, TicketRef, TicketSnapshot};
use crate::ticket_hash::TicketHash;

/// FA bridge precompile (system contract) address on L2.
pub const FA_BRIDGE_PRECOMPILE_ADDRESS: H160 = H160([
    0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
]);

/// Selector of `withdraw(address,bytes,uint256,bytes22,bytes)`.
pub const FA_BRIDGE_WITHDRAW_METHOD_ID: &[u8; 4] = b"\x80\xfc\x1f\xe3";

alloy_sol_types::sol! {
    /// Arguments of `withdraw`, encoded without the selector.
    event WithdrawArguments (
        address ticket_owner,
        bytes   routing_info,
        uint256 amount,
        bytes22 ticketer,
        bytes   content,
    );
}

/// L1 ticket transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub ticket: TicketRef,
    pub amount: U256,
    pub source: Address,
    pub destination: Address,
    pub entrypoint: Entrypoint,
    /// Raw routing info, only set for deposits
    pub routing_info: Option<HexString>,
}

impl TransferIntent {
    /// Deposit of the whole snapshot to the rollup.
    pub fn deposit(
        ticket: &TicketSnapshot,
        rollup: &SmartRollupAddress,
        routing_info: &DepositRoutingInfo,
    ) -> Self {
        Self {
            routing_info: Some(routing_info.encode().into()),
            ..ticket.transfer(Address::from(rollup), None)
        }
    }

    pub fn is_deposit(&self) -> bool {
        self.routing_info.is_some()
    }

    pub fn ticket_hash(&self) -> Result<TicketHash, FaBridgeError> {
        self.ticket.ticket_hash()
    }
}

/// Call of the FA bridge precompile `withdraw` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalIntent {
    /// Account that invokes the precompile
    pub sender: L2Address,
    /// Account debited in the ticket table: the sender or its ERC wrapper
    pub ticket_owner: L2Address,
    pub routing_info: WithdrawalRoutingInfo,
    pub amount: U256,
    pub ticket: TicketRef,
}

impl WithdrawalIntent {
    pub fn ticket_hash(&self) -> Result<TicketHash, FaBridgeError> {
        self.ticket.ticket_hash()
    }

    pub fn destination(&self) -> L2Address {
        L2Address(FA_BRIDGE_PRECOMPILE_ADDRESS)
    }

    /// Precompile calldata: the `withdraw` selector followed by the ABI
    /// encoded owner, routing info, amount, forged ticketer and content.
    pub fn calldata(&self) -> Result<Vec<u8>, FaBridgeError> {
        let input = WithdrawArguments {
            ticket_owner: AlloyAddress::from_slice(self.ticket_owner.0.as_bytes()),
            routing_info: Bytes::from(self.routing_info.encode()?.to_vec()),
            amount: AlloyU256::from_be_bytes(u256_to_be_bytes(&self.amount)),
            ticketer: FixedBytes::<L1_ADDRESS_SIZE>::from(self.ticket.ticketer.forge()?),
            content: Bytes::from(self.ticket.content_bytes()?),
        };

        let mut call_data = Vec::with_capacity(4 + 7 * 32);
        call_data.extend_from_slice(FA_BRIDGE_WITHDRAW_METHOD_ID);
        call_data.extend_from_slice(&input.encode_data());
        Ok(call_data)
    }

    /// Inverse of [WithdrawalIntent::calldata].
    pub fn try_parse(calldata: &[u8], sender: L2Address) -> Result<Self, FaBridgeError> {
        let input_data = calldata
            .strip_prefix(FA_BRIDGE_WITHDRAW_METHOD_ID.as_slice())
            .ok_or(FaBridgeError::AbiDecode("unknown method id"))?;
        let (ticket_owner, routing_info, amount, ticketer, content) =
            WithdrawArguments::abi_decode_data(input_data, true)
                .map_err(|_| FaBridgeError::AbiDecode("malformed withdraw arguments"))?;

        let ticketer = L1Address::from_forged(ticketer.as_slice())?;
        let content = decode_content_bytes(&content)?;
        Ok(Self {
            sender,
            ticket_owner: L2Address(H160::from_slice(ticket_owner.as_slice())),
            routing_info: WithdrawalRoutingInfo::decode(&routing_info)?,
            amount: U256::from_big_endian(&amount.to_be_bytes::<32>()),
            ticket: TicketRef::new(ticketer, content)?,
        })
    }
}

fn u256_to_be_bytes(value: &U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketContent;

    fn ticketer() -> L1Address {
        "KT18amZmM5W7qDWVt2pH6uj7sCEd3kbzLrHT".parse().unwrap()
    }

    fn ticket() -> TicketRef {
        TicketRef::new(ticketer(), TicketContent::raw(1.into(), Some(vec![0]))).unwrap()
    }

    fn withdrawal() -> WithdrawalIntent {
        WithdrawalIntent {
            sender: L2Address(H160::repeat_byte(0x11)),
            ticket_owner: L2Address(H160::repeat_byte(0x22)),
            routing_info: WithdrawalRoutingInfo::new(
                "tz1RjtZUVeLhADFHDL8UwDZA6vjWWhojpu5w".parse().unwrap(),
                "KT1X1M4ywyz9cHvUgBLTUUdz3GTiYJhPcyPh".parse().unwrap(),
            )
            .unwrap(),
            amount: 42.into(),
            ticket: ticket(),
        }
    }

    #[test]
    fn withdraw_calldata_layout() {
        let calldata = withdrawal().calldata().unwrap();
        assert_eq!(&calldata[..4], &[0x80, 0xfc, 0x1f, 0xe3]);
        let words = &calldata[4..];
        // ticket owner, left padded
        assert_eq!(&words[12..32], &[0x22; 20]);
        // offset of the routing info
        assert_eq!(words[63], 5 * 32);
        // amount
        assert_eq!(words[95], 42);
        // ticketer, right padded
        assert_eq!(&words[96..118], &ticketer().forge().unwrap());
        // routing info length
        assert_eq!(words[5 * 32 + 31], 44);
    }

    #[test]
    fn withdraw_calldata_parses_back() {
        let intent = withdrawal();
        let parsed =
            WithdrawalIntent::try_parse(&intent.calldata().unwrap(), intent.sender).unwrap();
        assert_eq!(parsed, intent);
        assert_eq!(parsed.ticket_hash().unwrap(), intent.ticket_hash().unwrap());
    }

    #[test]
    fn try_parse_rejects_other_methods() {
        let mut calldata = withdrawal().calldata().unwrap();
        calldata[0] = 0;
        assert!(matches!(
            WithdrawalIntent::try_parse(&calldata, L2Address::zero()),
            Err(FaBridgeError::AbiDecode(_))
        ));
        assert!(WithdrawalIntent::try_parse(&calldata[..3], L2Address::zero()).is_err());
    }

    #[test]
    fn deposit_intent() {
        let snapshot = TicketSnapshot {
            ticket: ticket(),
            owner: Address::new("tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU"),
            amount: 7.into(),
            level: 3,
        };
        let rollup: SmartRollupAddress = "sr1Ghq66tYK9y3r8CC1Tf8i8m5nxh8nTvZEf".parse().unwrap();
        let routing = DepositRoutingInfo::new(L2Address(H160::repeat_byte(0x33)), None);

        let intent = TransferIntent::deposit(&snapshot, &rollup, &routing);
        assert!(intent.is_deposit());
        assert!(intent.entrypoint.is_default());
        assert_eq!(intent.destination.as_str(), "sr1Ghq66tYK9y3r8CC1Tf8i8m5nxh8nTvZEf");
        assert_eq!(intent.amount, U256::from(7));
        assert_eq!(intent.routing_info.unwrap().len(), 40);
    }
}
