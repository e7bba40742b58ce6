// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Bridge indexer queries.
//!
//! The indexer joins operations observed on both ledgers by ticket hash and
//! exposes them as `(l1, l2)` pairs. Amounts and ticket hashes are decimal
//! strings on the wire.

use async_trait::async_trait;
use fa_bridge_types::{Address, TicketHash};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::error::SettlementError;
use crate::ledger::{BatchOrderingKey, LedgerError, OperationHash};
use crate::outbox::OutboxMessageRef;
use crate::retry::retry;
use crate::transfer::TransferKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1TransactionRecord {
    pub operation_hash: OperationHash,
    pub counter: u64,
    pub nonce: u64,
    #[serde(with = "decimal")]
    pub amount: U256,
    pub ticket_hash: TicketHash,
    pub l1_account: Address,
    pub l2_account: Address,
    pub level: u32,
}

impl L1TransactionRecord {
    pub fn ordering_key(&self) -> BatchOrderingKey {
        BatchOrderingKey::L1 {
            counter: self.counter,
            nonce: self.nonce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2TransactionRecord {
    pub transaction_hash: OperationHash,
    pub transaction_index: u64,
    pub log_index: u64,
    #[serde(with = "decimal")]
    pub amount: U256,
    pub ticket_hash: TicketHash,
    pub l1_account: Address,
    pub l2_account: Address,
    /// Account credited in the ticket table (receiver or proxy)
    pub ticket_owner: Address,
    pub level: u32,
    /// Set for withdrawals only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox_message: Option<OutboxMessageRef>,
}

impl L2TransactionRecord {
    pub fn ordering_key(&self) -> BatchOrderingKey {
        BatchOrderingKey::L2 {
            transaction_index: self.transaction_index,
            log_index: self.log_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRecord {
    pub kind: TransferKind,
    pub l1_transaction: Option<L1TransactionRecord>,
    pub l2_transaction: Option<L2TransactionRecord>,
}

#[async_trait]
pub trait IndexerQuery: Send + Sync {
    /// Records originated by the given L1 operation or L2 transaction.
    async fn by_operation_hash(
        &self,
        hash: &OperationHash,
    ) -> Result<Vec<BridgeRecord>, LedgerError>;

    async fn by_ticket_hash(&self, ticket_hash: &TicketHash)
        -> Result<Vec<BridgeRecord>, LedgerError>;

    /// Records where the account is either the L1 or the L2 side.
    async fn by_account(&self, account: &Address) -> Result<Vec<BridgeRecord>, LedgerError>;
}

/// Waits until the indexer knows about `hash`.
pub async fn records_for<I: IndexerQuery + ?Sized>(
    indexer: &I,
    hash: &OperationHash,
    config: &RetryConfig,
) -> Result<Vec<BridgeRecord>, SettlementError> {
    retry(config, "indexed records", || async {
        let records = indexer.by_operation_hash(hash).await?;
        if records.is_empty() {
            Err(SettlementError::NotYetAvailable(format!(
                "records of operation {}",
                hash
            )))
        } else {
            Ok(records)
        }
    })
    .await
}

/// Serde helper for unsigned amounts rendered as decimal strings.
pub mod decimal {
    use primitive_types::U256;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw).map_err(|_| D::Error::custom("expected a decimal uint256"))
    }
}
