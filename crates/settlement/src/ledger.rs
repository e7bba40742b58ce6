// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Ledger client abstraction.
//!
//! The same interface is used for both sides of the bridge, each with its
//! own operation type: ticket transfers, contract calls and outbox
//! executions on L1, precompile calls on L2.
//!
//! Batches are atomic: either every sub-operation is included, in order, or
//! none is. The receipt carries one ordering key per sub-operation, in
//! submission order.

use std::fmt;

use async_trait::async_trait;
use fa_bridge_types::asset::ContractCall;
use fa_bridge_types::{
    Address, AssetKey, FaBridgeError, HexString, L2Address, SmartRollupAddress, TicketRef,
    TicketSnapshot, TransferIntent, WithdrawalIntent,
};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::SettlementError;
use crate::outbox::CommitmentHash;
use crate::retry::retry;

/// Failure of a ledger, rollup node or indexer call.
///
/// Only [LedgerError::Rejected] is final, the other variants are retried.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Transport or decoding failure of the client itself.
    #[error("Internal ledger client error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("Request timed out")]
    Timeout,
    /// Not included or not indexed yet.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The ledger refused the operation, resubmitting it as is will not help.
    #[error("Operation rejected: {0}")]
    Rejected(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Internal(_) | Self::Timeout | Self::NotFound(_) => true,
            Self::Rejected(_) => false,
        }
    }
}

/// Operation (L1) or transaction (L2) hash, as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHash(pub String);

impl OperationHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationHash {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Position of a sub-operation within a batch.
///
/// Keys of the same ledger are ordered lexicographically. Keys of different
/// ledgers are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOrderingKey {
    L1 { counter: u64, nonce: u64 },
    L2 { transaction_index: u64, log_index: u64 },
}

impl fmt::Display for BatchOrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L1 { counter, nonce } => write!(f, "(counter {}, nonce {})", counter, nonce),
            Self::L2 {
                transaction_index,
                log_index,
            } => write!(f, "(tx {}, log {})", transaction_index, log_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReceipt {
    pub hash: OperationHash,
    /// One key per sub-operation, in submission order
    pub keys: Vec<BatchOrderingKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: OperationHash,
    pub level: u32,
    pub status: ConfirmationStatus,
}

impl Confirmation {
    pub fn is_applied(&self) -> bool {
        self.status == ConfirmationStatus::Applied
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L1Operation {
    Transfer(TransferIntent),
    Call(ContractCall),
    /// Execution of a cemented outbox message, the proof is forwarded verbatim.
    ExecuteOutbox {
        rollup: SmartRollupAddress,
        commitment: CommitmentHash,
        proof: HexString,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Operation {
    pub from: L2Address,
    pub to: L2Address,
    pub data: HexString,
    pub value: U256,
}

impl L2Operation {
    pub fn from_withdrawal(intent: &WithdrawalIntent) -> Result<Self, FaBridgeError> {
        Ok(Self {
            from: intent.sender,
            to: intent.destination(),
            data: intent.calldata()?.into(),
            value: U256::zero(),
        })
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    type Operation: Clone + Send + Sync + 'static;

    /// Inject all operations atomically, in order.
    async fn submit_batch(
        &self,
        operations: Vec<Self::Operation>,
    ) -> Result<OperationReceipt, LedgerError>;

    async fn submit(&self, operation: Self::Operation) -> Result<OperationReceipt, LedgerError> {
        self.submit_batch(vec![operation]).await
    }

    /// Inclusion status of a submitted batch.
    ///
    /// Fails with [LedgerError::NotFound] until the batch is included.
    async fn wait(&self, receipt: &OperationReceipt) -> Result<Confirmation, LedgerError>;

    async fn query_balance(&self, owner: &Address, asset: &AssetKey) -> Result<U256, LedgerError>;

    async fn current_level(&self) -> Result<u32, LedgerError>;
}

/// Reads the ticket balance of `owner` and pins it to the current level.
pub async fn fetch_ticket<C: LedgerClient + ?Sized>(
    ledger: &C,
    owner: &Address,
    ticket: &TicketRef,
    config: &RetryConfig,
) -> Result<TicketSnapshot, SettlementError> {
    let asset = AssetKey::Ticket(ticket.clone());
    let amount = retry(config, "ticket balance", || async {
        ledger
            .query_balance(owner, &asset)
            .await
            .map_err(SettlementError::from)
    })
    .await?;
    let level = wait_level(ledger, config).await?;
    debug!("Ticket balance of {} is {} at level {}", owner, amount, level);
    Ok(TicketSnapshot {
        ticket: ticket.clone(),
        owner: owner.clone(),
        amount,
        level,
    })
}

pub async fn wait_level<C: LedgerClient + ?Sized>(
    ledger: &C,
    config: &RetryConfig,
) -> Result<u32, SettlementError> {
    retry(config, "current level", || async {
        ledger.current_level().await.map_err(SettlementError::from)
    })
    .await
}

pub async fn wait_confirmation<C: LedgerClient + ?Sized>(
    ledger: &C,
    receipt: &OperationReceipt,
    config: &RetryConfig,
) -> Result<Confirmation, SettlementError> {
    retry(config, "operation confirmation", || async {
        ledger.wait(receipt).await.map_err(SettlementError::from)
    })
    .await
}
