// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Transfer lifecycle.
//!
//! ```text
//! deposit:    CREATED ---------------------------------------------------> COMPLETED
//! withdrawal: CREATED -> PENDING_COMMITMENT -> PENDING_PROOF -> EXECUTABLE -> COMPLETED
//! ```
//!
//! Any non-terminal state can end in `FAILED_<reason>`. Failures are
//! outcomes reported by the ledgers, not errors of ours, and nothing here
//! tries to remediate them.

use std::fmt;

use fa_bridge_types::{Address, HexString, TicketHash};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SettlementError;
use crate::indexer::decimal;
use crate::ledger::{BatchOrderingKey, OperationHash};
use crate::outbox::{CommitmentHash, OutboxMessageRef, OutboxProof};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Deposit,
    Withdrawal,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("deposit"),
            Self::Withdrawal => f.write_str("withdrawal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// The proxy rejected the payload, the receiver got the ticket instead
    InvalidRoutingInfoRevertable,
    ProxyNotFound,
    /// The proxy is bound to another token
    TicketHashMismatch,
    ExecutionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStatus {
    Created,
    PendingCommitment,
    PendingProof,
    Executable,
    Completed,
    Failed(FailureReason),
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PendingCommitment => "PENDING_COMMITMENT",
            Self::PendingProof => "PENDING_PROOF",
            Self::Executable => "EXECUTABLE",
            Self::Completed => "COMPLETED",
            Self::Failed(FailureReason::InvalidRoutingInfoRevertable) => {
                "FAILED_INVALID_ROUTING_INFO_REVERTABLE"
            }
            Self::Failed(FailureReason::ProxyNotFound) => "FAILED_PROXY_NOT_FOUND",
            Self::Failed(FailureReason::TicketHashMismatch) => "FAILED_TICKET_HASH_MISMATCH",
            Self::Failed(FailureReason::ExecutionFailed) => "FAILED_EXECUTION_FAILED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CREATED" => Self::Created,
            "PENDING_COMMITMENT" => Self::PendingCommitment,
            "PENDING_PROOF" => Self::PendingProof,
            "EXECUTABLE" => Self::Executable,
            "COMPLETED" => Self::Completed,
            "FAILED_INVALID_ROUTING_INFO_REVERTABLE" => {
                Self::Failed(FailureReason::InvalidRoutingInfoRevertable)
            }
            "FAILED_PROXY_NOT_FOUND" => Self::Failed(FailureReason::ProxyNotFound),
            "FAILED_TICKET_HASH_MISMATCH" => Self::Failed(FailureReason::TicketHashMismatch),
            "FAILED_EXECUTION_FAILED" => Self::Failed(FailureReason::ExecutionFailed),
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TransferStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransferStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown transfer status {}", raw)))
    }
}

/// Unique key of a transfer: its originating operation and position within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId {
    pub operation_hash: OperationHash,
    pub batch_key: BatchOrderingKey,
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operation_hash, self.batch_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub kind: TransferKind,
    /// Originating operation: L1 operation for deposits, L2 transaction for withdrawals
    pub operation_hash: OperationHash,
    pub batch_key: BatchOrderingKey,
    pub source: Address,
    pub destination: Address,
    pub ticket_hash: TicketHash,
    #[serde(with = "decimal")]
    pub amount: U256,
    pub routing_info: HexString,
    pub status: TransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbox_message: Option<OutboxMessageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_commitment: Option<CommitmentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<HexString>,
    /// Counterpart event on L2 (deposit) or withdrawal transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_operation_hash: Option<OperationHash>,
    /// Outbox execution operation on L1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_operation_hash: Option<OperationHash>,
}

impl Transfer {
    #[allow(clippy::too_many_arguments)]
    pub fn created(
        kind: TransferKind,
        operation_hash: OperationHash,
        batch_key: BatchOrderingKey,
        source: Address,
        destination: Address,
        ticket_hash: TicketHash,
        amount: U256,
        routing_info: HexString,
    ) -> Self {
        let l2_operation_hash = match kind {
            TransferKind::Deposit => None,
            TransferKind::Withdrawal => Some(operation_hash.clone()),
        };
        Self {
            kind,
            operation_hash,
            batch_key,
            source,
            destination,
            ticket_hash,
            amount,
            routing_info,
            status: TransferStatus::Created,
            outbox_message: None,
            related_commitment: None,
            proof: None,
            l2_operation_hash,
            settlement_operation_hash: None,
        }
    }

    pub fn id(&self) -> TransferId {
        TransferId {
            operation_hash: self.operation_hash.clone(),
            batch_key: self.batch_key,
        }
    }

    /// True for every terminal state, failures included.
    pub fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_successful(&self) -> bool {
        self.status == TransferStatus::Completed
    }

    fn transition(&mut self, to: TransferStatus) -> Result<(), SettlementError> {
        use TransferStatus::*;

        let allowed = match (self.kind, self.status, to) {
            (_, from, _) if from.is_terminal() => false,
            (_, _, Failed(_)) => true,
            (TransferKind::Deposit, Created, Completed) => true,
            (TransferKind::Withdrawal, Created, PendingCommitment) => true,
            (TransferKind::Withdrawal, PendingCommitment, PendingProof) => true,
            (TransferKind::Withdrawal, PendingProof, Executable) => true,
            (TransferKind::Withdrawal, Executable, Completed) => true,
            _ => false,
        };
        if !allowed {
            return Err(SettlementError::InvalidTransition {
                kind: self.kind,
                from: self.status,
                to,
            });
        }
        info!("Transfer {} {} -> {}", self.id(), self.status, to);
        self.status = to;
        Ok(())
    }

    /// The withdrawal was processed by the rollup and left an outbox message.
    pub fn observe_withdrawal(&mut self, message: OutboxMessageRef) -> Result<(), SettlementError> {
        self.transition(TransferStatus::PendingCommitment)?;
        self.outbox_message = Some(message);
        Ok(())
    }

    pub fn mark_cemented(&mut self) -> Result<(), SettlementError> {
        self.transition(TransferStatus::PendingProof)
    }

    pub fn attach_proof(&mut self, proof: OutboxProof) -> Result<(), SettlementError> {
        self.transition(TransferStatus::Executable)?;
        self.related_commitment = Some(proof.commitment);
        self.proof = Some(proof.proof);
        Ok(())
    }

    /// The outbox message was executed on L1.
    pub fn complete_withdrawal(&mut self, execution: OperationHash) -> Result<(), SettlementError> {
        if self.kind != TransferKind::Withdrawal {
            return Err(self.invalid(TransferStatus::Completed));
        }
        self.transition(TransferStatus::Completed)?;
        self.settlement_operation_hash = Some(execution);
        Ok(())
    }

    /// The deposit event was observed on L2.
    pub fn complete_deposit(
        &mut self,
        deposit_event: OperationHash,
    ) -> Result<(), SettlementError> {
        if self.kind != TransferKind::Deposit {
            return Err(self.invalid(TransferStatus::Completed));
        }
        self.transition(TransferStatus::Completed)?;
        self.l2_operation_hash = Some(deposit_event);
        Ok(())
    }

    pub fn fail(&mut self, reason: FailureReason) -> Result<(), SettlementError> {
        self.transition(TransferStatus::Failed(reason))
    }

    fn invalid(&self, to: TransferStatus) -> SettlementError {
        SettlementError::InvalidTransition {
            kind: self.kind,
            from: self.status,
            to,
        }
    }
}
