// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Batch reconciliation.
//!
//! K sub-operations submitted in one batch must map 1:1, in submission
//! order, to K counterpart events. Ordering keys are the only tie-break.
//! Any deviation means the two ledgers disagree about the bridge state,
//! which is reported as an invariant violation.

use std::collections::BTreeMap;

use fa_bridge_types::TicketHash;

use crate::error::SettlementError;
use crate::indexer::{BridgeRecord, L1TransactionRecord, L2TransactionRecord};
use crate::ledger::{BatchOrderingKey, OperationHash};
use crate::transfer::Transfer;

/// Anything that has a position within a batch and refers to a ticket.
pub trait Ordered {
    fn ordering_key(&self) -> BatchOrderingKey;

    fn ticket_hash(&self) -> TicketHash;
}

impl Ordered for L1TransactionRecord {
    fn ordering_key(&self) -> BatchOrderingKey {
        L1TransactionRecord::ordering_key(self)
    }

    fn ticket_hash(&self) -> TicketHash {
        self.ticket_hash
    }
}

impl Ordered for L2TransactionRecord {
    fn ordering_key(&self) -> BatchOrderingKey {
        L2TransactionRecord::ordering_key(self)
    }

    fn ticket_hash(&self) -> TicketHash {
        self.ticket_hash
    }
}

impl Ordered for Transfer {
    fn ordering_key(&self) -> BatchOrderingKey {
        self.batch_key
    }

    fn ticket_hash(&self) -> TicketHash {
        self.ticket_hash
    }
}

/// L1 operation with its L2 counterpart, if already observed.
pub type ReconciledPair = (L1TransactionRecord, Option<L2TransactionRecord>);

/// Checks the indexer view of an L1 operation made of `expected` sub-operations.
pub fn check_batch(
    operation_hash: &OperationHash,
    expected: usize,
    records: &[BridgeRecord],
) -> Result<Vec<ReconciledPair>, SettlementError> {
    if records.len() != expected {
        return Err(SettlementError::invariant(format!(
            "operation {} has {} sub-operations but {} indexed records",
            operation_hash,
            expected,
            records.len()
        )));
    }

    let mut pairs: Vec<ReconciledPair> = Vec::with_capacity(expected);
    for record in records {
        let l1 = record.l1_transaction.as_ref().ok_or_else(|| {
            SettlementError::invariant(format!(
                "record of operation {} has no L1 side",
                operation_hash
            ))
        })?;
        if &l1.operation_hash != operation_hash {
            return Err(SettlementError::invariant(format!(
                "record of operation {} belongs to {}",
                operation_hash, l1.operation_hash
            )));
        }
        if let Some((previous, _)) = pairs.last() {
            if previous.ordering_key() >= l1.ordering_key() {
                return Err(SettlementError::invariant(format!(
                    "operation {}: key {} does not follow {}",
                    operation_hash,
                    l1.ordering_key(),
                    previous.ordering_key()
                )));
            }
        }
        if let Some(l2) = &record.l2_transaction {
            check_counterpart(l1, l2)?;
        }
        pairs.push((l1.clone(), record.l2_transaction.clone()));
    }
    Ok(pairs)
}

fn check_counterpart(
    l1: &L1TransactionRecord,
    l2: &L2TransactionRecord,
) -> Result<(), SettlementError> {
    if l1.ticket_hash != l2.ticket_hash {
        return Err(SettlementError::invariant(format!(
            "ticket hash {} on L1 but {} on L2 for operation {}",
            l1.ticket_hash, l2.ticket_hash, l1.operation_hash
        )));
    }
    if l1.amount != l2.amount {
        return Err(SettlementError::invariant(format!(
            "amount {} on L1 but {} on L2 for operation {}",
            l1.amount, l2.amount, l1.operation_hash
        )));
    }
    Ok(())
}

/// Pairs submitted transfers with observed counterpart events, by ordering key.
///
/// Every observed event must carry the key of exactly one submission, pairs
/// are returned in key order. Submissions without an event yet are left out.
pub fn match_batch<'a, S: Ordered, O: Ordered>(
    submitted: &'a [S],
    observed: &'a [O],
) -> Result<Vec<(&'a S, &'a O)>, SettlementError> {
    let by_key: BTreeMap<BatchOrderingKey, &S> = submitted
        .iter()
        .map(|item| (item.ordering_key(), item))
        .collect();
    if by_key.len() != submitted.len() {
        return Err(SettlementError::invariant(format!(
            "{} submitted operations share ordering keys",
            submitted.len() - by_key.len()
        )));
    }

    let mut matched: BTreeMap<BatchOrderingKey, (&S, &O)> = BTreeMap::new();
    for event in observed {
        let key = event.ordering_key();
        let submission = by_key.get(&key).copied().ok_or_else(|| {
            SettlementError::invariant(format!("counterpart {} matches no submission", key))
        })?;
        if submission.ticket_hash() != event.ticket_hash() {
            return Err(SettlementError::invariant(format!(
                "submission {} carries ticket {} but its counterpart carries {}",
                key,
                submission.ticket_hash(),
                event.ticket_hash()
            )));
        }
        if matched.insert(key, (submission, event)).is_some() {
            return Err(SettlementError::invariant(format!(
                "submission {} has more than one counterpart",
                key
            )));
        }
    }
    Ok(matched.into_values().collect())
}
