// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Batch submission of deposits and withdrawals.
//!
//! Every request of a batch is validated locally first: nothing reaches a
//! ledger unless the whole batch is well-formed. The batch is then
//! submitted once (injection is never retried, waiting for inclusion is).
//! One `CREATED` transfer per sub-operation is persisted as soon as the
//! batch is injected, before waiting for its inclusion.

use std::collections::HashMap;

use fa_bridge_types::{
    Address, DepositRoutingInfo, FaBridgeError, HexString, SmartRollupAddress, TicketHash,
    TicketSnapshot, TransferIntent, WithdrawalIntent, WithdrawalRoutingInfo,
};
use primitive_types::U256;
use tracing::{error, info};

use crate::config::RetryConfig;
use crate::error::SettlementError;
use crate::ledger::{
    wait_confirmation, ConfirmationStatus, L1Operation, L2Operation, LedgerClient, LedgerError,
    OperationReceipt,
};
use crate::store::TransferStore;
use crate::transfer::{FailureReason, Transfer, TransferKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    /// Tickets of the L1 owner to take the amount from
    pub ticket: TicketSnapshot,
    pub amount: U256,
    /// Raw deposit routing info, checked before submission
    pub routing_info: HexString,
}

impl DepositRequest {
    pub fn new(ticket: TicketSnapshot, amount: U256, routing_info: &DepositRoutingInfo) -> Self {
        Self {
            ticket,
            amount,
            routing_info: routing_info.encode().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    /// Account invoking the precompile
    pub sender: Address,
    /// Tickets of the L2 owner (sender or proxy) to take the amount from
    pub ticket: TicketSnapshot,
    pub amount: U256,
    /// Raw withdrawal routing info, checked before submission
    pub routing_info: HexString,
}

impl WithdrawalRequest {
    pub fn new(
        sender: Address,
        ticket: TicketSnapshot,
        amount: U256,
        routing_info: &WithdrawalRoutingInfo,
    ) -> Result<Self, FaBridgeError> {
        Ok(Self {
            sender,
            ticket,
            amount,
            routing_info: routing_info.encode()?.into(),
        })
    }
}

struct Prepared<Op> {
    operation: Op,
    source: Address,
    destination: Address,
    ticket_hash: TicketHash,
    amount: U256,
    routing_info: HexString,
}

/// What is left of every (owner, ticket) snapshot a batch draws from.
#[derive(Default)]
struct Allocations(HashMap<(Address, TicketHash), U256>);

impl Allocations {
    /// Takes `amount` out of the snapshot, net of earlier requests of the same batch.
    fn take(
        &mut self,
        snapshot: &TicketSnapshot,
        amount: U256,
    ) -> Result<TicketSnapshot, SettlementError> {
        let key = (snapshot.owner.clone(), snapshot.ticket.ticket_hash()?);
        let remaining = self.0.entry(key).or_insert(snapshot.amount);
        let available = TicketSnapshot {
            amount: *remaining,
            ..snapshot.clone()
        };
        let (taken, rest) = available.split(amount)?;
        *remaining = rest.amount;
        Ok(taken)
    }
}

fn prepare_deposit(
    request: &DepositRequest,
    rollup: &SmartRollupAddress,
    allocations: &mut Allocations,
) -> Result<Prepared<L1Operation>, SettlementError> {
    let routing = DepositRoutingInfo::decode(request.routing_info.as_bytes())?;
    let ticket = allocations.take(&request.ticket, request.amount)?;
    let intent = TransferIntent::deposit(&ticket, rollup, &routing);
    Ok(Prepared {
        ticket_hash: intent.ticket_hash()?,
        source: intent.source.clone(),
        destination: Address::from(routing.receiver),
        amount: intent.amount,
        routing_info: request.routing_info.clone(),
        operation: L1Operation::Transfer(intent),
    })
}

fn prepare_withdrawal(
    request: &WithdrawalRequest,
    allocations: &mut Allocations,
) -> Result<Prepared<L2Operation>, SettlementError> {
    let routing = WithdrawalRoutingInfo::decode(request.routing_info.as_bytes())?;
    let destination = Address::from(&routing.receiver);
    let ticket = allocations.take(&request.ticket, request.amount)?;
    let intent = WithdrawalIntent {
        sender: request.sender.to_l2()?,
        ticket_owner: ticket.owner.to_l2()?,
        routing_info: routing,
        amount: ticket.amount,
        ticket: ticket.ticket,
    };
    Ok(Prepared {
        operation: L2Operation::from_withdrawal(&intent)?,
        source: request.sender.clone(),
        destination,
        ticket_hash: intent.ticket_hash()?,
        amount: intent.amount,
        routing_info: request.routing_info.clone(),
    })
}

/// Deposits tickets into the rollup, in one L1 operation.
pub async fn submit_deposits<C, S>(
    l1: &C,
    store: &S,
    rollup: &SmartRollupAddress,
    requests: &[DepositRequest],
    retry_config: &RetryConfig,
) -> Result<Vec<Transfer>, SettlementError>
where
    C: LedgerClient<Operation = L1Operation> + ?Sized,
    S: TransferStore + ?Sized,
{
    let mut allocations = Allocations::default();
    let prepared = requests
        .iter()
        .map(|request| prepare_deposit(request, rollup, &mut allocations))
        .collect::<Result<Vec<_>, _>>()?;
    submit(l1, store, TransferKind::Deposit, prepared, retry_config).await
}

/// Withdraws tickets from the rollup, in one L2 transaction.
pub async fn submit_withdrawals<C, S>(
    l2: &C,
    store: &S,
    requests: &[WithdrawalRequest],
    retry_config: &RetryConfig,
) -> Result<Vec<Transfer>, SettlementError>
where
    C: LedgerClient<Operation = L2Operation> + ?Sized,
    S: TransferStore + ?Sized,
{
    let mut allocations = Allocations::default();
    let prepared = requests
        .iter()
        .map(|request| prepare_withdrawal(request, &mut allocations))
        .collect::<Result<Vec<_>, _>>()?;
    submit(l2, store, TransferKind::Withdrawal, prepared, retry_config).await
}

async fn submit<C, S>(
    ledger: &C,
    store: &S,
    kind: TransferKind,
    prepared: Vec<Prepared<C::Operation>>,
    retry_config: &RetryConfig,
) -> Result<Vec<Transfer>, SettlementError>
where
    C: LedgerClient + ?Sized,
    S: TransferStore + ?Sized,
{
    if prepared.is_empty() {
        return Ok(Vec::new());
    }

    let operations = prepared.iter().map(|p| p.operation.clone()).collect();
    let receipt = ledger.submit_batch(operations).await?;
    check_receipt(&receipt, prepared.len())?;

    let mut transfers: Vec<Transfer> = prepared
        .into_iter()
        .zip(&receipt.keys)
        .map(|(p, key)| {
            Transfer::created(
                kind,
                receipt.hash.clone(),
                *key,
                p.source,
                p.destination,
                p.ticket_hash,
                p.amount,
                p.routing_info,
            )
        })
        .collect();
    store.put_all(&transfers)?;
    info!("Injected {} {}(s) in {}", transfers.len(), kind, receipt.hash);

    let confirmation = wait_confirmation(ledger, &receipt, retry_config).await?;
    if let ConfirmationStatus::Failed(reason) = confirmation.status {
        error!("{} batch {} failed: {}", kind, receipt.hash, reason);
        for transfer in transfers.iter_mut() {
            transfer.fail(FailureReason::ExecutionFailed)?;
        }
        store.put_all(&transfers)?;
        return Err(LedgerError::Rejected(reason).into());
    }

    info!(
        "{} batch {} included at level {}",
        kind, receipt.hash, confirmation.level
    );
    Ok(transfers)
}

fn check_receipt(receipt: &OperationReceipt, expected: usize) -> Result<(), SettlementError> {
    if receipt.keys.len() != expected {
        return Err(SettlementError::invariant(format!(
            "operation {} has {} ordering keys for {} sub-operations",
            receipt.hash,
            receipt.keys.len(),
            expected
        )));
    }
    if receipt.keys.windows(2).any(|keys| keys[0] >= keys[1]) {
        return Err(SettlementError::invariant(format!(
            "ordering keys of operation {} are not strictly increasing",
            receipt.hash
        )));
    }
    Ok(())
}
