// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Polling tracker.
//!
//! Iterates the durable work-list and moves every unfinished transfer one
//! state forward when the ledgers allow it. Transfers that came from the
//! same operation are handled together, since only their ordering keys
//! tell which counterpart event belongs to which of them.

use std::collections::BTreeMap;

use fa_bridge_types::DepositRoutingInfo;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::classify::{classify_deposit, read_proxy_state, ProxyState};
use crate::config::{
    ConfigProvider, RetryConfig, RollupConfig, TrackerConfig, RETRY_CONFIG, ROLLUP_CONFIG,
    TRACKER_CONFIG,
};
use crate::error::SettlementError;
use crate::indexer::{BridgeRecord, IndexerQuery, L2TransactionRecord};
use crate::ledger::{
    wait_confirmation, wait_level, ConfirmationStatus, L1Operation, LedgerClient,
    OperationHash, OperationReceipt,
};
use crate::outbox::{is_cemented, wait_for_proof, RollupNode};
use crate::reconcile::{check_batch, match_batch};
use crate::retry::retry;
use crate::store::TransferStore;
use crate::transfer::{FailureReason, Transfer, TransferKind, TransferStatus};

pub struct Tracker<C, R, I, S> {
    l1: C,
    rollup: R,
    indexer: I,
    store: S,
    retry_config: RetryConfig,
    rollup_config: RollupConfig,
    config: TrackerConfig,
}

impl<C, R, I, S> Tracker<C, R, I, S>
where
    C: LedgerClient<Operation = L1Operation>,
    R: RollupNode,
    I: IndexerQuery,
    S: TransferStore,
{
    pub fn new(
        l1: C,
        rollup: R,
        indexer: I,
        store: S,
        retry_config: RetryConfig,
        rollup_config: RollupConfig,
        config: TrackerConfig,
    ) -> Self {
        Self {
            l1,
            rollup,
            indexer,
            store,
            retry_config,
            rollup_config,
            config,
        }
    }

    pub fn with_config(
        l1: C,
        rollup: R,
        indexer: I,
        store: S,
        config_provider: &impl ConfigProvider,
    ) -> Result<Self, SettlementError> {
        Ok(Self::new(
            l1,
            rollup,
            indexer,
            store,
            config_provider.get_config(RETRY_CONFIG)?,
            config_provider.get_config(ROLLUP_CONFIG)?,
            config_provider.get_config(TRACKER_CONFIG)?,
        ))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// One pass over the work-list, returns the number of transitions made.
    ///
    /// Transient failures leave the affected batch for the next pass, an
    /// invariant violation stops the pass.
    pub async fn step(&self) -> Result<usize, SettlementError> {
        let mut batches: BTreeMap<OperationHash, Vec<Transfer>> = BTreeMap::new();
        for transfer in self.store.load_all()? {
            batches
                .entry(transfer.operation_hash.clone())
                .or_default()
                .push(transfer);
        }

        let mut transitions = 0;
        for (hash, batch) in batches {
            if batch.iter().all(Transfer::is_completed) {
                continue;
            }
            let advanced = match batch[0].kind {
                TransferKind::Deposit => self.advance_deposits(&hash, batch).await,
                TransferKind::Withdrawal => self.advance_withdrawals(&hash, batch).await,
            };
            match advanced {
                Ok(count) => transitions += count,
                Err(err @ SettlementError::DeadlineExceeded { .. }) => {
                    warn!("Skipping operation {} until next pass: {}", hash, err)
                }
                Err(err) if err.is_transient() => {
                    warn!("Skipping operation {} until next pass: {}", hash, err)
                }
                Err(err) => return Err(err),
            }
        }
        Ok(transitions)
    }

    async fn records(&self, hash: &OperationHash) -> Result<Vec<BridgeRecord>, SettlementError> {
        retry(&self.retry_config, "indexed records", || async {
            self.indexer
                .by_operation_hash(hash)
                .await
                .map_err(SettlementError::from)
        })
        .await
    }

    async fn advance_deposits(
        &self,
        hash: &OperationHash,
        mut batch: Vec<Transfer>,
    ) -> Result<usize, SettlementError> {
        let records = self.records(hash).await?;
        if records.is_empty() {
            debug!("Deposit operation {} is not indexed yet", hash);
            return Ok(0);
        }
        let pairs = check_batch(hash, batch.len(), &records)?;
        let l1_records: Vec<_> = pairs.iter().map(|(l1, _)| l1.clone()).collect();
        // every indexed sub-operation is one of ours, at the key it was submitted with
        match_batch(&batch, &l1_records)?;

        let mut transitions = 0;
        for (l1, event) in pairs {
            let Some(event) = event else { continue };
            let key = l1.ordering_key();
            let transfer = batch
                .iter_mut()
                .find(|transfer| transfer.batch_key == key)
                .ok_or_else(|| {
                    SettlementError::invariant(format!(
                        "deposit {} has no sub-operation {}",
                        hash, key
                    ))
                })?;
            if transfer.is_completed() {
                continue;
            }
            self.settle_deposit(transfer, &event).await?;
            self.store.put(transfer)?;
            transitions += 1;
        }
        Ok(transitions)
    }

    async fn settle_deposit(
        &self,
        transfer: &mut Transfer,
        event: &L2TransactionRecord,
    ) -> Result<(), SettlementError> {
        let routing = DepositRoutingInfo::decode(transfer.routing_info.as_bytes())?;
        let proxy = match routing.proxy {
            Some(proxy) if event.ticket_owner.to_l2()? != proxy => {
                read_proxy_state(&self.rollup, &proxy, &self.config).await?
            }
            _ => ProxyState::default(),
        };
        match classify_deposit(&routing, event, &proxy)? {
            TransferStatus::Failed(reason) => {
                transfer.fail(reason)?;
                transfer.l2_operation_hash = Some(event.transaction_hash.clone());
                Ok(())
            }
            _ => transfer.complete_deposit(event.transaction_hash.clone()),
        }
    }

    async fn advance_withdrawals(
        &self,
        hash: &OperationHash,
        mut batch: Vec<Transfer>,
    ) -> Result<usize, SettlementError> {
        batch.sort_by_key(|transfer| transfer.batch_key);

        let mut transitions = 0;
        if batch
            .iter()
            .any(|transfer| transfer.status == TransferStatus::Created)
        {
            transitions += self.observe_withdrawals(hash, &mut batch).await?;
        }

        for transfer in batch.iter_mut() {
            let before = transfer.status;
            match before {
                // handled by observe_withdrawals
                TransferStatus::Created => continue,
                TransferStatus::PendingCommitment => self.check_cemented(transfer).await?,
                TransferStatus::PendingProof => self.fetch_proof(transfer).await?,
                TransferStatus::Executable => self.execute(transfer).await?,
                TransferStatus::Completed | TransferStatus::Failed(_) => continue,
            }
            if transfer.status != before {
                self.store.put(transfer)?;
                transitions += 1;
            }
        }
        Ok(transitions)
    }

    async fn observe_withdrawals(
        &self,
        hash: &OperationHash,
        batch: &mut [Transfer],
    ) -> Result<usize, SettlementError> {
        let events: Vec<L2TransactionRecord> = self
            .records(hash)
            .await?
            .into_iter()
            .filter_map(|record| record.l2_transaction)
            .filter(|event| event.outbox_message.is_some())
            .collect();
        if events.is_empty() {
            debug!("Withdrawal {} has not reached the outbox yet", hash);
            return Ok(0);
        }

        let observed: Vec<_> = match_batch(batch, &events)?
            .into_iter()
            .map(|(transfer, event)| (transfer.id(), event.outbox_message))
            .collect();
        let mut updated = Vec::new();
        for (id, message) in observed {
            let Some(message) = message else { continue };
            if let Some(transfer) = batch.iter_mut().find(|transfer| transfer.id() == id) {
                if transfer.status == TransferStatus::Created {
                    transfer.observe_withdrawal(message)?;
                    updated.push(transfer.clone());
                }
            }
        }
        self.store.put_all(&updated)?;
        Ok(updated.len())
    }

    async fn check_cemented(&self, transfer: &mut Transfer) -> Result<(), SettlementError> {
        let message = outbox_message(transfer)?;
        let level = wait_level(&self.l1, &self.retry_config).await?;
        if is_cemented(
            message.level,
            level,
            self.rollup_config.commitment_period,
            self.rollup_config.challenge_window,
        ) {
            transfer.mark_cemented()?;
        }
        Ok(())
    }

    async fn fetch_proof(&self, transfer: &mut Transfer) -> Result<(), SettlementError> {
        let message = outbox_message(transfer)?;
        let proof = wait_for_proof(
            &self.rollup,
            &self.l1,
            message,
            &self.rollup_config,
            &self.retry_config,
        )
        .await?;
        transfer.attach_proof(proof)
    }

    async fn execute(&self, transfer: &mut Transfer) -> Result<(), SettlementError> {
        let receipt = match &transfer.settlement_operation_hash {
            // submitted before a restart, only wait for it
            Some(hash) => OperationReceipt {
                hash: hash.clone(),
                keys: Vec::new(),
            },
            None => {
                let (Some(commitment), Some(proof)) =
                    (transfer.related_commitment.clone(), transfer.proof.clone())
                else {
                    return Err(SettlementError::invariant(format!(
                        "executable transfer {} has no proof",
                        transfer.id()
                    )));
                };
                let receipt = self
                    .l1
                    .submit(L1Operation::ExecuteOutbox {
                        rollup: self.rollup.address(),
                        commitment,
                        proof,
                    })
                    .await?;
                info!(
                    "Executing outbox message of {} in {}",
                    transfer.id(),
                    receipt.hash
                );
                transfer.settlement_operation_hash = Some(receipt.hash.clone());
                self.store.put(transfer)?;
                receipt
            }
        };

        let confirmation = wait_confirmation(&self.l1, &receipt, &self.retry_config).await?;
        match confirmation.status {
            ConfirmationStatus::Applied => transfer.complete_withdrawal(receipt.hash),
            ConfirmationStatus::Failed(reason) => {
                warn!(
                    "Outbox execution {} of {} failed: {}",
                    receipt.hash,
                    transfer.id(),
                    reason
                );
                transfer.fail(FailureReason::ExecutionFailed)
            }
        }
    }
}

fn outbox_message(
    transfer: &Transfer,
) -> Result<crate::outbox::OutboxMessageRef, SettlementError> {
    transfer.outbox_message.ok_or_else(|| {
        SettlementError::invariant(format!(
            "withdrawal {} is {} without an outbox message",
            transfer.id(),
            transfer.status
        ))
    })
}

/// Drives a [Tracker] until shutdown.
pub struct TrackerRunner<C, R, I, S> {
    tracker: Tracker<C, R, I, S>,
    rx_shutdown: broadcast::Receiver<()>,
}

impl<C, R, I, S> TrackerRunner<C, R, I, S>
where
    C: LedgerClient<Operation = L1Operation>,
    R: RollupNode,
    I: IndexerQuery,
    S: TransferStore,
{
    pub fn new(tracker: Tracker<C, R, I, S>, rx_shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            tracker,
            rx_shutdown,
        }
    }

    pub fn tracker(&self) -> &Tracker<C, R, I, S> {
        &self.tracker
    }

    async fn run_inner(&mut self) -> Result<(), SettlementError> {
        info!("Starting transfer tracker");
        loop {
            tokio::select! {
                result = self.tracker.step() => {
                    let transitions = result?;
                    debug!("Tracker pass made {} transitions", transitions);
                },
                _ = self.rx_shutdown.recv() => {
                    return Ok(())
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.tracker.config.poll_interval) => {},
                _ = self.rx_shutdown.recv() => {
                    return Ok(())
                }
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), ()> {
        match self.run_inner().await {
            Err(err) => {
                error!("Transfer tracker failed with {}", err);
                Err(())
            }
            Ok(()) => {
                info!("Transfer tracker terminated");
                Ok(())
            }
        }
    }
}
