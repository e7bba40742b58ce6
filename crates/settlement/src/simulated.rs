// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Simulated bridge.
//!
//! Both ledgers, the rollup node and the indexer share one in-memory world,
//! so that an operation submitted on one side shows up on the other. The
//! rollup processes deposits as soon as they are included, and withdrawals
//! leave an outbox message at the current L1 level.
//!
//! Every collaborator call is counted, see [Simulation::remote_calls].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fa_bridge_types::intent::FA_BRIDGE_PRECOMPILE_ADDRESS;
use fa_bridge_types::{
    Address, AssetKey, DepositRoutingInfo, HexString, L1Address, L2Address, SmartRollupAddress,
    TicketHash, TicketRef, TransferIntent, WithdrawalIntent,
};
use primitive_types::{H160, U256};
use tezos_smart_rollup_host::path::OwnedPath;

use crate::config::RollupConfig;
use crate::durable::{
    code_path, decode_u256_le, encode_u256_le, slot_index, storage_path, ticket_balance_path,
};
use crate::indexer::{BridgeRecord, IndexerQuery, L1TransactionRecord, L2TransactionRecord};
use crate::ledger::{
    BatchOrderingKey, Confirmation, ConfirmationStatus, L1Operation, L2Operation, LedgerClient,
    LedgerError, OperationHash, OperationReceipt,
};
use crate::outbox::{
    is_cemented, CommitmentHash, OutboxMessage, OutboxMessageRef, OutboxProof, RollupNode,
};
use crate::transfer::TransferKind;

/// Storage slot where simulated proxies keep the ticket hash they are bound to.
pub const PROXY_TICKET_HASH_SLOT: u64 = 0;

const ROLLUP_ADDRESS: &str = "sr1Ghq66tYK9y3r8CC1Tf8i8m5nxh8nTvZEf";
const PROXY_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Proxy {
    accepts: bool,
}

#[derive(Debug, Clone)]
struct IndexedRecord {
    origin: OperationHash,
    record: BridgeRecord,
    /// L1 level from which the L2 side is visible
    l2_visible_from: u32,
}

#[derive(Debug, Clone)]
struct PendingWithdrawal {
    record: usize,
    receiver: L1Address,
    ticket: TicketRef,
    amount: U256,
}

#[derive(Debug, Clone)]
struct World {
    rollup_config: RollupConfig,
    rollup: SmartRollupAddress,
    l1_level: u32,
    l2_level: u32,
    l1_counter: u64,
    l2_transaction_index: u64,
    operations: u64,
    remote_calls: usize,
    indexer_lag: u32,
    l1_tickets: BTreeMap<(Address, TicketHash), U256>,
    durable: BTreeMap<OwnedPath, Vec<u8>>,
    proxies: BTreeMap<L2Address, Proxy>,
    confirmations: BTreeMap<OperationHash, Confirmation>,
    records: Vec<IndexedRecord>,
    outbox: BTreeMap<u32, Vec<OutboxMessage>>,
    withdrawals: BTreeMap<OutboxMessageRef, PendingWithdrawal>,
    executed: BTreeSet<OutboxMessageRef>,
}

fn rejected(reason: impl ToString) -> LedgerError {
    LedgerError::Rejected(reason.to_string())
}

impl World {
    fn new(rollup_config: RollupConfig, rollup: SmartRollupAddress) -> Self {
        Self {
            rollup_config,
            rollup,
            l1_level: 0,
            l2_level: 0,
            l1_counter: 0,
            l2_transaction_index: 0,
            operations: 0,
            remote_calls: 0,
            indexer_lag: 0,
            l1_tickets: BTreeMap::new(),
            durable: BTreeMap::new(),
            proxies: BTreeMap::new(),
            confirmations: BTreeMap::new(),
            records: Vec::new(),
            outbox: BTreeMap::new(),
            withdrawals: BTreeMap::new(),
            executed: BTreeSet::new(),
        }
    }

    fn next_operation(&mut self) -> u64 {
        self.operations += 1;
        self.operations
    }

    fn commitment_for(&self, level: u32) -> CommitmentHash {
        let period = self.rollup_config.commitment_period.max(1);
        let inbox_level = (level / period + 1) * period;
        CommitmentHash(format!("src1{:050}", inbox_level))
    }

    fn proof_for(&self, message: &OutboxMessage) -> HexString {
        let mut proof = Vec::with_capacity(8 + message.payload.len());
        proof.extend_from_slice(&message.level.to_be_bytes());
        proof.extend_from_slice(&message.index.to_be_bytes());
        proof.extend_from_slice(message.payload.as_bytes());
        HexString(proof)
    }

    fn message(&self, message: OutboxMessageRef) -> Option<&OutboxMessage> {
        self.outbox
            .get(&message.level)
            .and_then(|messages| messages.get(message.index as usize))
    }

    fn push_outbox_message(&mut self, payload: Vec<u8>) -> OutboxMessageRef {
        let level = self.l1_level;
        let messages = self.outbox.entry(level).or_default();
        let index = messages.len() as u32;
        messages.push(OutboxMessage {
            level,
            index,
            payload: HexString(payload),
        });
        OutboxMessageRef { level, index }
    }

    fn l1_debit(
        &mut self,
        owner: &Address,
        ticket: TicketHash,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let balance = self
            .l1_tickets
            .entry((owner.clone(), ticket))
            .or_default();
        *balance = balance
            .checked_sub(amount)
            .ok_or_else(|| rejected(format!("{} has not enough tickets", owner)))?;
        Ok(())
    }

    fn l1_credit(&mut self, owner: &Address, ticket: TicketHash, amount: U256) {
        *self.l1_tickets.entry((owner.clone(), ticket)).or_default() += amount;
    }

    fn l2_balance(&self, ticket: &TicketHash, owner: &L2Address) -> Result<U256, LedgerError> {
        let path = ticket_balance_path(ticket, &owner.0).map_err(rejected)?;
        Ok(decode_u256_le(self.durable.get(&path).map(Vec::as_slice)))
    }

    fn l2_set_balance(
        &mut self,
        ticket: &TicketHash,
        owner: &L2Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let path = ticket_balance_path(ticket, &owner.0).map_err(rejected)?;
        self.durable.insert(path, encode_u256_le(&amount).to_vec());
        Ok(())
    }

    fn apply_l1(
        &mut self,
        hash: &OperationHash,
        operation: &L1Operation,
        key: BatchOrderingKey,
    ) -> Result<(), LedgerError> {
        match operation {
            L1Operation::Transfer(intent) => self.apply_ticket_transfer(hash, intent, key),
            L1Operation::Call(_) => Ok(()),
            L1Operation::ExecuteOutbox {
                rollup,
                commitment,
                proof,
            } => self.apply_execute_outbox(hash, rollup, commitment, proof, key),
        }
    }

    fn apply_ticket_transfer(
        &mut self,
        hash: &OperationHash,
        intent: &TransferIntent,
        key: BatchOrderingKey,
    ) -> Result<(), LedgerError> {
        let ticket_hash = intent.ticket_hash().map_err(rejected)?;
        self.l1_debit(&intent.source, ticket_hash, intent.amount)?;

        if intent.destination != Address::from(&self.rollup) {
            self.l1_credit(&intent.destination, ticket_hash, intent.amount);
            return Ok(());
        }

        let raw_routing = intent
            .routing_info
            .as_ref()
            .ok_or_else(|| rejected("deposit without routing info"))?;
        let routing = DepositRoutingInfo::decode(raw_routing.as_bytes()).map_err(rejected)?;
        let BatchOrderingKey::L1 { counter, nonce } = key else {
            return Err(rejected("L2 key for an L1 operation"));
        };

        // the rollup processes the deposit right away
        let owner = match routing.proxy {
            Some(proxy) if self.proxy_accepts(&proxy, &ticket_hash)? => proxy,
            _ => routing.receiver,
        };
        let balance = self.l2_balance(&ticket_hash, &owner)?;
        let credited = balance
            .checked_add(intent.amount)
            .ok_or_else(|| rejected("ticket table overflow"))?;
        self.l2_set_balance(&ticket_hash, &owner, credited)?;

        self.l2_level += 1;
        self.l2_transaction_index += 1;
        let l2_hash = OperationHash(format!("0x{:064x}", self.next_operation()));
        let l1_record = L1TransactionRecord {
            operation_hash: hash.clone(),
            counter,
            nonce,
            amount: intent.amount,
            ticket_hash,
            l1_account: intent.source.clone(),
            l2_account: Address::from(routing.receiver),
            level: self.l1_level,
        };
        let l2_record = L2TransactionRecord {
            transaction_hash: l2_hash,
            transaction_index: self.l2_transaction_index,
            log_index: 0,
            amount: intent.amount,
            ticket_hash,
            l1_account: intent.source.clone(),
            l2_account: Address::from(routing.receiver),
            ticket_owner: Address::from(owner),
            level: self.l2_level,
            outbox_message: None,
        };
        self.records.push(IndexedRecord {
            origin: hash.clone(),
            record: BridgeRecord {
                kind: TransferKind::Deposit,
                l1_transaction: Some(l1_record),
                l2_transaction: Some(l2_record),
            },
            l2_visible_from: self.l1_level.saturating_add(self.indexer_lag),
        });
        Ok(())
    }

    fn proxy_accepts(
        &self,
        proxy: &L2Address,
        ticket_hash: &TicketHash,
    ) -> Result<bool, LedgerError> {
        let Some(contract) = self.proxies.get(proxy) else {
            return Ok(false);
        };
        let slot =
            storage_path(&proxy.0, &slot_index(PROXY_TICKET_HASH_SLOT)).map_err(rejected)?;
        let bound = self
            .durable
            .get(&slot)
            .map(|word| word.as_slice() == ticket_hash.0.as_bytes())
            .unwrap_or(true);
        Ok(contract.accepts && bound)
    }

    fn apply_execute_outbox(
        &mut self,
        hash: &OperationHash,
        rollup: &SmartRollupAddress,
        commitment: &CommitmentHash,
        proof: &HexString,
        key: BatchOrderingKey,
    ) -> Result<(), LedgerError> {
        if *rollup != self.rollup {
            return Err(rejected(format!("unknown rollup {}", rollup)));
        }
        let bytes = proof.as_bytes();
        if bytes.len() < 8 {
            return Err(rejected("invalid output proof"));
        }
        let message = OutboxMessageRef {
            level: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            index: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        };
        let expected = self
            .message(message)
            .map(|stored| self.proof_for(stored))
            .ok_or_else(|| rejected("invalid output proof"))?;
        if &expected != proof || *commitment != self.commitment_for(message.level) {
            return Err(rejected("invalid output proof"));
        }
        if !self.is_cemented(message.level) {
            return Err(rejected("commitment is not cemented"));
        }
        if !self.executed.insert(message) {
            return Err(rejected("outbox message already executed"));
        }

        let withdrawal = self
            .withdrawals
            .get(&message)
            .cloned()
            .ok_or_else(|| rejected("outbox message is not a withdrawal"))?;
        let ticket_hash = withdrawal.ticket.ticket_hash().map_err(rejected)?;
        // the router forwards the ticket to the receiver
        let receiver = Address::from(&withdrawal.receiver);
        self.l1_credit(&receiver, ticket_hash, withdrawal.amount);

        let BatchOrderingKey::L1 { counter, nonce } = key else {
            return Err(rejected("L2 key for an L1 operation"));
        };
        let level = self.l1_level;
        let indexed = self
            .records
            .get_mut(withdrawal.record)
            .ok_or_else(|| rejected("unknown withdrawal record"))?;
        let l2_account = indexed
            .record
            .l2_transaction
            .as_ref()
            .map(|l2| l2.l2_account.clone())
            .ok_or_else(|| rejected("withdrawal record without L2 side"))?;
        indexed.record.l1_transaction = Some(L1TransactionRecord {
            operation_hash: hash.clone(),
            counter,
            nonce,
            amount: withdrawal.amount,
            ticket_hash,
            l1_account: receiver,
            l2_account,
            level,
        });
        Ok(())
    }

    fn apply_withdrawal(
        &mut self,
        hash: &OperationHash,
        operation: &L2Operation,
        log_index: u64,
    ) -> Result<(), LedgerError> {
        if operation.to.0 != FA_BRIDGE_PRECOMPILE_ADDRESS {
            return Err(rejected("only FA bridge withdrawals are simulated on L2"));
        }
        let intent = WithdrawalIntent::try_parse(operation.data.as_bytes(), operation.from)
            .map_err(rejected)?;
        let ticket_hash = intent.ticket_hash().map_err(rejected)?;
        let balance = self.l2_balance(&ticket_hash, &intent.ticket_owner)?;
        let rest = balance
            .checked_sub(intent.amount)
            .ok_or_else(|| rejected("not enough tickets in the ticket table"))?;
        self.l2_set_balance(&ticket_hash, &intent.ticket_owner, rest)?;

        let mut payload = intent.routing_info.encode().map_err(rejected)?.to_vec();
        payload.extend_from_slice(&encode_u256_le(&intent.amount));
        let message = self.push_outbox_message(payload);

        let record = L2TransactionRecord {
            transaction_hash: hash.clone(),
            transaction_index: self.l2_transaction_index,
            log_index,
            amount: intent.amount,
            ticket_hash,
            l1_account: Address::from(&intent.routing_info.receiver),
            l2_account: Address::from(intent.sender),
            ticket_owner: Address::from(intent.ticket_owner),
            level: self.l2_level,
            outbox_message: Some(message),
        };
        self.withdrawals.insert(
            message,
            PendingWithdrawal {
                record: self.records.len(),
                receiver: intent.routing_info.receiver,
                ticket: intent.ticket,
                amount: intent.amount,
            },
        );
        self.records.push(IndexedRecord {
            origin: hash.clone(),
            record: BridgeRecord {
                kind: TransferKind::Withdrawal,
                l1_transaction: None,
                l2_transaction: Some(record),
            },
            l2_visible_from: self.l1_level.saturating_add(self.indexer_lag),
        });
        Ok(())
    }

    fn is_cemented(&self, level: u32) -> bool {
        is_cemented(
            level,
            self.l1_level,
            self.rollup_config.commitment_period,
            self.rollup_config.challenge_window,
        )
    }

    fn confirm(&mut self, hash: &OperationHash, level: u32, result: Result<(), LedgerError>) {
        let status = match result {
            Ok(()) => ConfirmationStatus::Applied,
            Err(err) => ConfirmationStatus::Failed(err.to_string()),
        };
        self.confirmations.insert(
            hash.clone(),
            Confirmation {
                hash: hash.clone(),
                level,
                status,
            },
        );
    }

    fn visible(&self, indexed: &IndexedRecord) -> BridgeRecord {
        let mut record = indexed.record.clone();
        if self.l1_level < indexed.l2_visible_from {
            record.l2_transaction = None;
        }
        record
    }

    fn query(&self, filter: impl Fn(&IndexedRecord) -> bool) -> Vec<BridgeRecord> {
        self.records
            .iter()
            .filter(|indexed| filter(indexed))
            .map(|indexed| self.visible(indexed))
            .filter(|record| record.l1_transaction.is_some() || record.l2_transaction.is_some())
            .collect()
    }
}

/// Shared handle on the simulated world.
#[derive(Debug, Clone)]
pub struct Simulation {
    world: Arc<Mutex<World>>,
}

impl Simulation {
    pub fn new(rollup_config: RollupConfig) -> Self {
        let rollup = ROLLUP_ADDRESS
            .parse()
            .expect("simulated rollup address is valid b58check");
        Self {
            world: Arc::new(Mutex::new(World::new(rollup_config, rollup))),
        }
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn l1(&self) -> SimulatedL1 {
        SimulatedL1 { sim: self.clone() }
    }

    pub fn l2(&self) -> SimulatedL2 {
        SimulatedL2 { sim: self.clone() }
    }

    pub fn rollup(&self) -> SimulatedRollup {
        SimulatedRollup { sim: self.clone() }
    }

    pub fn indexer(&self) -> SimulatedIndexer {
        SimulatedIndexer { sim: self.clone() }
    }

    pub fn rollup_address(&self) -> SmartRollupAddress {
        self.world().rollup.clone()
    }

    /// Number of collaborator calls made so far.
    pub fn remote_calls(&self) -> usize {
        self.world().remote_calls
    }

    pub fn l1_level(&self) -> u32 {
        self.world().l1_level
    }

    /// Advances L1 by `blocks` levels.
    pub fn bake(&self, blocks: u32) {
        let mut world = self.world();
        world.l1_level = world.l1_level.saturating_add(blocks);
    }

    /// L2 counterparts become visible `levels` L1 blocks after they happen.
    pub fn set_indexer_lag(&self, levels: u32) {
        self.world().indexer_lag = levels;
    }

    pub fn mint_tickets(&self, owner: &Address, ticket: &TicketRef, amount: U256) {
        if let Ok(hash) = ticket.ticket_hash() {
            self.world().l1_credit(owner, hash, amount);
        }
    }

    pub fn l1_balance(&self, owner: &Address, ticket: &TicketRef) -> U256 {
        let world = self.world();
        ticket
            .ticket_hash()
            .ok()
            .and_then(|hash| world.l1_tickets.get(&(owner.clone(), hash)).copied())
            .unwrap_or_default()
    }

    pub fn l2_balance(&self, owner: &L2Address, ticket: &TicketRef) -> U256 {
        let world = self.world();
        ticket
            .ticket_hash()
            .ok()
            .and_then(|hash| world.l2_balance(&hash, owner).ok())
            .unwrap_or_default()
    }

    /// Deploys an ERC wrapper, optionally bound to a ticket.
    pub fn deploy_proxy(&self, address: L2Address, bound_to: Option<TicketHash>, accepts: bool) {
        let mut world = self.world();
        if let Ok(code) = code_path(&address.0) {
            world.durable.insert(code, PROXY_CODE.to_vec());
        }
        let slot = storage_path(&address.0, &slot_index(PROXY_TICKET_HASH_SLOT));
        if let (Some(bound_to), Ok(slot)) = (bound_to, slot) {
            world.durable.insert(slot, bound_to.0.as_bytes().to_vec());
        }
        world.proxies.insert(address, Proxy { accepts });
    }

    pub fn push_outbox_message(&self, payload: Vec<u8>) -> OutboxMessageRef {
        self.world().push_outbox_message(payload)
    }

    pub fn is_executed(&self, message: OutboxMessageRef) -> bool {
        self.world().executed.contains(&message)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedL1 {
    sim: Simulation,
}

#[async_trait]
impl LedgerClient for SimulatedL1 {
    type Operation = L1Operation;

    async fn submit_batch(
        &self,
        operations: Vec<L1Operation>,
    ) -> Result<OperationReceipt, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        if operations.is_empty() {
            return Err(rejected("empty batch"));
        }

        world.l1_level += 1;
        let level = world.l1_level;
        let hash = OperationHash(format!("op{:049}", world.next_operation()));
        let keys: Vec<_> = (1..=operations.len() as u64)
            .map(|i| BatchOrderingKey::L1 {
                counter: world.l1_counter + i,
                nonce: 0,
            })
            .collect();
        world.l1_counter += operations.len() as u64;

        // all or nothing
        let mut next = world.clone();
        let result = operations
            .iter()
            .zip(&keys)
            .try_for_each(|(operation, key)| next.apply_l1(&hash, operation, *key));
        if result.is_ok() {
            *world = next;
        }
        world.confirm(&hash, level, result);
        Ok(OperationReceipt { hash, keys })
    }

    async fn wait(&self, receipt: &OperationReceipt) -> Result<Confirmation, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        world
            .confirmations
            .get(&receipt.hash)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(receipt.hash.to_string()))
    }

    async fn query_balance(&self, owner: &Address, asset: &AssetKey) -> Result<U256, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        match asset {
            AssetKey::Ticket(ticket) => {
                let hash = ticket.ticket_hash().map_err(rejected)?;
                Ok(world
                    .l1_tickets
                    .get(&(owner.clone(), hash))
                    .copied()
                    .unwrap_or_default())
            }
            AssetKey::Token(_) | AssetKey::Erc20(_) => Err(rejected("unsupported asset")),
        }
    }

    async fn current_level(&self) -> Result<u32, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        Ok(world.l1_level)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedL2 {
    sim: Simulation,
}

#[async_trait]
impl LedgerClient for SimulatedL2 {
    type Operation = L2Operation;

    async fn submit_batch(
        &self,
        operations: Vec<L2Operation>,
    ) -> Result<OperationReceipt, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        if operations.is_empty() {
            return Err(rejected("empty batch"));
        }

        world.l2_level += 1;
        world.l2_transaction_index += 1;
        let level = world.l2_level;
        let hash = OperationHash(format!("0x{:064x}", world.next_operation()));
        let transaction_index = world.l2_transaction_index;
        let keys: Vec<_> = (0..operations.len() as u64)
            .map(|log_index| BatchOrderingKey::L2 {
                transaction_index,
                log_index,
            })
            .collect();

        let mut next = world.clone();
        let result = operations
            .iter()
            .zip(0u64..)
            .try_for_each(|(operation, log_index)| {
                next.apply_withdrawal(&hash, operation, log_index)
            });
        if result.is_ok() {
            *world = next;
        }
        world.confirm(&hash, level, result);
        Ok(OperationReceipt { hash, keys })
    }

    async fn wait(&self, receipt: &OperationReceipt) -> Result<Confirmation, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        world
            .confirmations
            .get(&receipt.hash)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(receipt.hash.to_string()))
    }

    async fn query_balance(&self, owner: &Address, asset: &AssetKey) -> Result<U256, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        match asset {
            AssetKey::Ticket(ticket) => {
                let hash = ticket.ticket_hash().map_err(rejected)?;
                let owner = owner.to_l2().map_err(rejected)?;
                world.l2_balance(&hash, &owner)
            }
            AssetKey::Token(_) | AssetKey::Erc20(_) => Err(rejected("unsupported asset")),
        }
    }

    async fn current_level(&self) -> Result<u32, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        Ok(world.l2_level)
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedRollup {
    sim: Simulation,
}

#[async_trait]
impl RollupNode for SimulatedRollup {
    fn address(&self) -> SmartRollupAddress {
        self.sim.rollup_address()
    }

    async fn get_proof(
        &self,
        message: OutboxMessageRef,
    ) -> Result<Option<OutboxProof>, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        let stored = world
            .message(message)
            .cloned()
            .ok_or_else(|| rejected(format!("unknown outbox message {}", message)))?;
        if !world.is_cemented(message.level) {
            return Ok(None);
        }
        Ok(Some(OutboxProof {
            commitment: world.commitment_for(message.level),
            proof: world.proof_for(&stored),
        }))
    }

    async fn get_messages(&self, level: u32) -> Result<Vec<OutboxMessage>, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        Ok(world.outbox.get(&level).cloned().unwrap_or_default())
    }

    async fn durable_value(&self, path: &OwnedPath) -> Result<Option<Vec<u8>>, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        Ok(world.durable.get(path).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedIndexer {
    sim: Simulation,
}

#[async_trait]
impl IndexerQuery for SimulatedIndexer {
    async fn by_operation_hash(
        &self,
        hash: &OperationHash,
    ) -> Result<Vec<BridgeRecord>, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        Ok(world.query(|indexed| &indexed.origin == hash))
    }

    async fn by_ticket_hash(
        &self,
        ticket_hash: &TicketHash,
    ) -> Result<Vec<BridgeRecord>, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        Ok(world.query(|indexed| {
            let record = &indexed.record;
            record
                .l1_transaction
                .as_ref()
                .is_some_and(|l1| &l1.ticket_hash == ticket_hash)
                || record
                    .l2_transaction
                    .as_ref()
                    .is_some_and(|l2| &l2.ticket_hash == ticket_hash)
        }))
    }

    async fn by_account(&self, account: &Address) -> Result<Vec<BridgeRecord>, LedgerError> {
        let mut world = self.sim.world();
        world.remote_calls += 1;
        Ok(world.query(|indexed| {
            let record = &indexed.record;
            record
                .l1_transaction
                .as_ref()
                .is_some_and(|l1| &l1.l1_account == account || &l1.l2_account == account)
                || record
                    .l2_transaction
                    .as_ref()
                    .is_some_and(|l2| &l2.l1_account == account || &l2.l2_account == account)
        }))
    }
}

/// Account handy for tests.
pub fn l2_account(byte: u8) -> L2Address {
    L2Address(H160::repeat_byte(byte))
}
