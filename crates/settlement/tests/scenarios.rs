// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! End-to-end transfers against the simulated bridge.

use std::sync::Arc;
use std::time::Duration;

use fa_bridge_settlement::config::{
    DefaultConfigProvider, JsonConfigProvider, RetryConfig, RollupConfig, TrackerConfig,
};
use fa_bridge_settlement::durable::ticket_balance;
use fa_bridge_settlement::indexer::records_for;
use fa_bridge_settlement::ledger::{fetch_ticket, wait_confirmation, L1Operation};
use fa_bridge_settlement::outbox::get_proof;
use fa_bridge_settlement::reconcile::check_batch;
use fa_bridge_settlement::simulated::{
    l2_account, Simulation, SimulatedIndexer, SimulatedL1, SimulatedRollup,
    PROXY_TICKET_HASH_SLOT,
};
use fa_bridge_settlement::{
    submit_deposits, submit_withdrawals, DepositRequest, FailureReason, JsonFileStore,
    LedgerClient, MemoryStore, SettlementError, Tracker, TrackerRunner, TransferKind,
    TransferStatus, TransferStore, WithdrawalRequest,
};
use fa_bridge_types::{
    Address, DepositRoutingInfo, FaBridgeError, HexString, L1Address, L2Address, TicketContent,
    TicketHash, TicketRef, TicketSnapshot, WithdrawalRoutingInfo,
};
use pretty_assertions::assert_eq;
use primitive_types::{H256, U256};
use tokio::sync::broadcast;

fn rollup_config() -> RollupConfig {
    RollupConfig {
        commitment_period: 2,
        challenge_window: 3,
        block_time: Duration::from_millis(10),
    }
}

fn retry_config() -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(5),
        max_attempts: 5,
        ..Default::default()
    }
}

fn ticket() -> TicketRef {
    TicketRef::new(
        "KT1NgXQ6Mwu3XKFDcKdYFS6dkkY3iNKdBKEc".parse().unwrap(),
        TicketContent::raw(0.into(), None),
    )
    .unwrap()
}

fn alice() -> L1Address {
    "tz1Ke2h7sDdakHJQh8WX4Z372du1KChsksyU".parse().unwrap()
}

fn router() -> L1Address {
    "KT1X1M4ywyz9cHvUgBLTUUdz3GTiYJhPcyPh".parse().unwrap()
}

fn receiver() -> L2Address {
    l2_account(0x44)
}

fn snapshot(owner: impl Into<Address>, amount: u64) -> TicketSnapshot {
    TicketSnapshot {
        ticket: ticket(),
        owner: owner.into(),
        amount: amount.into(),
        level: 0,
    }
}

type SimTracker<S> = Tracker<SimulatedL1, SimulatedRollup, SimulatedIndexer, S>;

fn tracker<S: TransferStore>(sim: &Simulation, store: S, config: TrackerConfig) -> SimTracker<S> {
    Tracker::new(
        sim.l1(),
        sim.rollup(),
        sim.indexer(),
        store,
        retry_config(),
        rollup_config(),
        config,
    )
}

/// Funds `receiver` on L2 by depositing from alice, nothing is tracked.
async fn fund_l2(sim: &Simulation, receiver: L2Address, amount: u64) {
    sim.mint_tickets(&alice().into(), &ticket(), amount.into());
    submit_deposits(
        &sim.l1(),
        &MemoryStore::default(),
        &sim.rollup_address(),
        &[DepositRequest::new(
            snapshot(alice(), amount),
            amount.into(),
            &DepositRoutingInfo::new(receiver, None),
        )],
        &retry_config(),
    )
    .await
    .unwrap();
}

fn withdrawal(sender: L2Address, available: u64, amount: u64) -> WithdrawalRequest {
    WithdrawalRequest::new(
        sender.into(),
        snapshot(sender, available),
        amount.into(),
        &WithdrawalRoutingInfo::new(alice(), router()).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn single_deposit_is_reconciled() {
    let sim = Simulation::new(rollup_config());
    let store = Arc::new(MemoryStore::default());
    sim.mint_tickets(&alice().into(), &ticket(), 10.into());

    let transfers = submit_deposits(
        &sim.l1(),
        &store,
        &sim.rollup_address(),
        &[DepositRequest::new(
            snapshot(alice(), 10),
            7.into(),
            &DepositRoutingInfo::new(receiver(), None),
        )],
        &retry_config(),
    )
    .await
    .unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].status, TransferStatus::Created);
    assert_eq!(transfers[0].kind, TransferKind::Deposit);

    let hash = transfers[0].operation_hash.clone();
    let records = records_for(&sim.indexer(), &hash, &retry_config())
        .await
        .unwrap();
    let pairs = check_batch(&hash, 1, &records).unwrap();
    let (l1, l2) = &pairs[0];
    let l2 = l2.as_ref().unwrap();
    assert_eq!(l1.amount, U256::from(7));
    assert_eq!(l2.amount, U256::from(7));
    assert_eq!(l1.ticket_hash, l2.ticket_hash);
    assert_eq!(l1.ticket_hash, ticket().ticket_hash().unwrap());
    assert_eq!(serde_json::to_value(l1).unwrap()["amount"], "7");
    assert_eq!(serde_json::to_value(l2).unwrap()["amount"], "7");

    let tracker = tracker(&sim, store.clone(), TrackerConfig::default());
    assert_eq!(tracker.step().await.unwrap(), 1);
    let settled = store.get(&transfers[0].id()).unwrap().unwrap();
    assert_eq!(settled.status, TransferStatus::Completed);
    assert_eq!(settled.l2_operation_hash, Some(l2.transaction_hash.clone()));

    assert_eq!(sim.l1_balance(&alice().into(), &ticket()), U256::from(3));
    assert_eq!(
        ticket_balance(&sim.rollup(), &l1.ticket_hash, &receiver())
            .await
            .unwrap(),
        U256::from(7)
    );
    // nothing left to do
    assert_eq!(tracker.step().await.unwrap(), 0);
}

#[tokio::test]
async fn batched_deposits_keep_submission_order() {
    let sim = Simulation::new(rollup_config());
    let store = Arc::new(MemoryStore::default());
    sim.mint_tickets(&alice().into(), &ticket(), 20.into());
    let available = fetch_ticket(&sim.l1(), &alice().into(), &ticket(), &retry_config())
        .await
        .unwrap();
    assert_eq!(available.amount, U256::from(20));

    let requests: Vec<_> = (0..4)
        .map(|_| {
            DepositRequest::new(
                available.clone(),
                5.into(),
                &DepositRoutingInfo::new(receiver(), None),
            )
        })
        .collect();
    let transfers = submit_deposits(
        &sim.l1(),
        &store,
        &sim.rollup_address(),
        &requests,
        &retry_config(),
    )
    .await
    .unwrap();
    assert_eq!(transfers.len(), 4);
    assert!(transfers
        .windows(2)
        .all(|pair| pair[0].batch_key < pair[1].batch_key));
    assert!(transfers
        .iter()
        .all(|transfer| transfer.operation_hash == transfers[0].operation_hash));

    let hash = transfers[0].operation_hash.clone();
    let records = records_for(&sim.indexer(), &hash, &retry_config())
        .await
        .unwrap();
    let pairs = check_batch(&hash, 4, &records).unwrap();
    for ((l1, l2), transfer) in pairs.iter().zip(&transfers) {
        assert_eq!(l1.ordering_key(), transfer.batch_key);
        assert_eq!(l2.as_ref().unwrap().amount, U256::from(5));
    }
    assert!(pairs.windows(2).all(|pair| {
        pair[0].1.as_ref().unwrap().ordering_key() < pair[1].1.as_ref().unwrap().ordering_key()
    }));

    let tracker = tracker(&sim, store.clone(), TrackerConfig::default());
    assert_eq!(tracker.step().await.unwrap(), 4);
    assert!(store
        .load_all()
        .unwrap()
        .iter()
        .all(|transfer| transfer.status == TransferStatus::Completed));
    assert_eq!(sim.l2_balance(&receiver(), &ticket()), U256::from(20));
}

#[tokio::test]
async fn deposit_waits_for_the_indexer() {
    let sim = Simulation::new(rollup_config());
    let store = Arc::new(MemoryStore::default());
    sim.set_indexer_lag(2);
    sim.mint_tickets(&alice().into(), &ticket(), 10.into());

    let transfers = submit_deposits(
        &sim.l1(),
        &store,
        &sim.rollup_address(),
        &[DepositRequest::new(
            snapshot(alice(), 10),
            10.into(),
            &DepositRoutingInfo::new(receiver(), None),
        )],
        &retry_config(),
    )
    .await
    .unwrap();

    let tracker = tracker(&sim, store.clone(), TrackerConfig::default());
    assert_eq!(tracker.step().await.unwrap(), 0);
    assert_eq!(
        store.get(&transfers[0].id()).unwrap().unwrap().status,
        TransferStatus::Created
    );

    sim.bake(2);
    assert_eq!(tracker.step().await.unwrap(), 1);
    assert_eq!(
        store.get(&transfers[0].id()).unwrap().unwrap().status,
        TransferStatus::Completed
    );
}

#[tokio::test]
async fn withdrawal_goes_through_the_outbox() {
    let sim = Simulation::new(rollup_config());
    let store = Arc::new(MemoryStore::default());
    fund_l2(&sim, receiver(), 10).await;

    let transfers = submit_withdrawals(
        &sim.l2(),
        &store,
        &[withdrawal(receiver(), 10, 4)],
        &retry_config(),
    )
    .await
    .unwrap();
    let id = transfers[0].id();
    assert_eq!(transfers[0].kind, TransferKind::Withdrawal);
    assert_eq!(sim.l2_balance(&receiver(), &ticket()), U256::from(6));

    let tracker = tracker(&sim, store.clone(), TrackerConfig::default());
    assert_eq!(tracker.step().await.unwrap(), 1);
    let pending = store.get(&id).unwrap().unwrap();
    assert_eq!(pending.status, TransferStatus::PendingCommitment);
    let message = pending.outbox_message.unwrap();

    // one block short of cementing
    sim.bake(4);
    assert!(matches!(
        get_proof(&sim.rollup(), message).await,
        Err(SettlementError::NotYetAvailable(_))
    ));
    assert_eq!(tracker.step().await.unwrap(), 0);
    assert_eq!(
        store.get(&id).unwrap().unwrap().status,
        TransferStatus::PendingCommitment
    );

    sim.bake(1);
    assert!(get_proof(&sim.rollup(), message).await.is_ok());
    let mut statuses = Vec::new();
    for _ in 0..3 {
        tracker.step().await.unwrap();
        statuses.push(store.get(&id).unwrap().unwrap().status);
    }
    assert_eq!(
        statuses,
        vec![
            TransferStatus::PendingProof,
            TransferStatus::Executable,
            TransferStatus::Completed
        ]
    );

    let completed = store.get(&id).unwrap().unwrap();
    assert!(completed.related_commitment.is_some());
    assert!(completed.settlement_operation_hash.is_some());
    assert!(sim.is_executed(message));
    assert_eq!(sim.l1_balance(&alice().into(), &ticket()), U256::from(4));

    let records = records_for(&sim.indexer(), &transfers[0].operation_hash, &retry_config())
        .await
        .unwrap();
    let l1 = records[0].l1_transaction.as_ref().unwrap();
    assert_eq!(
        Some(&l1.operation_hash),
        completed.settlement_operation_hash.as_ref()
    );
}

#[tokio::test]
async fn proof_is_stable_and_executes_once() {
    let sim = Simulation::new(rollup_config());
    fund_l2(&sim, receiver(), 3).await;
    let store = Arc::new(MemoryStore::default());
    submit_withdrawals(
        &sim.l2(),
        &store,
        &[withdrawal(receiver(), 3, 3)],
        &retry_config(),
    )
    .await
    .unwrap();

    let tracker = tracker(&sim, store.clone(), TrackerConfig::default());
    tracker.step().await.unwrap();
    let message = store.load_all().unwrap()[0].outbox_message.unwrap();
    sim.bake(5);

    let proof = get_proof(&sim.rollup(), message).await.unwrap();
    sim.bake(3);
    assert_eq!(get_proof(&sim.rollup(), message).await.unwrap(), proof);

    let execute = || L1Operation::ExecuteOutbox {
        rollup: sim.rollup_address(),
        commitment: proof.commitment.clone(),
        proof: proof.proof.clone(),
    };
    let l1 = sim.l1();
    let first = l1.submit(execute()).await.unwrap();
    assert!(wait_confirmation(&l1, &first, &retry_config())
        .await
        .unwrap()
        .is_applied());
    let second = l1.submit(execute()).await.unwrap();
    assert!(!wait_confirmation(&l1, &second, &retry_config())
        .await
        .unwrap()
        .is_applied());
    assert_eq!(sim.l1_balance(&alice().into(), &ticket()), U256::from(3));
}

#[tokio::test]
async fn invalid_withdrawal_routing_makes_no_remote_call() {
    let sim = Simulation::new(rollup_config());
    let store = MemoryStore::default();
    let request = WithdrawalRequest {
        routing_info: HexString(vec![0x01; 60]),
        ..withdrawal(receiver(), 10, 1)
    };

    let err = submit_withdrawals(&sim.l2(), &store, &[request], &retry_config())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Validation(FaBridgeError::InvalidLength {
            expected: 44,
            actual: 60,
            ..
        })
    ));
    assert_eq!(sim.remote_calls(), 0);
    assert!(store.load_all().unwrap().is_empty());
}

async fn deposit_through_proxy(
    sim: &Simulation,
    proxy: L2Address,
    config: TrackerConfig,
) -> TransferStatus {
    let store = Arc::new(MemoryStore::default());
    sim.mint_tickets(&alice().into(), &ticket(), 5.into());
    let transfers = submit_deposits(
        &sim.l1(),
        &store,
        &sim.rollup_address(),
        &[DepositRequest::new(
            snapshot(alice(), 5),
            5.into(),
            &DepositRoutingInfo::new(receiver(), Some(proxy)),
        )],
        &retry_config(),
    )
    .await
    .unwrap();
    tracker(sim, store.clone(), config).step().await.unwrap();
    store.get(&transfers[0].id()).unwrap().unwrap().status
}

#[tokio::test]
async fn proxy_outcomes_are_classified() {
    let config = TrackerConfig {
        proxy_ticket_hash_slot: Some(PROXY_TICKET_HASH_SLOT),
        ..Default::default()
    };
    let ticket_hash = ticket().ticket_hash().unwrap();

    let sim = Simulation::new(rollup_config());
    let proxy = l2_account(0x01);
    sim.deploy_proxy(proxy, Some(ticket_hash), true);
    assert_eq!(
        deposit_through_proxy(&sim, proxy, config.clone()).await,
        TransferStatus::Completed
    );
    assert_eq!(sim.l2_balance(&proxy, &ticket()), U256::from(5));

    let sim = Simulation::new(rollup_config());
    assert_eq!(
        deposit_through_proxy(&sim, l2_account(0x02), config.clone()).await,
        TransferStatus::Failed(FailureReason::ProxyNotFound)
    );
    assert_eq!(sim.l2_balance(&receiver(), &ticket()), U256::from(5));

    let sim = Simulation::new(rollup_config());
    let proxy = l2_account(0x03);
    sim.deploy_proxy(proxy, Some(TicketHash(H256::repeat_byte(0xee))), true);
    assert_eq!(
        deposit_through_proxy(&sim, proxy, config.clone()).await,
        TransferStatus::Failed(FailureReason::TicketHashMismatch)
    );

    let sim = Simulation::new(rollup_config());
    let proxy = l2_account(0x04);
    sim.deploy_proxy(proxy, Some(ticket_hash), false);
    assert_eq!(
        deposit_through_proxy(&sim, proxy, config).await,
        TransferStatus::Failed(FailureReason::InvalidRoutingInfoRevertable)
    );
    assert_eq!(sim.l2_balance(&receiver(), &ticket()), U256::from(5));
}

#[tokio::test]
async fn tracker_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transfers.json");
    let sim = Simulation::new(rollup_config());
    fund_l2(&sim, receiver(), 8).await;

    let id = {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        let transfers = submit_withdrawals(
            &sim.l2(),
            &store,
            &[withdrawal(receiver(), 8, 2), withdrawal(receiver(), 8, 6)],
            &retry_config(),
        )
        .await
        .unwrap();
        tracker(&sim, store, TrackerConfig::default())
            .step()
            .await
            .unwrap();
        transfers[1].id()
    };

    sim.bake(5);
    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let before = store.get(&id).unwrap().unwrap();
    assert_eq!(before.status, TransferStatus::PendingCommitment);

    let tracker = tracker(&sim, store.clone(), TrackerConfig::default());
    for _ in 0..3 {
        tracker.step().await.unwrap();
    }
    let transfers = store.load_all().unwrap();
    assert_eq!(transfers.len(), 2);
    assert!(transfers.iter().all(|transfer| transfer.is_successful()));
    assert_eq!(sim.l1_balance(&alice().into(), &ticket()), U256::from(8));
}

#[tokio::test]
async fn tracker_stops_on_mismatched_batch() {
    let sim = Simulation::new(rollup_config());
    let store = Arc::new(MemoryStore::default());
    sim.mint_tickets(&alice().into(), &ticket(), 10.into());
    let request = DepositRequest::new(
        snapshot(alice(), 10),
        5.into(),
        &DepositRoutingInfo::new(receiver(), None),
    );
    let transfers = submit_deposits(
        &sim.l1(),
        &store,
        &sim.rollup_address(),
        &[request.clone(), request],
        &retry_config(),
    )
    .await
    .unwrap();

    // the work-list forgot one of the two sub-operations
    let forgetful = Arc::new(MemoryStore::default());
    forgetful.put(&transfers[1]).unwrap();
    let err = tracker(&sim, forgetful, TrackerConfig::default())
        .step()
        .await
        .unwrap_err();
    assert!(err.is_invariant_violation());
}

#[tokio::test]
async fn runner_stops_on_shutdown() {
    let sim = Simulation::new(rollup_config());
    let store = Arc::new(MemoryStore::default());
    sim.mint_tickets(&alice().into(), &ticket(), 1.into());
    let transfers = submit_deposits(
        &sim.l1(),
        &store,
        &sim.rollup_address(),
        &[DepositRequest::new(
            snapshot(alice(), 1),
            1.into(),
            &DepositRoutingInfo::new(receiver(), None),
        )],
        &retry_config(),
    )
    .await
    .unwrap();

    let config = TrackerConfig {
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    };
    let (tx_shutdown, rx_shutdown) = broadcast::channel(1);
    let mut runner = TrackerRunner::new(tracker(&sim, store.clone(), config), rx_shutdown);
    let shutdown = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx_shutdown.send(()).unwrap();
    };

    let (result, ()) = tokio::join!(runner.run(), shutdown);
    assert_eq!(result, Ok(()));
    assert!(store.get(&transfers[0].id()).unwrap().unwrap().is_successful());
}

#[tokio::test]
async fn tracker_is_configured_by_name() {
    let sim = Simulation::new(rollup_config());
    let provider = JsonConfigProvider::parse(
        r#"{
            "retry": { "initial_delay": 5, "max_attempts": 3 },
            "tracker": { "poll_interval": 20, "proxy_ticket_hash_slot": 0 }
        }"#,
    )
    .unwrap();
    let tracker = Tracker::with_config(
        sim.l1(),
        sim.rollup(),
        sim.indexer(),
        MemoryStore::default(),
        &provider,
    )
    .unwrap();
    assert_eq!(tracker.config().poll_interval, Duration::from_millis(20));
    assert_eq!(
        tracker.config().proxy_ticket_hash_slot,
        Some(PROXY_TICKET_HASH_SLOT)
    );
    assert_eq!(tracker.step().await.unwrap(), 0);

    let tracker = Tracker::with_config(
        sim.l1(),
        sim.rollup(),
        sim.indexer(),
        MemoryStore::default(),
        &DefaultConfigProvider,
    )
    .unwrap();
    assert_eq!(tracker.config(), &TrackerConfig::default());

    let invalid = JsonConfigProvider::parse(r#"{ "rollup": { "commitment_period": "soon" } }"#)
        .unwrap();
    assert!(matches!(
        Tracker::with_config(
            sim.l1(),
            sim.rollup(),
            sim.indexer(),
            MemoryStore::default(),
            &invalid,
        ),
        Err(SettlementError::Config(_))
    ));
}
