// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Settlement of FA bridge transfers between Tezos (L1) and Etherlink (L2).
//!
//! Deposits and withdrawals are submitted in batches, persisted as
//! [transfer::Transfer] records, then driven to a terminal state by the
//! [tracker::Tracker]:
//!
//! ```text
//! deposit:    CREATED -> COMPLETED | FAILED_*
//! withdrawal: CREATED -> PENDING_COMMITMENT -> PENDING_PROOF -> EXECUTABLE -> COMPLETED
//! ```
//!
//! Ledgers, rollup node and indexer are reached through the
//! [ledger::LedgerClient], [outbox::RollupNode] and [indexer::IndexerQuery]
//! traits. The `testing` feature provides in-memory implementations of all
//! of them sharing a single simulated world.

pub mod classify;
pub mod config;
pub mod durable;
pub mod error;
pub mod indexer;
pub mod ledger;
pub mod outbox;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod submit;
pub mod tracker;
pub mod transfer;

#[cfg(any(test, feature = "testing"))]
pub mod simulated;

pub use error::SettlementError;
pub use ledger::{LedgerClient, LedgerError, OperationHash};
pub use store::{JsonFileStore, MemoryStore, TransferStore};
pub use submit::{submit_deposits, submit_withdrawals, DepositRequest, WithdrawalRequest};
pub use tracker::{Tracker, TrackerRunner};
pub use transfer::{FailureReason, Transfer, TransferKind, TransferStatus};
