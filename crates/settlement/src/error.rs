// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

use fa_bridge_types::FaBridgeError;
use tezos_smart_rollup_host::path::PathError;

use crate::config::ConfigProviderError;
use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::transfer::{TransferKind, TransferStatus};

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Rejected locally, before any remote call.
    #[error("Validation failed: {0}")]
    Validation(#[from] FaBridgeError),

    #[error("Ledger client error: {0}")]
    Ledger(#[from] LedgerError),

    /// Data has not propagated yet (proof before cementing, empty indexer result).
    #[error("Not yet available: {0}")]
    NotYetAvailable(String),

    #[error("Could not get {what} within {attempts} attempts")]
    DeadlineExceeded { what: String, attempts: usize },

    #[error("Invalid {kind} transition from {from} to {to}")]
    InvalidTransition {
        kind: TransferKind,
        from: TransferStatus,
        to: TransferStatus,
    },

    /// Cross-ledger identity is broken, never tolerated.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Transfer store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigProviderError),

    #[error("Invalid durable storage path: {0}")]
    DurablePath(#[from] PathError),
}

impl SettlementError {
    /// Whether retrying the same read may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Ledger(err) => err.is_transient(),
            Self::NotYetAvailable(_) => true,
            Self::Validation(_)
            | Self::DeadlineExceeded { .. }
            | Self::InvalidTransition { .. }
            | Self::InvariantViolation(_)
            | Self::Store(_)
            | Self::Config(_)
            | Self::DurablePath(_) => false,
        }
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}
