// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Deposit outcome classification.
//!
//! The rollup credits the ticket to the proxy when the proxy accepted the
//! deposit, and falls back to the receiver when no proxy was given or the
//! proxy call failed. Which of the two ended up as the ticket owner, and
//! what the proxy looks like, tells us the outcome.

use fa_bridge_types::{DepositRoutingInfo, L2Address, TicketHash};
use tracing::warn;

use crate::config::TrackerConfig;
use crate::durable::{has_code, slot_index, storage_value};
use crate::error::SettlementError;
use crate::indexer::L2TransactionRecord;
use crate::outbox::RollupNode;
use crate::transfer::{FailureReason, TransferStatus};

/// What the rollup state says about a proxy contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProxyState {
    pub has_code: bool,
    /// Ticket hash the proxy is bound to, when it can be read
    pub bound_ticket_hash: Option<TicketHash>,
}

pub async fn read_proxy_state<R: RollupNode + ?Sized>(
    rollup: &R,
    proxy: &L2Address,
    config: &TrackerConfig,
) -> Result<ProxyState, SettlementError> {
    let has_code = has_code(rollup, proxy).await?;
    let bound_ticket_hash = match config.proxy_ticket_hash_slot {
        Some(slot) if has_code => {
            let word = storage_value(rollup, proxy, &slot_index(slot)).await?;
            Some(TicketHash(word))
        }
        _ => None,
    };
    Ok(ProxyState {
        has_code,
        bound_ticket_hash,
    })
}

pub fn classify_deposit(
    routing_info: &DepositRoutingInfo,
    event: &L2TransactionRecord,
    proxy: &ProxyState,
) -> Result<TransferStatus, SettlementError> {
    let owner = event.ticket_owner.to_l2()?;

    if let Some(expected_proxy) = routing_info.proxy {
        if owner == expected_proxy {
            return Ok(TransferStatus::Completed);
        }
    }
    if owner != routing_info.receiver {
        return Err(SettlementError::invariant(format!(
            "deposit {} credited {}, neither the receiver nor the proxy",
            event.transaction_hash, owner
        )));
    }
    if routing_info.proxy.is_none() {
        return Ok(TransferStatus::Completed);
    }

    let reason = if !proxy.has_code {
        FailureReason::ProxyNotFound
    } else if proxy
        .bound_ticket_hash
        .is_some_and(|bound| bound != event.ticket_hash)
    {
        FailureReason::TicketHashMismatch
    } else {
        FailureReason::InvalidRoutingInfoRevertable
    };
    warn!(
        "Proxy call of deposit {} failed ({:?}), ticket credited to the receiver {}",
        event.transaction_hash, reason, owner
    );
    Ok(TransferStatus::Failed(reason))
}
