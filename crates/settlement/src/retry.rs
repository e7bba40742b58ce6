// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Bounded retry with exponential backoff.
//!
//! Every remote read goes through [`retry_if`]: a transient failure is
//! retried after a growing delay until the attempt budget runs out, in which
//! case the caller gets [`SettlementError::DeadlineExceeded`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::SettlementError;

/// Delays between consecutive attempts, `max_attempts - 1` items.
///
/// Growth saturates at `max_delay` (or [`Duration::MAX`] when unset).
pub fn backoff_strategy(config: &RetryConfig) -> impl Iterator<Item = Duration> {
    let multiplier = config.multiplier.max(1.0);
    let max_delay = config.max_delay.unwrap_or(Duration::MAX);
    std::iter::successors(Some(config.initial_delay.min(max_delay)), move |delay| {
        let next = Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier)
            .unwrap_or(Duration::MAX);
        Some(next.min(max_delay))
    })
    .take(config.max_attempts.saturating_sub(1))
}

/// Runs `action` until it succeeds, fails with an error `predicate` rejects,
/// or the attempt budget is exhausted.
pub async fn retry_if<T, A, Fut, P>(
    config: &RetryConfig,
    what: &str,
    mut predicate: P,
    mut action: A,
) -> Result<T, SettlementError>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SettlementError>>,
    P: FnMut(&SettlementError) -> bool,
{
    let attempts = AtomicUsize::new(0);
    let retryable = AtomicBool::new(false);

    let result = RetryIf::spawn(
        backoff_strategy(config),
        || {
            attempts.fetch_add(1, Ordering::Relaxed);
            action()
        },
        |err: &SettlementError| {
            let retry = predicate(err);
            retryable.store(retry, Ordering::Relaxed);
            if retry {
                debug!(
                    "Attempt {} to get {} failed: {}",
                    attempts.load(Ordering::Relaxed),
                    what,
                    err
                );
            }
            retry
        },
    )
    .await;

    match result {
        Err(err) if retryable.load(Ordering::Relaxed) => {
            let attempts = attempts.load(Ordering::Relaxed);
            warn!("Giving up on {} after {} attempts: {}", what, attempts, err);
            Err(SettlementError::DeadlineExceeded {
                what: what.to_owned(),
                attempts,
            })
        }
        other => other,
    }
}

/// [`retry_if`] retrying on transient errors only.
pub async fn retry<T, A, Fut>(
    config: &RetryConfig,
    what: &str,
    action: A,
) -> Result<T, SettlementError>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SettlementError>>,
{
    retry_if(config, what, SettlementError::is_transient, action).await
}
