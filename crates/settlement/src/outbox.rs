// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Rollup outbox.
//!
//! A withdrawal leaves an outbox message at the L1 level the rollup
//! processed it. The message can be executed on L1 once the commitment
//! covering that level is cemented, that is `commitment_period +
//! challenge_window` blocks later, with a proof the rollup node produces
//! from the cemented state.

use std::fmt;

use async_trait::async_trait;
use fa_bridge_types::{HexString, SmartRollupAddress};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tezos_smart_rollup_host::path::OwnedPath;
use tracing::{debug, info};

use crate::config::{RetryConfig, RollupConfig};
use crate::error::SettlementError;
use crate::ledger::{wait_level, LedgerClient, LedgerError};
use crate::retry::retry;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitmentHash(pub String);

impl fmt::Display for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a message in the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutboxMessageRef {
    pub level: u32,
    pub index: u32,
}

impl fmt::Display for OutboxMessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.level, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub level: u32,
    pub index: u32,
    pub payload: HexString,
}

impl OutboxMessage {
    pub fn reference(&self) -> OutboxMessageRef {
        OutboxMessageRef {
            level: self.level,
            index: self.index,
        }
    }
}

/// Output proof against a cemented commitment, opaque to us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxProof {
    pub commitment: CommitmentHash,
    pub proof: HexString,
}

#[async_trait]
pub trait RollupNode: Send + Sync {
    fn address(&self) -> SmartRollupAddress;

    /// `None` until the commitment covering the message level is cemented.
    async fn get_proof(
        &self,
        message: OutboxMessageRef,
    ) -> Result<Option<OutboxProof>, LedgerError>;

    async fn get_messages(&self, level: u32) -> Result<Vec<OutboxMessage>, LedgerError>;

    /// Raw value stored in the durable storage under `path`.
    async fn durable_value(&self, path: &OwnedPath) -> Result<Option<Vec<u8>>, LedgerError>;
}

pub fn is_cemented(
    level: u32,
    current_level: u32,
    commitment_period: u32,
    challenge_window: u32,
) -> bool {
    current_level
        >= level
            .saturating_add(commitment_period)
            .saturating_add(challenge_window)
}

pub fn earliest_cementing_level(level: u32, config: &RollupConfig) -> u32 {
    level.saturating_add(config.cementing_delay())
}

/// Single proof request, a missing commitment is reported as pending.
pub async fn get_proof<R: RollupNode + ?Sized>(
    rollup: &R,
    message: OutboxMessageRef,
) -> Result<OutboxProof, SettlementError> {
    rollup.get_proof(message).await?.ok_or_else(|| {
        SettlementError::NotYetAvailable(format!("proof of outbox message {}", message))
    })
}

/// Lazily fetches the outbox of `max_levels` consecutive levels.
///
/// Stops after the first error; the level it failed at is the cursor to
/// restart from.
pub fn scan_outbox<R: RollupNode + ?Sized>(
    rollup: &R,
    level_from: u32,
    max_levels: u32,
) -> impl Stream<Item = Result<(u32, Vec<OutboxMessage>), SettlementError>> + '_ {
    let end = level_from.saturating_add(max_levels);
    stream::unfold(Some(level_from), move |cursor| async move {
        let level = cursor.filter(|level| *level < end)?;
        match rollup.get_messages(level).await {
            Ok(messages) => Some((Ok((level, messages)), Some(level + 1))),
            Err(err) => Some((Err(err.into()), None)),
        }
    })
}

/// Waits until the message can be cemented, then polls for its proof.
///
/// Sleeps for the expected number of blocks first, then polls the L1 level
/// until it reaches the earliest cementing level.
pub async fn wait_for_proof<R, C>(
    rollup: &R,
    l1: &C,
    message: OutboxMessageRef,
    rollup_config: &RollupConfig,
    retry_config: &RetryConfig,
) -> Result<OutboxProof, SettlementError>
where
    R: RollupNode + ?Sized,
    C: LedgerClient + ?Sized,
{
    let earliest = earliest_cementing_level(message.level, rollup_config);
    let current_level = wait_level(l1, retry_config).await?;
    if current_level < earliest {
        let blocks = earliest - current_level;
        info!(
            "Outbox message {} can be cemented in {} blocks, waiting",
            message, blocks
        );
        tokio::time::sleep(rollup_config.block_time.saturating_mul(blocks)).await;
        retry(retry_config, "cementing level", || async {
            let level = l1.current_level().await.map_err(SettlementError::from)?;
            if level < earliest {
                return Err(SettlementError::NotYetAvailable(format!(
                    "level {} (current {})",
                    earliest, level
                )));
            }
            Ok(())
        })
        .await?;
    }

    let proof = retry(retry_config, "outbox proof", || get_proof(rollup, message)).await?;
    debug!(
        "Got proof for outbox message {} against commitment {}",
        message, proof.commitment
    );
    Ok(proof)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::simulated::Simulation;

    fn rollup_config() -> RollupConfig {
        RollupConfig {
            commitment_period: 2,
            challenge_window: 3,
            block_time: Duration::from_millis(100),
        }
    }

    #[test]
    fn cementing_boundary() {
        assert!(!is_cemented(10, 14, 2, 3));
        assert!(is_cemented(10, 15, 2, 3));
        assert!(is_cemented(10, 16, 2, 3));
        assert_eq!(earliest_cementing_level(10, &rollup_config()), 15);
    }

    #[test]
    fn cementing_saturates() {
        assert!(!is_cemented(u32::MAX - 1, u32::MAX - 1, 2, 3));
        assert!(is_cemented(u32::MAX - 1, u32::MAX, 2, 3));
        assert_eq!(earliest_cementing_level(u32::MAX, &rollup_config()), u32::MAX);
    }

    #[tokio::test]
    async fn proof_is_pending_until_cemented() {
        let sim = Simulation::new(rollup_config());
        let message = sim.push_outbox_message(vec![1, 2, 3]);
        let rollup = sim.rollup();

        sim.bake(4);
        let err = get_proof(&rollup, message).await.unwrap_err();
        assert!(matches!(err, SettlementError::NotYetAvailable(_)));
        assert!(err.is_transient());

        sim.bake(1);
        let proof = get_proof(&rollup, message).await.unwrap();
        // same message, same cemented commitment, same proof
        assert_eq!(get_proof(&rollup, message).await.unwrap(), proof);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_proof_skips_polling_before_cementing() {
        let sim = Simulation::new(rollup_config());
        let message = sim.push_outbox_message(vec![1]);

        let baker = sim.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                baker.bake(1);
            }
        });

        let proof = wait_for_proof(
            &sim.rollup(),
            &sim.l1(),
            message,
            &rollup_config(),
            &RetryConfig {
                initial_delay: Duration::from_millis(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(proof, get_proof(&sim.rollup(), message).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_proof_polls_after_slow_blocks() {
        let sim = Simulation::new(rollup_config());
        let message = sim.push_outbox_message(vec![1]);

        // twice the expected block time
        let baker = sim.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(200)).await;
                baker.bake(1);
            }
        });

        let proof = wait_for_proof(
            &sim.rollup(),
            &sim.l1(),
            message,
            &rollup_config(),
            &RetryConfig {
                initial_delay: Duration::from_millis(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(sim.l1_level() >= earliest_cementing_level(message.level, &rollup_config()));
        assert_eq!(proof, get_proof(&sim.rollup(), message).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_proof_gives_up_on_a_stalled_chain() {
        let sim = Simulation::new(rollup_config());
        let message = sim.push_outbox_message(vec![1]);

        let err = wait_for_proof(
            &sim.rollup(),
            &sim.l1(),
            message,
            &rollup_config(),
            &RetryConfig {
                initial_delay: Duration::from_millis(50),
                max_attempts: 3,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::DeadlineExceeded { ref what, attempts: 3 } if what == "cementing level"
        ));
    }

    #[tokio::test]
    async fn scan_is_restartable() {
        let sim = Simulation::new(rollup_config());
        let first = sim.push_outbox_message(vec![1]);
        sim.push_outbox_message(vec![2]);
        sim.bake(1);
        let second = sim.push_outbox_message(vec![3]);

        let rollup = sim.rollup();
        let levels: Vec<_> = scan_outbox(&rollup, first.level, 3)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0].1.len(), 2);
        assert_eq!(levels[1].0, second.level);
        assert_eq!(levels[1].1[0].payload, HexString(vec![3]));
        assert!(levels[2].1.is_empty());

        // resuming from a cursor yields the remaining levels only
        let resumed: Vec<_> = scan_outbox(&rollup, second.level, 1)
            .map(|item| item.unwrap().0)
            .collect()
            .await;
        assert_eq!(resumed, vec![second.level]);
    }
}
