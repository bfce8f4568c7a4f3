//! Pluggable consensus: a quorum of voters must agree on one of a fixed set
//! of options within a timeout, with at most one vote counted per voter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};

use crate::error::{KernelError, KernelResult};

/// Aggregates raw votes into per-option tallies. The kernel, not the
/// strategy, enforces quorum, threshold and timeout — the strategy only
/// decides how ties and weighting work.
pub trait ConsensusStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn tally(&self, votes: &HashMap<String, String>) -> HashMap<String, usize>;
}

/// Every vote counts equally; the option with the most votes wins, ties
/// broken by whichever option was declared first.
pub struct QuorumVoteStrategy;

impl ConsensusStrategy for QuorumVoteStrategy {
    fn name(&self) -> &str {
        "quorum-vote"
    }

    fn tally(&self, votes: &HashMap<String, String>) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for option in votes.values() {
            *counts.entry(option.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Equivalent tallying to quorum-vote; kept distinct so a swarm can be
/// configured with raft-like terminology without the kernel caring which
/// strategy object it holds.
pub struct RaftLikeStrategy;

impl ConsensusStrategy for RaftLikeStrategy {
    fn name(&self) -> &str {
        "raft-like"
    }

    fn tally(&self, votes: &HashMap<String, String>) -> HashMap<String, usize> {
        QuorumVoteStrategy.tally(votes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome {
    pub consensus: bool,
    pub decision: Option<String>,
    pub votes: HashMap<String, String>,
}

struct Round {
    options: Vec<String>,
    voters: Vec<String>,
    threshold: f64,
    quorum: usize,
    votes: RwLock<HashMap<String, String>>,
    notify: Notify,
}

/// One coordinator's consensus subsystem. A round is identified by the id
/// returned from `begin_round` and is dropped once `resolve` returns.
pub struct ConsensusCoordinator {
    strategy: Arc<dyn ConsensusStrategy>,
    rounds: RwLock<HashMap<String, Arc<Round>>>,
}

impl ConsensusCoordinator {
    #[must_use]
    pub fn new(strategy: Arc<dyn ConsensusStrategy>) -> Self {
        Self { strategy, rounds: RwLock::new(HashMap::new()) }
    }

    /// Open a round over `options` with `voters` eligible to vote. Quorum
    /// defaults to `ceil(n/2) + 1` and threshold to 0.66 of the full voter
    /// set (not merely of votes cast).
    pub async fn begin_round(&self, options: Vec<String>, voters: Vec<String>) -> String {
        self.begin_round_with(options, voters, None, 0.66).await
    }

    pub async fn begin_round_with(
        &self,
        options: Vec<String>,
        voters: Vec<String>,
        quorum: Option<usize>,
        threshold: f64,
    ) -> String {
        let quorum = quorum.unwrap_or_else(|| voters.len().div_ceil(2) + 1);
        let round = Arc::new(Round {
            options,
            voters,
            threshold,
            quorum,
            votes: RwLock::new(HashMap::new()),
            notify: Notify::new(),
        });
        let id = crate::ids::generate("round_");
        self.rounds.write().await.insert(id.clone(), round);
        id
    }

    /// Cast one vote. Rejects unknown voters, unknown options, and a
    /// second vote from the same voter in the same round.
    pub async fn cast_vote(&self, round_id: &str, voter: impl Into<String>, option: impl Into<String>) -> KernelResult<()> {
        let voter = voter.into();
        let option = option.into();
        let round = self
            .rounds
            .read()
            .await
            .get(round_id)
            .cloned()
            .ok_or_else(|| KernelError::NotFound { kind: "consensus-round", id: round_id.to_string() })?;

        if !round.voters.contains(&voter) {
            return Err(KernelError::Validation(format!("{voter} is not an eligible voter")));
        }
        if !round.options.contains(&option) {
            return Err(KernelError::Validation(format!("{option} is not a valid option")));
        }
        let mut votes = round.votes.write().await;
        if votes.contains_key(&voter) {
            return Err(KernelError::Conflict(format!("{voter} has already voted in this round")));
        }
        votes.insert(voter, option);
        drop(votes);
        round.notify.notify_waiters();
        Ok(())
    }

    /// Wait until the winning option clears quorum and threshold, or
    /// `timeout` elapses. The round is removed from the coordinator either
    /// way.
    pub async fn resolve(&self, round_id: &str, timeout: Duration) -> KernelResult<ConsensusOutcome> {
        let round = self
            .rounds
            .read()
            .await
            .get(round_id)
            .cloned()
            .ok_or_else(|| KernelError::NotFound { kind: "consensus-round", id: round_id.to_string() })?;

        let outcome = tokio::time::timeout(timeout, self.wait_for_decision(&round)).await;
        self.rounds.write().await.remove(round_id);

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                let votes = round.votes.read().await.clone();
                Ok(ConsensusOutcome { consensus: false, decision: None, votes })
            }
        }
    }

    async fn wait_for_decision(&self, round: &Round) -> ConsensusOutcome {
        loop {
            {
                let votes = round.votes.read().await;
                if votes.len() >= round.quorum {
                    let tallies = self.strategy.tally(&votes);
                    if let Some((winner, count)) = tallies.iter().max_by_key(|(_, count)| **count) {
                        let share = *count as f64 / round.voters.len() as f64;
                        if share >= round.threshold {
                            return ConsensusOutcome {
                                consensus: true,
                                decision: Some(winner.clone()),
                                votes: votes.clone(),
                            };
                        }
                    }
                }
            }
            round.notify.notified().await;
        }
    }
}
