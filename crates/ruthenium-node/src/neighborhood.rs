//! Neighbor bookkeeping for a node.
//!
//! [`StaticNeighborhood`] keeps every known neighbor with an integer score:
//! valid relayed data raises it, invalid data lowers it faster. The outbound
//! selection served to the engine is recomputed on each synchronization and
//! holds the best scored neighbors, up to `max_outbounds_count`. Neighbors
//! whose score falls to [`BANNED_SCORE`] are left out until they are added
//! again.
//!
//! [`LocalNeighbor`] exposes a node of the same process as a neighbor, for
//! local networks and tests.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use ruthenium_consensus::{Blockchain, TransactionsPool};
use ruthenium_core::error::NetworkError;
use ruthenium_core::traits::{Neighbor, Neighborhood};

pub const INCENTIVE_SCORE: i64 = 1;
pub const PENALTY_SCORE: i64 = 10;
pub const BANNED_SCORE: i64 = -100;
pub const MAX_SCORE: i64 = 1_000;

struct Known {
    neighbor: Arc<dyn Neighbor>,
    score: i64,
}

pub struct StaticNeighborhood {
    max_outbounds_count: usize,
    known: RwLock<Vec<Known>>,
    outbounds: RwLock<Vec<Arc<dyn Neighbor>>>,
}

impl StaticNeighborhood {
    pub fn new(max_outbounds_count: usize) -> Self {
        Self {
            max_outbounds_count,
            known: RwLock::new(Vec::new()),
            outbounds: RwLock::new(Vec::new()),
        }
    }

    /// Register a neighbor with a fresh score and refresh the selection.
    /// A known target is reset rather than duplicated.
    pub fn add(&self, neighbor: Arc<dyn Neighbor>) {
        {
            let mut known = self.known.write();
            match known.iter_mut().find(|k| k.neighbor.target() == neighbor.target()) {
                Some(existing) => {
                    existing.neighbor = neighbor;
                    existing.score = 0;
                }
                None => known.push(Known { neighbor, score: 0 }),
            }
        }
        self.synchronize();
    }

    /// Recompute the outbound selection from the current scores.
    pub fn synchronize(&self) {
        let mut candidates: Vec<(i64, Arc<dyn Neighbor>)> = self
            .known
            .read()
            .iter()
            .filter(|k| k.score > BANNED_SCORE)
            .map(|k| (k.score, Arc::clone(&k.neighbor)))
            .collect();
        // Equal scores are served in random order.
        candidates.shuffle(&mut rand::thread_rng());
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        candidates.truncate(self.max_outbounds_count);

        let selected: Vec<Arc<dyn Neighbor>> = candidates.into_iter().map(|(_, n)| n).collect();
        debug!(count = selected.len(), "neighborhood synchronized");
        *self.outbounds.write() = selected;
    }

    pub fn score(&self, target: &str) -> Option<i64> {
        self.known
            .read()
            .iter()
            .find(|k| k.neighbor.target() == target)
            .map(|k| k.score)
    }

    pub fn known_count(&self) -> usize {
        self.known.read().len()
    }

    fn adjust(&self, target: &str, delta: i64) {
        let mut known = self.known.write();
        if let Some(entry) = known.iter_mut().find(|k| k.neighbor.target() == target) {
            entry.score = entry.score.saturating_add(delta).clamp(BANNED_SCORE, MAX_SCORE);
            if entry.score == BANNED_SCORE {
                info!(neighbor = %target, "neighbor banned");
            }
        }
    }
}

impl Neighborhood for StaticNeighborhood {
    fn neighbors(&self) -> Vec<Arc<dyn Neighbor>> {
        self.outbounds.read().clone()
    }

    fn incentive(&self, target: &str) {
        self.adjust(target, INCENTIVE_SCORE);
    }

    fn penalize(&self, target: &str) {
        self.adjust(target, -PENALTY_SCORE);
    }
}

impl std::fmt::Debug for StaticNeighborhood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticNeighborhood")
            .field("max_outbounds_count", &self.max_outbounds_count)
            .field("known", &self.known.read().len())
            .field("outbounds", &self.outbounds.read().len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// LocalNeighbor
// ---------------------------------------------------------------------------

/// A node of the same process seen through the [`Neighbor`] interface.
///
/// Holds weak references so that nodes pointing at each other do not keep
/// each other alive; a dropped node answers as unreachable.
pub struct LocalNeighbor {
    target: String,
    blockchain: Weak<Blockchain>,
    pool: Weak<TransactionsPool>,
}

impl LocalNeighbor {
    pub fn new(target: impl Into<String>, blockchain: &Arc<Blockchain>, pool: &Arc<TransactionsPool>) -> Self {
        Self {
            target: target.into(),
            blockchain: Arc::downgrade(blockchain),
            pool: Arc::downgrade(pool),
        }
    }

    fn unreachable(&self) -> NetworkError {
        NetworkError::Unreachable(self.target.clone())
    }
}

#[async_trait]
impl Neighbor for LocalNeighbor {
    fn target(&self) -> &str {
        &self.target
    }

    async fn get_blocks(&self, starting_height: u64) -> Result<Vec<u8>, NetworkError> {
        let blockchain = self.blockchain.upgrade().ok_or_else(|| self.unreachable())?;
        blockchain
            .blocks_json(starting_height)
            .map_err(|e| NetworkError::Malformed(e.to_string()))
    }

    async fn add_transaction(&self, request: Vec<u8>) -> Result<(), NetworkError> {
        let pool = self.pool.upgrade().ok_or_else(|| self.unreachable())?;
        pool.add_transaction(&request, &self.target);
        Ok(())
    }
}

impl std::fmt::Debug for LocalNeighbor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNeighbor")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruthenium_core::testing::StubNeighbor;

    fn neighborhood(max: usize, targets: &[&str]) -> StaticNeighborhood {
        let neighborhood = StaticNeighborhood::new(max);
        for target in targets {
            neighborhood.add(Arc::new(StubNeighbor::new(*target, Vec::new())));
        }
        neighborhood
    }

    fn targets(neighborhood: &StaticNeighborhood) -> Vec<String> {
        neighborhood
            .neighbors()
            .iter()
            .map(|n| n.target().to_string())
            .collect()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    #[test]
    fn selection_is_capped() {
        let neighborhood = neighborhood(2, &["a", "b", "c"]);
        assert_eq!(neighborhood.known_count(), 3);
        assert_eq!(neighborhood.neighbors().len(), 2);
    }

    #[test]
    fn best_scored_neighbors_come_first() {
        let neighborhood = neighborhood(3, &["a", "b", "c"]);
        neighborhood.incentive("c");
        neighborhood.incentive("c");
        neighborhood.incentive("b");
        neighborhood.synchronize();
        assert_eq!(targets(&neighborhood), vec!["c", "b", "a"]);
    }

    #[test]
    fn penalized_neighbor_drops_out_of_a_full_selection() {
        let neighborhood = neighborhood(1, &["a", "b"]);
        neighborhood.penalize("a");
        neighborhood.synchronize();
        assert_eq!(targets(&neighborhood), vec!["b"]);
    }

    #[test]
    fn banned_neighbor_is_never_selected() {
        let neighborhood = neighborhood(8, &["a", "b"]);
        for _ in 0..(BANNED_SCORE / -PENALTY_SCORE) {
            neighborhood.penalize("a");
        }
        neighborhood.synchronize();
        assert_eq!(neighborhood.score("a"), Some(BANNED_SCORE));
        assert_eq!(targets(&neighborhood), vec!["b"]);
    }

    #[test]
    fn readding_resets_score() {
        let neighborhood = neighborhood(8, &["a"]);
        neighborhood.penalize("a");
        neighborhood.add(Arc::new(StubNeighbor::new("a", Vec::new())));
        assert_eq!(neighborhood.score("a"), Some(0));
        assert_eq!(neighborhood.known_count(), 1);
    }

    #[test]
    fn score_is_capped() {
        let neighborhood = neighborhood(8, &["a"]);
        for _ in 0..(MAX_SCORE + 5) {
            neighborhood.incentive("a");
        }
        assert_eq!(neighborhood.score("a"), Some(MAX_SCORE));
    }

    #[test]
    fn unknown_target_is_ignored() {
        let neighborhood = neighborhood(8, &["a"]);
        neighborhood.penalize("z");
        assert_eq!(neighborhood.score("z"), None);
    }

    #[test]
    fn selection_is_stale_until_synchronized() {
        let neighborhood = neighborhood(1, &["a", "b"]);
        let before = targets(&neighborhood);
        let loser = before[0].clone();
        for _ in 0..3 {
            neighborhood.penalize(&loser);
        }
        assert_eq!(targets(&neighborhood), before);
        neighborhood.synchronize();
        assert_ne!(targets(&neighborhood), before);
    }
}
