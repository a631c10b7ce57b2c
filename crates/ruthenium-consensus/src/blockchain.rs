//! The local chain and its reconciliation with neighbors.
//!
//! The chain keeps a bounded window of the most recent blocks together with
//! the ledger undo data of each, so a neighbor chain diverging inside the
//! window can be verified by rewinding copies of the ledger and registry.
//! Live state is only touched by [`Blockchain::add_block`] and by the final
//! swap of [`Blockchain::update`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use ruthenium_core::crypto::verify_signatures;
use ruthenium_core::error::{BlockError, NetworkError, TransactionError, VerificationError};
use ruthenium_core::ledger::{Ledger, LedgerUndo};
use ruthenium_core::settings::ProtocolSettings;
use ruthenium_core::traits::{HumanityOracle, Neighbor, Neighborhood, ValueModel};
use ruthenium_core::types::{Address, Block, Hash256, Transaction};

use crate::registry::AddressRegistry;

#[derive(Debug)]
struct ChainEntry {
    block: Arc<Block>,
    hash: Hash256,
    undo: LedgerUndo,
    /// Whether the block rewarded the holder of the oldest yielding output.
    rewards_oldest: bool,
}

/// What the next block links to.
#[derive(Debug, Clone, Copy)]
struct Link {
    hash: Hash256,
    timestamp: i64,
}

/// Chains are compared by length, then by whether the tip rewarded the
/// oldest validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    length: u64,
    rewards_oldest: bool,
}

#[derive(Debug, Default)]
struct ChainState {
    entries: VecDeque<ChainEntry>,
    /// Absolute height of `entries[0]`.
    first_height: u64,
    /// Newest evicted block.
    anchor: Option<Link>,
    genesis_timestamp: i64,
}

impl ChainState {
    fn len(&self) -> u64 {
        self.first_height + self.entries.len() as u64
    }

    fn last(&self) -> Option<&ChainEntry> {
        self.entries.back()
    }

    fn entry(&self, height: u64) -> Option<&ChainEntry> {
        let index = usize::try_from(height.checked_sub(self.first_height)?).ok()?;
        self.entries.get(index)
    }

    fn link(&self, height: u64) -> Option<Link> {
        match self.entry(height) {
            Some(entry) => Some(Link { hash: entry.hash, timestamp: entry.block.timestamp }),
            None if height + 1 == self.first_height => self.anchor,
            None => None,
        }
    }

    fn rank(&self) -> Rank {
        Rank {
            length: self.len(),
            rewards_oldest: self.last().is_none_or(|entry| entry.rewards_oldest),
        }
    }

    fn push(&mut self, entry: ChainEntry, limit: u64) {
        if self.len() == 0 {
            self.genesis_timestamp = entry.block.timestamp;
        }
        self.entries.push_back(entry);
        while self.entries.len() as u64 > limit.max(1) {
            if let Some(evicted) = self.entries.pop_front() {
                self.anchor = Some(Link { hash: evicted.hash, timestamp: evicted.block.timestamp });
                self.first_height += 1;
            }
        }
    }

    /// Drop every entry at `height` and above.
    fn truncate(&mut self, height: u64) {
        while self.len() > height && self.entries.pop_back().is_some() {}
    }
}

/// A verified neighbor chain, ready to be swapped in.
struct Candidate {
    divergence: u64,
    entries: Vec<ChainEntry>,
    ledger: Ledger,
    registry: AddressRegistry,
    rank: Rank,
}

/// Outcome of a [`Blockchain::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainUpdate {
    Replaced { target: String },
    Kept,
}

pub struct Blockchain {
    state: RwLock<ChainState>,
    ledger: Arc<Ledger>,
    registry: Arc<AddressRegistry>,
    model: Arc<dyn ValueModel>,
    neighborhood: Arc<dyn Neighborhood>,
    oracle: Arc<dyn HumanityOracle>,
    settings: ProtocolSettings,
    /// Serializes local block closing and chain replacement.
    sync: Mutex<()>,
}

impl fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blockchain").finish_non_exhaustive()
    }
}

impl Blockchain {
    pub fn new(
        settings: ProtocolSettings,
        ledger: Arc<Ledger>,
        registry: Arc<AddressRegistry>,
        model: Arc<dyn ValueModel>,
        neighborhood: Arc<dyn Neighborhood>,
        oracle: Arc<dyn HumanityOracle>,
    ) -> Self {
        Self {
            state: RwLock::new(ChainState::default()),
            ledger,
            registry,
            model,
            neighborhood,
            oracle,
            settings,
            sync: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<AddressRegistry> {
        &self.registry
    }

    pub fn model(&self) -> &Arc<dyn ValueModel> {
        &self.model
    }

    pub fn neighborhood(&self) -> &Arc<dyn Neighborhood> {
        &self.neighborhood
    }

    pub fn oracle(&self) -> &Arc<dyn HumanityOracle> {
        &self.oracle
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Local blocks
    // ------------------------------------------------------------------

    /// Close a block at `timestamp` with `transactions`.
    ///
    /// `new_addresses` are the yielding output addresses of the batch; the
    /// ones the oracle confirms and not registered yet are announced by the
    /// block, along with the registry's pending removals. Every yielding
    /// output must go to an address registered once the block applies.
    /// On error nothing is changed.
    pub async fn add_block(
        &self,
        timestamp: i64,
        transactions: Vec<Transaction>,
        new_addresses: &[Address],
    ) -> Result<(), BlockError> {
        let _sync = self.sync.lock().await;
        let added = self.registry.filter_eligible(new_addresses, self.oracle.as_ref()).await;
        let removed = self.registry.removed_addresses();
        let unregistered = transactions
            .iter()
            .flat_map(|transaction| &transaction.outputs)
            .filter(|output| output.is_yielding)
            .find(|output| !is_registered_after(&self.registry, &added, &removed, &output.address));
        if let Some(output) = unregistered {
            return Err(BlockError::YieldingAddressNotRegistered(output.address.to_string()));
        }
        let mut state = self.state.write();
        let previous_hash = match state.last() {
            Some(last) if last.block.timestamp == timestamp => return Err(BlockError::SameTimestamp),
            Some(last) => {
                let expected = last.block.timestamp.saturating_add(self.settings.validation_timestamp());
                if timestamp != expected {
                    return Err(BlockError::UnexpectedTimestamp { expected, got: timestamp });
                }
                last.hash
            }
            None => Hash256::ZERO,
        };
        let block = Block::new(previous_hash, added, removed, timestamp, transactions);
        let rewards_oldest = rewards_oldest(&self.ledger, &block);
        let undo = self.ledger.connect(&block.transactions, timestamp)?;
        self.registry
            .update(&block.added_registered_addresses, &block.removed_registered_addresses);
        let hash = block.hash();
        info!(height = state.len(), %hash, transactions = block.transactions.len(), "block added");
        state.push(
            ChainEntry { block: Arc::new(block), hash, undo, rewards_oldest },
            self.settings.blocks_count_limit,
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Retained blocks at or after `starting_height`.
    ///
    /// A height below the window starts at the oldest retained block; a
    /// height past the tip gives an empty list.
    pub fn blocks(&self, starting_height: u64) -> Vec<Block> {
        let state = self.state.read();
        let skip = usize::try_from(starting_height.saturating_sub(state.first_height)).unwrap_or(usize::MAX);
        state
            .entries
            .iter()
            .skip(skip)
            .map(|entry| Block::clone(&entry.block))
            .collect()
    }

    pub fn blocks_json(&self, starting_height: u64) -> Result<Vec<u8>, BlockError> {
        serde_json::to_vec(&self.blocks(starting_height))
            .map_err(|e| BlockError::Serialization(e.to_string()))
    }

    /// Genesis timestamp, retained after eviction. 0 when empty.
    pub fn first_block_timestamp(&self) -> i64 {
        self.state.read().genesis_timestamp
    }

    /// 0 when empty.
    pub fn last_block_timestamp(&self) -> i64 {
        self.state.read().last().map_or(0, |entry| entry.block.timestamp)
    }

    pub fn last_block_transactions(&self) -> Vec<Transaction> {
        self.state
            .read()
            .last()
            .map(|entry| entry.block.transactions.clone())
            .unwrap_or_default()
    }

    /// Number of blocks ever appended, evicted ones included.
    pub fn height(&self) -> u64 {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0
    }

    /// Hash of the newest block.
    pub fn tip(&self) -> Option<Hash256> {
        self.state.read().last().map(|entry| entry.hash)
    }

    // ------------------------------------------------------------------
    // Replacement
    // ------------------------------------------------------------------

    /// Fetch every neighbor's chain, verify it and adopt the best one if it
    /// outranks the local chain.
    ///
    /// A neighbor failing to answer is skipped; a neighbor sending invalid
    /// blocks is penalized. Nothing live changes unless a candidate wins.
    pub async fn update(&self, now: i64) -> ChainUpdate {
        let _sync = self.sync.lock().await;
        let (start, first_height, local_rank) = {
            let state = self.state.read();
            let start = state
                .len()
                .saturating_sub(self.settings.verification_overlap)
                .max(state.first_height);
            (start, state.first_height, state.rank())
        };

        let mut best: Option<(String, Candidate)> = None;
        for (neighbor, response) in self.fetch(start).await {
            let target = neighbor.target().to_string();
            let mut outcome = match response {
                Ok(bytes) => self.verify(start, &bytes, now).await,
                Err(e) => {
                    debug!(neighbor = %target, "failed to get neighbor's blockchain: {e}");
                    continue;
                }
            };
            if matches!(outcome, Err(VerificationError::Fork { .. })) && start > first_height {
                debug!(neighbor = %target, "neighbor's blockchain is a fork, verifying the whole retained window");
                outcome = match request_blocks(neighbor.as_ref(), first_height, self.settings.validation_timeout()).await {
                    Ok(bytes) => self.verify(first_height, &bytes, now).await,
                    Err(e) => {
                        debug!(neighbor = %target, "failed to get neighbor's blockchain: {e}");
                        continue;
                    }
                };
            }
            match outcome {
                Ok(Some(candidate)) => {
                    self.neighborhood.incentive(&target);
                    if best.as_ref().is_none_or(|(_, b)| candidate.rank > b.rank) {
                        best = Some((target, candidate));
                    }
                }
                Ok(None) => debug!(neighbor = %target, "neighbor's blockchain has no new block"),
                Err(VerificationError::EmptyCandidate) => {
                    debug!(neighbor = %target, "neighbor's blockchain is empty")
                }
                Err(VerificationError::Fork { height }) => {
                    debug!(neighbor = %target, height, "neighbor's blockchain forks below the retained window")
                }
                Err(e) => {
                    warn!(neighbor = %target, "neighbor's blockchain rejected: {e}");
                    self.neighborhood.penalize(&target);
                }
            }
        }

        match best {
            Some((target, candidate)) if candidate.rank > local_rank => {
                self.replace(candidate);
                info!(neighbor = %target, "verification done: blockchain replaced");
                ChainUpdate::Replaced { target }
            }
            _ => {
                debug!("verification done: blockchain kept");
                ChainUpdate::Kept
            }
        }
    }

    /// Query every neighbor concurrently, each bounded by the validation
    /// timeout. Responses come back in neighbor order.
    async fn fetch(&self, start: u64) -> Vec<(Arc<dyn Neighbor>, Result<Vec<u8>, NetworkError>)> {
        let timeout = self.settings.validation_timeout();
        let mut fetches = JoinSet::new();
        for (order, neighbor) in self.neighborhood.neighbors().into_iter().enumerate() {
            fetches.spawn(async move {
                let response = request_blocks(neighbor.as_ref(), start, timeout).await;
                (order, neighbor, response)
            });
        }
        let mut responses = Vec::new();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok(response) => responses.push(response),
                Err(e) => warn!("neighbor fetch task failed: {e}"),
            }
        }
        responses.sort_by_key(|(order, _, _)| *order);
        responses
            .into_iter()
            .map(|(_, neighbor, response)| (neighbor, response))
            .collect()
    }

    /// Verify blocks served from height `start` against copies of the live
    /// state. `None` when the neighbor has nothing the local chain lacks.
    ///
    /// A first block that neither matches the local one nor links to the
    /// block below `start` is a [`VerificationError::Fork`]: the chains split
    /// further down.
    async fn verify(&self, start: u64, bytes: &[u8], now: i64) -> Result<Option<Candidate>, VerificationError> {
        let blocks = Block::list_from_json(bytes)?;
        if blocks.is_empty() {
            return Err(VerificationError::EmptyCandidate);
        }
        let (divergence, mut previous, ledger, registry) = {
            let state = self.state.read();
            let shared = blocks
                .iter()
                .zip(start..)
                .take_while(|(block, height)| {
                    state.entry(*height).is_some_and(|entry| entry.hash == block.hash())
                })
                .count();
            if shared == blocks.len() {
                return Ok(None);
            }
            let divergence = start + shared as u64;
            let previous = match divergence.checked_sub(1) {
                Some(height) => Some(
                    state
                        .link(height)
                        .ok_or(VerificationError::InvalidPreviousHash { height: divergence })?,
                ),
                None => None,
            };
            if let (0, Some(link)) = (shared, previous) {
                if blocks[0].previous_hash != link.hash {
                    return Err(VerificationError::Fork { height: start });
                }
            }
            let ledger = self.ledger.copy();
            let registry = self.registry.copy();
            let kept = usize::try_from(divergence - state.first_height).unwrap_or(usize::MAX);
            for entry in state.entries.iter().skip(kept).rev() {
                ledger.disconnect(&entry.undo);
                registry.revert(
                    &entry.block.added_registered_addresses,
                    &entry.block.removed_registered_addresses,
                );
            }
            (divergence, previous, ledger, registry)
        };

        let new_blocks = &blocks[(divergence - start) as usize..];
        let mut entries = Vec::with_capacity(new_blocks.len());
        for (offset, block) in new_blocks.iter().enumerate() {
            let height = divergence + offset as u64;
            let oldest = ledger.oldest_yielding_holder();
            let rewards_oldest = oldest
                .as_ref()
                .is_none_or(|oldest| block.validator_address() == Some(oldest));
            if offset + 1 == new_blocks.len() {
                if let (false, Some(oldest)) = (rewards_oldest, &oldest) {
                    return Err(VerificationError::ValidatorNotOldest {
                        rewarded: block.validator_address().map(ToString::to_string).unwrap_or_default(),
                        oldest: oldest.to_string(),
                    });
                }
                registry
                    .verify(
                        &block.added_registered_addresses,
                        &block.removed_registered_addresses,
                        self.oracle.as_ref(),
                    )
                    .await?;
            }
            let undo = match previous {
                None => self.verify_genesis(block, now, &ledger)?,
                Some(link) => {
                    if block.previous_hash != link.hash {
                        return Err(VerificationError::InvalidPreviousHash { height });
                    }
                    self.verify_block(block, link.timestamp, now, &ledger, &registry)?
                }
            };
            registry.update(&block.added_registered_addresses, &block.removed_registered_addresses);
            let hash = block.hash();
            previous = Some(Link { hash, timestamp: block.timestamp });
            entries.push(ChainEntry {
                block: Arc::new(block.clone()),
                hash,
                undo,
                rewards_oldest,
            });
        }

        let rank = Rank {
            length: divergence + entries.len() as u64,
            rewards_oldest: entries.last().is_none_or(|entry| entry.rewards_oldest),
        };
        Ok(Some(Candidate { divergence, entries, ledger, registry, rank }))
    }

    fn verify_genesis(&self, block: &Block, now: i64, ledger: &Ledger) -> Result<LedgerUndo, VerificationError> {
        if !block.previous_hash.is_zero() {
            return Err(VerificationError::InvalidGenesis("previous hash is not zero".to_string()));
        }
        if block.timestamp > now {
            return Err(VerificationError::InFuture { block: block.timestamp, now });
        }
        let [reward] = block.transactions.as_slice() else {
            return Err(VerificationError::InvalidGenesis("a single transaction is expected".to_string()));
        };
        if !reward.has_reward() {
            return Err(VerificationError::InvalidGenesis("the transaction is not a reward".to_string()));
        }
        if reward.reward_value() != self.settings.genesis_amount {
            return Err(VerificationError::InvalidGenesis(format!(
                "reward {} differs from the genesis amount {}",
                reward.reward_value(),
                self.settings.genesis_amount
            )));
        }
        for output in reward.outputs.iter().filter(|output| output.is_yielding) {
            if !block.added_registered_addresses.contains(&output.address) {
                return Err(VerificationError::YieldingAddressNotRegistered);
            }
        }
        Ok(ledger.connect(&block.transactions, block.timestamp)?)
    }

    /// Replay a neighbor block on `ledger`, checking every rule a locally
    /// closed block satisfies.
    fn verify_block(
        &self,
        block: &Block,
        previous_timestamp: i64,
        now: i64,
        ledger: &Ledger,
        registry: &AddressRegistry,
    ) -> Result<LedgerUndo, VerificationError> {
        let expected = previous_timestamp.saturating_add(self.settings.validation_timestamp());
        if block.timestamp != expected {
            return Err(VerificationError::InvalidTimestamp { expected, got: block.timestamp });
        }
        if block.timestamp > now {
            return Err(VerificationError::InFuture { block: block.timestamp, now });
        }
        let mut rewards = block.transactions.iter().filter(|transaction| transaction.has_reward());
        let reward = rewards.next();
        if rewards.next().is_some() {
            return Err(VerificationError::MultipleRewards);
        }

        let mut fees: u64 = 0;
        let mut undo = LedgerUndo::default();
        for transaction in &block.transactions {
            if transaction.timestamp > block.timestamp {
                return Err(VerificationError::TransactionTooFarInFuture { txid: transaction.id.to_string() });
            }
            if transaction.timestamp < previous_timestamp {
                return Err(VerificationError::TransactionTooOld { txid: transaction.id.to_string() });
            }
            for output in transaction.outputs.iter().filter(|output| output.is_yielding) {
                if !is_registered_after(
                    registry,
                    &block.added_registered_addresses,
                    &block.removed_registered_addresses,
                    &output.address,
                ) {
                    return Err(VerificationError::YieldingAddressNotRegistered);
                }
            }
            if transaction.has_reward() {
                continue;
            }
            verify_signatures(transaction)?;
            let fee = ledger.calculate_fee(
                transaction,
                block.timestamp,
                self.model.as_ref(),
                self.settings.minimal_transaction_fee,
            )?;
            fees = fees.checked_add(fee).ok_or(TransactionError::ValueOverflow)?;
            undo.append(ledger.connect(std::slice::from_ref(transaction), block.timestamp)?);
        }

        let reward = reward.ok_or(VerificationError::NotRewarded)?;
        if reward.reward_value() > fees {
            return Err(VerificationError::RewardExceedsFees { reward: reward.reward_value(), fees });
        }
        undo.append(ledger.connect(std::slice::from_ref(reward), block.timestamp)?);
        Ok(undo)
    }

    fn replace(&self, candidate: Candidate) {
        let Candidate { divergence, entries, ledger, registry, .. } = candidate;
        // Removals queued by a synchronization that ran during verification.
        registry.queue_removals(&self.registry.removed_addresses());
        let mut state = self.state.write();
        state.truncate(divergence);
        for entry in entries {
            state.push(entry, self.settings.blocks_count_limit);
        }
        self.ledger.assign(ledger);
        self.registry.assign(registry);
    }
}

async fn request_blocks(neighbor: &dyn Neighbor, start: u64, timeout: Duration) -> Result<Vec<u8>, NetworkError> {
    tokio::time::timeout(timeout, neighbor.get_blocks(start))
        .await
        .unwrap_or(Err(NetworkError::Timeout))
}

/// Whether `address` is registered once a block announcing `added` and
/// `removed` applies on top of `registry`.
fn is_registered_after(registry: &AddressRegistry, added: &[Address], removed: &[Address], address: &Address) -> bool {
    !removed.contains(address) && (added.contains(address) || registry.is_registered(address))
}

fn rewards_oldest(ledger: &Ledger, block: &Block) -> bool {
    ledger
        .oldest_yielding_holder()
        .is_none_or(|oldest| block.validator_address() == Some(&oldest))
}
