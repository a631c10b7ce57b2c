//! The transactions pool: admission, gossip and block closing.
//!
//! Transactions are advisory. A rejected transaction is logged and dropped,
//! the sender gets no answer beyond the initial decode.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use ruthenium_core::crypto::verify_signatures;
use ruthenium_core::error::{BlockError, PoolError, TransactionError};
use ruthenium_core::ledger::Ledger;
use ruthenium_core::traits::Clock;
use ruthenium_core::types::{Address, Hash256, Transaction, TransactionRequest};

use crate::blockchain::Blockchain;

pub struct TransactionsPool {
    transactions: Mutex<Vec<Transaction>>,
    blockchain: Arc<Blockchain>,
    clock: Arc<dyn Clock>,
    /// Recipient of the rewards of locally closed blocks.
    validator_address: Option<Address>,
}

impl fmt::Debug for TransactionsPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionsPool")
            .field("validator_address", &self.validator_address)
            .finish_non_exhaustive()
    }
}

impl TransactionsPool {
    pub fn new(blockchain: Arc<Blockchain>, clock: Arc<dyn Clock>, validator_address: Option<Address>) -> Self {
        Self {
            transactions: Mutex::new(Vec::new()),
            blockchain,
            clock,
            validator_address,
        }
    }

    /// Snapshot of the pending transactions.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.lock().clone()
    }

    pub fn transactions_json(&self) -> Result<Vec<u8>, TransactionError> {
        serde_json::to_vec(&*self.transactions.lock())
            .map_err(|e| TransactionError::Serialization(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.transactions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.lock().is_empty()
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit a JSON-encoded [`TransactionRequest`], then relay it to every
    /// neighbor but its broadcaster, naming `host_target` as the new one.
    pub fn add_transaction(&self, request_bytes: &[u8], host_target: &str) {
        let request = match self.admit(request_bytes) {
            Ok(request) => request,
            Err(e) => {
                debug!("failed to add transaction: {e}");
                return;
            }
        };
        let TransactionRequest { transaction, transaction_broadcaster_target: origin } = request;
        debug!(txid = %transaction.id, %origin, "transaction added to the pool");
        self.blockchain.neighborhood().incentive(&origin);
        self.broadcast(TransactionRequest::new(transaction, host_target), &origin);
    }

    fn admit(&self, request_bytes: &[u8]) -> Result<TransactionRequest, PoolError> {
        let request = TransactionRequest::from_json(request_bytes)?;
        let transaction = &request.transaction;
        if self.blockchain.is_empty() {
            return Err(PoolError::EmptyBlockchain);
        }
        if transaction.has_reward() {
            return Err(PoolError::UnexpectedReward);
        }
        let settings = self.blockchain.settings();
        let interval = settings.validation_timestamp();
        let last_block_timestamp = self.blockchain.last_block_timestamp();
        let limit = self.clock.now().saturating_add(interval);
        if transaction.timestamp > limit {
            return Err(TransactionError::TooFarInFuture { timestamp: transaction.timestamp, limit }.into());
        }
        // One interval below the last block: a neighbor that has not adopted
        // that block yet can still commit the transaction. Locally it is
        // dropped by the next validation.
        let limit = last_block_timestamp.saturating_sub(interval);
        if transaction.timestamp < limit {
            return Err(TransactionError::TooOld { timestamp: transaction.timestamp, limit }.into());
        }
        verify_signatures(transaction)?;

        let next_block_timestamp = last_block_timestamp.saturating_add(interval);
        let mut transactions = self.transactions.lock();
        if transactions.iter().any(|pending| pending.id == transaction.id) {
            return Err(PoolError::AlreadyInPool);
        }
        let simulation = self.blockchain.ledger().copy();
        simulation.update_utxos(&transactions, next_block_timestamp)?;
        simulation.calculate_fee(
            transaction,
            next_block_timestamp,
            self.blockchain.model().as_ref(),
            settings.minimal_transaction_fee,
        )?;
        transactions.push(transaction.clone());
        Ok(request)
    }

    /// Relay on spawned tasks: a failing neighbor never affects admission.
    fn broadcast(&self, request: TransactionRequest, origin: &str) {
        let bytes = match request.to_json() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode transaction request: {e}");
                return;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, transaction not relayed");
            return;
        };
        for neighbor in self.blockchain.neighborhood().neighbors() {
            if neighbor.target() == origin {
                continue;
            }
            let bytes = bytes.clone();
            runtime.spawn(async move {
                if let Err(e) = neighbor.add_transaction(bytes).await {
                    debug!(neighbor = neighbor.target(), "failed to relay transaction: {e}");
                }
            });
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Close the block of `timestamp` with the pending transactions that are
    /// still valid. Failures are logged; the pool keeps its transactions.
    pub async fn validate(&self, timestamp: i64) {
        let Some(validator_address) = self.validator_address.clone() else {
            debug!("no validator address, block not closed");
            return;
        };
        if let Err(e) = self.close_block(timestamp, validator_address).await {
            error!("unable to create block: {e}");
        }
    }

    async fn close_block(&self, timestamp: i64, validator_address: Address) -> Result<(), BlockError> {
        let settings = self.blockchain.settings();
        if self.blockchain.is_empty() {
            let yielding = self
                .blockchain
                .registry()
                .is_eligible(&validator_address, self.blockchain.oracle().as_ref())
                .await;
            let reward = Transaction::reward(validator_address.clone(), yielding, timestamp, settings.genesis_amount);
            self.blockchain
                .add_block(timestamp, vec![reward], &[validator_address])
                .await?;
            info!(timestamp, "genesis block closed");
            return Ok(());
        }

        let last_block_timestamp = self.blockchain.last_block_timestamp();
        let next_block_timestamp = last_block_timestamp.saturating_add(settings.validation_timestamp());
        if last_block_timestamp == timestamp {
            return Err(BlockError::SameTimestamp);
        }
        if timestamp > next_block_timestamp {
            return Err(BlockError::Missing { expected: next_block_timestamp, got: timestamp });
        }

        let mut pending = self.transactions();
        pending.shuffle(&mut StdRng::seed_from_u64(timestamp as u64));
        let scratch = self.blockchain.ledger().copy();
        let mut reward: u64 = 0;
        let mut selected = Vec::with_capacity(pending.len() + 1);
        let mut rejected = HashSet::new();
        for transaction in pending {
            match self.screen(&transaction, &scratch, last_block_timestamp, timestamp).await {
                Ok(fee) => {
                    reward = reward.saturating_add(fee);
                    selected.push(transaction);
                }
                Err(e) => {
                    warn!(txid = %transaction.id, "transaction removed from the transactions pool: {e}");
                    rejected.insert(transaction.id);
                }
            }
        }

        let new_addresses: Vec<Address> = selected
            .iter()
            .flat_map(|transaction| &transaction.outputs)
            .filter(|output| output.is_yielding)
            .map(|output| output.address.clone())
            .collect();
        let mut removed: HashSet<Hash256> = selected.iter().map(|transaction| transaction.id).collect();
        selected.push(Transaction::reward(validator_address, false, timestamp, reward));
        self.blockchain
            .add_block(timestamp, selected, &new_addresses)
            .await?;
        removed.extend(rejected);
        self.transactions
            .lock()
            .retain(|transaction| !removed.contains(&transaction.id));
        debug!(timestamp, reward, "block closed");
        Ok(())
    }

    /// Check a pooled transaction against the block closing at `timestamp`
    /// and apply it to `scratch`. Returns its fee.
    async fn screen(
        &self,
        transaction: &Transaction,
        scratch: &Ledger,
        last_block_timestamp: i64,
        timestamp: i64,
    ) -> Result<u64, PoolError> {
        if transaction.timestamp > timestamp {
            return Err(TransactionError::TooFarInFuture { timestamp: transaction.timestamp, limit: timestamp }.into());
        }
        if transaction.timestamp < last_block_timestamp {
            return Err(TransactionError::TooOld { timestamp: transaction.timestamp, limit: last_block_timestamp }.into());
        }
        let registry = self.blockchain.registry();
        for output in transaction.outputs.iter().filter(|output| output.is_yielding) {
            if !registry.is_eligible(&output.address, self.blockchain.oracle().as_ref()).await {
                return Err(PoolError::IneligibleYieldingAddress(output.address.to_string()));
            }
        }
        verify_signatures(transaction)?;
        let fee = scratch.calculate_fee(
            transaction,
            timestamp,
            self.blockchain.model().as_ref(),
            self.blockchain.settings().minimal_transaction_fee,
        )?;
        scratch.update_utxos(std::slice::from_ref(transaction), timestamp)?;
        Ok(fee)
    }
}
