//! Shared builders for the integration tests.

use std::sync::Arc;

use ruthenium_consensus::{AddressRegistry, Blockchain, TransactionsPool};
use ruthenium_core::crypto::{sign_transaction_input, KeyPair};
use ruthenium_core::ledger::Ledger;
use ruthenium_core::settings::ProtocolSettings;
use ruthenium_core::testing::{FlatValueModel, ManualClock, StubNeighbor, StubNeighborhood, StubOracle};
use ruthenium_core::traits::{Clock, HumanityOracle, Neighborhood};
use ruthenium_core::types::{Address, Block, Input, Output, Transaction, TransactionRequest, Utxo};

pub const SECOND: i64 = 1_000_000_000;
pub const GENESIS_AMOUNT: u64 = 1_000_000;
pub const MINIMAL_FEE: u64 = 10;

/// Deterministic key pair from a seed byte.
pub fn key(seed: u8) -> KeyPair {
    KeyPair::from_secret_bytes([seed; 32])
}

/// One-second blocks, small genesis, flat values unless a test swaps the model.
pub fn settings() -> ProtocolSettings {
    ProtocolSettings {
        genesis_amount: GENESIS_AMOUNT,
        minimal_transaction_fee: MINIMAL_FEE,
        validation_interval_in_seconds: 1,
        ..ProtocolSettings::default()
    }
}

/// A blockchain with its stub collaborators.
pub struct Chain {
    pub blockchain: Arc<Blockchain>,
    pub neighborhood: Arc<StubNeighborhood>,
    pub oracle: Arc<StubOracle>,
}

pub fn chain(
    settings: ProtocolSettings,
    registered: &[Address],
    neighbors: Vec<Arc<StubNeighbor>>,
) -> Chain {
    let neighborhood = Arc::new(StubNeighborhood::new(neighbors));
    let oracle = Arc::new(StubOracle::new(registered.iter().cloned()));
    let blockchain = Arc::new(Blockchain::new(
        settings,
        Arc::new(Ledger::new()),
        Arc::new(AddressRegistry::new()),
        Arc::new(FlatValueModel),
        Arc::clone(&neighborhood) as Arc<dyn Neighborhood>,
        Arc::clone(&oracle) as Arc<dyn HumanityOracle>,
    ));
    Chain { blockchain, neighborhood, oracle }
}

/// A chain closing its own blocks through a pool, on a manual clock.
pub struct Validator {
    pub chain: Chain,
    pub pool: TransactionsPool,
    pub clock: Arc<ManualClock>,
    pub key: KeyPair,
}

pub fn validator(settings: ProtocolSettings, key: KeyPair) -> Validator {
    let chain = chain(settings, &[key.address()], Vec::new());
    let clock = Arc::new(ManualClock::new(0));
    let pool = TransactionsPool::new(
        Arc::clone(&chain.blockchain),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Some(key.address()),
    );
    Validator { chain, pool, clock, key }
}

impl Validator {
    /// Submit `transaction` as if relayed by a client, with the clock at `now`.
    pub fn submit(&self, transaction: Transaction, now: i64) {
        self.clock.set(now);
        self.pool.add_transaction(&request(transaction), "client");
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.chain.blockchain.blocks(0)
    }
}

/// JSON-encoded request carrying `transaction`.
pub fn request(transaction: Transaction) -> Vec<u8> {
    TransactionRequest::new(transaction, "client")
        .to_json()
        .expect("encodable request")
}

/// `owner` spending `utxo` into `outputs`, signed.
pub fn pay(owner: &KeyPair, utxo: &Utxo, outputs: Vec<Output>, timestamp: i64) -> Transaction {
    let mut transaction = Transaction::new(vec![Input::unsigned(utxo.input_info.clone())], outputs, timestamp);
    sign_transaction_input(&mut transaction, 0, owner).expect("owner signs its own input");
    transaction
}

/// Genesis paying `validator`, then `count - 1` empty blocks rewarding it.
pub async fn grow(blockchain: &Blockchain, validator: &Address, count: i64) {
    let genesis = Transaction::reward(validator.clone(), true, 0, blockchain.settings().genesis_amount);
    blockchain
        .add_block(0, vec![genesis], std::slice::from_ref(validator))
        .await
        .expect("genesis block");
    for height in 1..count {
        let timestamp = height * SECOND;
        let reward = Transaction::reward(validator.clone(), false, timestamp, 0);
        blockchain
            .add_block(timestamp, vec![reward], &[])
            .await
            .expect("empty block");
    }
}

/// Empty block rewarding `rewarded` on top of `previous`.
pub fn empty_block(previous: &Block, rewarded: &Address) -> Block {
    let timestamp = previous.timestamp + SECOND;
    Block::new(
        previous.hash(),
        Vec::new(),
        Vec::new(),
        timestamp,
        vec![Transaction::reward(rewarded.clone(), false, timestamp, 0)],
    )
}

pub fn current_thread_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}
