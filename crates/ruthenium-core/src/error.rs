//! Error types for the Ruthenium protocol.
//!
//! Every rejection reason carries a stable message: operators grep the logs
//! for them and the test suites assert on them.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("malformed transaction: {0}")] Malformed(String),
    #[error("wrong transaction ID: declared {declared}, computed {computed}")] WrongId { declared: String, computed: String },
    #[error("multiple rewards attempt for the same transaction")] MultipleRewardOutputs,
    #[error("reward not found whereas the transaction has no input")] MissingRewardOutput,
    #[error("failed to verify signature of input {index}: {source}")] InvalidSignature { index: usize, source: CryptoError },
    #[error("output address does not derive from the input public key: {0}")] AddressMismatch(String),
    #[error("unknown UTXO: {0}")] UnknownUtxo(String),
    #[error("fee is negative")] NegativeFee,
    #[error("fee is too low: {fee} < {minimal}")] FeeTooLow { fee: u64, minimal: u64 },
    #[error("the transaction timestamp is too far in the future: {timestamp} > {limit}")] TooFarInFuture { timestamp: i64, limit: i64 },
    #[error("the transaction timestamp is too old: {timestamp} < {limit}")] TooOld { timestamp: i64, limit: i64 },
    #[error("value overflow")] ValueOverflow,
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("UTXO not found: {0}")] NotFound(String),
    #[error("transaction already applied: {0}")] DuplicateTransaction(String),
    #[error("multiple yielding UTXOs for address {0}")] MultipleYieldingOutputs(String),
    #[error("transaction error: {0}")] Transaction(#[from] TransactionError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("neighbor {0} is unreachable")] Unreachable(String),
    #[error("neighbor's response timeout")] Timeout,
    #[error("malformed response: {0}")] Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("an added address is not registered: {0}")] AddedAddressNotRegistered(String),
    #[error("a removed address is still registered: {0}")] RemovedAddressStillRegistered(String),
    #[error("oracle: {0}")] Oracle(String),
}

/// Failures while closing a local block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("a block with the same timestamp is already in the blockchain")] SameTimestamp,
    #[error("a block is missing in the blockchain: expected timestamp {expected}, got {got}")] Missing { expected: i64, got: i64 },
    #[error("block timestamp {got} does not follow the last block, expected {expected}")] UnexpectedTimestamp { expected: i64, got: i64 },
    #[error("a yielding output address is not registered: {0}")] YieldingAddressNotRegistered(String),
    #[error("failed to add UTXOs: {0}")] Ledger(#[from] LedgerError),
    #[error("serialization: {0}")] Serialization(String),
}

/// Reasons a transaction is not admitted into the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("the blockchain is empty")] EmptyBlockchain,
    #[error("the transaction is already in the transactions pool")] AlreadyInPool,
    #[error("reward transactions are only created by validators")] UnexpectedReward,
    #[error("yielding output address is not eligible: {0}")] IneligibleYieldingAddress(String),
    #[error("invalid transaction: {0}")] Transaction(#[from] TransactionError),
    #[error("failed to simulate the transactions pool: {0}")] Ledger(#[from] LedgerError),
}

/// Rejection reasons for a neighbor's candidate chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("failed to get neighbor's blockchain: {0}")] Fetch(#[from] NetworkError),
    #[error("neighbor's blockchain is empty")] EmptyCandidate,
    #[error("a previous neighbor block hash is invalid: block height {height}")] InvalidPreviousHash { height: u64 },
    #[error("neighbor blockchain forks below height {height}")] Fork { height: u64 },
    #[error("neighbor genesis block is invalid: {0}")] InvalidGenesis(String),
    #[error("neighbor block timestamp is invalid: block timestamp is {got}, expected is {expected}")] InvalidTimestamp { expected: i64, got: i64 },
    #[error("neighbor block timestamp is in the future: block timestamp is {block}, now is {now}")] InFuture { block: i64, now: i64 },
    #[error("multiple rewards attempt for the same neighbor block")] MultipleRewards,
    #[error("neighbor block has not been rewarded")] NotRewarded,
    #[error("neighbor block reward exceeds the consented one: reward {reward}, fees {fees}")] RewardExceedsFees { reward: u64, fees: u64 },
    #[error("a neighbor block transaction timestamp is too far in the future: transaction {txid}")] TransactionTooFarInFuture { txid: String },
    #[error("a neighbor block transaction timestamp is too old: transaction {txid}")] TransactionTooOld { txid: String },
    #[error("neighbor transaction is invalid: {0}")] Transaction(#[from] TransactionError),
    #[error("a neighbor block transaction yielding output address is not registered")] YieldingAddressNotRegistered,
    #[error("failed to verify registered addresses: {0}")] Registry(#[from] RegistryError),
    #[error("failed to apply neighbor block: {0}")] Ledger(#[from] LedgerError),
    #[error("neighbor validator is not the oldest: rewarded {rewarded}, oldest {oldest}")] ValidatorNotOldest { rewarded: String, oldest: String },
}

#[derive(Error, Debug)]
pub enum RutheniumError {
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Crypto(#[from] CryptoError),
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Registry(#[from] RegistryError),
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Pool(#[from] PoolError),
    #[error(transparent)] Verification(#[from] VerificationError),
}
