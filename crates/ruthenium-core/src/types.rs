//! Core protocol types: transactions, blocks, UTXOs.
//!
//! All monetary values are in the smallest currency unit and never pass
//! through floating point outside of the value model.
//! Timestamps are Unix nanoseconds.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::TransactionError;
use crate::traits::ValueModel;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3) and block hashes (SHA-256).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Previous hash of the genesis block.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Account address: `0x` followed by the hex of the first 20 bytes of the
/// BLAKE3 hash of an Ed25519 public key.
///
/// See [`PublicKey::address`](crate::crypto::PublicKey::address).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Number of hash bytes kept in an address.
    pub const HASH_LEN: usize = 20;

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive the address owning outputs signed by `public_key_bytes`.
    pub fn from_public_key_bytes(public_key_bytes: &[u8; 32]) -> Self {
        let digest = blake3::hash(public_key_bytes);
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[..Self::HASH_LEN])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputInfo {
    pub transaction_id: Hash256,
    pub output_index: u16,
}

impl InputInfo {
    pub fn new(transaction_id: Hash256, output_index: u16) -> Self {
        Self { transaction_id, output_index }
    }
}

impl fmt::Display for InputInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

/// A transaction input, spending a previous output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Input {
    /// The output being spent.
    pub info: InputInfo,
    /// Ed25519 public key (32 bytes).
    pub public_key: Vec<u8>,
    /// Ed25519 signature (64 bytes).
    pub signature: Vec<u8>,
}

impl Input {
    /// An input waiting for [`sign_transaction_input`](crate::crypto::sign_transaction_input).
    pub fn unsigned(info: InputInfo) -> Self {
        Self { info, public_key: Vec::new(), signature: Vec::new() }
    }
}

/// A transaction output, creating a new UTXO.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub address: Address,
    /// Opts the output into the income model. At most one live per address.
    pub is_yielding: bool,
    pub initial_value: u64,
}

impl Output {
    pub fn new(address: Address, is_yielding: bool, initial_value: u64) -> Self {
        Self { address, is_yielding, initial_value }
    }

    /// Whether applying this output creates anything worth tracking.
    pub fn is_material(&self) -> bool {
        self.initial_value > 0 || self.is_yielding
    }
}

/// A transaction transferring value between addresses.
///
/// A transaction without inputs is the reward transaction of its block and
/// carries exactly one output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Content hash, see [`Transaction::compute_id`].
    pub id: Hash256,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub timestamp: i64,
}

impl Transaction {
    /// Build a transaction and stamp its content id.
    ///
    /// Inputs are usually unsigned at this point; call
    /// [`Transaction::refresh_id`] after signing.
    pub fn new(inputs: Vec<Input>, outputs: Vec<Output>, timestamp: i64) -> Self {
        let mut transaction = Self { id: Hash256::ZERO, inputs, outputs, timestamp };
        transaction.refresh_id();
        transaction
    }

    /// The validator's compensation: no input, a single output.
    pub fn reward(recipient: Address, is_yielding: bool, timestamp: i64, value: u64) -> Self {
        Self::new(Vec::new(), vec![Output::new(recipient, is_yielding, value)], timestamp)
    }

    /// BLAKE3 over the canonical byte layout of inputs, outputs and timestamp.
    pub fn compute_id(&self) -> Hash256 {
        let mut data = Vec::new();
        data.extend_from_slice(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(input.info.transaction_id.as_bytes());
            data.extend_from_slice(&input.info.output_index.to_le_bytes());
            write_bytes(&mut data, &input.public_key);
            write_bytes(&mut data, &input.signature);
        }
        write_outputs(&mut data, &self.outputs);
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        Hash256(blake3::hash(&data).into())
    }

    pub fn refresh_id(&mut self) {
        self.id = self.compute_id();
    }

    pub fn has_reward(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Recipient of a reward transaction.
    pub fn reward_recipient(&self) -> Option<&Address> {
        if self.has_reward() {
            self.outputs.first().map(|output| &output.address)
        } else {
            None
        }
    }

    pub fn reward_value(&self) -> u64 {
        if self.has_reward() {
            self.outputs.first().map_or(0, |output| output.initial_value)
        } else {
            0
        }
    }

    /// Sum of all output initial values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.initial_value))
    }

    /// Checks every decoded transaction must pass before entering any state.
    pub fn verify_structure(&self) -> Result<(), TransactionError> {
        let computed = self.compute_id();
        if computed != self.id {
            return Err(TransactionError::WrongId {
                declared: self.id.to_string(),
                computed: computed.to_string(),
            });
        }
        if self.has_reward() {
            match self.outputs.len() {
                0 => return Err(TransactionError::MissingRewardOutput),
                1 => {}
                _ => return Err(TransactionError::MultipleRewardOutputs),
            }
        }
        Ok(())
    }

    /// Decode a transaction received from the network.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TransactionError> {
        let transaction: Self = serde_json::from_slice(bytes)
            .map_err(|e| TransactionError::Malformed(e.to_string()))?;
        transaction.verify_structure()?;
        Ok(transaction)
    }
}

/// Gossip envelope for a transaction, naming the peer that relayed it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub transaction: Transaction,
    pub transaction_broadcaster_target: String,
}

impl TransactionRequest {
    pub fn new(transaction: Transaction, transaction_broadcaster_target: impl Into<String>) -> Self {
        Self {
            transaction,
            transaction_broadcaster_target: transaction_broadcaster_target.into(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, TransactionError> {
        serde_json::to_vec(self).map_err(|e| TransactionError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, TransactionError> {
        let request: Self = serde_json::from_slice(bytes)
            .map_err(|e| TransactionError::Malformed(e.to_string()))?;
        request.transaction.verify_structure()?;
        Ok(request)
    }
}

/// A block of the chain. Immutable once created.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub previous_hash: Hash256,
    pub added_registered_addresses: Vec<Address>,
    pub removed_registered_addresses: Vec<Address>,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        previous_hash: Hash256,
        added_registered_addresses: Vec<Address>,
        removed_registered_addresses: Vec<Address>,
        timestamp: i64,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            previous_hash,
            added_registered_addresses,
            removed_registered_addresses,
            timestamp,
            transactions,
        }
    }

    /// SHA-256 over the canonical byte layout of every field.
    ///
    /// Layout: previous_hash || added || removed || timestamp || transactions,
    /// where lists are length-prefixed and integers little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::new();
        data.extend_from_slice(self.previous_hash.as_bytes());
        write_addresses(&mut data, &self.added_registered_addresses);
        write_addresses(&mut data, &self.removed_registered_addresses);
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for transaction in &self.transactions {
            data.extend_from_slice(transaction.compute_id().as_bytes());
        }
        Hash256(Sha256::digest(&data).into())
    }

    /// The address rewarded by this block, if any.
    pub fn validator_address(&self) -> Option<&Address> {
        self.transactions.iter().find_map(Transaction::reward_recipient)
    }

    /// Decode a block list received from a neighbor.
    pub fn list_from_json(bytes: &[u8]) -> Result<Vec<Self>, TransactionError> {
        let blocks: Vec<Self> = serde_json::from_slice(bytes)
            .map_err(|e| TransactionError::Malformed(e.to_string()))?;
        for block in &blocks {
            for transaction in &block.transactions {
                transaction.verify_structure()?;
            }
        }
        Ok(blocks)
    }
}

/// An unspent output, owned by the [`Ledger`](crate::ledger::Ledger).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub input_info: InputInfo,
    pub output: Output,
    /// Timestamp of the block that created the output.
    pub timestamp: i64,
}

impl Utxo {
    pub fn new(input_info: InputInfo, output: Output, timestamp: i64) -> Self {
        Self { input_info, output, timestamp }
    }

    pub fn address(&self) -> &Address {
        &self.output.address
    }

    pub fn is_yielding(&self) -> bool {
        self.output.is_yielding
    }

    /// Spendable value at `now` according to `model`.
    pub fn value(&self, now: i64, model: &dyn ValueModel) -> u64 {
        let elapsed = now.saturating_sub(self.timestamp);
        model.value(self.output.initial_value, self.output.is_yielding, elapsed)
    }

    pub fn view(&self) -> UtxoView {
        UtxoView {
            address: self.output.address.clone(),
            is_yielding: self.output.is_yielding,
            output_index: self.input_info.output_index,
            transaction_id: self.input_info.transaction_id,
            value: self.output.initial_value,
            timestamp: self.timestamp,
        }
    }
}

/// Serialized form of a [`Utxo`] handed to clients.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UtxoView {
    pub address: Address,
    pub is_yielding: bool,
    pub output_index: u16,
    pub transaction_id: Hash256,
    /// Initial value; clients apply the value model themselves.
    pub value: u64,
    pub timestamp: i64,
}

fn write_bytes(data: &mut Vec<u8>, bytes: &[u8]) {
    data.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    data.extend_from_slice(bytes);
}

fn write_addresses(data: &mut Vec<u8>, addresses: &[Address]) {
    data.extend_from_slice(&(addresses.len() as u64).to_le_bytes());
    for address in addresses {
        write_bytes(data, address.as_str().as_bytes());
    }
}

pub(crate) fn write_outputs(data: &mut Vec<u8>, outputs: &[Output]) {
    data.extend_from_slice(&(outputs.len() as u64).to_le_bytes());
    for output in outputs {
        write_bytes(data, output.address.as_str().as_bytes());
        data.push(u8::from(output.is_yielding));
        data.extend_from_slice(&output.initial_value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_address() -> Address {
        Address::from_public_key_bytes(&[0xAA; 32])
    }

    fn sample_tx() -> Transaction {
        Transaction::new(
            vec![Input {
                info: InputInfo::new(Hash256([1; 32]), 0),
                public_key: vec![2; 32],
                signature: vec![3; 64],
            }],
            vec![Output::new(sample_address(), false, 40)],
            7,
        )
    }

    fn sample_block() -> Block {
        Block::new(
            Hash256([9; 32]),
            vec![sample_address()],
            Vec::new(),
            1_000,
            vec![sample_tx(), Transaction::reward(sample_address(), false, 1_000, 5)],
        )
    }

    // --- Hash256 / Address ---

    #[test]
    fn hash256_display_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        let display = format!("{}", Hash256(bytes));
        assert!(display.starts_with("ab00"));
        assert_eq!(display.len(), 64);
    }

    #[test]
    fn address_derivation_format() {
        let address = sample_address();
        assert!(address.as_str().starts_with("0x"));
        assert_eq!(address.as_str().len(), 2 + 2 * Address::HASH_LEN);
        assert_eq!(address, Address::from_public_key_bytes(&[0xAA; 32]));
        assert_ne!(address, Address::from_public_key_bytes(&[0xAB; 32]));
    }

    // --- Transaction ---

    #[test]
    fn transaction_id_deterministic() {
        assert_eq!(sample_tx().id, sample_tx().compute_id());
        assert!(!sample_tx().id.is_zero());
    }

    #[test]
    fn transaction_id_changes_with_timestamp() {
        let mut tx = sample_tx();
        tx.timestamp += 1;
        assert_ne!(tx.compute_id(), sample_tx().id);
    }

    #[test]
    fn transaction_id_commits_to_signature() {
        let mut tx = sample_tx();
        tx.inputs[0].signature[0] ^= 1;
        assert_ne!(tx.compute_id(), sample_tx().id);
    }

    #[test]
    fn reward_detection() {
        let reward = Transaction::reward(sample_address(), true, 3, 12);
        assert!(reward.has_reward());
        assert_eq!(reward.reward_recipient(), Some(&sample_address()));
        assert_eq!(reward.reward_value(), 12);
        assert!(!sample_tx().has_reward());
        assert_eq!(sample_tx().reward_recipient(), None);
        assert_eq!(sample_tx().reward_value(), 0);
    }

    #[test]
    fn total_output_value_overflow_returns_none() {
        let tx = Transaction::new(
            Vec::new(),
            vec![
                Output::new(sample_address(), false, u64::MAX),
                Output::new(sample_address(), false, 1),
            ],
            0,
        );
        assert_eq!(tx.total_output_value(), None);
    }

    #[test]
    fn verify_structure_rejects_tampered_id() {
        let mut tx = sample_tx();
        tx.outputs[0].initial_value += 1;
        assert!(matches!(tx.verify_structure(), Err(TransactionError::WrongId { .. })));
    }

    #[test]
    fn verify_structure_rejects_reward_with_two_outputs() {
        let tx = Transaction::new(
            Vec::new(),
            vec![
                Output::new(sample_address(), false, 1),
                Output::new(sample_address(), false, 1),
            ],
            0,
        );
        assert_eq!(tx.verify_structure(), Err(TransactionError::MultipleRewardOutputs));
    }

    #[test]
    fn verify_structure_rejects_reward_without_output() {
        let tx = Transaction::new(Vec::new(), Vec::new(), 0);
        assert_eq!(tx.verify_structure(), Err(TransactionError::MissingRewardOutput));
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(matches!(
            Transaction::from_json(b"{not json"),
            Err(TransactionError::Malformed(_))
        ));
    }

    #[test]
    fn from_json_checks_id() {
        let mut tx = sample_tx();
        tx.timestamp = 8;
        let bytes = serde_json::to_vec(&tx).unwrap();
        assert!(matches!(Transaction::from_json(&bytes), Err(TransactionError::WrongId { .. })));
    }

    #[test]
    fn transaction_request_json() {
        let request = TransactionRequest::new(sample_tx(), "127.0.0.1:8106");
        let decoded = TransactionRequest::from_json(&request.to_json().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    // --- Block ---

    #[test]
    fn block_hash_deterministic() {
        assert_eq!(sample_block().hash(), sample_block().hash());
    }

    #[test]
    fn block_hash_chains_previous_hash() {
        let mut block = sample_block();
        block.previous_hash = Hash256([8; 32]);
        assert_ne!(block.hash(), sample_block().hash());
    }

    #[test]
    fn block_hash_covers_registry_changes() {
        let mut block = sample_block();
        block.removed_registered_addresses.push(Address::from("0x01"));
        assert_ne!(block.hash(), sample_block().hash());
    }

    #[test]
    fn block_validator_address() {
        assert_eq!(sample_block().validator_address(), Some(&sample_address()));
        let empty = Block::new(Hash256::ZERO, Vec::new(), Vec::new(), 0, Vec::new());
        assert_eq!(empty.validator_address(), None);
    }

    #[test]
    fn block_list_from_json_checks_transactions() {
        let mut block = sample_block();
        block.transactions[0].timestamp = 99;
        let bytes = serde_json::to_vec(&vec![block]).unwrap();
        assert!(Block::list_from_json(&bytes).is_err());

        let bytes = serde_json::to_vec(&vec![sample_block()]).unwrap();
        assert_eq!(Block::list_from_json(&bytes).unwrap(), vec![sample_block()]);
    }

    // --- Utxo ---

    #[test]
    fn utxo_view_carries_initial_value() {
        let utxo = Utxo::new(
            InputInfo::new(Hash256([4; 32]), 2),
            Output::new(sample_address(), true, 77),
            50,
        );
        let view = utxo.view();
        assert_eq!(view.value, 77);
        assert_eq!(view.output_index, 2);
        assert!(view.is_yielding);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["address"], serde_json::json!(sample_address().as_str()));
    }
}
