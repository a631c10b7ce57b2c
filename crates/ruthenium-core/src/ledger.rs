//! The UTXO ledger.
//!
//! Two indices over one set of [`Utxo`]s: by owning address (balances, coin
//! selection) and by `(transaction id, output index)` (input resolution).
//! Both live behind a single `RwLock`, so every reader sees them agree.
//!
//! Batches are applied to a clone of the indices and swapped in only once
//! the whole batch, including the yielding-output invariant, has been
//! validated. A failed batch leaves the ledger untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::crypto::input_address;
use crate::error::{LedgerError, TransactionError};
use crate::traits::ValueModel;
use crate::types::{Address, Hash256, InputInfo, Transaction, Utxo, UtxoView};

/// Undo data for reverting an applied batch.
///
/// Stores the transaction ids that materialized outputs and the UTXOs the
/// batch consumed, so a chain replacement can rewind the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerUndo {
    /// Transactions whose outputs were indexed, in application order.
    created: Vec<Hash256>,
    /// Spent UTXOs in the order they were consumed.
    spent: Vec<Arc<Utxo>>,
}

impl LedgerUndo {
    pub fn spent_count(&self) -> usize {
        self.spent.len()
    }

    /// Merge the undo data of a batch applied right after this one.
    pub fn append(&mut self, mut next: LedgerUndo) {
        self.created.append(&mut next.created);
        self.spent.append(&mut next.spent);
    }
}

#[derive(Clone, Debug, Default)]
struct UtxoIndex {
    by_address: HashMap<Address, Vec<Arc<Utxo>>>,
    by_id: HashMap<Hash256, BTreeMap<u16, Arc<Utxo>>>,
}

impl UtxoIndex {
    fn get(&self, info: &InputInfo) -> Option<&Arc<Utxo>> {
        self.by_id
            .get(&info.transaction_id)
            .and_then(|outputs| outputs.get(&info.output_index))
    }

    fn insert(&mut self, utxo: Arc<Utxo>) {
        self.by_address
            .entry(utxo.address().clone())
            .or_default()
            .push(Arc::clone(&utxo));
        self.by_id
            .entry(utxo.input_info.transaction_id)
            .or_default()
            .insert(utxo.input_info.output_index, utxo);
    }

    fn remove_from_address(&mut self, utxo: &Arc<Utxo>) {
        if let Some(utxos) = self.by_address.get_mut(utxo.address()) {
            if let Some(position) = utxos.iter().position(|u| Arc::ptr_eq(u, utxo)) {
                utxos.remove(position);
            }
            if utxos.is_empty() {
                self.by_address.remove(utxo.address());
            }
        }
    }

    fn spend(&mut self, info: &InputInfo) -> Result<Arc<Utxo>, LedgerError> {
        let outputs = self
            .by_id
            .get_mut(&info.transaction_id)
            .ok_or_else(|| LedgerError::NotFound(info.to_string()))?;
        let utxo = outputs
            .remove(&info.output_index)
            .ok_or_else(|| LedgerError::NotFound(info.to_string()))?;
        if outputs.is_empty() {
            self.by_id.remove(&info.transaction_id);
        }
        self.remove_from_address(&utxo);
        Ok(utxo)
    }

    fn apply(
        &mut self,
        transactions: &[Transaction],
        timestamp: i64,
    ) -> Result<LedgerUndo, LedgerError> {
        let mut undo = LedgerUndo::default();
        for transaction in transactions {
            if self.by_id.contains_key(&transaction.id) {
                return Err(LedgerError::DuplicateTransaction(transaction.id.to_string()));
            }
            if transaction.outputs.iter().any(|output| output.is_material()) {
                for (index, output) in transaction.outputs.iter().enumerate() {
                    if !output.is_material() {
                        continue;
                    }
                    let index = u16::try_from(index).map_err(|_| {
                        TransactionError::Malformed(format!("output index {index} exceeds u16"))
                    })?;
                    let info = InputInfo::new(transaction.id, index);
                    self.insert(Arc::new(Utxo::new(info, output.clone(), timestamp)));
                }
                undo.created.push(transaction.id);
            }
            for input in &transaction.inputs {
                undo.spent.push(self.spend(&input.info)?);
            }
        }
        Ok(undo)
    }

    fn revert(&mut self, undo: &LedgerUndo) {
        for utxo in undo.spent.iter().rev() {
            self.insert(Arc::clone(utxo));
        }
        for id in undo.created.iter().rev() {
            if let Some(outputs) = self.by_id.remove(id) {
                for utxo in outputs.values() {
                    self.remove_from_address(utxo);
                }
            }
        }
    }

    fn verify_yielding(&self) -> Result<(), LedgerError> {
        for (address, utxos) in &self.by_address {
            if utxos.iter().filter(|utxo| utxo.is_yielding()).count() > 1 {
                return Err(LedgerError::MultipleYieldingOutputs(address.to_string()));
            }
        }
        Ok(())
    }
}

/// Authoritative set of spendable outputs.
#[derive(Debug, Default)]
pub struct Ledger {
    index: RwLock<UtxoIndex>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent snapshot. Mutating the copy never affects `self`.
    pub fn copy(&self) -> Self {
        Self {
            index: RwLock::new(UtxoIndex::clone(&self.index.read())),
        }
    }

    pub fn clear(&self) {
        *self.index.write() = UtxoIndex::default();
    }

    /// Replace the whole content of `self` with `other` in one swap.
    pub fn assign(&self, other: Ledger) {
        *self.index.write() = other.index.into_inner();
    }

    /// Apply a batch of transactions created at `timestamp`.
    ///
    /// All-or-nothing: on error no effect of the batch is retained.
    pub fn update_utxos(&self, transactions: &[Transaction], timestamp: i64) -> Result<(), LedgerError> {
        self.connect(transactions, timestamp).map(|_| ())
    }

    /// Like [`update_utxos`](Self::update_utxos), returning what is needed to
    /// [`disconnect`](Self::disconnect) the batch later.
    pub fn connect(&self, transactions: &[Transaction], timestamp: i64) -> Result<LedgerUndo, LedgerError> {
        // Writers serialize on the upgradable guard; plain readers keep going
        // until the final swap.
        let guard = self.index.upgradable_read();
        let mut next = UtxoIndex::clone(&guard);
        let undo = next.apply(transactions, timestamp)?;
        next.verify_yielding()?;
        let mut index = RwLockUpgradableReadGuard::upgrade(guard);
        *index = next;
        Ok(undo)
    }

    /// Revert a batch previously applied with [`connect`](Self::connect).
    ///
    /// Batches must be disconnected newest first.
    pub fn disconnect(&self, undo: &LedgerUndo) {
        self.index.write().revert(undo);
    }

    /// Point lookup by `(transaction id, output index)`.
    pub fn utxo(&self, info: &InputInfo) -> Result<Utxo, LedgerError> {
        self.index
            .read()
            .get(info)
            .map(|utxo| Utxo::clone(utxo))
            .ok_or_else(|| LedgerError::NotFound(info.to_string()))
    }

    /// Live UTXOs owned by `address`, in creation order.
    pub fn utxos(&self, address: &Address) -> Vec<Utxo> {
        self.index
            .read()
            .by_address
            .get(address)
            .map(|utxos| utxos.iter().map(|utxo| Utxo::clone(utxo)).collect())
            .unwrap_or_default()
    }

    /// JSON array of [`UtxoView`]s; `[]` for an unknown address.
    pub fn utxos_json(&self, address: &Address) -> Result<String, TransactionError> {
        let views: Vec<UtxoView> = self.utxos(address).iter().map(Utxo::view).collect();
        serde_json::to_string(&views).map_err(|e| TransactionError::Serialization(e.to_string()))
    }

    /// Every live yielding UTXO.
    pub fn yielding_utxos(&self) -> Vec<Utxo> {
        self.index
            .read()
            .by_address
            .values()
            .flatten()
            .filter(|utxo| utxo.is_yielding())
            .map(|utxo| Utxo::clone(utxo))
            .collect()
    }

    /// Holder of the yielding UTXO unspent for the longest time.
    ///
    /// Ties on the creation timestamp go to the smallest address.
    pub fn oldest_yielding_holder(&self) -> Option<Address> {
        self.yielding_utxos()
            .into_iter()
            .min_by(|a, b| (a.timestamp, a.address()).cmp(&(b.timestamp, b.address())))
            .map(|utxo| utxo.output.address)
    }

    /// Fee paid by `transaction` if it were included in a block at `timestamp`.
    ///
    /// Every input must resolve to a live UTXO owned by the input's public key.
    pub fn calculate_fee(
        &self,
        transaction: &Transaction,
        timestamp: i64,
        model: &dyn ValueModel,
        minimal_fee: u64,
    ) -> Result<u64, TransactionError> {
        let index = self.index.read();
        let mut inputs_value: u64 = 0;
        for (position, input) in transaction.inputs.iter().enumerate() {
            let utxo = index
                .get(&input.info)
                .ok_or_else(|| TransactionError::UnknownUtxo(input.info.to_string()))?;
            let owner = input_address(input)
                .map_err(|source| TransactionError::InvalidSignature { index: position, source })?;
            if &owner != utxo.address() {
                return Err(TransactionError::AddressMismatch(input.info.to_string()));
            }
            inputs_value = inputs_value
                .checked_add(utxo.value(timestamp, model))
                .ok_or(TransactionError::ValueOverflow)?;
        }
        let outputs_value = transaction
            .total_output_value()
            .ok_or(TransactionError::ValueOverflow)?;
        let fee = inputs_value
            .checked_sub(outputs_value)
            .ok_or(TransactionError::NegativeFee)?;
        if fee < minimal_fee {
            return Err(TransactionError::FeeTooLow { fee, minimal: minimal_fee });
        }
        Ok(fee)
    }

    /// Sum of the initial values of every live UTXO.
    pub fn total_initial_value(&self) -> u128 {
        self.index
            .read()
            .by_address
            .values()
            .flatten()
            .map(|utxo| u128::from(utxo.output.initial_value))
            .sum()
    }

    /// Number of live UTXOs.
    pub fn len(&self) -> usize {
        self.index.read().by_id.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().by_id.is_empty()
    }

    /// Whether both indices describe the same set. Used by tests.
    pub fn is_consistent(&self) -> bool {
        let index = self.index.read();
        let by_address: usize = index.by_address.values().map(Vec::len).sum();
        by_address == index.by_id.values().map(BTreeMap::len).sum::<usize>()
            && index
                .by_address
                .values()
                .flatten()
                .all(|utxo| index.get(&utxo.input_info).is_some_and(|u| Arc::ptr_eq(u, utxo)))
    }
}
