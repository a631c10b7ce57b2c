//! Registered addresses: the only ones allowed to hold a yielding output.
//!
//! The authoritative answer comes from a [`HumanityOracle`], which is slow
//! and unreliable. The registry keeps the locally agreed set, a provisional
//! cache of oracle answers and the addresses waiting to be announced as
//! removed by the next locally closed block.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

use ruthenium_core::error::RegistryError;
use ruthenium_core::traits::HumanityOracle;
use ruthenium_core::types::Address;

#[derive(Debug, Default)]
pub struct AddressRegistry {
    registered: RwLock<HashSet<Address>>,
    /// Addresses the oracle confirmed since the last synchronization.
    temporary: RwLock<HashSet<Address>>,
    /// Registered addresses the oracle no longer vouches for.
    removed: RwLock<Vec<Address>>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent snapshot. Mutating the copy never affects `self`.
    pub fn copy(&self) -> Self {
        Self {
            registered: RwLock::new(self.registered.read().clone()),
            temporary: RwLock::new(self.temporary.read().clone()),
            removed: RwLock::new(self.removed.read().clone()),
        }
    }

    pub fn clear(&self) {
        self.registered.write().clear();
        self.temporary.write().clear();
        self.removed.write().clear();
    }

    /// Replace the whole content of `self` with `other`.
    pub fn assign(&self, other: AddressRegistry) {
        let AddressRegistry { registered, temporary, removed } = other;
        *self.registered.write() = registered.into_inner();
        *self.temporary.write() = temporary.into_inner();
        *self.removed.write() = removed.into_inner();
    }

    /// The addresses of `addresses` not registered yet, deduplicated.
    pub fn filter(&self, addresses: &[Address]) -> Vec<Address> {
        let registered = self.registered.read();
        let mut seen = HashSet::new();
        addresses
            .iter()
            .filter(|address| !registered.contains(*address) && seen.insert(*address))
            .cloned()
            .collect()
    }

    /// The addresses of `addresses` a new block may announce: not registered
    /// yet and confirmed by the oracle, deduplicated.
    pub async fn filter_eligible(&self, addresses: &[Address], oracle: &dyn HumanityOracle) -> Vec<Address> {
        let mut eligible = Vec::new();
        for address in self.filter(addresses) {
            if self.is_eligible(&address, oracle).await {
                eligible.push(address);
            }
        }
        eligible
    }

    /// Whether `address` may receive a yielding output in the next local block.
    ///
    /// Registered addresses qualify unless queued for removal. Others need a
    /// positive oracle answer; an oracle failure leaves them out.
    pub async fn is_eligible(&self, address: &Address, oracle: &dyn HumanityOracle) -> bool {
        if self.removed.read().contains(address) {
            return false;
        }
        if self.registered.read().contains(address) || self.temporary.read().contains(address) {
            return true;
        }
        match oracle.is_registered(address).await {
            Ok(true) => {
                self.temporary.write().insert(address.clone());
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(%address, "eligibility check deferred: {e}");
                false
            }
        }
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.registered.read().contains(address)
    }

    /// Registered addresses, sorted.
    pub fn registered_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.registered.read().iter().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Addresses to announce as removed in the next block.
    pub fn removed_addresses(&self) -> Vec<Address> {
        self.removed.read().clone()
    }

    /// Record the registry changes carried by a committed block.
    pub fn update(&self, added: &[Address], removed: &[Address]) {
        let mut registered = self.registered.write();
        let mut pending = self.removed.write();
        for address in removed {
            pending.retain(|queued| queued != address);
            registered.remove(address);
        }
        registered.extend(added.iter().cloned());
    }

    /// Undo an [`update`](Self::update). The pending removals are left to the
    /// next synchronization.
    pub fn revert(&self, added: &[Address], removed: &[Address]) {
        let mut registered = self.registered.write();
        for address in added {
            registered.remove(address);
        }
        registered.extend(removed.iter().cloned());
    }

    /// Ask the oracle about every registered address and queue the ones it
    /// no longer vouches for. Clears the provisional cache.
    pub async fn synchronize(&self, oracle: &dyn HumanityOracle) {
        let addresses = self.registered_addresses();
        let mut ineligible = Vec::new();
        for address in addresses {
            match oracle.is_registered(&address).await {
                Ok(true) => {}
                Ok(false) => ineligible.push(address),
                Err(e) => debug!(%address, "registry synchronization deferred: {e}"),
            }
        }
        self.queue_removals(&ineligible);
        self.temporary.write().clear();
    }

    /// Queue `addresses` for removal, skipping the ones already queued or no
    /// longer registered.
    pub fn queue_removals(&self, addresses: &[Address]) {
        let registered = self.registered.read();
        let mut pending = self.removed.write();
        for address in addresses {
            if registered.contains(address) && !pending.contains(address) {
                pending.push(address.clone());
            }
        }
    }

    /// Check the registry changes announced by a neighbor block.
    ///
    /// Oracle failures accept the change: the next synchronization will
    /// catch a wrong registration.
    pub async fn verify(
        &self,
        added: &[Address],
        removed: &[Address],
        oracle: &dyn HumanityOracle,
    ) -> Result<(), RegistryError> {
        for address in added {
            if self.temporary.read().contains(address) {
                continue;
            }
            match oracle.is_registered(address).await {
                Ok(true) => {
                    self.temporary.write().insert(address.clone());
                }
                Ok(false) => return Err(RegistryError::AddedAddressNotRegistered(address.to_string())),
                Err(e) => debug!(%address, "added address check deferred: {e}"),
            }
        }
        for address in removed {
            if self.temporary.read().contains(address) {
                return Err(RegistryError::RemovedAddressStillRegistered(address.to_string()));
            }
            match oracle.is_registered(address).await {
                Ok(true) => {
                    self.temporary.write().insert(address.clone());
                    return Err(RegistryError::RemovedAddressStillRegistered(address.to_string()));
                }
                Ok(false) => {}
                Err(e) => debug!(%address, "removed address check deferred: {e}"),
            }
        }
        Ok(())
    }
}
