//! In-process humanity oracle backed by the settings allow-list.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use ruthenium_core::error::RegistryError;
use ruthenium_core::traits::HumanityOracle;
use ruthenium_core::types::Address;

/// Answers eligibility from a fixed set of addresses.
///
/// An empty set makes every address eligible, which suits a private network
/// where the validators are trusted.
#[derive(Debug, Default)]
pub struct AllowListOracle {
    eligible: RwLock<HashSet<Address>>,
}

impl AllowListOracle {
    pub fn new(eligible: impl IntoIterator<Item = Address>) -> Self {
        Self {
            eligible: RwLock::new(eligible.into_iter().collect()),
        }
    }

    pub fn allow(&self, address: Address) {
        self.eligible.write().insert(address);
    }

    pub fn revoke(&self, address: &Address) {
        self.eligible.write().remove(address);
    }
}

#[async_trait]
impl HumanityOracle for AllowListOracle {
    async fn is_registered(&self, address: &Address) -> Result<bool, RegistryError> {
        let eligible = self.eligible.read();
        Ok(eligible.is_empty() || eligible.contains(address))
    }
}
