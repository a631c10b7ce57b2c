//! Node composition and lifecycle.
//!
//! The [`Node`] struct wires the ledger, registry, blockchain and transactions
//! pool together with a [`StaticNeighborhood`] and an oracle, and drives them
//! with four [`TickEngine`]s:
//! - validation closes a block at every validation interval
//! - verification polls neighbors for a better chain several times per interval
//! - registry synchronization re-checks registered addresses with the oracle
//! - neighborhood synchronization refreshes the outbound selection

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use ruthenium_consensus::{AddressRegistry, Blockchain, ChainUpdate, TransactionsPool};
use ruthenium_core::error::{BlockError, TransactionError};
use ruthenium_core::ledger::Ledger;
use ruthenium_core::traits::{Clock, HumanityOracle, Neighbor, Neighborhood, SystemClock};
use ruthenium_core::types::Address;
use ruthenium_decay::HalfLifeModel;

use crate::config::NodeSettings;
use crate::error::NodeError;
use crate::neighborhood::{LocalNeighbor, StaticNeighborhood};
use crate::oracle::AllowListOracle;
use crate::tick::TickEngine;

pub struct Node {
    settings: NodeSettings,
    target: String,
    clock: Arc<dyn Clock>,
    oracle: Arc<dyn HumanityOracle>,
    neighborhood: Arc<StaticNeighborhood>,
    blockchain: Arc<Blockchain>,
    pool: Arc<TransactionsPool>,
}

impl Node {
    /// Build a node on the system clock with the allow-list oracle of `settings`.
    pub fn new(settings: NodeSettings) -> Result<Self, NodeError> {
        let oracle = Arc::new(AllowListOracle::new(settings.registry.eligible_addresses.clone()));
        Self::with_collaborators(settings, Arc::new(SystemClock), oracle)
    }

    pub fn with_collaborators(
        settings: NodeSettings,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn HumanityOracle>,
    ) -> Result<Self, NodeError> {
        settings.validate()?;
        let neighborhood = Arc::new(StaticNeighborhood::new(settings.network.max_outbounds_count));
        let blockchain = Arc::new(Blockchain::new(
            settings.protocol.clone(),
            Arc::new(Ledger::new()),
            Arc::new(AddressRegistry::new()),
            Arc::new(HalfLifeModel::from_settings(&settings.protocol)),
            Arc::clone(&neighborhood) as Arc<dyn Neighborhood>,
            Arc::clone(&oracle),
        ));
        let pool = Arc::new(TransactionsPool::new(
            Arc::clone(&blockchain),
            Arc::clone(&clock),
            settings.validator.address.clone(),
        ));
        Ok(Self {
            target: settings.host_target(),
            settings,
            clock,
            oracle,
            neighborhood,
            blockchain,
            pool,
        })
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn blockchain(&self) -> &Arc<Blockchain> {
        &self.blockchain
    }

    pub fn pool(&self) -> &Arc<TransactionsPool> {
        &self.pool
    }

    pub fn registry(&self) -> &Arc<AddressRegistry> {
        self.blockchain.registry()
    }

    pub fn neighborhood(&self) -> &Arc<StaticNeighborhood> {
        &self.neighborhood
    }

    // ------------------------------------------------------------------
    // Neighbors
    // ------------------------------------------------------------------

    /// This node as seen by another node of the same process.
    pub fn as_neighbor(&self) -> Arc<dyn Neighbor> {
        Arc::new(LocalNeighbor::new(self.target.clone(), &self.blockchain, &self.pool))
    }

    /// Make `other` a neighbor of this node.
    pub fn connect(&self, other: &Node) {
        self.neighborhood.add(other.as_neighbor());
        info!(neighbor = %other.target, "neighbor added");
    }

    // ------------------------------------------------------------------
    // Inbound requests
    // ------------------------------------------------------------------

    /// Admit a JSON-encoded transaction request received from a client or a neighbor.
    pub fn add_transaction(&self, request: &[u8]) {
        self.pool.add_transaction(request, &self.target);
    }

    pub fn blocks_json(&self, starting_height: u64) -> Result<Vec<u8>, BlockError> {
        self.blockchain.blocks_json(starting_height)
    }

    pub fn transactions_json(&self) -> Result<Vec<u8>, TransactionError> {
        self.pool.transactions_json()
    }

    pub fn utxos_json(&self, address: &Address) -> Result<String, TransactionError> {
        self.blockchain.ledger().utxos_json(address)
    }

    pub fn first_block_timestamp(&self) -> i64 {
        self.blockchain.first_block_timestamp()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Run the four engines until `shutdown` completes.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let protocol = &self.settings.protocol;
        let validation = TickEngine::periodic("validation", Arc::clone(&self.clock), protocol.validation_timer());
        // The first sub-tick coincides with block closing.
        let verification = TickEngine::new(
            "verification",
            Arc::clone(&self.clock),
            protocol.validation_timer(),
            protocol.verifications_count_per_validation,
            1,
        );
        let registry_synchronization = TickEngine::periodic(
            "registry synchronization",
            Arc::clone(&self.clock),
            Duration::from_secs(self.settings.registry.synchronization_interval_in_seconds),
        );
        let neighborhood_synchronization = TickEngine::periodic(
            "neighborhood synchronization",
            Arc::clone(&self.clock),
            Duration::from_secs(self.settings.network.synchronization_interval_in_seconds),
        );

        info!(
            node = %self.target,
            validator = self.settings.validator.address.is_some(),
            "node started"
        );
        tokio::select! {
            _ = validation.run(move |timestamp| self.pool.validate(timestamp)) => {}
            _ = verification.run(move |timestamp| async move {
                if let ChainUpdate::Replaced { target } = self.blockchain.update(timestamp).await {
                    debug!(neighbor = %target, timestamp, "chain replaced");
                }
            }) => {}
            _ = registry_synchronization.run(move |_| self.registry().synchronize(self.oracle.as_ref())) => {}
            _ = neighborhood_synchronization.run(move |_| async move { self.neighborhood.synchronize() }) => {}
            _ = shutdown => {}
        }
        info!(node = %self.target, "node stopped");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("target", &self.target)
            .field("height", &self.blockchain.height())
            .field("pool", &self.pool.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruthenium_core::crypto::KeyPair;

    fn settings(port: u16, validator: Option<Address>) -> NodeSettings {
        let mut settings = NodeSettings::default();
        settings.host.port = port;
        settings.validator.address = validator;
        settings.protocol.validation_interval_in_seconds = 1;
        settings
    }

    #[test]
    fn new_rejects_invalid_settings() {
        let mut settings = settings(1, None);
        settings.protocol.validation_interval_in_seconds = 0;
        assert!(matches!(Node::new(settings), Err(NodeError::InvalidSettings(_))));
    }

    #[test]
    fn target_comes_from_host_settings() {
        let node = Node::new(settings(9100, None)).unwrap();
        assert_eq!(node.target(), "127.0.0.1:9100");
    }

    #[test]
    fn connect_adds_a_neighbor() {
        let a = Node::new(settings(1, None)).unwrap();
        let b = Node::new(settings(2, None)).unwrap();
        a.connect(&b);
        let neighbors = a.neighborhood().neighbors();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].target(), "127.0.0.1:2");
    }

    #[tokio::test]
    async fn dropped_node_is_unreachable() {
        let a = Node::new(settings(1, None)).unwrap();
        let neighbor = {
            let b = Node::new(settings(2, None)).unwrap();
            b.as_neighbor()
        };
        a.neighborhood().add(Arc::clone(&neighbor));
        assert!(neighbor.get_blocks(0).await.is_err());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let validator = KeyPair::from_secret_bytes([1; 32]).address();
        let node = Node::new(settings(1, Some(validator))).unwrap();
        tokio::time::timeout(
            Duration::from_secs(5),
            node.run(tokio::time::sleep(Duration::from_millis(10))),
        )
        .await
        .expect("node stopped");
    }

    #[test]
    fn debug_shows_target() {
        let node = Node::new(settings(3, None)).unwrap();
        assert!(format!("{node:?}").contains("127.0.0.1:3"));
    }
}
