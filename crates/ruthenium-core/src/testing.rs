//! In-memory doubles for the collaborator traits.
//!
//! Enabled by the `testing` feature so downstream crates can drive the
//! engine deterministically from their own test suites.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::{NetworkError, RegistryError};
use crate::traits::{Clock, HumanityOracle, Neighbor, Neighborhood, ValueModel};
use crate::types::{Address, Block};

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self { now: AtomicI64::new(now) }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: i64) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Value model that never changes a value.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatValueModel;

impl ValueModel for FlatValueModel {
    fn value(&self, initial_value: u64, _is_yielding: bool, _elapsed: i64) -> u64 {
        initial_value
    }
}

/// Oracle answering from a fixed set, optionally failing for some addresses.
#[derive(Debug, Default)]
pub struct StubOracle {
    registered: RwLock<HashSet<Address>>,
    failing: RwLock<HashSet<Address>>,
    calls: Mutex<Vec<Address>>,
}

impl StubOracle {
    pub fn new(registered: impl IntoIterator<Item = Address>) -> Self {
        Self {
            registered: RwLock::new(registered.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn register(&self, address: Address) {
        self.registered.write().insert(address);
    }

    pub fn unregister(&self, address: &Address) {
        self.registered.write().remove(address);
    }

    /// Make every query for `address` fail.
    pub fn fail_for(&self, address: Address) {
        self.failing.write().insert(address);
    }

    /// Addresses queried so far, in order.
    pub fn calls(&self) -> Vec<Address> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HumanityOracle for StubOracle {
    async fn is_registered(&self, address: &Address) -> Result<bool, RegistryError> {
        self.calls.lock().push(address.clone());
        if self.failing.read().contains(address) {
            return Err(RegistryError::Oracle(format!("unavailable for {address}")));
        }
        Ok(self.registered.read().contains(address))
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Serve,
    Fail,
    Stall(Duration),
    Raw(Vec<u8>),
}

/// Neighbor serving a fixed chain and recording relayed transactions.
#[derive(Debug)]
pub struct StubNeighbor {
    target: String,
    blocks: RwLock<Vec<Block>>,
    behaviour: RwLock<Behaviour>,
    received: Mutex<Vec<Vec<u8>>>,
}

impl StubNeighbor {
    pub fn new(target: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            target: target.into(),
            blocks: RwLock::new(blocks),
            behaviour: RwLock::new(Behaviour::Serve),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn set_blocks(&self, blocks: Vec<Block>) {
        *self.blocks.write() = blocks;
    }

    /// Every request fails as unreachable.
    pub fn fail(&self) {
        *self.behaviour.write() = Behaviour::Fail;
    }

    /// Every block request sleeps for `delay` before answering.
    pub fn stall(&self, delay: Duration) {
        *self.behaviour.write() = Behaviour::Stall(delay);
    }

    /// Every block request returns `bytes` verbatim.
    pub fn respond_raw(&self, bytes: Vec<u8>) {
        *self.behaviour.write() = Behaviour::Raw(bytes);
    }

    /// Transaction requests received so far.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().clone()
    }

    fn serve(&self, starting_height: u64) -> Result<Vec<u8>, NetworkError> {
        let blocks = self.blocks.read();
        let start = usize::try_from(starting_height).unwrap_or(usize::MAX).min(blocks.len());
        serde_json::to_vec(&blocks[start..]).map_err(|e| NetworkError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Neighbor for StubNeighbor {
    fn target(&self) -> &str {
        &self.target
    }

    async fn get_blocks(&self, starting_height: u64) -> Result<Vec<u8>, NetworkError> {
        let behaviour = self.behaviour.read().clone();
        match behaviour {
            Behaviour::Serve => self.serve(starting_height),
            Behaviour::Fail => Err(NetworkError::Unreachable(self.target.clone())),
            Behaviour::Stall(delay) => {
                tokio::time::sleep(delay).await;
                self.serve(starting_height)
            }
            Behaviour::Raw(bytes) => Ok(bytes),
        }
    }

    async fn add_transaction(&self, request: Vec<u8>) -> Result<(), NetworkError> {
        if matches!(*self.behaviour.read(), Behaviour::Fail) {
            return Err(NetworkError::Unreachable(self.target.clone()));
        }
        self.received.lock().push(request);
        Ok(())
    }
}

/// Fixed set of neighbors recording reputation changes.
#[derive(Default)]
pub struct StubNeighborhood {
    neighbors: RwLock<Vec<Arc<StubNeighbor>>>,
    incentives: Mutex<Vec<String>>,
    penalties: Mutex<Vec<String>>,
}

impl StubNeighborhood {
    pub fn new(neighbors: Vec<Arc<StubNeighbor>>) -> Self {
        Self {
            neighbors: RwLock::new(neighbors),
            ..Self::default()
        }
    }

    pub fn add(&self, neighbor: Arc<StubNeighbor>) {
        self.neighbors.write().push(neighbor);
    }

    pub fn incentives(&self) -> Vec<String> {
        self.incentives.lock().clone()
    }

    pub fn penalties(&self) -> Vec<String> {
        self.penalties.lock().clone()
    }
}

impl Neighborhood for StubNeighborhood {
    fn neighbors(&self) -> Vec<Arc<dyn Neighbor>> {
        self.neighbors
            .read()
            .iter()
            .map(|neighbor| Arc::clone(neighbor) as Arc<dyn Neighbor>)
            .collect()
    }

    fn incentive(&self, target: &str) {
        self.incentives.lock().push(target.to_string());
    }

    fn penalize(&self, target: &str) {
        self.penalties.lock().push(target.to_string());
    }
}
