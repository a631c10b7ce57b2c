//! Two nodes of the same process exchanging blocks and transactions.

use std::sync::Arc;
use std::time::Duration;

use ruthenium_core::crypto::{sign_transaction_input, KeyPair};
use ruthenium_core::testing::{ManualClock, StubOracle};
use ruthenium_core::traits::{Clock, HumanityOracle, Neighborhood};
use ruthenium_core::types::{Address, Input, Output, Transaction, TransactionRequest};
use ruthenium_consensus::ChainUpdate;
use ruthenium_node_lib::{Node, NodeSettings};

const SECOND: i64 = 1_000_000_000;
const GENESIS_AMOUNT: u64 = 1_000_000;

fn validator() -> KeyPair {
    KeyPair::from_secret_bytes([7; 32])
}

fn recipient() -> Address {
    KeyPair::from_secret_bytes([8; 32]).address()
}

fn settings(port: u16, validator: Option<Address>) -> NodeSettings {
    let mut settings = NodeSettings::default();
    settings.host.port = port;
    settings.validator.address = validator;
    settings.protocol.validation_interval_in_seconds = 1;
    settings.protocol.genesis_amount = GENESIS_AMOUNT;
    settings.protocol.minimal_transaction_fee = 10;
    settings
}

struct Network {
    clock: Arc<ManualClock>,
    validator: Node,
    follower: Node,
}

fn network() -> Network {
    let clock = Arc::new(ManualClock::new(0));
    let oracle: Arc<dyn HumanityOracle> = Arc::new(StubOracle::new([validator().address()]));
    let validator = Node::with_collaborators(
        settings(9001, Some(validator().address())),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&oracle),
    )
    .unwrap();
    let follower = Node::with_collaborators(settings(9002, None), Arc::clone(&clock) as Arc<dyn Clock>, oracle).unwrap();
    validator.connect(&follower);
    follower.connect(&validator);
    Network { clock, validator, follower }
}

fn payment(node: &Node, timestamp: i64) -> Vec<u8> {
    let owner = validator();
    let utxo = node.blockchain().ledger().utxos(&owner.address())[0].clone();
    let mut transaction = Transaction::new(
        vec![Input::unsigned(utxo.input_info.clone())],
        vec![
            Output::new(recipient(), false, 1_000),
            Output::new(owner.address(), false, utxo.output.initial_value - 2_000),
        ],
        timestamp,
    );
    sign_transaction_input(&mut transaction, 0, &owner).unwrap();
    TransactionRequest::new(transaction, "client").to_json().unwrap()
}

async fn wait_for(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn follower_adopts_the_validator_chain() {
    let network = network();
    network.validator.pool().validate(0).await;
    assert_eq!(network.validator.blockchain().height(), 1);

    let update = network.follower.blockchain().update(SECOND / 2).await;

    assert_eq!(update, ChainUpdate::Replaced { target: network.validator.target().to_string() });
    assert_eq!(network.follower.blockchain().tip(), network.validator.blockchain().tip());
    assert!(network.follower.registry().is_registered(&validator().address()));
}

#[tokio::test]
async fn relayed_transaction_reaches_the_next_block() {
    let network = network();
    network.validator.pool().validate(0).await;
    network.follower.blockchain().update(SECOND / 4).await;
    network.clock.set(SECOND / 2);

    network.follower.add_transaction(&payment(&network.follower, SECOND / 2));
    assert_eq!(network.follower.pool().len(), 1);
    assert!(wait_for(|| network.validator.pool().len() == 1).await);
    assert!(network.validator.neighborhood().score(network.follower.target()) > Some(0));

    network.validator.pool().validate(SECOND).await;
    network.follower.blockchain().update(SECOND + SECOND / 2).await;

    assert_eq!(network.follower.blockchain().height(), 2);
    assert_eq!(network.follower.blockchain().ledger().utxos(&recipient()).len(), 1);
    assert!(network.validator.pool().is_empty());
}

#[tokio::test]
async fn follower_without_validator_address_closes_nothing() {
    let network = network();
    network.follower.pool().validate(0).await;
    assert!(network.follower.blockchain().is_empty());
}

#[tokio::test]
async fn neighbors_are_served_by_the_neighborhood() {
    let network = network();
    let neighbors = network.follower.neighborhood().neighbors();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].target(), network.validator.target());
}
