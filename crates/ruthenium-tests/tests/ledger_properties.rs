//! Property-based tests of the UTXO ledger.
//!
//! Invariants checked under randomized batches:
//! - Conservation: live value equals created value minus spent value
//! - A failed batch leaves the ledger untouched
//! - No address ever holds two yielding outputs
//! - An output cannot be spent twice, within a batch or across batches
//! - Disconnecting applied batches in reverse restores the ledger

use proptest::prelude::*;
use ruthenium_core::ledger::Ledger;
use ruthenium_core::types::{Address, Input, InputInfo, Output, Transaction, Utxo};
use ruthenium_tests::helpers::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SEED_VALUE: u64 = 1_000_000;

#[derive(Debug, Clone)]
struct Spend {
    pick: usize,
    weights: Vec<u64>,
    burn: u64,
    replay: bool,
}

fn spend_strategy() -> impl Strategy<Value = Spend> {
    (
        any::<usize>(),
        prop::collection::vec(1u64..100, 1..4),
        0u64..50,
        prop::bool::weighted(0.2),
    )
        .prop_map(|(pick, weights, burn, replay)| Spend { pick, weights, burn, replay })
}

fn owners() -> Vec<Address> {
    (1..=3).map(|seed| key(seed).address()).collect()
}

/// Ledger holding one non-yielding output of [`SEED_VALUE`] per owner.
fn seeded(owners: &[Address]) -> Ledger {
    let ledger = Ledger::new();
    let seeds: Vec<Transaction> = owners
        .iter()
        .enumerate()
        .map(|(index, owner)| Transaction::reward(owner.clone(), false, index as i64, SEED_VALUE))
        .collect();
    ledger.connect(&seeds, 0).unwrap();
    ledger
}

fn live(ledger: &Ledger, owners: &[Address]) -> Vec<Utxo> {
    let mut utxos: Vec<Utxo> = owners.iter().flat_map(|owner| ledger.utxos(owner)).collect();
    utxos.sort_by_key(|utxo| (utxo.input_info.transaction_id.to_string(), utxo.input_info.output_index));
    utxos
}

/// Split what is left of `utxo` after burning a fee between owners.
fn split(utxo: &Utxo, spend: &Spend, owners: &[Address], step: usize) -> Vec<Output> {
    let available = utxo.output.initial_value - spend.burn.min(utxo.output.initial_value);
    let total: u64 = spend.weights.iter().sum();
    spend
        .weights
        .iter()
        .enumerate()
        .map(|(index, weight)| {
            let owner = owners[(step + index) % owners.len()].clone();
            Output::new(owner, false, available * weight / total)
        })
        .collect()
}

fn snapshot(ledger: &Ledger, owners: &[Address]) -> Vec<(String, u16, u64, i64)> {
    live(ledger, owners)
        .into_iter()
        .map(|utxo| {
            (
                utxo.input_info.transaction_id.to_string(),
                utxo.input_info.output_index,
                utxo.output.initial_value,
                utxo.timestamp,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Conservation and replayed inputs
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn ledger_conserves_value(steps in prop::collection::vec(spend_strategy(), 1..20)) {
        let owners = owners();
        let ledger = seeded(&owners);
        let mut expected = u128::from(SEED_VALUE) * owners.len() as u128;
        let mut spent: Vec<InputInfo> = Vec::new();

        for (step, spend) in steps.iter().enumerate() {
            let utxos = live(&ledger, &owners);
            if utxos.is_empty() {
                break;
            }
            let utxo = &utxos[spend.pick % utxos.len()];
            let outputs = split(utxo, spend, &owners, step);
            let created: u128 = outputs.iter().map(|output| u128::from(output.initial_value)).sum();

            let mut inputs = vec![Input::unsigned(utxo.input_info.clone())];
            let replayed = spend.replay && !spent.is_empty();
            if replayed {
                inputs.push(Input::unsigned(spent[spend.pick % spent.len()].clone()));
            }
            let timestamp = (step as i64 + 1) * SECOND;
            let transaction = Transaction::new(inputs, outputs, timestamp);
            let before = ledger.total_initial_value();

            match ledger.connect(std::slice::from_ref(&transaction), timestamp) {
                Ok(_) => {
                    prop_assert!(!replayed, "a spent output was accepted again");
                    expected = expected - u128::from(utxo.output.initial_value) + created;
                    spent.push(utxo.input_info.clone());
                }
                Err(_) => {
                    prop_assert!(replayed, "honest transfer rejected at step {}", step);
                    prop_assert_eq!(ledger.total_initial_value(), before);
                }
            }
            prop_assert_eq!(ledger.total_initial_value(), expected);
            prop_assert!(ledger.is_consistent());
        }
    }
}

// ---------------------------------------------------------------------------
// Double spend inside one batch
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn batch_spending_an_output_twice_is_rejected_whole(
        first in 1u64..SEED_VALUE,
        second in 1u64..SEED_VALUE,
        pick in 0usize..3,
    ) {
        let owners = owners();
        let ledger = seeded(&owners);
        let before = snapshot(&ledger, &owners);
        let utxo = live(&ledger, &owners)[pick].clone();

        let batch = vec![
            Transaction::new(
                vec![Input::unsigned(utxo.input_info.clone())],
                vec![Output::new(owners[0].clone(), false, first)],
                SECOND,
            ),
            Transaction::new(
                vec![Input::unsigned(utxo.input_info.clone())],
                vec![Output::new(owners[1].clone(), false, second)],
                SECOND + 1,
            ),
        ];

        prop_assert!(ledger.connect(&batch, SECOND).is_err());
        prop_assert_eq!(snapshot(&ledger, &owners), before);
    }
}

// ---------------------------------------------------------------------------
// At most one yielding output per address
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn no_address_holds_two_yielding_outputs(
        batches in prop::collection::vec(
            prop::collection::vec((0usize..3, any::<bool>(), 1u64..1_000), 1..4),
            1..10,
        ),
    ) {
        let owners = owners();
        let ledger = Ledger::new();
        let mut timestamp = 0;

        for batch in &batches {
            let holders: Vec<Address> = ledger.yielding_utxos().into_iter().map(|utxo| utxo.output.address).collect();
            let mut yielding: Vec<&Address> = Vec::new();
            let transactions: Vec<Transaction> = batch
                .iter()
                .map(|(owner, is_yielding, value)| {
                    timestamp += 1;
                    if *is_yielding {
                        yielding.push(&owners[*owner]);
                    }
                    Transaction::reward(owners[*owner].clone(), *is_yielding, timestamp, *value)
                })
                .collect();
            let mut unique = yielding.clone();
            unique.sort();
            unique.dedup();
            let conflicting = unique.len() < yielding.len()
                || yielding.iter().any(|address| holders.contains(*address));

            let result = ledger.connect(&transactions, timestamp);
            prop_assert_eq!(result.is_err(), conflicting);

            for owner in &owners {
                let count = ledger.utxos(owner).iter().filter(|utxo| utxo.is_yielding()).count();
                prop_assert!(count <= 1, "{} holds {} yielding outputs", owner, count);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connect / disconnect round trip
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn disconnect_restores_previous_state(steps in prop::collection::vec(spend_strategy(), 1..10)) {
        let owners = owners();
        let ledger = seeded(&owners);
        let initial = snapshot(&ledger, &owners);
        let mut undos = Vec::new();

        for (step, spend) in steps.iter().enumerate() {
            let utxos = live(&ledger, &owners);
            if utxos.is_empty() {
                break;
            }
            let utxo = &utxos[spend.pick % utxos.len()];
            let timestamp = (step as i64 + 1) * SECOND;
            let transaction = Transaction::new(
                vec![Input::unsigned(utxo.input_info.clone())],
                split(utxo, spend, &owners, step),
                timestamp,
            );
            undos.push(ledger.connect(&[transaction], timestamp).unwrap());
        }

        for undo in undos.iter().rev() {
            ledger.disconnect(undo);
        }
        prop_assert_eq!(snapshot(&ledger, &owners), initial);
        prop_assert!(ledger.is_consistent());
    }
}
