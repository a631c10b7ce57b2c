//! # ruthenium-core
//! Foundation types, the UTXO ledger, and collaborator traits for the
//! Ruthenium protocol.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod settings;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
