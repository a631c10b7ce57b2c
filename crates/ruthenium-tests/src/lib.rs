//! Cross-crate test suite for Ruthenium.
//!
//! Integration tests that drive the ledger, the blockchain replacement
//! protocol and the transactions pool together, from honest and hostile
//! neighbors alike.

pub mod helpers;
