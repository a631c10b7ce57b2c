//! # ruthenium-consensus — Chain state, replacement protocol and mempool.
//!
//! This crate builds the consensus engine on top of ruthenium-core:
//! - [`AddressRegistry`] tracks the addresses allowed to hold a yielding output
//! - [`Blockchain`] keeps the bounded block window, closes local blocks and
//!   replaces the chain with a verified better neighbor chain
//! - [`TransactionsPool`] admits, relays and commits transactions
//!
//! Verification of untrusted neighbor chains always runs on copies of the
//! ledger and registry; the live state changes in a single swap.

pub mod blockchain;
pub mod pool;
pub mod registry;

pub use blockchain::{Blockchain, ChainUpdate};
pub use pool::TransactionsPool;
pub use registry::AddressRegistry;
