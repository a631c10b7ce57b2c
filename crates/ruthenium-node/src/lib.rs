//! # ruthenium-node-lib — Node composition and periodic engines.
//!
//! Composes the Ruthenium subsystems into a running node:
//! - [`config::NodeSettings`] — settings file and environment overrides
//! - [`tick::TickEngine`] — period-aligned scheduling
//! - [`neighborhood::StaticNeighborhood`] — scored neighbor selection
//! - [`oracle::AllowListOracle`] — eligibility from the settings allow-list
//! - [`node::Node`] — wiring and lifecycle

pub mod config;
pub mod error;
pub mod neighborhood;
pub mod node;
pub mod oracle;
pub mod tick;

pub use config::{LogFormat, NodeSettings};
pub use error::NodeError;
pub use neighborhood::{LocalNeighbor, StaticNeighborhood};
pub use node::Node;
pub use oracle::AllowListOracle;
pub use tick::TickEngine;
