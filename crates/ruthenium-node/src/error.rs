//! Error types for node composition.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("failed to load settings: {0}")] Settings(#[from] config::ConfigError),
    #[error("invalid settings: {0}")] InvalidSettings(String),
}
