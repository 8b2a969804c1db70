//! Error types for the simulator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Engine error: {0}")]
    Engine(#[from] worldline_core::EngineError),

    #[error("Store error: {0}")]
    Store(#[from] worldline_store::StoreError),

    #[error("Invalid parameter '{0}': expected key=value")]
    Param(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
