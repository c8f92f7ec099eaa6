use servoscope_core::{ConfigError, RouterError};
use servoscope_env::EnvError;
use thiserror::Error;

/// Errors raised by the simulation harness itself.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Device link error: {0}")]
    Link(#[from] EnvError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),
}
