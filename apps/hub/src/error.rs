use std::io::Error as IoError;

use thiserror::Error;
use uplink::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0:#}")]
    Database(#[from] anyhow::Error),
}
