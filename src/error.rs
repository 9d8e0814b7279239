//! Error types for netblock.
//!
//! Enforcement outcomes (already blocked, command failed, ...) are values of
//! [`crate::engine::BlockResult`]; the types here cover infrastructure failures
//! that happen around the engine.

use thiserror::Error;

/// Main error type for netblock.
#[derive(Error, Debug)]
pub enum NetblockError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform not supported: {0}")]
    UnsupportedPlatform(String),

    #[error("Device repository error: {0}")]
    Repository(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid chain name '{name}': {reason}")]
    InvalidChainName { name: String, reason: String },

    #[error("Invalid rule prefix '{prefix}': {reason}")]
    InvalidRulePrefix { prefix: String, reason: String },

    #[error("Invalid MAC address '{0}'")]
    InvalidMacAddress(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, NetblockError>;
