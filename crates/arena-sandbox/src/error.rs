//! Error types for arena-sandbox

use thiserror::Error;

/// Errors that can occur while managing execution environments
#[derive(Error, Debug)]
pub enum EnvError {
    /// The environment could not be created (clone, container start, ...)
    #[error("Provisioning from {source_url} failed: {reason}")]
    Provision { source_url: String, reason: String },

    /// Verification command is empty or cannot be split into words
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// File change path escapes the environment root
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Validation request carried no file changes
    #[error("No file changes to validate")]
    NoFiles,

    /// Process could not be started inside the environment
    #[error("Failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// Container runtime command failed
    #[error("Container command failed: {0}")]
    Container(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for environment operations
pub type EnvResult<T> = std::result::Result<T, EnvError>;
