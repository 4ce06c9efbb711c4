//! Error types for the connection pool and the service registry

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to connect to {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on pooled connection: {0}")]
    Io(#[from] io::Error),

    #[error("Pool has no destinations configured")]
    NoDestinations,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Service discovery failed: {0}")]
    Discovery(#[from] RegistryError),
}

impl PoolError {
    /// True when the error came from dialing a destination
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, PoolError::ConnectFailed { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry write to {key} failed: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Registry read of {prefix} failed: {reason}")]
    ReadFailed { prefix: String, reason: String },

    #[error("Malformed registry entry {key}: {reason}")]
    MalformedEntry { key: String, reason: String },

    #[error("Invalid registration configuration: {0}")]
    InvalidConfiguration(String),
}

/// Lets pooled connections plug into code expecting `io::Result`
impl From<PoolError> for io::Error {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Io(e) => e,
            PoolError::ConnectFailed { source, .. } => source,
            other => io::Error::other(other),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
pub type RegistryResult<T> = Result<T, RegistryError>;
