//! Error types for vault operations

use thiserror::Error;

/// Errors that can occur while working with the in-memory vault.
///
/// Lookups that find nothing return `None` and misuse of the tree panics, so
/// only genuinely recoverable conditions end up here.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid search pattern in term '{term}': {source}")]
    InvalidPattern {
        term: String,
        #[source]
        source: regex::Error,
    },

    #[error("Secret data is not valid UTF-8")]
    InvalidUtf8,
}

pub type VaultResult<T> = Result<T, VaultError>;
