//! Error types for the vault.

use thiserror::Error;

use keyward_core::KeyId;

/// Errors that can occur during vault operations.
///
/// Crypto failures are hard errors: callers must not retry them and must
/// never surface partial plaintext. Messages never contain key material.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Encryption, decryption, or authentication failure.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// Custody already holds different key material under this id.
    #[error("custody conflict for key {0}")]
    CustodyConflict(KeyId),

    /// Sealed custody record is structurally invalid.
    #[error("malformed custody record for key {0}: {1}")]
    MalformedCustodyRecord(KeyId, String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
