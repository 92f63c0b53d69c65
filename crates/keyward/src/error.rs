//! Error types for the Keyward API.

use std::path::PathBuf;

use keyward_core::{ContentId, DeviceClass, DeviceId, KeyId, UserId, ValidationError};
use keyward_store::StoreError;
use keyward_vault::VaultError;
use thiserror::Error;

use crate::entitlement::EntitlementUnavailable;

/// Errors that can occur during Keyward operations.
#[derive(Debug, Error)]
pub enum KeywardError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// User has not been admitted.
    #[error("user not admitted: {0}")]
    UserNotFound(UserId),

    /// An active device already occupies the class slot.
    #[error("quota exceeded: an active {class} device ({active}) is already registered")]
    QuotaExceeded {
        class: DeviceClass,
        active: DeviceId,
    },

    /// The fingerprint is already registered under a different class.
    #[error("device {device} is registered as {actual}, not {requested}")]
    DeviceClassMismatch {
        device: DeviceId,
        actual: DeviceClass,
        requested: DeviceClass,
    },

    /// Device is unknown, revoked, or belongs to another user.
    #[error("device not authorized: {0}")]
    DeviceNotAuthorized(DeviceId),

    /// Content is unknown or deactivated.
    #[error("content not found: {0}")]
    ContentNotFound(ContentId),

    /// Ingest source does not exist.
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// User holds no entitlement for the content.
    #[error("entitlement required for content {0}")]
    EntitlementRequired(ContentId),

    /// The entitlement provider could not answer.
    #[error("entitlement provider unavailable: {0}")]
    EntitlementUnavailable(String),

    /// A content key the catalog references is not in custody.
    #[error("key material missing for content {content}: key {key} not in custody")]
    KeyMaterialMissing { content: ContentId, key: KeyId },

    /// Cryptographic operation failed.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),
}

impl From<VaultError> for KeywardError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Io(e) => KeywardError::Io(e),
            other => KeywardError::CryptoFailure(other.to_string()),
        }
    }
}

impl From<EntitlementUnavailable> for KeywardError {
    fn from(e: EntitlementUnavailable) -> Self {
        KeywardError::EntitlementUnavailable(e.0)
    }
}

/// Result type for Keyward operations.
pub type Result<T> = std::result::Result<T, KeywardError>;
