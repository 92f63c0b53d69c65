//! Error types for Keyward core.

use thiserror::Error;

/// Validation errors for caller-supplied input.
///
/// These are immediate rejections the caller can fix; nothing has been
/// persisted when one is returned.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("attribute key {0:?} collides with a named field")]
    ReservedAttribute(String),

    #[error("attribute key must not be empty")]
    EmptyAttributeKey,

    #[error("malformed canonical attributes: {0}")]
    MalformedAttributes(String),

    #[error("unknown device class: {0:?}")]
    UnknownDeviceClass(String),

    #[error("unknown content kind: {0:?}")]
    UnknownContentKind(String),

    #[error("unknown access kind: {0:?}")]
    UnknownAccessKind(String),
}
