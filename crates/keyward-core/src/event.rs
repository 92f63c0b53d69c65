//! Access events: the append-only audit trail.
//!
//! One event is recorded per successful key grant. Events record grants,
//! not deliveries; whether the client actually streamed the payload is
//! outside this core. Events are never mutated or deleted, including when
//! the device or content they mention is later revoked or deactivated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::{ContentId, DeviceId, UserId};

/// How the client intends to consume the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    Download,
    Stream,
    View,
}

impl AccessKind {
    pub const ALL: [AccessKind; 3] = [Self::Download, Self::Stream, Self::View];

    /// The wire/storage string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Stream => "stream",
            Self::View => "view",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "download" => Ok(Self::Download),
            "stream" => Ok(Self::Stream),
            "view" => Ok(Self::View),
            other => Err(ValidationError::UnknownAccessKind(other.to_string())),
        }
    }
}

/// Requester metadata attached to an access event.
///
/// Untrusted, caller-reported. Kept for audit only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    pub fn new(remote_addr: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            remote_addr: Some(remote_addr.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// A recorded access grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub user: UserId,
    pub content: ContentId,
    pub device: DeviceId,
    pub kind: AccessKind,

    /// Grant time (Unix milliseconds).
    pub at: i64,

    pub meta: ClientMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_kind_roundtrip() {
        for kind in AccessKind::ALL {
            let s = kind.as_str();
            let recovered: AccessKind = s.parse().unwrap();
            assert_eq!(kind, recovered);
        }
    }

    #[test]
    fn test_access_kind_rejects_unknown() {
        let err = "print".parse::<AccessKind>().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownAccessKind(_)));
    }

    #[test]
    fn test_client_meta_default_is_empty() {
        let meta = ClientMeta::default();
        assert!(meta.remote_addr.is_none());
        assert!(meta.user_agent.is_none());
    }

    #[test]
    fn test_access_event_json_roundtrip() {
        let event = AccessEvent {
            user: UserId::new(42),
            content: ContentId::from_bytes([0x11; 32]),
            device: DeviceId::from_bytes([0x22; 32]),
            kind: AccessKind::Stream,
            at: 1_700_000_000_000,
            meta: ClientMeta::new("198.51.100.7", "keyward-client/1.0"),
        };

        let json = serde_json::to_string(&event).unwrap();
        let recovered: AccessEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, recovered);
    }
}
