//! Content asset records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::{ContentId, KeyId};

/// Domain prefix for content addressing.
const CONTENT_DOMAIN: &[u8] = b"keyward-content-v1:";

/// The kind of protected asset.
///
/// All kinds go through the same encryption pipeline; the kind only tells
/// clients how to present the decrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    Video,
    Pdf,
    Audio,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [Self::Video, Self::Pdf, Self::Audio];

    /// The wire/storage string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Pdf => "pdf",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "pdf" => Ok(Self::Pdf),
            "audio" => Ok(Self::Audio),
            other => Err(ValidationError::UnknownContentKind(other.to_string())),
        }
    }
}

/// A protected content asset.
///
/// The payload at `payload_path` is always the encrypted form; the content
/// key itself lives in vault custody, reachable only through `key_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAsset {
    /// Content-address of the encrypted payload.
    pub id: ContentId,

    /// Display title.
    pub title: String,

    /// Display description.
    pub description: String,

    /// Asset kind.
    pub kind: ContentKind,

    /// Where the encrypted payload lives.
    pub payload_path: PathBuf,

    /// Size of the encrypted payload in bytes.
    pub size_bytes: u64,

    /// Playback length for audio/video, when known.
    pub duration_secs: Option<u32>,

    /// Preview image shown in listings. Never encrypted; thumbnails are
    /// presentation material, not protected content.
    pub thumbnail_path: Option<PathBuf>,

    /// Opaque handle of the content key in custody.
    pub key_id: KeyId,

    /// Whether the asset is currently served.
    pub is_active: bool,

    /// Ingest time (Unix milliseconds).
    pub created_at: i64,
}

/// Incremental content-address computation.
///
/// Feed the encrypted payload bytes in any chunking; the resulting
/// [`ContentId`] depends only on the byte sequence. Ingest drives this
/// while streaming ciphertext to disk, so the address is known without a
/// second pass over the file.
pub struct ContentDigest {
    hasher: blake3::Hasher,
}

impl ContentDigest {
    pub fn new() -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONTENT_DOMAIN);
        Self { hasher }
    }

    /// Absorb the next run of payload bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Finish and produce the content address.
    pub fn finalize(self) -> ContentId {
        ContentId::from_bytes(*self.hasher.finalize().as_bytes())
    }
}

impl Default for ContentDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kind_roundtrip() {
        for kind in ContentKind::ALL {
            let s = kind.as_str();
            let recovered: ContentKind = s.parse().unwrap();
            assert_eq!(kind, recovered);
        }
    }

    #[test]
    fn test_content_kind_rejects_unknown() {
        let err = "epub".parse::<ContentKind>().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownContentKind(_)));
    }

    #[test]
    fn test_content_digest_chunking_invariant() {
        let mut whole = ContentDigest::new();
        whole.update(b"one frame of ciphertext");

        let mut split = ContentDigest::new();
        split.update(b"one frame ");
        split.update(b"of ciphertext");

        assert_eq!(whole.finalize(), split.finalize());
    }

    #[test]
    fn test_content_digest_distinguishes_payloads() {
        let mut a = ContentDigest::new();
        a.update(b"payload a");
        let mut b = ContentDigest::new();
        b.update(b"payload b");

        assert_ne!(a.finalize(), b.finalize());
    }
}
