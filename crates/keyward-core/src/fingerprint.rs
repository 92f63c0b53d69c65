//! Device fingerprinting: a deterministic identity from client attributes.
//!
//! The fingerprint is Blake3 over the canonical CBOR encoding of the merged
//! attribute map. Identical attribute sets always produce the same
//! [`DeviceId`], which is how a re-registering device is recognized instead
//! of consuming a second quota slot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::canonical;
use crate::error::ValidationError;
use crate::types::DeviceId;

/// Domain prefix for fingerprint hashing.
const FINGERPRINT_DOMAIN: &[u8] = b"keyward-fingerprint-v1:";

/// Attribute keys with reserved meaning. `extra` entries may not use these.
const NAMED_KEYS: [&str; 7] = [
    "platform",
    "model",
    "os_version",
    "hardware_id",
    "screen",
    "timezone",
    "locale",
];

/// The attribute set a client reports at registration.
///
/// `platform`, `model`, `os_version` and `hardware_id` are required and must
/// be non-empty. Optional fields and the open `extra` map contribute to the
/// fingerprint when present; web clients typically add `user_agent` and a
/// salted address hash there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAttributes {
    pub platform: String,
    pub model: String,
    pub os_version: String,
    pub hardware_id: String,
    pub screen: Option<String>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl DeviceAttributes {
    /// Start from the required attributes.
    pub fn new(
        platform: impl Into<String>,
        model: impl Into<String>,
        os_version: impl Into<String>,
        hardware_id: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            model: model.into(),
            os_version: os_version.into(),
            hardware_id: hardware_id.into(),
            screen: None,
            timezone: None,
            locale: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the screen resolution tag.
    pub fn screen(mut self, v: impl Into<String>) -> Self {
        self.screen = Some(v.into());
        self
    }

    /// Set the timezone tag.
    pub fn timezone(mut self, v: impl Into<String>) -> Self {
        self.timezone = Some(v.into());
        self
    }

    /// Set the locale tag.
    pub fn locale(mut self, v: impl Into<String>) -> Self {
        self.locale = Some(v.into());
        self
    }

    /// Add a free-form attribute.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Merge all present fields into a single validated map.
    fn to_map(&self) -> Result<BTreeMap<String, String>, ValidationError> {
        let required = [
            ("platform", &self.platform),
            ("model", &self.model),
            ("os_version", &self.os_version),
            ("hardware_id", &self.hardware_id),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(ValidationError::MissingAttribute(name));
            }
        }

        let mut map = BTreeMap::new();
        for (name, value) in required {
            map.insert(name.to_string(), value.clone());
        }

        let optional = [
            ("screen", &self.screen),
            ("timezone", &self.timezone),
            ("locale", &self.locale),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                map.insert(name.to_string(), v.clone());
            }
        }

        for (key, value) in &self.extra {
            if key.is_empty() {
                return Err(ValidationError::EmptyAttributeKey);
            }
            if NAMED_KEYS.contains(&key.as_str()) {
                return Err(ValidationError::ReservedAttribute(key.clone()));
            }
            map.insert(key.clone(), value.clone());
        }

        Ok(map)
    }
}

/// The canonical byte encoding of an attribute set.
///
/// This is what the registry persists. The fingerprint can be re-derived
/// from it, and it decodes back to the attribute map for display.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalAttributes(pub Vec<u8>);

impl CanonicalAttributes {
    /// Wrap stored canonical bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the canonical bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Re-derive the device fingerprint from the canonical bytes.
    pub fn device_id(&self) -> DeviceId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(&self.0);
        DeviceId(*hasher.finalize().as_bytes())
    }

    /// Decode back to the merged attribute map.
    pub fn decode(&self) -> Result<BTreeMap<String, String>, ValidationError> {
        canonical::decode_map(&self.0)
    }
}

impl fmt::Debug for CanonicalAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalAttributes({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for CanonicalAttributes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Compute the fingerprint of an attribute set.
///
/// Returns the derived [`DeviceId`] together with the canonical bytes that
/// produced it. Pure: no side effects, fails only on malformed input.
pub fn fingerprint(
    attrs: &DeviceAttributes,
) -> Result<(DeviceId, CanonicalAttributes), ValidationError> {
    let map = attrs.to_map()?;
    let canonical = CanonicalAttributes(canonical::canonical_map_bytes(&map));
    Ok((canonical.device_id(), canonical))
}
