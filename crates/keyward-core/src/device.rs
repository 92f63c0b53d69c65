//! Device records and device-class quota domain.
//!
//! A device is a registered client endpoint bound to one user. Devices are
//! never deleted: revocation flips `is_active` off, and a later
//! re-registration of the same fingerprint flips it back on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::fingerprint::CanonicalAttributes;
use crate::types::{DeviceId, UserId};

/// The quota-bearing device class.
///
/// Each user may hold at most one active device per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Mobile,
    Laptop,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 2] = [Self::Mobile, Self::Laptop];

    /// The wire/storage string for this class.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Laptop => "laptop",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Self::Mobile),
            "laptop" => Ok(Self::Laptop),
            other => Err(ValidationError::UnknownDeviceClass(other.to_string())),
        }
    }
}

/// A 32-byte X25519 device public key.
///
/// The public half of a device identity. Content keys are wrapped to this
/// key on every access grant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevicePublicKey(pub [u8; 32]);

impl DevicePublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for DevicePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePub({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for DevicePublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for DevicePublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A registered device.
///
/// The private half of the device identity is returned to the caller once
/// at registration and never stored; no field for it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Fingerprint-derived identifier, stable across re-registration.
    pub id: DeviceId,

    /// Owning user.
    pub user: UserId,

    /// Quota class.
    pub class: DeviceClass,

    /// Platform tag, copied from the fingerprint attributes.
    pub platform: String,

    /// Optional human-readable label ("my work laptop").
    pub name: Option<String>,

    /// Canonical fingerprint attributes as registered.
    pub attributes: CanonicalAttributes,

    /// The device's public key.
    pub public_key: DevicePublicKey,

    /// Whether the device currently holds its class slot.
    pub is_active: bool,

    /// First registration time (Unix milliseconds).
    pub registered_at: i64,

    /// Last verified use (Unix milliseconds).
    pub last_seen: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_class_roundtrip() {
        for class in DeviceClass::ALL {
            let s = class.as_str();
            let recovered: DeviceClass = s.parse().unwrap();
            assert_eq!(class, recovered);
        }
    }

    #[test]
    fn test_device_class_rejects_unknown() {
        let err = "tablet".parse::<DeviceClass>().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownDeviceClass(_)));
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let pk = DevicePublicKey::from_bytes([0x5a; 32]);
        let recovered = DevicePublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, recovered);
    }

    #[test]
    fn test_public_key_debug_is_truncated() {
        let pk = DevicePublicKey::from_bytes([0x5a; 32]);
        let debug = format!("{:?}", pk);
        assert_eq!(debug, "DevicePub(5a5a5a5a5a5a5a5a)");
    }
}
