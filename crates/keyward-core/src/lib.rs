//! # Keyward Core
//!
//! Pure primitives for Keyward: identifiers, device fingerprints, records,
//! and canonicalization.
//!
//! This crate contains no I/O, no storage, no cryptographic secrets. It is
//! pure computation over the domain's data structures.
//!
//! ## Key Types
//!
//! - [`DeviceId`] - Fingerprint-derived device identifier (Blake3 hash)
//! - [`DeviceAttributes`] - The attribute set a client reports at registration
//! - [`Device`] - A registered device record
//! - [`ContentAsset`] - A protected content record
//! - [`AccessEvent`] - One entry of the append-only audit trail
//!
//! ## Canonicalization
//!
//! Fingerprint input is encoded as deterministic CBOR so identical
//! attribute sets hash identically on every platform. See [`canonical`].

pub mod canonical;
pub mod content;
pub mod device;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod types;

pub use content::{ContentAsset, ContentDigest, ContentKind};
pub use device::{Device, DeviceClass, DevicePublicKey};
pub use error::ValidationError;
pub use event::{AccessEvent, AccessKind, ClientMeta};
pub use fingerprint::{fingerprint, CanonicalAttributes, DeviceAttributes};
pub use types::{ContentId, DeviceId, KeyId, UserId};
