//! # Keyward
//!
//! The unified API for Keyward - device-bound key custody and delivery
//! for protected content.
//!
//! ## Overview
//!
//! Keyward keeps every asset encrypted at rest and releases content keys
//! only to registered devices:
//!
//! - **Registry**: Devices identified by attribute fingerprints, at most
//!   one active device per class (mobile, laptop) per user
//! - **Ingest**: Assets encrypted on the way in; keys sealed in custody
//! - **Brokering**: Per-request checks ending in a key wrapped for
//!   exactly one device
//! - **Audit**: An append-only event per successful grant
//!
//! ## Key Concepts
//!
//! - **Fingerprint**: A device id derived from canonicalized attributes.
//!   The same hardware always maps to the same record.
//! - **Class slot**: One active mobile and one active laptop per user;
//!   revocation frees the slot, reactivation reclaims it.
//! - **Wrapped key**: A content key encrypted to one device's X25519
//!   identity. The raw key never crosses the API boundary.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use keyward::core::{ContentKind, DeviceAttributes, DeviceClass, UserId};
//! use keyward::store::SqliteStore;
//! use keyward::vault::{CustodySecret, DirCustody};
//! use keyward::{AccessBroker, AllowAll, ContentConfig, ContentManager, DeviceRegistry, IngestRequest};
//!
//! async fn example() {
//!     let store = Arc::new(SqliteStore::open("keyward.db").unwrap());
//!     let custody = Arc::new(
//!         DirCustody::open("keys", CustodySecret::generate())
//!             .await
//!             .unwrap(),
//!     );
//!
//!     // Register a device
//!     let registry = DeviceRegistry::new(Arc::clone(&store));
//!     let user = UserId::new(42);
//!     registry.admit_user(user).await.unwrap();
//!     let attrs = DeviceAttributes::new("ios", "iPhone 15", "17.2", "A1B2C3");
//!     let registration = registry
//!         .register(user, DeviceClass::Mobile, Some("phone"), &attrs)
//!         .await
//!         .unwrap();
//!
//!     // Bring an asset under protection
//!     let manager = ContentManager::new(
//!         Arc::clone(&store),
//!         Arc::clone(&custody),
//!         ContentConfig::new("payloads"),
//!     );
//!     let asset = manager
//!         .ingest(IngestRequest::new("Lecture 1", ContentKind::Video, "lecture1.mp4"))
//!         .await
//!         .unwrap();
//!
//!     // Release the key to the device
//!     let broker = AccessBroker::new(store, custody, Arc::new(AllowAll));
//!     // let grant = broker
//!     //     .grant_access(user, &asset.id, &registration.device().id,
//!     //         AccessKind::Stream, ClientMeta::default())
//!     //     .await
//!     //     .unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `keyward::core` - Identifiers, fingerprints, records
//! - `keyward::vault` - Content keys, bulk encryption, custody, wrapping
//! - `keyward::store` - Storage abstraction and SQLite

pub mod broker;
pub mod content;
pub mod entitlement;
pub mod error;
pub mod registry;

// Re-export component crates
pub use keyward_core as core;
pub use keyward_store as store;
pub use keyward_vault as vault;

// Re-export main types for convenience
pub use broker::{AccessBroker, AccessGrant};
pub use content::{ContentConfig, ContentManager, IngestRequest};
pub use entitlement::{AllowAll, EntitlementProvider, EntitlementUnavailable, StaticEntitlements};
pub use error::{KeywardError, Result};
pub use registry::{DeviceRegistry, Registration};

// Re-export commonly used core types
pub use keyward_core::{
    AccessEvent, AccessKind, ClientMeta, ContentAsset, ContentId, ContentKind, Device,
    DeviceAttributes, DeviceClass, DeviceId, DevicePublicKey, KeyId, UserId,
};
