//! # Keyward Testkit
//!
//! Testing utilities for Keyward.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known attribute sets with expected fingerprints for cross-platform verification
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A ready-made deployment over in-memory backends
//!
//! ## Golden Vectors
//!
//! Golden vectors ensure deterministic fingerprinting across implementations:
//!
//! ```rust
//! use keyward_testkit::vectors::{all_vectors, device_id_from_vector};
//!
//! for vector in all_vectors() {
//!     let id = device_id_from_vector(&vector);
//!     println!("{}: {}", vector.name, id.to_hex());
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keyward::core::fingerprint;
//! use keyward_testkit::generators::{attributes_from_params, AttributeParams};
//!
//! proptest! {
//!     #[test]
//!     fn fingerprint_is_deterministic(params: AttributeParams) {
//!         let attrs = attributes_from_params(&params);
//!         let (id1, _) = fingerprint(&attrs).unwrap();
//!         let (id2, _) = fingerprint(&attrs).unwrap();
//!         prop_assert_eq!(id1, id2);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up test scenarios:
//!
//! ```rust,no_run
//! use keyward::core::{ContentKind, DeviceClass};
//! use keyward_testkit::fixtures::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new();
//!     let user = fixture.admit_users(1).await[0];
//!     let (device, _key) = fixture.register_device(user, DeviceClass::Mobile, 1).await;
//!     let asset = fixture.ingest_sample("sample", ContentKind::Pdf, b"payload").await;
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::TestFixture;
pub use generators::{attributes_from_params, AttributeParams};
pub use vectors::{all_vectors, device_id_from_vector, verify_all_vectors, GoldenVector};
