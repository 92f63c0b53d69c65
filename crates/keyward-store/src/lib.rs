//! # Keyward Store
//!
//! Storage abstraction for Keyward. Provides a trait-based interface for
//! device, content, and access-event persistence with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The store module abstracts persistence behind the [`Store`] trait,
//! allowing the registry and broker to be storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`DeviceInsert`] / [`Reactivate`] - Outcomes of the quota-gated writes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_store::{SqliteStore, Store, DeviceInsert};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("keyward.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // Insert a device
//!     // let device: Device = ...;
//!     // let result = store.insert_device(&device).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic quota**: at most one active device per (user, class); the
//!   backend enforces this at write time, so concurrent registrations
//!   serialize and exactly one wins
//! - **Flat records**: devices, assets, and events round-trip as whole
//!   records addressed by id
//! - **Soft delete**: deactivation flips `is_active`; rows are never removed

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ContentInsert, DeviceInsert, Reactivate, Store};
