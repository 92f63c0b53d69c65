//! Store trait: the abstract interface for registry persistence.
//!
//! This trait keeps the device registry and content catalog storage-agnostic.
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use keyward_core::{AccessEvent, ContentAsset, ContentId, Device, DeviceId, UserId};

use crate::error::Result;

/// Result of inserting a device row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceInsert {
    /// Device was inserted and now holds its class slot.
    Inserted,
    /// Another active device already holds this class slot.
    QuotaExceeded {
        /// The device currently occupying the slot.
        active: DeviceId,
    },
    /// A device with this fingerprint is already registered for the user.
    FingerprintExists,
}

/// Result of reactivating a revoked device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reactivate {
    /// Device transitioned from revoked to active.
    Reactivated(Device),
    /// Device was already active; only `last_seen` was updated.
    AlreadyActive(Device),
    /// Another active device already holds this class slot.
    QuotaExceeded {
        /// The device currently occupying the slot.
        active: DeviceId,
    },
    /// No device with this fingerprint is registered for the user.
    NotFound,
}

/// Result of inserting a content row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentInsert {
    /// Asset was inserted.
    Inserted,
    /// An asset with this content id already exists (idempotent - not an error).
    AlreadyExists,
}

/// The Store trait: async interface for registry persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Atomic quota**: The one-active-device-per-class rule is enforced by the
///   backend at insert/reactivate time, never by scanning and counting first.
///   Concurrent attempts serialize; exactly one wins.
/// - **Flat records**: Devices, assets, and events are stored and returned as
///   whole records addressed by id.
/// - **Append-only events**: Access events are never updated or deleted.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // User Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Admit a user, recording when they were first seen.
    ///
    /// Idempotent. Returns `true` if the user was newly admitted.
    async fn admit_user(&self, user: UserId, now: i64) -> Result<bool>;

    /// Check whether a user has been admitted.
    async fn user_exists(&self, user: UserId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Device Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new device row.
    ///
    /// # Returns
    /// - `Inserted` if the device was new and won its class slot.
    /// - `QuotaExceeded` if an active device already holds the slot.
    /// - `FingerprintExists` if the fingerprint is already registered.
    async fn insert_device(&self, device: &Device) -> Result<DeviceInsert>;

    /// Reactivate a revoked device, updating `last_seen`.
    ///
    /// Never issues new key material; the stored record keeps its public key.
    async fn reactivate_device(
        &self,
        user: UserId,
        device: &DeviceId,
        now: i64,
    ) -> Result<Reactivate>;

    /// Get a device by owner and fingerprint.
    async fn get_device(&self, user: UserId, device: &DeviceId) -> Result<Option<Device>>;

    /// Update `last_seen` on an active device.
    ///
    /// Returns `true` if an active device was touched, `false` if the device
    /// is missing or revoked.
    async fn touch_device(&self, user: UserId, device: &DeviceId, now: i64) -> Result<bool>;

    /// Revoke a device, freeing its class slot.
    ///
    /// Idempotent. Returns `true` if the device transitioned from active to
    /// revoked, `false` if it was already revoked or never existed.
    async fn deactivate_device(&self, user: UserId, device: &DeviceId) -> Result<bool>;

    /// List all devices for a user, active and revoked, oldest first.
    async fn list_devices(&self, user: UserId) -> Result<Vec<Device>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Content Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a content row.
    async fn insert_content(&self, asset: &ContentAsset) -> Result<ContentInsert>;

    /// Get an asset by content id, whether active or not.
    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentAsset>>;

    /// Soft-delete an asset.
    ///
    /// Idempotent. Returns `true` if the asset transitioned from active to
    /// inactive. The payload and custody record are not touched.
    async fn deactivate_content(&self, id: &ContentId) -> Result<bool>;

    /// List all active assets, oldest first.
    async fn list_active_content(&self) -> Result<Vec<ContentAsset>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Event Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an access event to the log.
    ///
    /// Returns the assigned event sequence number.
    async fn append_event(&self, event: &AccessEvent) -> Result<i64>;

    /// List events for a user, oldest first.
    async fn list_events_for_user(&self, user: UserId) -> Result<Vec<AccessEvent>>;

    /// List events for an asset, oldest first.
    async fn list_events_for_content(&self, content: &ContentId) -> Result<Vec<AccessEvent>>;
}
