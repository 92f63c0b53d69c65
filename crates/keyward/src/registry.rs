//! Device registration, verification, and revocation.
//!
//! The registry owns the device lifecycle: Unregistered → Active →
//! (Revoked ⇄ reactivated). A device is identified by its attribute
//! fingerprint, so the same hardware re-registering is recognized and
//! restored instead of duplicated, and its key material is never
//! re-issued.

use std::sync::Arc;

use keyward_core::{fingerprint, Device, DeviceAttributes, DeviceClass, DeviceId, UserId};
use keyward_store::{DeviceInsert, Reactivate, Store, StoreError};
use keyward_vault::{generate_device_identity, DevicePrivateKey};

use crate::error::{KeywardError, Result};

/// Outcome of a registration request.
#[derive(Debug)]
pub enum Registration {
    /// First sighting of this fingerprint. `private_key` is handed out
    /// exactly once, here; no copy of it is ever stored.
    New {
        device: Device,
        private_key: DevicePrivateKey,
    },
    /// Known fingerprint restored to (or confirmed in) its class slot.
    /// No new key material is issued.
    Reactivated { device: Device },
}

impl Registration {
    /// The registered device record.
    pub fn device(&self) -> &Device {
        match self {
            Registration::New { device, .. } => device,
            Registration::Reactivated { device } => device,
        }
    }
}

/// Registers devices under the per-class quota and answers whether a
/// device may act for a user.
pub struct DeviceRegistry<S: Store> {
    store: Arc<S>,
}

impl<S: Store> DeviceRegistry<S> {
    /// Create a registry over a shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission & Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Admit a user into the registry. Idempotent.
    pub async fn admit_user(&self, user: UserId) -> Result<()> {
        if self.store.admit_user(user, now_millis()).await? {
            tracing::info!("admitted user {}", user);
        }
        Ok(())
    }

    /// Register the device described by `attributes` for `user`.
    ///
    /// A fingerprint never seen before gets a fresh X25519 identity and
    /// claims the `class` slot; the private half is returned in
    /// [`Registration::New`] and exists nowhere else. A known fingerprint
    /// is reactivated instead, subject to the same slot check.
    pub async fn register(
        &self,
        user: UserId,
        class: DeviceClass,
        device_name: Option<&str>,
        attributes: &DeviceAttributes,
    ) -> Result<Registration> {
        if !self.store.user_exists(user).await? {
            return Err(KeywardError::UserNotFound(user));
        }

        let (device_id, canonical) = fingerprint(attributes)?;
        let now = now_millis();

        // Known fingerprint: restore the stored record, never mint keys.
        if let Some(existing) = self.store.get_device(user, &device_id).await? {
            return self.reactivate(user, existing, class, now).await;
        }

        let (private_key, public_key) = generate_device_identity();
        let device = Device {
            id: device_id,
            user,
            class,
            platform: attributes.platform.clone(),
            name: device_name.map(str::to_owned),
            attributes: canonical,
            public_key,
            is_active: true,
            registered_at: now,
            last_seen: now,
        };

        match self.store.insert_device(&device).await? {
            DeviceInsert::Inserted => {
                tracing::info!(
                    "registered new {} device {} for user {}",
                    class,
                    device.id,
                    user
                );
                Ok(Registration::New {
                    device,
                    private_key,
                })
            }
            DeviceInsert::QuotaExceeded { active } => {
                tracing::debug!(
                    "registration refused for user {}: {} slot held by {}",
                    user,
                    class,
                    active
                );
                Err(KeywardError::QuotaExceeded { class, active })
            }
            DeviceInsert::FingerprintExists => {
                // Lost a race with a concurrent registration of the same
                // fingerprint; the stored identity wins.
                let existing = self.store.get_device(user, &device_id).await?.ok_or_else(|| {
                    StoreError::InvalidData("fingerprint exists but device row is missing".into())
                })?;
                self.reactivate(user, existing, class, now).await
            }
        }
    }

    async fn reactivate(
        &self,
        user: UserId,
        existing: Device,
        requested: DeviceClass,
        now: i64,
    ) -> Result<Registration> {
        if existing.class != requested {
            return Err(KeywardError::DeviceClassMismatch {
                device: existing.id,
                actual: existing.class,
                requested,
            });
        }

        match self.store.reactivate_device(user, &existing.id, now).await? {
            Reactivate::Reactivated(device) => {
                tracing::info!(
                    "reactivated {} device {} for user {}",
                    device.class,
                    device.id,
                    user
                );
                Ok(Registration::Reactivated { device })
            }
            Reactivate::AlreadyActive(device) => Ok(Registration::Reactivated { device }),
            Reactivate::QuotaExceeded { active } => {
                tracing::debug!(
                    "reactivation of {} refused for user {}: {} slot held by {}",
                    existing.id,
                    user,
                    requested,
                    active
                );
                Err(KeywardError::QuotaExceeded {
                    class: requested,
                    active,
                })
            }
            // The row vanished between lookup and reactivation.
            Reactivate::NotFound => Err(KeywardError::DeviceNotAuthorized(existing.id)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification & Revocation
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify that `device` is active and belongs to `user`.
    ///
    /// Success refreshes the device's `last_seen`. Unknown, revoked, and
    /// foreign devices are refused alike.
    pub async fn verify(&self, user: UserId, device: &DeviceId) -> Result<Device> {
        if !self.store.touch_device(user, device, now_millis()).await? {
            tracing::debug!("verify refused for device {} of user {}", device, user);
            return Err(KeywardError::DeviceNotAuthorized(*device));
        }
        self.store
            .get_device(user, device)
            .await?
            .ok_or(KeywardError::DeviceNotAuthorized(*device))
    }

    /// Revoke a device, freeing its class slot. Idempotent.
    ///
    /// Takes effect immediately: there is no cache between the registry
    /// and the store, so the next `verify` already sees the revocation.
    pub async fn revoke(&self, user: UserId, device: &DeviceId) -> Result<bool> {
        let revoked = self.store.deactivate_device(user, device).await?;
        if revoked {
            tracing::info!("revoked device {} for user {}", device, user);
        }
        Ok(revoked)
    }

    /// List the user's active devices, oldest first.
    pub async fn list(&self, user: UserId) -> Result<Vec<Device>> {
        let devices = self.store.list_devices(user).await?;
        Ok(devices.into_iter().filter(|d| d.is_active).collect())
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
