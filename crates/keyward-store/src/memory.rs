//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use keyward_core::{AccessEvent, ContentAsset, ContentId, Device, DeviceClass, DeviceId, UserId};

use crate::error::Result;
use crate::traits::{ContentInsert, DeviceInsert, Reactivate, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Admitted users and their admission times.
    users: HashMap<UserId, i64>,

    /// Devices indexed by owner and fingerprint.
    devices: HashMap<(UserId, DeviceId), Device>,

    /// Class slot index: (user, class) -> the active device.
    active_slots: HashMap<(UserId, DeviceClass), DeviceId>,

    /// Content catalog.
    contents: HashMap<ContentId, ContentAsset>,

    /// Append-only event log.
    events: Vec<AccessEvent>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                users: HashMap::new(),
                devices: HashMap::new(),
                active_slots: HashMap::new(),
                contents: HashMap::new(),
                events: Vec::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn admit_user(&self, user: UserId, now: i64) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();

        if inner.users.contains_key(&user) {
            return Ok(false);
        }
        inner.users.insert(user, now);
        Ok(true)
    }

    async fn user_exists(&self, user: UserId) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.users.contains_key(&user))
    }

    async fn insert_device(&self, device: &Device) -> Result<DeviceInsert> {
        let mut inner = self.inner.write().unwrap();
        let key = (device.user, device.id);

        if inner.devices.contains_key(&key) {
            return Ok(DeviceInsert::FingerprintExists);
        }

        let slot = (device.user, device.class);
        if device.is_active {
            if let Some(&active) = inner.active_slots.get(&slot) {
                return Ok(DeviceInsert::QuotaExceeded { active });
            }
            inner.active_slots.insert(slot, device.id);
        }
        inner.devices.insert(key, device.clone());

        Ok(DeviceInsert::Inserted)
    }

    async fn reactivate_device(
        &self,
        user: UserId,
        device: &DeviceId,
        now: i64,
    ) -> Result<Reactivate> {
        let mut inner = self.inner.write().unwrap();
        let key = (user, *device);

        let Some(mut stored) = inner.devices.get(&key).cloned() else {
            return Ok(Reactivate::NotFound);
        };

        if stored.is_active {
            stored.last_seen = now;
            inner.devices.insert(key, stored.clone());
            return Ok(Reactivate::AlreadyActive(stored));
        }

        let slot = (user, stored.class);
        if let Some(&active) = inner.active_slots.get(&slot) {
            return Ok(Reactivate::QuotaExceeded { active });
        }

        stored.is_active = true;
        stored.last_seen = now;
        inner.active_slots.insert(slot, *device);
        inner.devices.insert(key, stored.clone());

        Ok(Reactivate::Reactivated(stored))
    }

    async fn get_device(&self, user: UserId, device: &DeviceId) -> Result<Option<Device>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.devices.get(&(user, *device)).cloned())
    }

    async fn touch_device(&self, user: UserId, device: &DeviceId, now: i64) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();

        match inner.devices.get_mut(&(user, *device)) {
            Some(stored) if stored.is_active => {
                stored.last_seen = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_device(&self, user: UserId, device: &DeviceId) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        let key = (user, *device);

        let Some(stored) = inner.devices.get(&key).cloned() else {
            return Ok(false);
        };
        if !stored.is_active {
            return Ok(false);
        }

        let slot = (user, stored.class);
        if inner.active_slots.get(&slot) == Some(device) {
            inner.active_slots.remove(&slot);
        }
        if let Some(stored) = inner.devices.get_mut(&key) {
            stored.is_active = false;
        }

        Ok(true)
    }

    async fn list_devices(&self, user: UserId) -> Result<Vec<Device>> {
        let inner = self.inner.read().unwrap();

        let mut devices: Vec<Device> = inner
            .devices
            .values()
            .filter(|d| d.user == user)
            .cloned()
            .collect();
        devices.sort_by_key(|d| (d.registered_at, d.id.0));

        Ok(devices)
    }

    async fn insert_content(&self, asset: &ContentAsset) -> Result<ContentInsert> {
        let mut inner = self.inner.write().unwrap();

        if inner.contents.contains_key(&asset.id) {
            return Ok(ContentInsert::AlreadyExists);
        }
        inner.contents.insert(asset.id, asset.clone());

        Ok(ContentInsert::Inserted)
    }

    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentAsset>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.contents.get(id).cloned())
    }

    async fn deactivate_content(&self, id: &ContentId) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();

        match inner.contents.get_mut(id) {
            Some(asset) if asset.is_active => {
                asset.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active_content(&self) -> Result<Vec<ContentAsset>> {
        let inner = self.inner.read().unwrap();

        let mut assets: Vec<ContentAsset> = inner
            .contents
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        assets.sort_by_key(|a| (a.created_at, a.id.0));

        Ok(assets)
    }

    async fn append_event(&self, event: &AccessEvent) -> Result<i64> {
        let mut inner = self.inner.write().unwrap();
        inner.events.push(event.clone());
        Ok(inner.events.len() as i64)
    }

    async fn list_events_for_user(&self, user: UserId) -> Result<Vec<AccessEvent>> {
        let inner = self.inner.read().unwrap();

        let mut events: Vec<AccessEvent> = inner
            .events
            .iter()
            .filter(|e| e.user == user)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.at);

        Ok(events)
    }

    async fn list_events_for_content(&self, content: &ContentId) -> Result<Vec<AccessEvent>> {
        let inner = self.inner.read().unwrap();

        let mut events: Vec<AccessEvent> = inner
            .events
            .iter()
            .filter(|e| e.content == *content)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.at);

        Ok(events)
    }
}
