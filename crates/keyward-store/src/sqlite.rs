//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Keyward. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use keyward_core::{
    AccessEvent, CanonicalAttributes, ClientMeta, ContentAsset, ContentId, Device, DeviceClass,
    DeviceId, DevicePublicKey, KeyId, UserId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ContentInsert, DeviceInsert, Reactivate, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Map a poisoned connection mutex into a database error.
fn lock_poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
        Some(format!("mutex poisoned: {}", e)),
    ))
}

/// Map a cancelled blocking task into a database error.
fn join_failed(e: tokio::task::JoinError) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(format!("spawn_blocking failed: {}", e)),
    ))
}

/// The statement tripped the table's primary key.
fn primary_key_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
}

/// The statement tripped a secondary unique index.
///
/// On the devices table the only such index is the active-class slot, so
/// this is the quota gate firing.
fn unique_index_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

// Helper to convert a row to Device
fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let device_id_bytes: Vec<u8> = row.get("device_id")?;
    let class_text: String = row.get("device_class")?;
    let attribute_bytes: Vec<u8> = row.get("attributes")?;
    let public_key_bytes: Vec<u8> = row.get("public_key")?;

    Ok(Device {
        id: DeviceId::from_bytes(device_id_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "device_id".into(), rusqlite::types::Type::Blob)
        })?),
        user: UserId::new(row.get::<_, i64>("user_id")? as u64),
        class: class_text.parse::<DeviceClass>().map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                2,
                "device_class".into(),
                rusqlite::types::Type::Text,
            )
        })?,
        platform: row.get("platform")?,
        name: row.get("device_name")?,
        attributes: CanonicalAttributes::from_bytes(attribute_bytes),
        public_key: DevicePublicKey(public_key_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(6, "public_key".into(), rusqlite::types::Type::Blob)
        })?),
        is_active: row.get("is_active")?,
        registered_at: row.get("registered_at")?,
        last_seen: row.get("last_seen")?,
    })
}

// Helper to convert a row to ContentAsset
fn row_to_content(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentAsset> {
    let content_id_bytes: Vec<u8> = row.get("content_id")?;
    let kind_text: String = row.get("kind")?;
    let payload_path: String = row.get("payload_path")?;
    let key_id_bytes: Vec<u8> = row.get("key_id")?;

    Ok(ContentAsset {
        id: ContentId::from_bytes(content_id_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "content_id".into(), rusqlite::types::Type::Blob)
        })?),
        title: row.get("title")?,
        description: row.get("description")?,
        kind: kind_text.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "kind".into(), rusqlite::types::Type::Text)
        })?,
        payload_path: PathBuf::from(payload_path),
        size_bytes: row.get::<_, i64>("size_bytes")? as u64,
        duration_secs: row.get::<_, Option<i64>>("duration_secs")?.map(|v| v as u32),
        thumbnail_path: row
            .get::<_, Option<String>>("thumbnail_path")?
            .map(PathBuf::from),
        key_id: KeyId::from_bytes(key_id_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(8, "key_id".into(), rusqlite::types::Type::Blob)
        })?),
        is_active: row.get("is_active")?,
        created_at: row.get("created_at")?,
    })
}

// Helper to convert a row to AccessEvent
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessEvent> {
    let content_id_bytes: Vec<u8> = row.get("content_id")?;
    let device_id_bytes: Vec<u8> = row.get("device_id")?;
    let kind_text: String = row.get("kind")?;

    Ok(AccessEvent {
        user: UserId::new(row.get::<_, i64>("user_id")? as u64),
        content: ContentId::from_bytes(content_id_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "content_id".into(), rusqlite::types::Type::Blob)
        })?),
        device: DeviceId::from_bytes(device_id_bytes.try_into().map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "device_id".into(), rusqlite::types::Type::Blob)
        })?),
        kind: kind_text.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "kind".into(), rusqlite::types::Type::Text)
        })?,
        at: row.get("at")?,
        meta: ClientMeta {
            remote_addr: row.get("remote_addr")?,
            user_agent: row.get("user_agent")?,
        },
    })
}

/// Fetch a full device row by owner and fingerprint.
fn fetch_device(
    conn: &Connection,
    user: UserId,
    device: &DeviceId,
) -> rusqlite::Result<Option<Device>> {
    conn.query_row(
        "SELECT device_id, user_id, device_class, platform, device_name, attributes,
                public_key, is_active, registered_at, last_seen
         FROM devices WHERE user_id = ?1 AND device_id = ?2",
        params![user.as_u64() as i64, device.as_bytes().as_slice()],
        row_to_device,
    )
    .optional()
}

/// Find which device currently holds the active slot for a class.
fn active_class_holder(
    conn: &Connection,
    user: UserId,
    class: DeviceClass,
) -> rusqlite::Result<Option<DeviceId>> {
    conn.query_row(
        "SELECT device_id FROM devices
         WHERE user_id = ?1 AND device_class = ?2 AND is_active = 1",
        params![user.as_u64() as i64, class.as_str()],
        |row| {
            let bytes: Vec<u8> = row.get(0)?;
            Ok(DeviceId::from_bytes(bytes.try_into().map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "device_id".into(),
                    rusqlite::types::Type::Blob,
                )
            })?))
        },
    )
    .optional()
}

#[async_trait]
impl Store for SqliteStore {
    async fn admit_user(&self, user: UserId, now: i64) -> Result<bool> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let changed = conn.execute(
                "INSERT OR IGNORE INTO users (user_id, admitted_at) VALUES (?1, ?2)",
                params![user.as_u64() as i64, now],
            )?;

            Ok(changed == 1)
        })
        .await
        .map_err(join_failed)?
    }

    async fn user_exists(&self, user: UserId) -> Result<bool> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)",
                params![user.as_u64() as i64],
                |row| row.get(0),
            )?;

            Ok(exists)
        })
        .await
        .map_err(join_failed)?
    }

    async fn insert_device(&self, device: &Device) -> Result<DeviceInsert> {
        let device = device.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            // No scan-and-count: the partial unique index on
            // (user_id, device_class) WHERE is_active = 1 is the quota gate,
            // so concurrent registrations serialize inside SQLite.
            let inserted = conn.execute(
                "INSERT INTO devices (
                    device_id, user_id, device_class, platform, device_name,
                    attributes, public_key, is_active, registered_at, last_seen
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    device.id.as_bytes().as_slice(),
                    device.user.as_u64() as i64,
                    device.class.as_str(),
                    &device.platform,
                    device.name.as_deref(),
                    device.attributes.as_bytes(),
                    device.public_key.0.as_slice(),
                    device.is_active,
                    device.registered_at,
                    device.last_seen,
                ],
            );

            match inserted {
                Ok(_) => Ok(DeviceInsert::Inserted),
                Err(e) if unique_index_violation(&e) => {
                    // The violation proves an active holder exists, and we
                    // still hold the connection lock.
                    let active = active_class_holder(&conn, device.user, device.class)?
                        .ok_or_else(|| {
                            StoreError::InvalidData(
                                "class slot violation without an active holder".into(),
                            )
                        })?;
                    Ok(DeviceInsert::QuotaExceeded { active })
                }
                Err(e) if primary_key_violation(&e) => Ok(DeviceInsert::FingerprintExists),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(join_failed)?
    }

    async fn reactivate_device(
        &self,
        user: UserId,
        device: &DeviceId,
        now: i64,
    ) -> Result<Reactivate> {
        let device = *device;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let revived = conn.execute(
                "UPDATE devices SET is_active = 1, last_seen = ?3
                 WHERE user_id = ?1 AND device_id = ?2 AND is_active = 0",
                params![user.as_u64() as i64, device.as_bytes().as_slice(), now],
            );

            match revived {
                Ok(1) => {
                    let restored = fetch_device(&conn, user, &device)?.ok_or_else(|| {
                        StoreError::InvalidData("reactivated device row vanished".into())
                    })?;
                    Ok(Reactivate::Reactivated(restored))
                }
                Ok(_) => {
                    // Nothing to revive: either already active or unknown.
                    let touched = conn.execute(
                        "UPDATE devices SET last_seen = ?3
                         WHERE user_id = ?1 AND device_id = ?2 AND is_active = 1",
                        params![user.as_u64() as i64, device.as_bytes().as_slice(), now],
                    )?;
                    if touched == 1 {
                        let current = fetch_device(&conn, user, &device)?.ok_or_else(|| {
                            StoreError::InvalidData("touched device row vanished".into())
                        })?;
                        Ok(Reactivate::AlreadyActive(current))
                    } else {
                        Ok(Reactivate::NotFound)
                    }
                }
                Err(e) if unique_index_violation(&e) => {
                    let stored = fetch_device(&conn, user, &device)?.ok_or_else(|| {
                        StoreError::InvalidData("class slot violation on unknown device".into())
                    })?;
                    let active =
                        active_class_holder(&conn, user, stored.class)?.ok_or_else(|| {
                            StoreError::InvalidData(
                                "class slot violation without an active holder".into(),
                            )
                        })?;
                    Ok(Reactivate::QuotaExceeded { active })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(join_failed)?
    }

    async fn get_device(&self, user: UserId, device: &DeviceId) -> Result<Option<Device>> {
        let device = *device;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;
            fetch_device(&conn, user, &device).map_err(StoreError::from)
        })
        .await
        .map_err(join_failed)?
    }

    async fn touch_device(&self, user: UserId, device: &DeviceId, now: i64) -> Result<bool> {
        let device = *device;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let changed = conn.execute(
                "UPDATE devices SET last_seen = ?3
                 WHERE user_id = ?1 AND device_id = ?2 AND is_active = 1",
                params![user.as_u64() as i64, device.as_bytes().as_slice(), now],
            )?;

            Ok(changed == 1)
        })
        .await
        .map_err(join_failed)?
    }

    async fn deactivate_device(&self, user: UserId, device: &DeviceId) -> Result<bool> {
        let device = *device;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let changed = conn.execute(
                "UPDATE devices SET is_active = 0
                 WHERE user_id = ?1 AND device_id = ?2 AND is_active = 1",
                params![user.as_u64() as i64, device.as_bytes().as_slice()],
            )?;

            Ok(changed == 1)
        })
        .await
        .map_err(join_failed)?
    }

    async fn list_devices(&self, user: UserId) -> Result<Vec<Device>> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let mut stmt = conn.prepare(
                "SELECT device_id, user_id, device_class, platform, device_name, attributes,
                        public_key, is_active, registered_at, last_seen
                 FROM devices WHERE user_id = ?1
                 ORDER BY registered_at, device_id",
            )?;

            let devices = stmt
                .query_map(params![user.as_u64() as i64], row_to_device)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(devices)
        })
        .await
        .map_err(join_failed)?
    }

    async fn insert_content(&self, asset: &ContentAsset) -> Result<ContentInsert> {
        let asset = asset.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let inserted = conn.execute(
                "INSERT INTO contents (
                    content_id, title, description, kind, payload_path,
                    size_bytes, duration_secs, thumbnail_path, key_id, is_active, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    asset.id.as_bytes().as_slice(),
                    &asset.title,
                    &asset.description,
                    asset.kind.as_str(),
                    asset.payload_path.to_string_lossy().into_owned(),
                    asset.size_bytes as i64,
                    asset.duration_secs.map(|v| v as i64),
                    asset
                        .thumbnail_path
                        .as_ref()
                        .map(|p| p.to_string_lossy().into_owned()),
                    asset.key_id.as_bytes().as_slice(),
                    asset.is_active,
                    asset.created_at,
                ],
            );

            match inserted {
                Ok(_) => Ok(ContentInsert::Inserted),
                Err(e) if primary_key_violation(&e) => Ok(ContentInsert::AlreadyExists),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(join_failed)?
    }

    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentAsset>> {
        let id = *id;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            conn.query_row(
                "SELECT content_id, title, description, kind, payload_path,
                        size_bytes, duration_secs, thumbnail_path, key_id, is_active, created_at
                 FROM contents WHERE content_id = ?1",
                params![id.as_bytes().as_slice()],
                row_to_content,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
        .map_err(join_failed)?
    }

    async fn deactivate_content(&self, id: &ContentId) -> Result<bool> {
        let id = *id;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let changed = conn.execute(
                "UPDATE contents SET is_active = 0 WHERE content_id = ?1 AND is_active = 1",
                params![id.as_bytes().as_slice()],
            )?;

            Ok(changed == 1)
        })
        .await
        .map_err(join_failed)?
    }

    async fn list_active_content(&self) -> Result<Vec<ContentAsset>> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let mut stmt = conn.prepare(
                "SELECT content_id, title, description, kind, payload_path,
                        size_bytes, duration_secs, thumbnail_path, key_id, is_active, created_at
                 FROM contents WHERE is_active = 1
                 ORDER BY created_at, content_id",
            )?;

            let assets = stmt
                .query_map([], row_to_content)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(assets)
        })
        .await
        .map_err(join_failed)?
    }

    async fn append_event(&self, event: &AccessEvent) -> Result<i64> {
        let event = event.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            conn.execute(
                "INSERT INTO access_events (
                    user_id, content_id, device_id, kind, at, remote_addr, user_agent
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.user.as_u64() as i64,
                    event.content.as_bytes().as_slice(),
                    event.device.as_bytes().as_slice(),
                    event.kind.as_str(),
                    event.at,
                    event.meta.remote_addr.as_deref(),
                    event.meta.user_agent.as_deref(),
                ],
            )?;

            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(join_failed)?
    }

    async fn list_events_for_user(&self, user: UserId) -> Result<Vec<AccessEvent>> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let mut stmt = conn.prepare(
                "SELECT user_id, content_id, device_id, kind, at, remote_addr, user_agent
                 FROM access_events WHERE user_id = ?1
                 ORDER BY at, event_id",
            )?;

            let events = stmt
                .query_map(params![user.as_u64() as i64], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(events)
        })
        .await
        .map_err(join_failed)?
    }

    async fn list_events_for_content(&self, content: &ContentId) -> Result<Vec<AccessEvent>> {
        let content = *content;
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(lock_poisoned)?;

            let mut stmt = conn.prepare(
                "SELECT user_id, content_id, device_id, kind, at, remote_addr, user_agent
                 FROM access_events WHERE content_id = ?1
                 ORDER BY at, event_id",
            )?;

            let events = stmt
                .query_map(params![content.as_bytes().as_slice()], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(events)
        })
        .await
        .map_err(join_failed)?
    }
}
