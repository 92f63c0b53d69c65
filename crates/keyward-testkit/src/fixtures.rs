//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use keyward::{
    AccessBroker, ContentConfig, ContentManager, DeviceRegistry, IngestRequest, Registration,
    StaticEntitlements,
};
use keyward_core::{ContentAsset, ContentKind, Device, DeviceAttributes, DeviceClass, UserId};
use keyward_store::MemoryStore;
use keyward_vault::{DevicePrivateKey, MemoryCustody};
use tempfile::TempDir;

/// A complete in-memory deployment with temp-dir payload storage.
///
/// All components share the same store and custody, exactly as a real
/// deployment wires them.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub custody: Arc<MemoryCustody>,
    pub entitlements: Arc<StaticEntitlements>,
    pub registry: DeviceRegistry<MemoryStore>,
    pub manager: ContentManager<MemoryStore, MemoryCustody>,
    pub broker: AccessBroker<MemoryStore, MemoryCustody, StaticEntitlements>,
    root: TempDir,
}

impl TestFixture {
    /// Create a fixture with empty backends.
    pub fn new() -> Self {
        let root = TempDir::new().expect("create temp dir");
        let store = Arc::new(MemoryStore::new());
        let custody = Arc::new(MemoryCustody::new());
        let entitlements = Arc::new(StaticEntitlements::new());
        Self {
            registry: DeviceRegistry::new(Arc::clone(&store)),
            manager: ContentManager::new(
                Arc::clone(&store),
                Arc::clone(&custody),
                ContentConfig::new(root.path().join("payloads")),
            ),
            broker: AccessBroker::new(
                Arc::clone(&store),
                Arc::clone(&custody),
                Arc::clone(&entitlements),
            ),
            store,
            custody,
            entitlements,
            root,
        }
    }

    /// Attribute set for a deterministic fake device.
    pub fn sample_attributes(seed: u8, platform: &str) -> DeviceAttributes {
        DeviceAttributes::new(platform, "test model", "1.0", format!("hw-{:02x}", seed))
    }

    /// Admit `user` and register a fresh device in `class`.
    ///
    /// `seed` determines the fingerprint; reuse a seed to hit the
    /// reactivation path instead.
    pub async fn register_device(
        &self,
        user: UserId,
        class: DeviceClass,
        seed: u8,
    ) -> (Device, DevicePrivateKey) {
        self.registry.admit_user(user).await.expect("admit user");
        let platform = match class {
            DeviceClass::Mobile => "ios",
            DeviceClass::Laptop => "macos",
        };
        match self
            .registry
            .register(user, class, None, &Self::sample_attributes(seed, platform))
            .await
            .expect("register device")
        {
            Registration::New {
                device,
                private_key,
            } => (device, private_key),
            Registration::Reactivated { device } => {
                panic!("seed {} already registered as device {}", seed, device.id)
            }
        }
    }

    /// Write a plaintext source file and ingest it.
    pub async fn ingest_sample(
        &self,
        title: &str,
        kind: ContentKind,
        plaintext: &[u8],
    ) -> ContentAsset {
        let source = self.source_path(title);
        fs::write(&source, plaintext).expect("write source");
        self.manager
            .ingest(IngestRequest::new(title, kind, &source))
            .await
            .expect("ingest")
    }

    /// Admit `count` users, returning their ids.
    pub async fn admit_users(&self, count: usize) -> Vec<UserId> {
        let mut users = Vec::with_capacity(count);
        for i in 0..count as u64 {
            let user = UserId::new(1000 + i);
            self.registry.admit_user(user).await.expect("admit user");
            users.push(user);
        }
        users
    }

    fn source_path(&self, title: &str) -> PathBuf {
        self.root
            .path()
            .join(format!("{}.src", title.replace(' ', "-")))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward::KeywardError;
    use keyward_core::{AccessKind, ClientMeta};
    use keyward_vault::{decrypt_stream, unwrap_with_device};

    #[tokio::test]
    async fn test_fixture_grant_roundtrip() {
        let fixture = TestFixture::new();
        let user = UserId::new(1);
        let (device, private_key) = fixture.register_device(user, DeviceClass::Mobile, 1).await;
        let asset = fixture
            .ingest_sample("clip", ContentKind::Video, b"frames of a clip")
            .await;
        fixture.entitlements.grant(user, asset.id);

        let grant = fixture
            .broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, ClientMeta::default())
            .await
            .unwrap();

        let key = unwrap_with_device(&grant.wrapped_key, &private_key).unwrap();
        let payload = fs::read(&grant.content.payload_path).unwrap();
        let mut recovered = Vec::new();
        decrypt_stream(&key, payload.as_slice(), &mut recovered).unwrap();
        assert_eq!(recovered, b"frames of a clip");
    }

    #[tokio::test]
    async fn test_fixture_enforces_quota() {
        let fixture = TestFixture::new();
        let user = UserId::new(1);
        fixture.register_device(user, DeviceClass::Mobile, 1).await;

        let err = fixture
            .registry
            .register(
                user,
                DeviceClass::Mobile,
                None,
                &TestFixture::sample_attributes(2, "android"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_admit_users_yields_distinct_ids() {
        let fixture = TestFixture::new();
        let users = fixture.admit_users(3).await;

        assert_eq!(users.len(), 3);
        assert_ne!(users[0], users[1]);
        assert_ne!(users[1], users[2]);
        for user in users {
            fixture.register_device(user, DeviceClass::Laptop, user.as_u64() as u8).await;
        }
    }
}
