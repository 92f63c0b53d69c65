//! Access brokering: the gate between a device and a content key.
//!
//! `grant_access` runs a fixed sequence of checks and refuses at the
//! first failure; nothing is recorded for refused requests. A successful
//! grant appends exactly one audit event before the wrapped key is
//! surfaced, so the audit trail records every key release.

use std::sync::Arc;

use keyward_core::{AccessEvent, AccessKind, ClientMeta, ContentAsset, ContentId, DeviceId, UserId};
use keyward_store::Store;
use keyward_vault::{wrap_for_device, KeyCustody, WrappedKey};

use crate::entitlement::EntitlementProvider;
use crate::error::{KeywardError, Result};
use crate::registry::DeviceRegistry;

/// A granted access: the wrapped key and the asset it opens.
#[derive(Debug)]
pub struct AccessGrant {
    /// The asset's catalog record; `payload_path` is what delivery serves.
    pub content: ContentAsset,
    /// The content key, wrapped for the requesting device only.
    pub wrapped_key: WrappedKey,
}

/// Checks a request against registry, entitlements, and custody, and
/// releases per-device wrapped keys.
pub struct AccessBroker<S: Store, K: KeyCustody, E: EntitlementProvider> {
    store: Arc<S>,
    custody: Arc<K>,
    entitlements: Arc<E>,
    registry: DeviceRegistry<S>,
}

impl<S: Store, K: KeyCustody, E: EntitlementProvider> AccessBroker<S, K, E> {
    /// Create a broker over shared backends.
    pub fn new(store: Arc<S>, custody: Arc<K>, entitlements: Arc<E>) -> Self {
        let registry = DeviceRegistry::new(Arc::clone(&store));
        Self {
            store,
            custody,
            entitlements,
            registry,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Authorize `device` to open `content` for `user`.
    ///
    /// Checks run in a fixed order: content first, then device, then
    /// entitlement, then custody. The first failing check decides the
    /// error; refused requests leave no trace in the audit trail.
    pub async fn grant_access(
        &self,
        user: UserId,
        content: &ContentId,
        device: &DeviceId,
        kind: AccessKind,
        meta: ClientMeta,
    ) -> Result<AccessGrant> {
        // The asset must exist and be in service.
        let Some(asset) = self.store.get_content(content).await?.filter(|a| a.is_active) else {
            tracing::debug!(
                "grant refused for user {}: content {} is not served",
                user,
                content
            );
            return Err(KeywardError::ContentNotFound(*content));
        };

        // The device must be active and owned by the requester.
        let device = self.registry.verify(user, device).await?;

        // The user must hold an entitlement.
        if !self
            .entitlements
            .has_active_entitlement(user, content)
            .await?
        {
            tracing::debug!(
                "grant refused for user {}: no entitlement for content {}",
                user,
                content
            );
            return Err(KeywardError::EntitlementRequired(*content));
        }

        // The content key must be in custody. A cataloged asset without
        // its key is an integrity fault, not a business rejection.
        let key = match self.custody.fetch(&asset.key_id).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                tracing::error!(
                    "key {} for content {} is not in custody",
                    asset.key_id,
                    asset.id
                );
                return Err(KeywardError::KeyMaterialMissing {
                    content: asset.id,
                    key: asset.key_id,
                });
            }
            Err(e) => {
                tracing::error!("custody fetch for key {} failed: {}", asset.key_id, e);
                return Err(e.into());
            }
        };

        // Wrap for this device only; the raw key never leaves the broker.
        let wrapped_key = wrap_for_device(&key, &device.public_key);

        // Record the grant before surfacing it. Events record grants,
        // not deliveries.
        let event = AccessEvent {
            user,
            content: asset.id,
            device: device.id,
            kind,
            at: now_millis(),
            meta,
        };
        self.store.append_event(&event).await?;

        tracing::info!(
            "granted {} access to content {} for user {} on device {}",
            kind,
            asset.id,
            user,
            device.id
        );

        Ok(AccessGrant {
            content: asset,
            wrapped_key,
        })
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use keyward_core::{ContentKind, Device, DeviceAttributes, DeviceClass};
    use keyward_store::MemoryStore;
    use keyward_vault::{unwrap_with_device, ContentKey, DevicePrivateKey, MemoryCustody};

    use crate::entitlement::{AllowAll, EntitlementUnavailable, StaticEntitlements};
    use crate::registry::Registration;

    fn backends() -> (Arc<MemoryStore>, Arc<MemoryCustody>) {
        (Arc::new(MemoryStore::new()), Arc::new(MemoryCustody::new()))
    }

    fn meta() -> ClientMeta {
        ClientMeta::new("203.0.113.9", "keyward-client/1.0")
    }

    async fn seed_device(
        store: &Arc<MemoryStore>,
        user: UserId,
        class: DeviceClass,
    ) -> (Device, DevicePrivateKey) {
        let registry = DeviceRegistry::new(Arc::clone(store));
        registry.admit_user(user).await.unwrap();
        let attrs = DeviceAttributes::new(
            "ios",
            "test model",
            "1.0",
            format!("hw-{}-{}", user, class),
        );
        match registry.register(user, class, None, &attrs).await.unwrap() {
            Registration::New {
                device,
                private_key,
            } => (device, private_key),
            other => panic!("expected New, got {:?}", other),
        }
    }

    async fn seed_asset(
        store: &Arc<MemoryStore>,
        custody: &Arc<MemoryCustody>,
        seed: u8,
    ) -> (ContentAsset, ContentKey) {
        let key = ContentKey::generate();
        custody.put(&key).await.unwrap();
        let asset = ContentAsset {
            id: ContentId::from_bytes([seed; 32]),
            title: "Asset".into(),
            description: String::new(),
            kind: ContentKind::Pdf,
            payload_path: PathBuf::from(format!("/payloads/{:02x}.kwp", seed)),
            size_bytes: 1024,
            duration_secs: None,
            thumbnail_path: None,
            key_id: key.id(),
            is_active: true,
            created_at: 1_700_000_000_000,
        };
        store
            .insert_content(&asset)
            .await
            .unwrap();
        (asset, key)
    }

    async fn assert_no_events(store: &MemoryStore, user: UserId) {
        assert!(store.list_events_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_access_releases_wrapped_key_and_records_event() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, private_key) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (asset, key) = seed_asset(&store, &custody, 0xC0).await;

        let broker = AccessBroker::new(Arc::clone(&store), Arc::clone(&custody), Arc::new(AllowAll));
        let grant = broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap();

        assert_eq!(grant.content.id, asset.id);
        let unwrapped = unwrap_with_device(&grant.wrapped_key, &private_key).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());

        let events = store.list_events_for_user(user).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content, asset.id);
        assert_eq!(events[0].device, device.id);
        assert_eq!(events[0].kind, AccessKind::Stream);
        assert_eq!(events[0].meta.remote_addr.as_deref(), Some("203.0.113.9"));
    }

    #[tokio::test]
    async fn test_every_grant_appends_an_event() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC1).await;

        let broker = AccessBroker::new(Arc::clone(&store), Arc::clone(&custody), Arc::new(AllowAll));
        for _ in 0..3 {
            broker
                .grant_access(user, &asset.id, &device.id, AccessKind::View, meta())
                .await
                .unwrap();
        }

        assert_eq!(store.list_events_for_user(user).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_grant_refuses_unknown_content() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;

        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(AllowAll));
        let unknown = ContentId::from_bytes([0x99; 32]);
        let err = broker
            .grant_access(user, &unknown, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap_err();

        assert!(matches!(err, KeywardError::ContentNotFound(c) if c == unknown));
        assert_no_events(&store, user).await;
    }

    #[tokio::test]
    async fn test_grant_refuses_deactivated_content() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC2).await;
        store.deactivate_content(&asset.id).await.unwrap();

        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(AllowAll));
        let err = broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap_err();

        assert!(matches!(err, KeywardError::ContentNotFound(_)));
        assert_no_events(&store, user).await;
    }

    #[tokio::test]
    async fn test_grant_refuses_revoked_device() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC3).await;

        let registry = DeviceRegistry::new(Arc::clone(&store));
        registry.revoke(user, &device.id).await.unwrap();

        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(AllowAll));
        let err = broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Download, meta())
            .await
            .unwrap_err();

        assert!(matches!(err, KeywardError::DeviceNotAuthorized(_)));
        assert_no_events(&store, user).await;
    }

    #[tokio::test]
    async fn test_grant_refuses_foreign_device() {
        let (store, custody) = backends();
        let owner = UserId::new(1);
        let requester = UserId::new(2);
        let (device, _) = seed_device(&store, owner, DeviceClass::Mobile).await;
        seed_device(&store, requester, DeviceClass::Mobile).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC4).await;

        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(AllowAll));
        let err = broker
            .grant_access(requester, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap_err();

        assert!(matches!(err, KeywardError::DeviceNotAuthorized(_)));
        assert_no_events(&store, requester).await;
    }

    #[tokio::test]
    async fn test_grant_requires_entitlement() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC5).await;

        let entitlements = Arc::new(StaticEntitlements::new());
        let broker = AccessBroker::new(
            Arc::clone(&store),
            Arc::clone(&custody),
            Arc::clone(&entitlements),
        );

        let err = broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::EntitlementRequired(c) if c == asset.id));
        assert_no_events(&store, user).await;

        // The same request passes once the entitlement exists.
        entitlements.grant(user, asset.id);
        broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap();
        assert_eq!(store.list_events_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grant_surfaces_provider_outage() {
        struct Outage;

        #[async_trait]
        impl EntitlementProvider for Outage {
            async fn has_active_entitlement(
                &self,
                _user: UserId,
                _content: &ContentId,
            ) -> std::result::Result<bool, EntitlementUnavailable> {
                Err(EntitlementUnavailable("billing backend down".into()))
            }
        }

        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC6).await;

        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(Outage));
        let err = broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap_err();

        assert!(matches!(err, KeywardError::EntitlementUnavailable(_)));
        assert_no_events(&store, user).await;
    }

    #[tokio::test]
    async fn test_grant_reports_missing_key_material() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;

        // Catalog row whose key never reached custody.
        let stray_key = ContentKey::generate();
        let asset = ContentAsset {
            id: ContentId::from_bytes([0xC7; 32]),
            title: "Orphan".into(),
            description: String::new(),
            kind: ContentKind::Video,
            payload_path: PathBuf::from("/payloads/orphan.kwp"),
            size_bytes: 2048,
            duration_secs: Some(90),
            thumbnail_path: None,
            key_id: stray_key.id(),
            is_active: true,
            created_at: 1_700_000_000_000,
        };
        store.insert_content(&asset).await.unwrap();

        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(AllowAll));
        let err = broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap_err();

        match err {
            KeywardError::KeyMaterialMissing { content, key } => {
                assert_eq!(content, asset.id);
                assert_eq!(key, stray_key.id());
            }
            other => panic!("expected KeyMaterialMissing, got {:?}", other),
        }
        assert_no_events(&store, user).await;
    }

    #[tokio::test]
    async fn test_wrapped_key_is_bound_to_the_requesting_device() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (mobile, _) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (_, laptop_key) = seed_device(&store, user, DeviceClass::Laptop).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC8).await;

        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(AllowAll));
        let grant = broker
            .grant_access(user, &asset.id, &mobile.id, AccessKind::Download, meta())
            .await
            .unwrap();

        assert!(unwrap_with_device(&grant.wrapped_key, &laptop_key).is_err());
    }

    #[tokio::test]
    async fn test_content_check_precedes_device_check() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;

        let registry = DeviceRegistry::new(Arc::clone(&store));
        registry.revoke(user, &device.id).await.unwrap();

        // Both the content and the device would fail; the content decides.
        let broker = AccessBroker::new(Arc::clone(&store), custody, Arc::new(AllowAll));
        let err = broker
            .grant_access(
                user,
                &ContentId::from_bytes([0x00; 32]),
                &device.id,
                AccessKind::Stream,
                meta(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, KeywardError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn test_revocation_cuts_off_further_grants() {
        let (store, custody) = backends();
        let user = UserId::new(1);
        let (device, _) = seed_device(&store, user, DeviceClass::Mobile).await;
        let (asset, _) = seed_asset(&store, &custody, 0xC9).await;

        let broker = AccessBroker::new(Arc::clone(&store), Arc::clone(&custody), Arc::new(AllowAll));
        broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap();

        let registry = DeviceRegistry::new(Arc::clone(&store));
        registry.revoke(user, &device.id).await.unwrap();

        let err = broker
            .grant_access(user, &asset.id, &device.id, AccessKind::Stream, meta())
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::DeviceNotAuthorized(_)));

        // Only the pre-revocation grant is on record.
        assert_eq!(store.list_events_for_user(user).await.unwrap().len(), 1);
    }
}
