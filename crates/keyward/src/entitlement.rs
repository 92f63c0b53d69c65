//! Entitlement lookup at the access boundary.
//!
//! Whether a user may open an asset is business state owned elsewhere
//! (purchases, subscriptions, promotional grants). The broker only asks
//! the question through [`EntitlementProvider`] and refuses the grant
//! when the answer is no or unavailable.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use keyward_core::{ContentId, UserId};
use thiserror::Error;

/// The entitlement backend gave no usable answer.
///
/// Distinct from a negative answer: the broker surfaces this as a
/// provider outage, never as a missing entitlement.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EntitlementUnavailable(pub String);

/// Answers whether a user currently holds an entitlement for an asset.
#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    /// Check for an active entitlement.
    async fn has_active_entitlement(
        &self,
        user: UserId,
        content: &ContentId,
    ) -> Result<bool, EntitlementUnavailable>;
}

/// Grants every request. For tools, tests, and open catalogs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl EntitlementProvider for AllowAll {
    async fn has_active_entitlement(
        &self,
        _user: UserId,
        _content: &ContentId,
    ) -> Result<bool, EntitlementUnavailable> {
        Ok(true)
    }
}

/// Fixed entitlement table backed by an in-memory set.
#[derive(Debug, Default)]
pub struct StaticEntitlements {
    grants: RwLock<HashSet<(UserId, ContentId)>>,
}

impl StaticEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entitlement.
    pub fn grant(&self, user: UserId, content: ContentId) {
        self.grants.write().unwrap().insert((user, content));
    }

    /// Remove an entitlement. Removing an absent one is a no-op.
    pub fn withdraw(&self, user: UserId, content: &ContentId) {
        self.grants.write().unwrap().remove(&(user, *content));
    }
}

#[async_trait]
impl EntitlementProvider for StaticEntitlements {
    async fn has_active_entitlement(
        &self,
        user: UserId,
        content: &ContentId,
    ) -> Result<bool, EntitlementUnavailable> {
        Ok(self.grants.read().unwrap().contains(&(user, *content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_all_always_grants() {
        let provider = AllowAll;
        let allowed = provider
            .has_active_entitlement(UserId::new(1), &ContentId::from_bytes([0x11; 32]))
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_static_entitlements_follow_grants() {
        let provider = StaticEntitlements::new();
        let user = UserId::new(7);
        let content = ContentId::from_bytes([0x22; 32]);

        assert!(!provider.has_active_entitlement(user, &content).await.unwrap());

        provider.grant(user, content);
        assert!(provider.has_active_entitlement(user, &content).await.unwrap());

        // Another user gains nothing from the grant.
        assert!(!provider
            .has_active_entitlement(UserId::new(8), &content)
            .await
            .unwrap());

        provider.withdraw(user, &content);
        assert!(!provider.has_active_entitlement(user, &content).await.unwrap());
    }
}
