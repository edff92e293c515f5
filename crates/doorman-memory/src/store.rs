//! In-memory `Store`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use doorman_core::error::{StoreError, StoreResult};
use doorman_core::model::{Authorization, Client, Grant, GrantWithAuthorization, NewGrant};
use doorman_core::scope::ScopeSet;
use doorman_core::store::{DeleteOutcome, Store};

#[derive(Debug, Default)]
struct Inner {
    clients: HashMap<Uuid, Client>,
    /// Keyed by the unique `(client_id, resource_owner_id)` pair.
    authorizations: HashMap<(Uuid, String), Authorization>,
    grants: HashMap<Uuid, Grant>,
}

/// In-memory storage backend.
///
/// A single write lock stands in for the database's transactions: each
/// operation observes and applies its changes atomically.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Client CRUD is the host application's job;
    /// this seam exists for tests and fixtures.
    pub async fn put_client(&self, client: Client) {
        self.inner.write().await.clients.insert(client.id, client);
    }

    /// Revoke a user's consent, cascading to its grants. This is the
    /// in-memory analog of the user deleting the authorization through
    /// the host's CRUD.
    pub async fn remove_authorization(&self, client_id: Uuid, resource_owner_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner
            .authorizations
            .remove(&(client_id, resource_owner_id.to_string()));
        if let Some(authorization) = &removed {
            inner
                .grants
                .retain(|_, grant| grant.authorization_id != authorization.id);
        }
        removed.is_some()
    }

    pub async fn grant_count(&self) -> usize {
        self.inner.read().await.grants.len()
    }

    pub async fn authorization_count(&self) -> usize {
        self.inner.read().await.authorizations.len()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.clients.clear();
        inner.authorizations.clear();
        inner.grants.clear();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(self.inner.read().await.clients.get(&id).cloned())
    }

    async fn authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: &str,
    ) -> StoreResult<Option<Authorization>> {
        Ok(self
            .inner
            .read()
            .await
            .authorizations
            .get(&(client_id, resource_owner_id.to_string()))
            .cloned())
    }

    async fn upsert_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: &str,
        scope: &ScopeSet,
    ) -> StoreResult<Authorization> {
        let mut inner = self.inner.write().await;

        if !inner.clients.contains_key(&client_id) {
            return Err(StoreError::ForeignKeyViolation("client"));
        }

        let now = Utc::now();
        let key = (client_id, resource_owner_id.to_string());
        let authorization = inner
            .authorizations
            .entry(key)
            .and_modify(|existing| {
                existing.scope = existing.scope.union(scope);
                existing.updated_at = now;
            })
            .or_insert_with(|| Authorization {
                id: Uuid::new_v4(),
                client_id,
                resource_owner_id: resource_owner_id.to_string(),
                scope: scope.clone(),
                created_at: now,
                updated_at: now,
            });

        Ok(authorization.clone())
    }

    async fn grant_by_code(
        &self,
        code_digest: &str,
    ) -> StoreResult<Option<GrantWithAuthorization>> {
        let inner = self.inner.read().await;
        let Some(grant) = inner
            .grants
            .values()
            .find(|grant| grant.code_digest == code_digest)
            .cloned()
        else {
            return Ok(None);
        };

        let authorization = inner
            .authorizations
            .values()
            .find(|authorization| authorization.id == grant.authorization_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Other(anyhow!("grant {} has no parent authorization", grant.id))
            })?;

        Ok(Some(GrantWithAuthorization {
            grant,
            authorization,
        }))
    }

    async fn insert_grant(&self, grant: NewGrant) -> StoreResult<Grant> {
        let mut inner = self.inner.write().await;

        if inner
            .grants
            .values()
            .any(|existing| existing.code_digest == grant.code_digest)
        {
            return Err(StoreError::UniqueViolation("grant"));
        }
        if !inner
            .authorizations
            .values()
            .any(|authorization| authorization.id == grant.authorization_id)
        {
            return Err(StoreError::ForeignKeyViolation("authorization"));
        }

        let stored = Grant {
            id: Uuid::new_v4(),
            authorization_id: grant.authorization_id,
            resource_owner_id: grant.resource_owner_id,
            kind: grant.kind,
            redirect_uri: grant.redirect_uri,
            redirect_uri_specified: grant.redirect_uri_specified,
            encrypted_code_challenge: grant.encrypted_code_challenge,
            code_digest: grant.code_digest,
            expires_at: grant.expires_at,
            created_at: Utc::now(),
        };
        inner.grants.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_grant(&self, id: Uuid) -> StoreResult<DeleteOutcome> {
        match self.inner.write().await.grants.remove(&id) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn update_client_scope(
        &self,
        client_id: Uuid,
        scope: &ScopeSet,
    ) -> StoreResult<Client> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let client = inner
            .clients
            .get_mut(&client_id)
            .ok_or(StoreError::ForeignKeyViolation("client"))?;
        client.scope = scope.clone();
        client.updated_at = now;
        let client = client.clone();

        // Same transaction: dependent authorizations never exceed the
        // narrowed client scope.
        for authorization in inner
            .authorizations
            .values_mut()
            .filter(|authorization| authorization.client_id == client_id)
        {
            authorization.scope = authorization.scope.intersect(scope);
            authorization.updated_at = now;
        }

        Ok(client)
    }

    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.grants.len();
        inner.grants.retain(|_, grant| !grant.expired_at(now));
        Ok((before - inner.grants.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use doorman_core::model::{ClientType, GrantKind, GrantType};

    fn client() -> Client {
        Client {
            id: Uuid::new_v4(),
            name: "Test App".into(),
            description: "".into(),
            encrypted_secret: "stored".into(),
            redirect_uris: vec!["https://app.example.com/cb".into()],
            scope: ScopeSet::parse("read write admin"),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            client_type: ClientType::Confidential,
            owner_id: "owner".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_grant(authorization_id: Uuid, digest: &str, expires_at: DateTime<Utc>) -> NewGrant {
        NewGrant {
            authorization_id,
            resource_owner_id: "42".into(),
            kind: GrantKind::AuthorizationCode,
            redirect_uri: "https://app.example.com/cb".into(),
            redirect_uri_specified: true,
            encrypted_code_challenge: None,
            code_digest: digest.into(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_unions() {
        let store = MemoryStore::new();
        let client = client();
        store.put_client(client.clone()).await;

        let first = store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("read"))
            .await
            .unwrap();
        assert_eq!(first.scope.join(), "read");

        let second = store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("write"))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.scope.join(), "read write");
        assert_eq!(store.authorization_count().await, 1);

        // Never shrinks on an authorize call.
        let third = store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("read"))
            .await
            .unwrap();
        assert_eq!(third.scope.join(), "read write");
    }

    #[tokio::test]
    async fn test_upsert_requires_client() {
        let store = MemoryStore::new();
        let err = store
            .upsert_authorization(Uuid::new_v4(), "42", &ScopeSet::parse("read"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation("client")));
    }

    #[tokio::test]
    async fn test_grant_round_trip_and_single_use() {
        let store = MemoryStore::new();
        let client = client();
        store.put_client(client.clone()).await;
        let authorization = store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("read"))
            .await
            .unwrap();

        let expires = Utc::now() + Duration::seconds(600);
        let grant = store
            .insert_grant(new_grant(authorization.id, "digest-1", expires))
            .await
            .unwrap();

        let found = store.grant_by_code("digest-1").await.unwrap().unwrap();
        assert_eq!(found.grant.id, grant.id);
        assert_eq!(found.authorization.id, authorization.id);
        assert!(store.grant_by_code("digest-2").await.unwrap().is_none());

        assert_eq!(
            store.delete_grant(grant.id).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            store.delete_grant(grant.id).await.unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_duplicate_code_digest_rejected() {
        let store = MemoryStore::new();
        let client = client();
        store.put_client(client.clone()).await;
        let authorization = store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("read"))
            .await
            .unwrap();

        let expires = Utc::now() + Duration::seconds(600);
        store
            .insert_grant(new_grant(authorization.id, "digest", expires))
            .await
            .unwrap();
        let err = store
            .insert_grant(new_grant(authorization.id, "digest", expires))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation("grant")));
    }

    #[tokio::test]
    async fn test_narrowing_client_scope_cascades() {
        let store = MemoryStore::new();
        let client = client();
        store.put_client(client.clone()).await;
        store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("read admin"))
            .await
            .unwrap();
        store
            .upsert_authorization(client.id, "43", &ScopeSet::parse("admin"))
            .await
            .unwrap();

        store
            .update_client_scope(client.id, &ScopeSet::parse("read write"))
            .await
            .unwrap();

        let first = store.authorization(client.id, "42").await.unwrap().unwrap();
        assert_eq!(first.scope.join(), "read");
        let second = store.authorization(client.id, "43").await.unwrap().unwrap();
        assert!(second.scope.is_empty());
    }

    #[tokio::test]
    async fn test_expired_sweep_is_inclusive_and_idempotent() {
        let store = MemoryStore::new();
        let client = client();
        store.put_client(client.clone()).await;
        let authorization = store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("read"))
            .await
            .unwrap();

        let now = Utc::now();
        store
            .insert_grant(new_grant(authorization.id, "live", now + Duration::seconds(1)))
            .await
            .unwrap();
        store
            .insert_grant(new_grant(authorization.id, "boundary", now))
            .await
            .unwrap();
        store
            .insert_grant(new_grant(authorization.id, "stale", now - Duration::seconds(1)))
            .await
            .unwrap();

        assert_eq!(store.delete_expired_grants(now).await.unwrap(), 2);
        assert_eq!(store.delete_expired_grants(now).await.unwrap(), 0);
        assert_eq!(store.grant_count().await, 1);
    }

    #[tokio::test]
    async fn test_remove_authorization_cascades_to_grants() {
        let store = MemoryStore::new();
        let client = client();
        store.put_client(client.clone()).await;
        let authorization = store
            .upsert_authorization(client.id, "42", &ScopeSet::parse("read"))
            .await
            .unwrap();
        store
            .insert_grant(new_grant(
                authorization.id,
                "digest",
                Utc::now() + Duration::seconds(600),
            ))
            .await
            .unwrap();

        assert!(store.remove_authorization(client.id, "42").await);
        assert_eq!(store.grant_count().await, 0);
        assert!(store.grant_by_code("digest").await.unwrap().is_none());
    }
}
