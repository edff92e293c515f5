//! The storage boundary.
//!
//! The core needs a closed set of queries, not general CRUD, so the
//! trait is typed per operation. Uniqueness is the store's job: the
//! `(client_id, resource_owner_id)` authorization index and the grant
//! code-digest index must be enforced at the database level.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::model::{Authorization, Client, Grant, GrantWithAuthorization, NewGrant};
use crate::scope::ScopeSet;

/// Outcome of a conditional delete.
///
/// Token issuance is gated on `Deleted`: of two concurrent exchanges of
/// the same code, exactly one observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// The queries the protocol core runs.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Look up a client by id.
    async fn client(&self, id: Uuid) -> StoreResult<Option<Client>>;

    /// The at-most-one authorization for a `(client, resource owner)` pair.
    async fn authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: &str,
    ) -> StoreResult<Option<Authorization>>;

    /// Insert an authorization, or expand an existing one's scope to the
    /// union of old and new. Never shrinks. Serialized by the unique
    /// `(client_id, resource_owner_id)` index; on a conflicting insert
    /// the store retries once as an update within the same transaction.
    async fn upsert_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: &str,
        scope: &ScopeSet,
    ) -> StoreResult<Authorization>;

    /// Look up a grant by the HMAC digest of its code, with the parent
    /// authorization preloaded.
    async fn grant_by_code(&self, code_digest: &str)
        -> StoreResult<Option<GrantWithAuthorization>>;

    /// Insert a grant. The unique index on the code digest backs the
    /// single-use guarantee.
    async fn insert_grant(&self, grant: NewGrant) -> StoreResult<Grant>;

    /// Conditionally delete a grant.
    async fn delete_grant(&self, id: Uuid) -> StoreResult<DeleteOutcome>;

    /// Narrow a client's scope and, in the same transaction, intersect
    /// every dependent authorization's scope with the new client scope.
    async fn update_client_scope(&self, client_id: Uuid, scope: &ScopeSet)
        -> StoreResult<Client>;

    /// Remove grants whose `expires_at` is at or before `now`. Idempotent;
    /// driven by the host scheduler. Returns the number removed.
    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
