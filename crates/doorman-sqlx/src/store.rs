//! PostgreSQL `Store`.
//!
//! Resource-owner ids are opaque strings to the core; the host's id
//! type comes from `ResourceOwnerOptions`, so binds cast through
//! `::<type>` and selects cast back to text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use doorman_core::error::{StoreError, StoreResult};
use doorman_core::model::{
    Authorization, Client, ClientType, Grant, GrantKind, GrantType, GrantWithAuthorization,
    NewGrant,
};
use doorman_core::options::ResourceOwnerOptions;
use doorman_core::scope::ScopeSet;
use doorman_core::store::{DeleteOutcome, Store};

const CLIENT_COLUMNS: &str = "id, name, description, encrypted_secret, redirect_uris, scope, \
                              grant_types, client_type, owner_id::text AS owner_id, \
                              created_at, updated_at";

const AUTHORIZATION_COLUMNS: &str = "id, client_id, \
                                     resource_owner_id::text AS resource_owner_id, scope, \
                                     created_at, updated_at";

const GRANT_COLUMNS: &str = "id, authorization_id, \
                             resource_owner_id::text AS resource_owner_id, kind, redirect_uri, \
                             redirect_uri_specified, encrypted_code_challenge, code_digest, \
                             expires_at, created_at";

/// PostgreSQL storage backend.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    owner_type: String,
}

impl PgStore {
    pub fn new(pool: PgPool, resource_owner: &ResourceOwnerOptions) -> Self {
        Self {
            pool,
            owner_type: resource_owner.id_type.clone(),
        }
    }

    pub async fn connect(
        url: &str,
        resource_owner: &ResourceOwnerOptions,
    ) -> StoreResult<Self> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| StoreError::Other(anyhow::Error::new(e)))?;
        Ok(Self::new(pool, resource_owner))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM oauth_clients WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(client_from_row).transpose()
    }

    async fn authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: &str,
    ) -> StoreResult<Option<Authorization>> {
        let sql = format!(
            "SELECT {AUTHORIZATION_COLUMNS} FROM oauth_authorizations \
             WHERE client_id = $1 AND resource_owner_id = $2::{owner}",
            owner = self.owner_type,
        );
        let row = sqlx::query(&sql)
            .bind(client_id)
            .bind(resource_owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.as_ref().map(authorization_from_row).transpose()
    }

    async fn upsert_authorization(
        &self,
        client_id: Uuid,
        resource_owner_id: &str,
        scope: &ScopeSet,
    ) -> StoreResult<Authorization> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let select = format!(
            "SELECT {AUTHORIZATION_COLUMNS} FROM oauth_authorizations \
             WHERE client_id = $1 AND resource_owner_id = $2::{owner} FOR UPDATE",
            owner = self.owner_type,
        );
        let update = format!(
            "UPDATE oauth_authorizations SET scope = $2, updated_at = now() \
             WHERE id = $1 RETURNING {AUTHORIZATION_COLUMNS}"
        );

        let existing = sqlx::query(&select)
            .bind(client_id)
            .bind(resource_owner_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;

        let expand = |row: &PgRow, tx_scope: &ScopeSet| -> StoreResult<(Uuid, Vec<String>)> {
            let current = authorization_from_row(row)?;
            Ok((current.id, scope_vec(&current.scope.union(tx_scope))))
        };

        let row = match existing {
            Some(row) => {
                let (id, merged) = expand(&row, scope)?;
                sqlx::query(&update)
                    .bind(id)
                    .bind(merged)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_err)?
            }
            None => {
                let insert = format!(
                    "INSERT INTO oauth_authorizations (id, client_id, resource_owner_id, scope) \
                     VALUES ($1, $2, $3::{owner}, $4) RETURNING {AUTHORIZATION_COLUMNS}",
                    owner = self.owner_type,
                );
                let inserted = sqlx::query(&insert)
                    .bind(Uuid::new_v4())
                    .bind(client_id)
                    .bind(resource_owner_id)
                    .bind(scope_vec(scope))
                    .fetch_one(&mut *tx)
                    .await;

                match inserted {
                    Ok(row) => row,
                    // Lost the insert race on the unique index: retry
                    // once as an update within the same transaction.
                    Err(e) if is_unique_violation(&e) => {
                        let row = sqlx::query(&select)
                            .bind(client_id)
                            .bind(resource_owner_id)
                            .fetch_one(&mut *tx)
                            .await
                            .map_err(map_err)?;
                        let (id, merged) = expand(&row, scope)?;
                        sqlx::query(&update)
                            .bind(id)
                            .bind(merged)
                            .fetch_one(&mut *tx)
                            .await
                            .map_err(map_err)?
                    }
                    Err(e) => return Err(map_err(e)),
                }
            }
        };

        let authorization = authorization_from_row(&row)?;
        tx.commit().await.map_err(map_err)?;
        Ok(authorization)
    }

    async fn grant_by_code(
        &self,
        code_digest: &str,
    ) -> StoreResult<Option<GrantWithAuthorization>> {
        let sql = "SELECT g.id AS g_id, g.authorization_id, \
                   g.resource_owner_id::text AS g_resource_owner_id, g.kind, g.redirect_uri, \
                   g.redirect_uri_specified, g.encrypted_code_challenge, g.code_digest, \
                   g.expires_at, g.created_at AS g_created_at, \
                   a.id AS a_id, a.client_id, \
                   a.resource_owner_id::text AS a_resource_owner_id, a.scope, \
                   a.created_at AS a_created_at, a.updated_at AS a_updated_at \
                   FROM oauth_grants g \
                   JOIN oauth_authorizations a ON a.id = g.authorization_id \
                   WHERE g.code_digest = $1";

        let Some(row) = sqlx::query(sql)
            .bind(code_digest)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
        else {
            return Ok(None);
        };

        let grant = Grant {
            id: get(&row, "g_id")?,
            authorization_id: get(&row, "authorization_id")?,
            resource_owner_id: get(&row, "g_resource_owner_id")?,
            kind: parse_grant_kind(&get::<String>(&row, "kind")?)?,
            redirect_uri: get(&row, "redirect_uri")?,
            redirect_uri_specified: get(&row, "redirect_uri_specified")?,
            encrypted_code_challenge: get(&row, "encrypted_code_challenge")?,
            code_digest: get(&row, "code_digest")?,
            expires_at: get(&row, "expires_at")?,
            created_at: get(&row, "g_created_at")?,
        };
        let authorization = Authorization {
            id: get(&row, "a_id")?,
            client_id: get(&row, "client_id")?,
            resource_owner_id: get(&row, "a_resource_owner_id")?,
            scope: ScopeSet::from(get::<Vec<String>>(&row, "scope")?),
            created_at: get(&row, "a_created_at")?,
            updated_at: get(&row, "a_updated_at")?,
        };

        Ok(Some(GrantWithAuthorization {
            grant,
            authorization,
        }))
    }

    async fn insert_grant(&self, grant: NewGrant) -> StoreResult<Grant> {
        let sql = format!(
            "INSERT INTO oauth_grants (id, authorization_id, resource_owner_id, kind, \
             redirect_uri, redirect_uri_specified, encrypted_code_challenge, code_digest, \
             expires_at) \
             VALUES ($1, $2, $3::{owner}, $4, $5, $6, $7, $8, $9) \
             RETURNING {GRANT_COLUMNS}",
            owner = self.owner_type,
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(grant.authorization_id)
            .bind(&grant.resource_owner_id)
            .bind(grant_kind_str(grant.kind))
            .bind(&grant.redirect_uri)
            .bind(grant.redirect_uri_specified)
            .bind(&grant.encrypted_code_challenge)
            .bind(&grant.code_digest)
            .bind(grant.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)?;
        grant_from_row(&row)
    }

    async fn delete_grant(&self, id: Uuid) -> StoreResult<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM oauth_grants WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(if result.rows_affected() == 1 {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn update_client_scope(
        &self,
        client_id: Uuid,
        scope: &ScopeSet,
    ) -> StoreResult<Client> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let update_client = format!(
            "UPDATE oauth_clients SET scope = $2, updated_at = now() \
             WHERE id = $1 RETURNING {CLIENT_COLUMNS}"
        );
        let row = sqlx::query(&update_client)
            .bind(client_id)
            .bind(scope_vec(scope))
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?
            .ok_or(StoreError::ForeignKeyViolation("client"))?;
        let client = client_from_row(&row)?;

        // Same transaction: intersect every dependent authorization's
        // scope with the narrowed client scope, preserving order.
        sqlx::query(
            "UPDATE oauth_authorizations \
             SET scope = COALESCE( \
                 (SELECT array_agg(s.val ORDER BY s.ord) \
                  FROM unnest(oauth_authorizations.scope) WITH ORDINALITY AS s(val, ord) \
                  WHERE s.val = ANY($2)), \
                 '{}'), \
                 updated_at = now() \
             WHERE client_id = $1",
        )
        .bind(client_id)
        .bind(scope_vec(scope))
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        Ok(client)
    }

    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM oauth_grants WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected())
    }
}

// ─── Row mapping ────────────────────────────────────────────────

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(map_err)
}

fn client_from_row(row: &PgRow) -> StoreResult<Client> {
    let grant_types = get::<Vec<String>>(row, "grant_types")?
        .iter()
        .map(|raw| parse_grant_type(raw))
        .collect::<StoreResult<Vec<_>>>()?;

    Ok(Client {
        id: get(row, "id")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        encrypted_secret: get(row, "encrypted_secret")?,
        redirect_uris: get(row, "redirect_uris")?,
        scope: ScopeSet::from(get::<Vec<String>>(row, "scope")?),
        grant_types,
        client_type: parse_client_type(&get::<String>(row, "client_type")?)?,
        owner_id: get(row, "owner_id")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn authorization_from_row(row: &PgRow) -> StoreResult<Authorization> {
    Ok(Authorization {
        id: get(row, "id")?,
        client_id: get(row, "client_id")?,
        resource_owner_id: get(row, "resource_owner_id")?,
        scope: ScopeSet::from(get::<Vec<String>>(row, "scope")?),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn grant_from_row(row: &PgRow) -> StoreResult<Grant> {
    Ok(Grant {
        id: get(row, "id")?,
        authorization_id: get(row, "authorization_id")?,
        resource_owner_id: get(row, "resource_owner_id")?,
        kind: parse_grant_kind(&get::<String>(row, "kind")?)?,
        redirect_uri: get(row, "redirect_uri")?,
        redirect_uri_specified: get(row, "redirect_uri_specified")?,
        encrypted_code_challenge: get(row, "encrypted_code_challenge")?,
        code_digest: get(row, "code_digest")?,
        expires_at: get(row, "expires_at")?,
        created_at: get(row, "created_at")?,
    })
}

fn parse_grant_type(raw: &str) -> StoreResult<GrantType> {
    match raw {
        "authorization_code" => Ok(GrantType::AuthorizationCode),
        "refresh_token" => Ok(GrantType::RefreshToken),
        other => Err(StoreError::Other(anyhow::anyhow!(
            "unknown grant type in database: {other}"
        ))),
    }
}

fn parse_client_type(raw: &str) -> StoreResult<ClientType> {
    match raw {
        "confidential" => Ok(ClientType::Confidential),
        "public" => Ok(ClientType::Public),
        other => Err(StoreError::Other(anyhow::anyhow!(
            "unknown client type in database: {other}"
        ))),
    }
}

fn parse_grant_kind(raw: &str) -> StoreResult<GrantKind> {
    match raw {
        "authorization_code" => Ok(GrantKind::AuthorizationCode),
        other => Err(StoreError::Other(anyhow::anyhow!(
            "unknown grant kind in database: {other}"
        ))),
    }
}

fn grant_kind_str(kind: GrantKind) -> &'static str {
    match kind {
        GrantKind::AuthorizationCode => "authorization_code",
    }
}

fn scope_vec(scope: &ScopeSet) -> Vec<String> {
    scope.iter().map(str::to_string).collect()
}

// ─── Error mapping ──────────────────────────────────────────────

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn map_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        let constraint = db.constraint().unwrap_or_default();
        match db.code().as_deref() {
            Some("23505") => {
                return StoreError::UniqueViolation(if constraint.contains("authorizations") {
                    "authorization"
                } else {
                    "grant"
                });
            }
            Some("23503") => {
                return StoreError::ForeignKeyViolation(if constraint.contains("client_id") {
                    "client"
                } else if constraint.contains("owner_id") {
                    "resource owner"
                } else {
                    "authorization"
                });
            }
            _ => {}
        }
    }
    StoreError::Other(anyhow::Error::new(e))
}
