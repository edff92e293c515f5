//! Schema DDL.
//!
//! The resource-owner column type and foreign-key target come from
//! [`ResourceOwnerOptions`]; everything else is fixed. Statements are
//! idempotent so `migrate` can run at every boot.

use sqlx::PgPool;

use doorman_core::error::{StoreError, StoreResult};
use doorman_core::options::ResourceOwnerOptions;

/// The DDL for the three tables, in dependency order.
pub fn schema_statements(resource_owner: &ResourceOwnerOptions) -> Vec<String> {
    let owner_type = &resource_owner.id_type;
    let owner_ref = format!(
        "{}({}) ON DELETE CASCADE",
        resource_owner.table, resource_owner.id_column
    );

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS oauth_clients (\n\
             \x20   id uuid PRIMARY KEY,\n\
             \x20   name text NOT NULL,\n\
             \x20   description text NOT NULL DEFAULT '',\n\
             \x20   encrypted_secret text NOT NULL,\n\
             \x20   redirect_uris text[] NOT NULL,\n\
             \x20   scope text[] NOT NULL,\n\
             \x20   grant_types text[] NOT NULL,\n\
             \x20   client_type text NOT NULL,\n\
             \x20   owner_id {owner_type} NOT NULL REFERENCES {owner_ref},\n\
             \x20   created_at timestamptz NOT NULL DEFAULT now(),\n\
             \x20   updated_at timestamptz NOT NULL DEFAULT now()\n\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS oauth_authorizations (\n\
             \x20   id uuid PRIMARY KEY,\n\
             \x20   client_id uuid NOT NULL REFERENCES oauth_clients(id) ON DELETE CASCADE,\n\
             \x20   resource_owner_id {owner_type} NOT NULL REFERENCES {owner_ref},\n\
             \x20   scope text[] NOT NULL,\n\
             \x20   created_at timestamptz NOT NULL DEFAULT now(),\n\
             \x20   updated_at timestamptz NOT NULL DEFAULT now(),\n\
             \x20   CONSTRAINT oauth_authorizations_client_owner_key UNIQUE (client_id, resource_owner_id)\n\
             )"
        ),
        "CREATE INDEX IF NOT EXISTS oauth_authorizations_resource_owner_idx \
         ON oauth_authorizations (resource_owner_id)"
            .to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS oauth_grants (\n\
             \x20   id uuid PRIMARY KEY,\n\
             \x20   authorization_id uuid NOT NULL REFERENCES oauth_authorizations(id) ON DELETE CASCADE,\n\
             \x20   resource_owner_id {owner_type} NOT NULL REFERENCES {owner_ref},\n\
             \x20   kind text NOT NULL,\n\
             \x20   redirect_uri text NOT NULL,\n\
             \x20   redirect_uri_specified boolean NOT NULL,\n\
             \x20   encrypted_code_challenge text,\n\
             \x20   code_digest text NOT NULL,\n\
             \x20   expires_at timestamptz NOT NULL,\n\
             \x20   created_at timestamptz NOT NULL DEFAULT now(),\n\
             \x20   CONSTRAINT oauth_grants_code_digest_key UNIQUE (code_digest)\n\
             )"
        ),
        "CREATE INDEX IF NOT EXISTS oauth_grants_authorization_idx \
         ON oauth_grants (authorization_id)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS oauth_grants_resource_owner_idx \
         ON oauth_grants (resource_owner_id)"
            .to_string(),
    ]
}

/// Apply the schema.
pub async fn migrate(pool: &PgPool, resource_owner: &ResourceOwnerOptions) -> StoreResult<()> {
    for statement in schema_statements(resource_owner) {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Other(anyhow::Error::new(e)))?;
    }
    Ok(())
}
