//! # doorman-sqlx
//!
//! PostgreSQL storage backend for doorman. The unique indexes back the
//! core's invariants (one authorization per client and resource owner,
//! one grant per code digest), and the cascade edges follow the
//! ownership tree: client to authorizations to grants, plus the host's
//! resource-owner table above both.

mod migration;
mod store;

pub use migration::{migrate, schema_statements};
pub use store::PgStore;
