//! # doorman-axum
//!
//! Mounts the doorman endpoints on an axum [`Router`]. The host nests
//! the router wherever it wants (`/oauth`, say) behind its own
//! authentication middleware; that middleware identifies the user and
//! inserts a [`Principal`] into the request extensions before the
//! authorize endpoint runs.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use doorman::context::ProviderContext;
//! use doorman::session::JwtSessionManager;
//! use doorman_core::options::ProviderOptions;
//! use doorman_memory::{MemorySessionStore, MemoryStore};
//!
//! let options = ProviderOptions::new(
//!     "a-32-byte-or-longer-base-secret!",
//!     vec!["read".into()],
//! );
//! let manager = Arc::new(JwtSessionManager::new(
//!     options.secret.clone(),
//!     Arc::new(MemorySessionStore::new()),
//! ));
//! let ctx = ProviderContext::new(
//!     options,
//!     Arc::new(MemoryStore::new()),
//!     manager.clone(),
//!     manager,
//! )
//! .unwrap();
//!
//! let app: axum::Router = axum::Router::new().nest("/oauth", doorman_axum::router(ctx));
//! # let _ = app;
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;

use doorman::context::ProviderContext;
use doorman::handler::{route_request, GenericRequest};
use doorman_core::model::Principal;

/// Request bodies larger than this are rejected before dispatch. The
/// handler applies the protocol's own 1 MB bound afterwards.
const BODY_READ_LIMIT: usize = 2 * 1024 * 1024;

/// Build a router serving the provider endpoints.
pub fn router(ctx: Arc<ProviderContext>) -> Router {
    Router::new().fallback(dispatch).with_state(ctx)
}

async fn dispatch(State(ctx): State<Arc<ProviderContext>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let principal = parts.extensions.get::<Principal>().cloned();

    let body = match axum::body::to_bytes(body, BODY_READ_LIMIT).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let generic = GenericRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
        body: Some(body),
    };

    let reply = route_request(&ctx, principal.as_ref(), &generic).await;

    let mut builder = Response::builder().status(reply.status);
    for (name, values) in &reply.headers {
        for value in values {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(Body::from(reply.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
