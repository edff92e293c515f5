//! Shared fixtures: a memory-backed provider with one registered
//! confidential client.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use doorman::context::ProviderContext;
use doorman::handler::{route_request, GenericRequest, GenericResponse};
use doorman::session::JwtSessionManager;
use doorman_core::model::{Client, ClientType, GrantType, Principal};
use doorman_core::options::ProviderOptions;
use doorman_core::scope::ScopeSet;
use doorman_memory::{MemorySessionStore, MemoryStore};

pub const BASE_SECRET: &str = "an-adequately-long-base-secret-value";
pub const CLIENT_SECRET: &str = "per-client-secret-with-enough-entropy";
pub const REDIRECT_URI: &str = "https://app.example.com/cb";
pub const USER_ID: &str = "42";

pub struct TestEnv {
    pub ctx: Arc<ProviderContext>,
    pub store: MemoryStore,
    pub sessions: Arc<MemorySessionStore>,
    pub client_id: Uuid,
}

pub fn default_options() -> ProviderOptions {
    ProviderOptions::new(
        BASE_SECRET,
        vec!["read".into(), "write".into(), "admin".into()],
    )
}

pub async fn setup() -> TestEnv {
    setup_with(default_options()).await
}

pub async fn setup_with(options: ProviderOptions) -> TestEnv {
    let store = MemoryStore::new();
    let sessions = Arc::new(MemorySessionStore::new());
    let manager = Arc::new(JwtSessionManager::new(options.secret.clone(), sessions.clone()));
    let ctx = ProviderContext::new(
        options,
        Arc::new(store.clone()),
        manager.clone(),
        manager,
    )
    .unwrap();

    let client_id = seed_client(
        &ctx,
        &store,
        ClientType::Confidential,
        vec![REDIRECT_URI.into()],
    )
    .await;

    TestEnv {
        ctx,
        store,
        sessions,
        client_id,
    }
}

pub async fn seed_client(
    ctx: &ProviderContext,
    store: &MemoryStore,
    client_type: ClientType,
    redirect_uris: Vec<String>,
) -> Uuid {
    let id = Uuid::new_v4();
    store
        .put_client(Client {
            id,
            name: "Test App".into(),
            description: "An app under test".into(),
            encrypted_secret: ctx.keys.encrypt_client_secret(CLIENT_SECRET).unwrap(),
            redirect_uris,
            scope: ScopeSet::parse("read write"),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            client_type,
            owner_id: "owner-1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await;
    id
}

pub fn form_request(path: &str, fields: &[(&str, &str)]) -> GenericRequest {
    let body = fields
        .iter()
        .map(|(key, value)| {
            format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut headers = HashMap::new();
    headers.insert(
        "content-type".into(),
        "application/x-www-form-urlencoded".into(),
    );
    GenericRequest {
        method: "POST".into(),
        path: path.into(),
        headers,
        body: Some(body.into_bytes()),
    }
}

pub async fn authorize(env: &TestEnv, fields: &[(&str, &str)]) -> GenericResponse {
    route_request(
        &env.ctx,
        Some(&Principal::new(USER_ID)),
        &form_request("/authorize", fields),
    )
    .await
}

pub async fn token(env: &TestEnv, fields: &[(&str, &str)]) -> GenericResponse {
    route_request(&env.ctx, None, &form_request("/token", fields)).await
}

pub fn json(response: &GenericResponse) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap_or(serde_json::Value::Null)
}

pub fn header<'a>(response: &'a GenericResponse, name: &str) -> Option<&'a str> {
    response
        .headers
        .get(name)
        .and_then(|values| values.first())
        .map(String::as_str)
}

pub fn query_param(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| urlencoding::decode(v).unwrap().into_owned())
    })
}

/// Run a successful authorize request and pull the code out of the
/// redirect envelope.
pub async fn obtain_code(env: &TestEnv, challenge: Option<&str>) -> String {
    let client_id = env.client_id.to_string();
    let mut fields = vec![
        ("client_id", client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", REDIRECT_URI),
        ("scope", "read"),
        ("state", "xyz"),
        ("permission_granted", "true"),
    ];
    if let Some(challenge) = challenge {
        fields.push(("code_challenge", challenge));
        fields.push(("code_challenge_method", "S256"));
    }

    let response = authorize(env, &fields).await;
    assert_eq!(response.status, 200, "authorize failed: {:?}", json(&response));
    let redirect_to = json(&response)["redirect_to"]
        .as_str()
        .expect("redirect envelope")
        .to_string();
    query_param(&redirect_to, "code").expect("code in redirect")
}
