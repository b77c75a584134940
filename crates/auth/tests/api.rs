use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use auth::database::Database;
use auth::{AuthState, Config};
use common::prelude::{IdentityDeleted, IdentityPermission, UserEvent};
use service::MemoryBus;

const SERVICE_KEY: &str = "test-service-key";

struct Harness {
    app: Router,
    bus: MemoryBus,
    database: Database,
}

async fn harness() -> Harness {
    let mut config = Config::new(SocketAddr::from(([127, 0, 0, 1], 0)), "test-secret");
    config.service_key = Some(SERVICE_KEY.to_string());

    let bus = MemoryBus::new();
    let database = Database::connect(None).await.unwrap();
    let state = AuthState::new(database.clone(), Arc::new(bus.clone()), &config).unwrap();

    Harness {
        app: auth::http_server::router(state),
        bus,
        database,
    }
}

impl Harness {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_with(method, uri, token, None, body).await
    }

    async fn send_with(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        service_key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        if let Some(key) = service_key {
            builder = builder.header("x-service-key", key);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Register `username` and return (user_id, session token).
    async fn login(&self, username: &str) -> (String, String) {
        let (status, user) = self
            .send(
                "POST",
                "/api/users",
                None,
                Some(json!({"username": username, "password": "hunter2hunter2"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, session) = self
            .send(
                "POST",
                "/api/sessions",
                None,
                Some(json!({"username": username, "password": "hunter2hunter2"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        (
            user["id"].as_str().unwrap().to_string(),
            session["token"].as_str().unwrap().to_string(),
        )
    }

    async fn check(&self, token_id: &str) -> (StatusCode, Value) {
        self.send_with(
            "GET",
            &format!("/api/tokens/{token_id}/check"),
            None,
            Some(SERVICE_KEY),
            None,
        )
        .await
    }
}

#[tokio::test]
async fn test_register_publishes_user_created() {
    let h = harness().await;
    let (user_id, _) = h.login("alice").await;

    let events = h.bus.messages("auth.user.>");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, format!("auth.user.{user_id}.created"));
    let event: UserEvent = serde_json::from_slice(&events[0].1).unwrap();
    assert_eq!(event.username, "alice");
    assert_eq!(event.source, "auth");
}

#[tokio::test]
async fn test_duplicate_username_and_bad_login() {
    let h = harness().await;
    h.login("alice").await;

    let (status, _) = h
        .send(
            "POST",
            "/api/users",
            None,
            Some(json!({"username": "alice", "password": "hunter2hunter2"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = h
        .send(
            "POST",
            "/api/sessions",
            None,
            Some(json!({"username": "alice", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_foreign_user_is_rejected_for_every_root() {
    let h = harness().await;
    let (_, session) = h.login("alice").await;

    for scope in ["storage.someone-else.files", "compute.someone-else.containers"] {
        let (status, _) = h
            .send(
                "POST",
                "/api/tokens",
                Some(&session),
                Some(json!({"name": "ci", "scopes": {scope: ["read"]}})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{scope}");
    }

    let (_, tokens) = h.send("GET", "/api/tokens", Some(&session), None).await;
    assert_eq!(tokens, json!([]), "no partial token issued");
}

#[tokio::test]
async fn test_standalone_token_check_and_revoke() {
    let h = harness().await;
    let (user_id, session) = h.login("alice").await;

    let scope = format!("storage.{user_id}.files");
    let (status, issued) = h
        .send(
            "POST",
            "/api/tokens",
            Some(&session),
            Some(json!({"name": "ci", "scopes": {&scope: ["read"]}})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(issued["token"].as_str().unwrap().starts_with("ecloud_"));
    let token_id = issued["id"].as_str().unwrap().to_string();

    let (status, check) = h.check(&token_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["valid"], json!(true));
    assert_eq!(check["scopes"][&scope], json!(["read"]));

    let (status, _) = h
        .send("DELETE", &format!("/api/tokens/{token_id}"), Some(&session), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, check) = h.check(&token_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(check["valid"], json!(false));

    let (status, _) = h.check("no-such-token").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_check_requires_configured_service_key() {
    let h = harness().await;
    let (status, _) = h
        .send_with("GET", "/api/tokens/abc/check", None, Some("wrong"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_service_account_lifecycle_emits_versioned_events() {
    let h = harness().await;
    let (user_id, session) = h.login("alice").await;
    let scope = format!("storage.{user_id}.files");

    let (status, account) = h
        .send(
            "POST",
            "/api/service-accounts",
            Some(&session),
            Some(json!({"name": "backup", "scopes": {&scope: ["read", "create"]}})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(account["version"], json!(1));
    let account_id = account["id"].as_str().unwrap().to_string();

    let (status, issued) = h
        .send(
            "POST",
            &format!("/api/service-accounts/{account_id}/tokens"),
            Some(&session),
            Some(json!({"name": "backup-token"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(issued.get("scopes").is_none());
    let token_id = issued["id"].as_str().unwrap().to_string();

    let (status, updated) = h
        .send(
            "PUT",
            &format!("/api/service-accounts/{account_id}/scopes"),
            Some(&session),
            Some(json!({"scopes": {&scope: ["read"]}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["version"], json!(2));

    // the bound token reports the account's current grant
    let (status, check) = h.check(&token_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["scopes"][&scope], json!(["read"]));

    let (status, _) = h
        .send(
            "DELETE",
            &format!("/api/service-accounts/{account_id}"),
            Some(&session),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = h.check(&token_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "bound tokens die with the account");

    let events = h.bus.messages("auth.identity.>");
    let subjects: Vec<_> = events.iter().map(|(s, _)| s.clone()).collect();
    assert_eq!(
        subjects,
        vec![
            format!("auth.identity.{account_id}.updated"),
            format!("auth.identity.{account_id}.updated"),
            format!("auth.identity.{account_id}.deleted"),
        ]
    );
    let v1: IdentityPermission = serde_json::from_slice(&events[0].1).unwrap();
    let v2: IdentityPermission = serde_json::from_slice(&events[1].1).unwrap();
    let deleted: IdentityDeleted = serde_json::from_slice(&events[2].1).unwrap();
    assert_eq!((v1.version, v2.version, deleted.version), (1, 2, 3));
    assert_eq!(deleted.user_id, user_id);
}

#[tokio::test]
async fn test_bulk_sync_requires_service_key() {
    let h = harness().await;
    let (user_id, session) = h.login("alice").await;
    h.send(
        "POST",
        "/api/service-accounts",
        Some(&session),
        Some(json!({"name": "backup", "scopes": {format!("storage.{user_id}"): ["read"]}})),
    )
    .await;

    let (status, _) = h.send("GET", "/api/identity-permissions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .send("GET", "/api/identity-permissions", Some(&session), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "user tokens are not service keys");

    let (status, body) = h
        .send_with("GET", "/api/identity-permissions", None, Some(SERVICE_KEY), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let permissions = body["permissions"].as_array().unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0]["user_id"], json!(user_id));
    assert_eq!(permissions[0]["version"], json!(1));
}

#[tokio::test]
async fn test_management_requires_live_session() {
    let h = harness().await;
    let (user_id, session) = h.login("alice").await;

    let (_, issued) = h
        .send(
            "POST",
            "/api/tokens",
            Some(&session),
            Some(json!({"name": "ci", "scopes": {format!("storage.{user_id}"): ["read"]}})),
        )
        .await;
    let api_token = issued["token"].as_str().unwrap().to_string();

    let (status, _) = h.send("GET", "/api/tokens", Some(&api_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h.send("GET", "/api/tokens", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // query-string transport works too
    let (status, _) = h
        .send("GET", &format!("/api/sessions?token={session}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, sessions) = h.send("GET", "/api/sessions", Some(&session), None).await;
    let session_id = sessions[0]["id"].as_str().unwrap().to_string();
    let (status, _) = h
        .send("DELETE", &format!("/api/sessions/{session_id}"), Some(&session), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = h.send("GET", "/api/sessions", Some(&session), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_delete_removes_service_accounts() {
    let h = harness().await;
    let (user_id, session) = h.login("alice").await;
    let (_, account) = h
        .send(
            "POST",
            "/api/service-accounts",
            Some(&session),
            Some(json!({"name": "backup", "scopes": {format!("compute.{user_id}.volumes"): ["read"]}})),
        )
        .await;
    let account_id = account["id"].as_str().unwrap().to_string();

    let (status, _) = h.send("DELETE", "/api/users/me", Some(&session), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let identity = h.bus.messages(&format!("auth.identity.{account_id}.deleted"));
    assert_eq!(identity.len(), 1);
    let deleted: IdentityDeleted = serde_json::from_slice(&identity[0].1).unwrap();
    assert_eq!(deleted.version, 2);

    let user = h.bus.messages(&format!("auth.user.{user_id}.deleted"));
    assert_eq!(user.len(), 1);
    let event: UserEvent = serde_json::from_slice(&user[0].1).unwrap();
    assert_eq!(event.display_name, None);

    let (status, _) = h.send("GET", "/api/sessions", Some(&session), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_failed_user_delete_keeps_service_accounts() {
    let h = harness().await;
    let (user_id, session) = h.login("alice").await;
    let (status, account) = h
        .send(
            "POST",
            "/api/service-accounts",
            Some(&session),
            Some(json!({"name": "sync", "scopes": {format!("storage.{user_id}.files"): ["read"]}})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let account_id = account["id"].as_str().unwrap().to_string();

    // make the user row removal fail after the accounts are gone
    sqlx::query(
        "CREATE TRIGGER block_user_delete BEFORE DELETE ON users \
         BEGIN SELECT RAISE(ABORT, 'user delete blocked'); END",
    )
    .execute(&*h.database)
    .await
    .unwrap();

    let (status, _) = h.send("DELETE", "/api/users/me", Some(&session), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // nothing committed, so nothing published
    assert!(h.bus.messages("auth.identity.*.deleted").is_empty());
    assert!(h.bus.messages("auth.user.*.deleted").is_empty());
    let (status, accounts) = h.send("GET", "/api/service-accounts", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(accounts.to_string().contains(&account_id));

    sqlx::query("DROP TRIGGER block_user_delete")
        .execute(&*h.database)
        .await
        .unwrap();
    let (status, _) = h.send("DELETE", "/api/users/me", Some(&session), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(
        h.bus
            .messages(&format!("auth.identity.{account_id}.deleted"))
            .len(),
        1
    );
}

#[tokio::test]
async fn test_status_routes_and_fallback() {
    let h = harness().await;
    let (status, _) = h.send("GET", "/_status/livez", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = h.send("GET", "/_status/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = h.send("GET", "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"msg": "not found"}));
}
