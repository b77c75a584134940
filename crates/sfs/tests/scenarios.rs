//! End-to-end runs against a real issuer on a loopback listener, sharing an
//! in-memory bus with the storage service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::Url;

use service::bus::Subscription;
use service::{EventBus, ManualClock, MemoryBus};
use sfs::bulk_sync::{BulkSync, SyncReport};
use sfs::consumer::{Disposition, EventConsumer, EventHandler, IdentityHandler, Outcome, UserHandler};
use sfs::database::Database;
use sfs::issuer_client::IssuerClient;
use sfs::revocation::HttpRevocationSource;
use sfs::SfsState;

const SECRET: &str = "shared-jwt-secret";
const SERVICE_KEY: &str = "shared-service-key";
const TTL: Duration = Duration::from_secs(300);

struct Harness {
    issuer: Url,
    http: reqwest::Client,
    bus: MemoryBus,
    clock: ManualClock,
    sfs: SfsState,
    app: Router,
}

async fn spawn_issuer(bus: &MemoryBus) -> Url {
    let mut config = auth::Config::new(SocketAddr::from(([127, 0, 0, 1], 0)), SECRET);
    config.service_key = Some(SERVICE_KEY.to_string());
    let database = auth::database::Database::connect(None).await.unwrap();
    let state = auth::AuthState::new(database, Arc::new(bus.clone()), &config).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = auth::http_server::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

async fn harness_with_issuer(issuer: Url, bus: MemoryBus) -> Harness {
    let mut config = sfs::Config::new(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        issuer.clone(),
        SECRET,
    );
    config.service_key = Some(SERVICE_KEY.to_string());
    config.cache_ttl = TTL;

    let clock = ManualClock::new();
    let client = IssuerClient::new(&issuer, config.service_key.as_deref()).unwrap();
    let sfs = SfsState::new(
        Database::connect(None).await.unwrap(),
        Arc::new(bus.clone()),
        client.clone(),
        Arc::new(HttpRevocationSource::new(client)),
        Arc::new(clock.clone()),
        &config,
    )
    .unwrap();

    Harness {
        issuer,
        http: reqwest::Client::new(),
        bus,
        clock,
        app: sfs::http_server::router(sfs.clone()),
        sfs,
    }
}

async fn harness() -> Harness {
    let bus = MemoryBus::new();
    let issuer = spawn_issuer(&bus).await;
    harness_with_issuer(issuer, bus).await
}

impl Harness {
    async fn issuer_call(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = self.issuer.join(path).unwrap();
        let mut request = self.http.request(method, url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Register and log in a fresh user; returns (user_id, session token).
    async fn user(&self, username: &str) -> (String, String) {
        let credentials = json!({"username": username, "password": "correct horse"});
        let (status, user) = self
            .issuer_call(reqwest::Method::POST, "/api/users", None, Some(credentials.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, session) = self
            .issuer_call(reqwest::Method::POST, "/api/sessions", None, Some(credentials))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            user["id"].as_str().unwrap().to_string(),
            session["token"].as_str().unwrap().to_string(),
        )
    }

    /// Create a service account and mint a bound token for it.
    async fn service_account(&self, session: &str, scopes: Value) -> (String, String) {
        let (status, account) = self
            .issuer_call(
                reqwest::Method::POST,
                "/api/service-accounts",
                Some(session),
                Some(json!({"name": "worker", "scopes": scopes})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let account_id = account["id"].as_str().unwrap().to_string();

        let (status, issued) = self
            .issuer_call(
                reqwest::Method::POST,
                &format!("/api/service-accounts/{account_id}/tokens"),
                Some(session),
                Some(json!({"name": "worker-token"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (account_id, issued["token"].as_str().unwrap().to_string())
    }

    async fn authorize(&self, token: &str, scope: &str, action: &str) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri("/api/authorize")
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(json!({"scope": scope, "action": action}).to_string()))
            .unwrap();
        self.app.clone().oneshot(request).await.unwrap().status()
    }

    fn identity_consumer(&self, ack_wait: Duration) -> EventConsumer<IdentityHandler> {
        EventConsumer::new(
            Arc::new(self.bus.clone()),
            "sfs-identity",
            IdentityHandler::new(self.sfs.permissions().clone()),
        )
        .with_spec(|spec| spec.with_ack_wait(ack_wait))
    }
}

/// Process everything currently deliverable.
async fn drain<H: EventHandler>(
    consumer: &EventConsumer<H>,
    subscription: &dyn Subscription,
) -> Vec<Disposition> {
    let mut dispositions = Vec::new();
    loop {
        let batch = subscription
            .fetch(10, Duration::from_millis(50))
            .await
            .unwrap();
        if batch.is_empty() {
            return dispositions;
        }
        for message in &batch {
            dispositions.push(consumer.process(subscription, message).await.unwrap());
        }
    }
}

#[tokio::test]
async fn test_bound_token_reads_but_cannot_delete() {
    let h = harness().await;
    let (user_id, session) = h.user("alice").await;
    let files = format!("storage.{user_id}.files");
    let (_, token) = h
        .service_account(&session, json!({ &files: ["read", "create"] }))
        .await;

    let report = BulkSync::new(h.sfs.issuer().clone())
        .run(h.sfs.permissions())
        .await
        .unwrap();
    assert_eq!(report, SyncReport { applied: 1, stale: 0 });

    let docs = format!("{files}.docs");
    assert_eq!(h.authorize(&token, &docs, "read").await, StatusCode::OK);
    assert_eq!(h.authorize(&token, &docs, "delete").await, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_scope_update_applies_on_event_not_ttl() {
    let h = harness().await;
    let (user_id, session) = h.user("alice").await;
    let files = format!("storage.{user_id}.files");
    let (account_id, token) = h
        .service_account(&session, json!({ &files: ["read", "create"] }))
        .await;

    let consumer = h.identity_consumer(Duration::from_secs(30));
    let subscription = h.bus.subscribe(consumer.spec().clone()).await.unwrap();
    drain(&consumer, subscription.as_ref()).await;
    assert_eq!(h.authorize(&token, &files, "create").await, StatusCode::OK);

    let (status, _) = h
        .issuer_call(
            reqwest::Method::PUT,
            &format!("/api/service-accounts/{account_id}/scopes"),
            Some(&session),
            Some(json!({"scopes": { &files: ["read"] }})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // not yet propagated: the cached grant still allows create
    assert_eq!(h.authorize(&token, &files, "create").await, StatusCode::OK);

    let applied = drain(&consumer, subscription.as_ref()).await;
    assert_eq!(applied, vec![Disposition::Acked(Outcome::Applied)]);
    assert_eq!(h.authorize(&token, &files, "create").await, StatusCode::FORBIDDEN);
    assert_eq!(h.authorize(&token, &files, "read").await, StatusCode::OK);
}

#[tokio::test]
async fn test_redelivered_update_after_delete_is_stale() {
    let h = harness().await;
    let (user_id, session) = h.user("alice").await;
    let files = format!("storage.{user_id}.files");
    let (account_id, _) = h
        .service_account(&session, json!({ &files: ["read", "create"] }))
        .await;

    let path = format!("/api/service-accounts/{account_id}");
    h.issuer_call(
        reqwest::Method::PUT,
        &format!("{path}/scopes"),
        Some(&session),
        Some(json!({"scopes": { &files: ["read"] }})),
    )
    .await;
    let (status, _) = h
        .issuer_call(reqwest::Method::DELETE, &path, Some(&session), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let consumer = h.identity_consumer(Duration::from_millis(300));
    let subscription = h.bus.subscribe(consumer.spec().clone()).await.unwrap();

    // v1 is handled; v2 is fetched but its ack never happens
    let first = subscription.fetch(2, Duration::from_millis(50)).await.unwrap();
    assert_eq!(first.len(), 2);
    consumer.process(subscription.as_ref(), &first[0]).await.unwrap();

    // v3 delete
    let deleted = drain(&consumer, subscription.as_ref()).await;
    assert_eq!(deleted, vec![Disposition::Acked(Outcome::Applied)]);

    // v2 comes back after the ack wait and changes nothing
    tokio::time::sleep(Duration::from_millis(400)).await;
    let redelivered = subscription.fetch(10, Duration::from_millis(50)).await.unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].delivered, 2);
    assert_eq!(
        consumer.process(subscription.as_ref(), &redelivered[0]).await.unwrap(),
        Disposition::Acked(Outcome::Stale)
    );

    let record = h.sfs.permissions().get_record(&account_id).await.unwrap().unwrap();
    assert!(record.deleted);
    assert_eq!(record.version, 3);
    assert_eq!(h.sfs.permissions().get_scopes(&account_id).await.unwrap(), None);
}

#[tokio::test]
async fn test_revoked_api_token_fails_after_ttl() {
    let h = harness().await;
    let (user_id, session) = h.user("alice").await;
    let files = format!("storage.{user_id}.files");
    let (status, issued) = h
        .issuer_call(
            reqwest::Method::POST,
            "/api/tokens",
            Some(&session),
            Some(json!({"name": "ci", "scopes": { &files: ["read"] }})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = issued["token"].as_str().unwrap().to_string();
    let token_id = issued["id"].as_str().unwrap().to_string();

    assert_eq!(h.authorize(&token, &files, "read").await, StatusCode::OK);

    let (status, _) = h
        .issuer_call(
            reqwest::Method::DELETE,
            &format!("/api/tokens/{token_id}"),
            Some(&session),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    h.clock.advance(TTL - Duration::from_secs(1));
    assert_eq!(h.authorize(&token, &files, "read").await, StatusCode::OK);

    h.clock.advance(Duration::from_secs(1));
    assert_eq!(h.authorize(&token, &files, "read").await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unreachable_issuer_fails_open_with_claim_scopes() {
    let bus = MemoryBus::new();
    // nothing listens on the discard port
    let h = harness_with_issuer(Url::parse("http://127.0.0.1:9").unwrap(), bus).await;

    let raw: common::prelude::RawScopes =
        serde_json::from_value(json!({"storage.u1.files": ["read"]})).unwrap();
    let token = common::prelude::TokenSigner::new(SECRET.as_bytes())
        .mint_api_token(
            "t1",
            "u1",
            &common::prelude::Scopes::for_owner(&raw, "u1").unwrap(),
            None,
        )
        .unwrap();

    assert_eq!(h.authorize(&token, "storage.u1.files.docs", "read").await, StatusCode::OK);
    assert_eq!(
        h.authorize(&token, "storage.u1.files.docs", "delete").await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(h.authorize(&token, "storage.u2.files", "read").await, StatusCode::FORBIDDEN);

    assert!(BulkSync::new(h.sfs.issuer().clone())
        .run_or_warn(h.sfs.permissions())
        .await
        .is_none());
}

#[tokio::test]
async fn test_compute_only_grant_is_not_replicated() {
    let h = harness().await;
    let (user_id, session) = h.user("alice").await;
    let (account_id, token) = h
        .service_account(&session, json!({ format!("compute.{user_id}.containers"): ["read"] }))
        .await;

    let consumer = h.identity_consumer(Duration::from_secs(30));
    let subscription = h.bus.subscribe(consumer.spec().clone()).await.unwrap();
    drain(&consumer, subscription.as_ref()).await;

    let record = h.sfs.permissions().get_record(&account_id).await.unwrap().unwrap();
    assert!(record.deleted);
    assert_eq!(
        h.authorize(&token, &format!("storage.{user_id}"), "read").await,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_whoami_reports_directory_user() {
    let h = harness().await;
    let (user_id, session) = h.user("alice").await;

    let consumer = EventConsumer::new(
        Arc::new(h.bus.clone()),
        "sfs-user",
        UserHandler::new(h.sfs.users().clone()),
    );
    let subscription = h.bus.subscribe(consumer.spec().clone()).await.unwrap();
    assert_eq!(
        drain(&consumer, subscription.as_ref()).await,
        vec![Disposition::Acked(Outcome::Applied)]
    );

    let request = Request::builder()
        .uri("/api/whoami")
        .header("authorization", format!("Bearer {session}"))
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(
        &axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(body["principal"]["kind"], json!("user"));
    assert_eq!(body["principal"]["user_id"], json!(user_id));
    assert_eq!(body["user"]["username"], json!("alice"));

    let request = Request::builder().uri("/api/whoami").body(Body::empty()).unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bulk_sync_requires_matching_service_key() {
    let h = harness().await;
    let (user_id, session) = h.user("alice").await;
    h.service_account(&session, json!({ format!("storage.{user_id}"): ["read"] }))
        .await;

    let wrong = IssuerClient::new(&h.issuer, Some("not-the-key")).unwrap();
    assert!(BulkSync::new(wrong).run(h.sfs.permissions()).await.is_err());

    let sync = BulkSync::new(h.sfs.issuer().clone());
    assert_eq!(
        sync.run(h.sfs.permissions()).await.unwrap(),
        SyncReport { applied: 1, stale: 0 }
    );
    // a second pass finds nothing newer
    assert_eq!(
        sync.run(h.sfs.permissions()).await.unwrap(),
        SyncReport { applied: 0, stale: 1 }
    );
}
