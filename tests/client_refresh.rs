//! Client refresh behaviour against an in-process fake API.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use futures_util::future::join_all;
use serde_json::{json, Value};
use uuid::Uuid;

use petitions_api::{
    client::{ApiClient, ClientError, Session, SessionState},
    models::user::AuthUser,
};

struct Fake {
    /// Access token the protected endpoint accepts; `None` rejects everything.
    valid_access: Option<&'static str>,
    refresh_succeeds: bool,
    refresh_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl Fake {
    fn new(valid_access: Option<&'static str>, refresh_succeeds: bool) -> Arc<Self> {
        Arc::new(Self {
            valid_access,
            refresh_succeeds,
            refresh_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        })
    }
}

fn user() -> AuthUser {
    AuthUser {
        id: Uuid::nil(),
        email: "advogado@example.com".into(),
        name: "Advogado".into(),
        is_admin: false,
    }
}

async fn fake_verify(State(fake): State<Arc<Fake>>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    fake.verify_calls.fetch_add(1, Ordering::SeqCst);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match (bearer, fake.valid_access) {
        (Some(b), Some(valid)) if b == valid => (
            StatusCode::OK,
            Json(json!({
                "valid": true,
                "user": { "id": Uuid::nil(), "email": "advogado@example.com", "is_admin": false }
            })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid or expired token", "code": "invalid_or_expired_token" })),
        ),
    }
}

async fn fake_refresh(State(fake): State<Arc<Fake>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    fake.refresh_calls.fetch_add(1, Ordering::SeqCst);
    // Keep the refresh in flight long enough for concurrent callers to pile up.
    tokio::time::sleep(Duration::from_millis(100)).await;

    if !fake.refresh_succeeds || body["refreshToken"] != "refresh-1" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid or expired token", "code": "invalid_or_expired_token" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "user": user(),
            "token": "access-2",
            "refreshToken": "refresh-2"
        })),
    )
}

async fn spawn_fake(fake: Arc<Fake>) -> String {
    let app = Router::new()
        .route("/api-auth/verify", get(fake_verify))
        .route("/api-auth/refresh", post(fake_refresh))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn stale_client(base_url: String) -> Arc<ApiClient> {
    let client = ApiClient::with_timeout(base_url, Duration::from_secs(5)).unwrap();
    client
        .set_session(Some(Session {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            user: user(),
        }))
        .await;
    Arc::new(client)
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let fake = Fake::new(Some("access-2"), true);
    let client = stale_client(spawn_fake(fake.clone()).await).await;

    let calls = (0..8).map(|_| {
        let client = client.clone();
        async move { client.verify().await }
    });
    let results = join_all(calls).await;

    for r in &results {
        assert!(r.as_ref().is_ok_and(|v| v.valid), "{r:?}");
    }
    assert_eq!(fake.refresh_calls.load(Ordering::SeqCst), 1);

    let session = client.session().await.unwrap();
    assert_eq!(session.access_token, "access-2");
    assert_eq!(session.refresh_token, "refresh-2");
    assert_eq!(client.state().await, SessionState::Authenticated);
}

#[tokio::test]
async fn failed_refresh_leaves_client_unauthenticated() {
    let fake = Fake::new(Some("access-2"), false);
    let client = stale_client(spawn_fake(fake.clone()).await).await;

    let calls = (0..4).map(|_| {
        let client = client.clone();
        async move { client.verify().await }
    });
    for r in join_all(calls).await {
        assert!(matches!(r, Err(ClientError::Unauthenticated)), "{r:?}");
    }

    assert_eq!(fake.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(client.session().await.is_none());
    assert_eq!(client.state().await, SessionState::Unauthenticated);

    // Without a session nothing is sent.
    assert!(matches!(client.verify().await, Err(ClientError::Unauthenticated)));
    assert_eq!(fake.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replay_happens_only_once() {
    let fake = Fake::new(None, true);
    let client = stale_client(spawn_fake(fake.clone()).await).await;

    match client.verify().await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, StatusCode::UNAUTHORIZED),
        other => panic!("expected replayed 401, got {other:?}"),
    }
    assert_eq!(fake.verify_calls.load(Ordering::SeqCst), 2);
    assert_eq!(fake.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn state_reports_refreshing_while_refresh_is_in_flight() {
    let fake = Fake::new(Some("access-2"), true);
    let client = stale_client(spawn_fake(fake.clone()).await).await;
    assert_eq!(client.state().await, SessionState::Authenticated);

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.verify().await })
    };

    // The fake refresh sleeps 100ms; poll until the client reports it.
    let mut saw_refreshing = false;
    for _ in 0..50 {
        if client.state().await == SessionState::Refreshing {
            saw_refreshing = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(saw_refreshing);
    assert!(pending.await.unwrap().is_ok());
}
