//! End-to-end flows against a real database. Each test gets a fresh database
//! with `migrations/` applied; `DATABASE_URL` must point at a Postgres server
//! where the test role can create databases.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use petitions_api::{
    build_router,
    config::Config,
    models::auth::TokenScope,
    services::{auth::AuthService, balance::BalanceService, tokens::TokenIssuer},
    AppState,
};

const SECRET: &str = "db-flow-secret";
const PASSWORD: &str = "segredo123";

fn config() -> Config {
    Config {
        database_url: String::new(),
        redis_url: None,
        jwt_secret: SECRET.into(),
        access_token_ttl_seconds: 3600,
        refresh_token_ttl_days: 7,
        host: "127.0.0.1".into(),
        port: 0,
        app_base_url: "http://localhost".into(),
        petition_cost: 16,
        smtp_host: None,
        smtp_port: None,
        smtp_username: None,
        smtp_password: None,
        smtp_from: None,
    }
}

fn issuer() -> TokenIssuer {
    TokenIssuer::new(SECRET, 3600, 7).unwrap()
}

fn app(pool: PgPool) -> Router {
    build_router(AppState {
        db: pool,
        redis: None,
        config: Arc::new(config()),
        tokens: Arc::new(issuer()),
        email: None,
    })
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

struct Account {
    id: Uuid,
    email: String,
    token: String,
    refresh_token: String,
}

async fn register(app: &Router, email: &str) -> Account {
    let (status, body) = call(
        app,
        Method::POST,
        "/api-auth/register",
        None,
        Some(json!({
            "email": email,
            "password": PASSWORD,
            "fullName": "Advogada Teste",
            "termsAccepted": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    Account {
        id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
        email: email.to_string(),
        token: body["token"].as_str().unwrap().to_string(),
        refresh_token: body["refreshToken"].as_str().unwrap().to_string(),
    }
}

async fn create_team(app: &Router, owner: &Account) -> Uuid {
    let (status, body) = call(
        app,
        Method::POST,
        "/api-teams",
        Some(&owner.token),
        Some(json!({ "name": "Escritório" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn create_petition(app: &Router, author: &Account, team_id: Uuid) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        "/api-petitions",
        Some(&author.token),
        Some(json!({
            "title": "Ação de alimentos",
            "team_id": team_id,
            "legal_area": "familia"
        })),
    )
    .await
}

async fn balance(app: &Router, account: &Account) -> i64 {
    let (status, body) = call(app, Method::GET, "/api-tokens/balance", Some(&account.token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["tokens"].as_i64().unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn login_returns_user_and_token_pair(pool: PgPool) {
    let app = app(pool);
    let account = register(&app, "login@example.com").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api-auth/login",
        None,
        Some(json!({ "email": "LOGIN@example.com", "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["id"], account.id.to_string());
    assert_eq!(body["user"]["email"], "login@example.com");
    assert_eq!(body["user"]["is_admin"], false);

    let access = issuer()
        .verify(body["token"].as_str().unwrap(), TokenScope::Access)
        .unwrap();
    assert_eq!(access.sub, account.id.to_string());
    let refresh = issuer()
        .verify(body["refreshToken"].as_str().unwrap(), TokenScope::Refresh)
        .unwrap();
    assert!(refresh.jti.is_some());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api-auth/login",
        None,
        Some(json!({ "email": account.email, "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");
}

#[sqlx::test(migrations = "./migrations")]
async fn refresh_rotates_and_reuse_revokes_the_family(pool: PgPool) {
    let app = app(pool.clone());
    let account = register(&app, "rotate@example.com").await;

    let (status, rotated) = call(
        &app,
        Method::POST,
        "/api-auth/refresh",
        None,
        Some(json!({ "refreshToken": account.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{rotated}");
    let next = rotated["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(next, account.refresh_token);

    // Presenting the consumed token again is treated as theft.
    let (status, body) = call(
        &app,
        Method::POST,
        "/api-auth/refresh",
        None,
        Some(json!({ "refreshToken": account.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_or_expired_token");

    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1 AND revoked_at IS NULL",
    )
    .bind(account.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(live, 0);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api-auth/refresh",
        None,
        Some(json!({ "refreshToken": next })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "./migrations")]
async fn non_member_is_forbidden_on_petition(pool: PgPool) {
    let app = app(pool.clone());
    let owner = register(&app, "dona@example.com").await;
    let outsider = register(&app, "estranho@example.com").await;
    let team_id = create_team(&app, &owner).await;
    BalanceService::credit(&pool, owner.id, 16, "test credit").await.unwrap();

    let (status, petition) = create_petition(&app, &owner, team_id).await;
    assert_eq!(status, StatusCode::CREATED, "{petition}");
    let uri = format!("/api-petitions/{}", petition["id"].as_str().unwrap());

    let (status, body) = call(&app, Method::GET, &uri, Some(&outsider.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = call(
        &app,
        Method::PUT,
        &uri,
        Some(&outsider.token),
        Some(json!({ "title": "Sequestrada" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::DELETE, &uri, Some(&outsider.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Still there and untouched for the owner.
    let (status, body) = call(&app, Method::GET, &uri, Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Ação de alimentos");

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api-petitions/{}", Uuid::new_v4()),
        Some(&outsider.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations")]
async fn creating_a_petition_debits_the_team_owner(pool: PgPool) {
    let app = app(pool.clone());
    let owner = register(&app, "titular@example.com").await;
    let team_id = create_team(&app, &owner).await;
    BalanceService::credit(&pool, owner.id, 20, "test credit").await.unwrap();

    let (status, body) = create_petition(&app, &owner, team_id).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "pending");
    assert_eq!(balance(&app, &owner).await, 4);

    let debits: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM token_transactions WHERE user_id = $1 AND amount = -16",
    )
    .bind(owner.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(debits, 1);

    // 4 tokens left, 16 needed: nothing is created and nothing is charged.
    let (status, body) = create_petition(&app, &owner, team_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
    assert_eq!(balance(&app, &owner).await, 4);

    let petitions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM petitions WHERE team_id = $1")
        .bind(team_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(petitions, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn admin_stats_rechecks_admin_flag_in_database(pool: PgPool) {
    let app = app(pool.clone());
    let account = register(&app, "admin@example.com").await;
    let team_id = create_team(&app, &account).await;
    BalanceService::credit(&pool, account.id, 16, "test credit").await.unwrap();
    let (status, _) = create_petition(&app, &account, team_id).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app, Method::GET, "/api-admin-stats", Some(&account.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    sqlx::query("UPDATE users SET is_admin = TRUE WHERE id = $1")
        .bind(account.id)
        .execute(&pool)
        .await
        .unwrap();

    // The token still says is_admin=false; the database is authoritative.
    let (status, body) = call(&app, Method::GET, "/api-admin-stats", Some(&account.token), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["total_users"], 1);
    assert_eq!(body["total_petitions"], 1);
    assert_eq!(body["pending_petitions"], 1);
    assert_eq!(body["distribution_by_status"]["pending"], 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn password_reset_replaces_password_and_ends_sessions(pool: PgPool) {
    let app = app(pool.clone());
    let account = register(&app, "esqueci@example.com").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api-auth/reset-password",
        None,
        Some(json!({ "email": "ninguem@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let unknown_message = body["message"].clone();

    let token = AuthService::request_password_reset(&pool, None, &account.email, "http://localhost")
        .await
        .unwrap()
        .expect("known email gets a token");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api-auth/reset-password",
        None,
        Some(json!({ "email": account.email })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], unknown_message);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api-auth/reset-password/confirm",
        None,
        Some(json!({ "token": token, "newPassword": "nova-senha-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Single use.
    let (status, _) = call(
        &app,
        Method::POST,
        "/api-auth/reset-password/confirm",
        None,
        Some(json!({ "token": token, "newPassword": "outra-senha-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api-auth/refresh",
        None,
        Some(json!({ "refreshToken": account.refresh_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api-auth/login",
        None,
        Some(json!({ "email": account.email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api-auth/login",
        None,
        Some(json!({ "email": account.email, "password": "nova-senha-42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
