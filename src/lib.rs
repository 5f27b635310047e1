// Library exports for binary tools and tests
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use services::{email::EmailService, tokens::TokenIssuer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Rate limiting is skipped when no Redis is configured.
    pub redis: Option<redis::aio::MultiplexedConnection>,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenIssuer>,
    /// Password reset emails are not sent when SMTP is not configured.
    pub email: Option<Arc<EmailService>>,
}

/// `http://<host>` or `http://<host>:<port>`, nothing else.
fn is_local_origin(origin: &str, host: &str) -> bool {
    let Some(rest) = origin.strip_prefix("http://").and_then(|o| o.strip_prefix(host)) else {
        return false;
    };
    match rest.strip_prefix(':') {
        None => rest.is_empty(),
        Some(port) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Allow the app base domain and its subdomains; localhost is always allowed.
fn origin_allowed(origin: &str, base: &str) -> bool {
    if is_local_origin(origin, "localhost") || is_local_origin(origin, "127.0.0.1") {
        return true;
    }
    if origin == base {
        return true;
    }
    if let Some(idx) = base.find("://") {
        let after_scheme = &base[idx + 3..];
        let domain = after_scheme.split('/').next().unwrap_or(after_scheme);
        let domain = domain.split(':').next().unwrap_or(domain);
        if !domain.is_empty() && origin.ends_with(&format!(".{domain}")) {
            return true;
        }
    }
    false
}

fn cors_layer(base_url: String) -> CorsLayer {
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .map(|o| origin_allowed(o, &base_url))
            .unwrap_or(false)
    });

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin)
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.app_base_url.clone());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/api-auth/login", post(routes::auth::login))
        .route("/api-auth/register", post(routes::auth::register))
        .route("/api-auth/refresh", post(routes::auth::refresh_token))
        .route("/api-auth/verify", get(routes::auth::verify))
        .route("/api-auth/logout", post(routes::auth::logout))
        .route("/api-auth/reset-password", post(routes::auth::forgot_password))
        .route("/api-auth/reset-password/confirm", post(routes::auth::reset_password))
        // Admin
        .route("/api-admin-stats", get(routes::admin::admin_stats))
        // Petitions
        .route(
            "/api-petitions",
            get(routes::petitions::list_petitions).post(routes::petitions::create_petition),
        )
        .route(
            "/api-petitions/{id}",
            get(routes::petitions::get_petition)
                .put(routes::petitions::update_petition)
                .delete(routes::petitions::delete_petition),
        )
        // Teams
        .route("/api-teams", get(routes::teams::list_teams).post(routes::teams::create_team))
        .route(
            "/api-teams/{id}",
            get(routes::teams::get_team)
                .put(routes::teams::update_team)
                .delete(routes::teams::delete_team),
        )
        .route("/api-teams/{id}/members", post(routes::teams::add_member))
        .route("/api-teams/{id}/members/{user_id}", delete(routes::teams::remove_member))
        .route("/api-teams/{id}/balance", get(routes::teams::team_balance))
        // Profile and balance
        .route(
            "/api-profile",
            get(routes::profile::get_profile).put(routes::profile::update_profile),
        )
        .route("/api-tokens/balance", get(routes::profile::token_balance))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .with_state(state)
}
