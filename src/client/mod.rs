//! HTTP client for the petitions API.
//!
//! Holds the session explicitly and refreshes it on 401. Concurrent requests
//! that fail with the same stale refresh token share a single refresh call and
//! then replay once with the new access token.

mod session;

pub use session::{Session, SessionState};

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    petition::{CreatePetitionRequest, Petition, PetitionDetail, PetitionPage, PetitionQuery, UpdatePetitionRequest},
    user::{AuthResponse, LoginRequest, LogoutRequest, RefreshTokenRequest, RegisterRequest, VerifyResponse},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const NO_QUERY: Option<&()> = None;
const NO_BODY: Option<&()> = None;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("API error {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    session: RwLock<Option<Session>>,
    /// Held for the duration of a refresh call.
    refresh_gate: Mutex<()>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        })
    }

    pub async fn state(&self) -> SessionState {
        if self.session.read().await.is_none() {
            return SessionState::Unauthenticated;
        }
        match self.refresh_gate.try_lock() {
            Ok(_) => SessionState::Authenticated,
            Err(_) => SessionState::Refreshing,
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Install a session obtained elsewhere, e.g. restored from disk.
    pub async fn set_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body = LoginRequest { email: email.to_string(), password: password.to_string() };
        let auth: AuthResponse = decode(self.request(Method::POST, "/api-auth/login").json(&body).send().await?).await?;
        let session = Session::from(auth);
        self.set_session(Some(session.clone())).await;
        Ok(session)
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<Session, ClientError> {
        let auth: AuthResponse = decode(self.request(Method::POST, "/api-auth/register").json(req).send().await?).await?;
        let session = Session::from(auth);
        self.set_session(Some(session.clone())).await;
        Ok(session)
    }

    /// Revoke the refresh token server-side and forget the local session.
    /// The local session is cleared even if the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        let body = LogoutRequest { refresh_token: Some(session.refresh_token) };
        let resp = self.request(Method::POST, "/api-auth/logout").json(&body).send().await?;
        let _: Value = decode(resp).await?;
        Ok(())
    }

    pub async fn verify(&self) -> Result<VerifyResponse, ClientError> {
        self.send_authed(Method::GET, "/api-auth/verify", NO_QUERY, NO_BODY).await
    }

    pub async fn list_petitions(&self, query: &PetitionQuery) -> Result<PetitionPage, ClientError> {
        self.send_authed(Method::GET, "/api-petitions", Some(query), NO_BODY).await
    }

    pub async fn get_petition(&self, id: Uuid) -> Result<PetitionDetail, ClientError> {
        self.send_authed(Method::GET, &format!("/api-petitions/{id}"), NO_QUERY, NO_BODY).await
    }

    pub async fn create_petition(&self, req: &CreatePetitionRequest) -> Result<Petition, ClientError> {
        self.send_authed(Method::POST, "/api-petitions", NO_QUERY, Some(req)).await
    }

    pub async fn update_petition(&self, id: Uuid, req: &UpdatePetitionRequest) -> Result<Petition, ClientError> {
        self.send_authed(Method::PUT, &format!("/api-petitions/{id}"), NO_QUERY, Some(req)).await
    }

    pub async fn delete_petition(&self, id: Uuid) -> Result<(), ClientError> {
        let _: Value = self
            .send_authed(Method::DELETE, &format!("/api-petitions/{id}"), NO_QUERY, NO_BODY)
            .await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    fn build<Q: Serialize, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Q>,
        body: Option<&B>,
        access_token: &str,
    ) -> RequestBuilder {
        let mut req = self.request(method, path).bearer_auth(access_token);
        if let Some(q) = query {
            req = req.query(q);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        req
    }

    /// Send with the current access token; on 401 refresh once and replay once.
    /// The replay's outcome is returned as-is.
    async fn send_authed<Q: Serialize, B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Q>,
        body: Option<&B>,
    ) -> Result<T, ClientError> {
        let session = self.session().await.ok_or(ClientError::Unauthenticated)?;

        let resp = self
            .build(method.clone(), path, query, body, &session.access_token)
            .send()
            .await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return decode(resp).await;
        }

        debug!("{method} {path} returned 401, refreshing session");
        let access_token = self.refresh_after(&session.refresh_token).await?;
        let resp = self.build(method, path, query, body, &access_token).send().await?;
        decode(resp).await
    }

    /// Single-flight refresh. `stale` is the refresh token the caller saw fail;
    /// if another task already rotated it, the current access token is reused.
    async fn refresh_after(&self, stale: &str) -> Result<String, ClientError> {
        let _gate = self.refresh_gate.lock().await;

        match self.session.read().await.as_ref() {
            None => return Err(ClientError::Unauthenticated),
            Some(current) if current.refresh_token != stale => {
                return Ok(current.access_token.clone());
            }
            Some(_) => {}
        }

        let body = RefreshTokenRequest { refresh_token: stale.to_string() };
        let result = match self.request(Method::POST, "/api-auth/refresh").json(&body).send().await {
            Ok(resp) => decode::<AuthResponse>(resp).await,
            Err(e) => Err(ClientError::Transport(e)),
        };

        match result {
            Ok(auth) => {
                let session = Session::from(auth);
                let access_token = session.access_token.clone();
                *self.session.write().await = Some(session);
                Ok(access_token)
            }
            Err(e) => {
                warn!("session refresh failed: {e}");
                *self.session.write().await = None;
                Err(ClientError::Unauthenticated)
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        let message = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
        return Err(ClientError::Api { status, message });
    }
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
