use crate::models::user::{AuthResponse, AuthUser};

/// Credentials held by an [`ApiClient`](super::ApiClient) between calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
}

impl From<AuthResponse> for Session {
    fn from(r: AuthResponse) -> Self {
        Self {
            access_token: r.token,
            refresh_token: r.refresh_token,
            user: r.user,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// A refresh call is in flight; callers that hit 401 wait for it.
    Refreshing,
}
