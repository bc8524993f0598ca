//! Google sign-in and server-side session tracking.
//!
//! The OAuth flow is the plain authorization-code dance: build the
//! consent URL with a one-time state token, exchange the callback code
//! for an access token, then fetch userinfo. Sessions live in memory
//! behind an opaque cookie token.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::{AuthConfig, RequestConfig};
use crate::error::{AuthError, AuthResult};

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "mc_session";

/// An authenticated user, as reported by Google userinfo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    sub: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

/// Client for Google's OAuth endpoints.
pub struct GoogleAuthClient {
    client: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_url: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleAuthClient {
    pub fn new(config: &AuthConfig, request: &RequestConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .build()?;

        if config.google_client_id.is_some() {
            info!("Google sign-in enabled");
        }

        Ok(Self {
            client,
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Build the consent-screen URL for a state token.
    pub fn authorization_url(&self, state: &str) -> AuthResult<String> {
        let client_id = self.client_id.as_deref().ok_or(AuthError::NotConfigured)?;

        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("access_type", "online"),
            ],
        )
        .map_err(|e| AuthError::ExchangeFailed {
            message: format!("Invalid auth URL: {}", e),
        })?;

        Ok(url.to_string())
    }

    /// Exchange a callback code for the signed-in user.
    pub async fn exchange_code(&self, code: &str) -> AuthResult<AuthUser> {
        let client_id = self.client_id.as_deref().ok_or(AuthError::NotConfigured)?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(AuthError::NotConfigured)?;

        let params = [
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", self.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed {
                message: format!("Token endpoint returned {}: {}", status.as_u16(), body),
            });
        }

        let token: TokenResponse =
            response.json().await.map_err(|e| AuthError::ExchangeFailed {
                message: format!("Invalid token response: {}", e),
            })?;

        let userinfo = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        let status = userinfo.status();
        if !status.is_success() {
            return Err(AuthError::ExchangeFailed {
                message: format!("Userinfo endpoint returned {}", status.as_u16()),
            });
        }

        let info: UserInfoResponse =
            userinfo.json().await.map_err(|e| AuthError::ExchangeFailed {
                message: format!("Invalid userinfo response: {}", e),
            })?;

        info!(email = %info.email, "User signed in");

        Ok(AuthUser {
            id: info.sub,
            email: info.email,
            name: info.name,
            picture: info.picture,
        })
    }
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<String, AuthUser>,
    pending_states: HashSet<String>,
}

/// In-memory session registry keyed by opaque cookie tokens.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a one-time state token for an OAuth round trip.
    pub async fn issue_state(&self) -> String {
        let state = Uuid::new_v4().to_string();
        self.inner.write().await.pending_states.insert(state.clone());
        state
    }

    /// Consume a state token; returns false if it was never issued.
    pub async fn consume_state(&self, state: &str) -> bool {
        self.inner.write().await.pending_states.remove(state)
    }

    /// Start a session for a user, returning the cookie token.
    pub async fn create_session(&self, user: AuthUser) -> String {
        let token = Uuid::new_v4().to_string();
        self.inner.write().await.sessions.insert(token.clone(), user);
        token
    }

    pub async fn get_user(&self, token: &str) -> Option<AuthUser> {
        self.inner.read().await.sessions.get(token).cloned()
    }

    /// Remove a session; returns whether it existed.
    pub async fn remove_session(&self, token: &str) -> bool {
        self.inner.write().await.sessions.remove(token).is_some()
    }
}

/// Pull the session token out of a Cookie header value.
pub fn session_token_from_cookies(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}
