//! Identity provider client. The provider owns all credential and token
//! material; panelgate only relays it. The wire protocol is consumed through
//! a small REST surface and never reimplemented locally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tprintln;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// Opaque session material issued by the provider. Relayed via cookies,
/// never minted locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: ProviderUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// Invalidate only the session behind the presented token.
    Local,
    /// Invalidate every session of the token's user.
    Global,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Local => "local",
            SignOutScope::Global => "global",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider denied the request: {0}")]
    Denied(String),
    #[error("provider transport failure: {0}")]
    Transport(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Asynchronous provider operations: token grants, user lookup and sign-out.
/// Every call is a bounded request/response round trip with explicit
/// success/error result types.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, ProviderError>;
    async fn password_login(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError>;
    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError>;
    async fn get_user(&self, access_token: &str) -> Result<Option<ProviderUser>, ProviderError>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError>;
    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), ProviderError>;
}

fn gen_token() -> String {
    // 128-bit random hex token
    let mut bytes = [0u8; 16];
    let _ = getrandom::getrandom(&mut bytes);
    let mut out = String::with_capacity(32);
    use std::fmt::Write as _;
    for b in &bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Pull a human-readable message out of a provider error body without leaking
/// the raw payload.
fn error_message(status: reqwest::StatusCode, body: Option<serde_json::Value>) -> String {
    body.as_ref()
        .and_then(|v| {
            v.get("error_description")
                .or_else(|| v.get("message"))
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {}", status))
}

/// REST-backed provider client. Auth endpoints live under `auth/v1` of the
/// hosted service root; every request carries the public API key.
pub struct RestAuthProvider {
    base: String,
    api_key: String,
    http: reqwest::Client,
}

impl RestAuthProvider {
    pub fn new(base: &str, api_key: &str) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base, path)
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<ProviderSession, ProviderError> {
        let url = format!("{}?grant_type={}", self.auth_url("token"), grant_type);
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<serde_json::Value>().await.ok();
            return Err(ProviderError::Denied(error_message(status, body)));
        }
        resp.json::<ProviderSession>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl AuthProvider for RestAuthProvider {
    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, ProviderError> {
        self.token_grant("authorization_code", serde_json::json!({ "code": code }))
            .await
    }

    async fn password_login(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        self.token_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError> {
        let resp = self
            .http
            .post(self.auth_url("otp"))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "redirect_to": redirect_to }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<serde_json::Value>().await.ok();
            return Err(ProviderError::Denied(error_message(status, body)));
        }
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<ProviderUser>, ProviderError> {
        let resp = self
            .http
            .get(self.auth_url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // Dead or revoked token: not an error, just no user
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.json::<serde_json::Value>().await.ok();
            return Err(ProviderError::Denied(error_message(status, body)));
        }
        let user = resp
            .json::<ProviderUser>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(Some(user))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), ProviderError> {
        let url = format!("{}?scope={}", self.auth_url("logout"), scope.as_str());
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token already invalid: the session is gone either way
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.json::<serde_json::Value>().await.ok();
            return Err(ProviderError::Denied(error_message(status, body)));
        }
        Ok(())
    }
}

/// In-memory provider used by tests and local development. Codes and tokens
/// are plain strings; no real credential material is involved.
#[derive(Default)]
pub struct StaticAuthProvider {
    codes: RwLock<HashMap<String, ProviderSession>>,
    passwords: RwLock<HashMap<String, (String, ProviderUser)>>,
    tokens: RwLock<HashMap<String, ProviderUser>>,
    refreshes: RwLock<HashMap<String, ProviderUser>>,
    magic_links: RwLock<Vec<(String, String)>>,
}

impl StaticAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a live session for a user and register its tokens.
    pub fn issue_session(&self, user: ProviderUser) -> ProviderSession {
        let session = ProviderSession {
            access_token: gen_token(),
            refresh_token: gen_token(),
            expires_in: Some(60 * 60 * 24 * 7),
            user: user.clone(),
        };
        self.tokens.write().insert(session.access_token.clone(), user.clone());
        self.refreshes.write().insert(session.refresh_token.clone(), user);
        tprintln!("static provider issued session access={}", session.access_token);
        session
    }

    /// Register an exchangeable one-shot code for a user.
    pub fn register_code(&self, code: &str, user: ProviderUser) -> ProviderSession {
        let session = self.issue_session(user);
        self.codes.write().insert(code.to_string(), session.clone());
        session
    }

    pub fn register_password(&self, email: &str, password: &str, user: ProviderUser) {
        self.passwords
            .write()
            .insert(email.trim().to_lowercase(), (password.to_string(), user));
    }

    pub fn token_is_live(&self, access_token: &str) -> bool {
        self.tokens.read().contains_key(access_token)
    }

    pub fn live_sessions(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn sent_magic_links(&self) -> Vec<(String, String)> {
        self.magic_links.read().clone()
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn exchange_code(&self, code: &str) -> Result<ProviderSession, ProviderError> {
        self.codes
            .write()
            .remove(code)
            .ok_or_else(|| ProviderError::Denied("invalid or expired code".into()))
    }

    async fn password_login(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        let entry = self.passwords.read().get(&email.trim().to_lowercase()).cloned();
        match entry {
            Some((expected, user)) if expected == password => Ok(self.issue_session(user)),
            _ => Err(ProviderError::Denied("invalid login credentials".into())),
        }
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError> {
        self.magic_links
            .write()
            .push((email.trim().to_lowercase(), redirect_to.to_string()));
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<ProviderUser>, ProviderError> {
        Ok(self.tokens.read().get(access_token).cloned())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        let user = self.refreshes.write().remove(refresh_token);
        match user {
            Some(user) => Ok(self.issue_session(user)),
            None => Err(ProviderError::Denied("invalid refresh token".into())),
        }
    }

    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), ProviderError> {
        let removed = self.tokens.write().remove(access_token);
        if scope == SignOutScope::Global {
            if let Some(user) = removed {
                self.tokens.write().retain(|_, u| u.id != user.id);
                self.refreshes.write().retain(|_, u| u.id != user.id);
            }
        }
        Ok(())
    }
}
