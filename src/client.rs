//! Panel client: the browser-side auth flows rendered as a Rust client.
//! Holds the provider session (the local-storage analog), mirrors every
//! outcome into the auth broadcaster, and never keeps a non-admin session
//! alive: a rejected principal runs the same teardown path the server gate
//! runs.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use reqwest::Url;
use tokio::sync::watch;
use tracing::warn;

use crate::identity::{
    AuthBroadcaster, AuthProvider, AuthSnapshot, Principal, ProviderSession, Published,
    SignOutScope,
};
use crate::settings::Setting;

pub const ACCESS_DENIED: &str = "Access denied. Admin privileges required for this application.";

pub struct PanelClient {
    base: Url,
    http: reqwest::Client,
    provider: Arc<dyn AuthProvider>,
    session: RwLock<Option<ProviderSession>>,
    broadcaster: AuthBroadcaster,
}

impl PanelClient {
    pub fn new(base: &str, provider: Arc<dyn AuthProvider>) -> Result<Self> {
        let base = Url::parse(base).context("invalid panel base URL")?;
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            base,
            http,
            provider,
            session: RwLock::new(None),
            broadcaster: AuthBroadcaster::new(),
        })
    }

    /// Observe auth-state changes. One slot, synchronous notification.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.broadcaster.subscribe()
    }

    pub fn current(&self) -> AuthSnapshot {
        self.broadcaster.current()
    }

    pub fn session(&self) -> Option<ProviderSession> {
        self.session.read().clone()
    }

    /// Server-side allow-list check; any failure counts as not admin.
    pub async fn validate_admin(&self, email: &str) -> bool {
        let Ok(url) = self.base.join("/auth/validate-admin") else { return false; };
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({"email": email.trim().to_lowercase()}))
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => r
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("isAdmin").and_then(|b| b.as_bool()))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<Principal> {
        self.broadcaster.set_loading(true);
        let session = match self
            .provider
            .password_login(&email.trim().to_lowercase(), password)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                self.broadcaster.publish(None);
                return Err(anyhow!("sign in failed: {e}"));
            }
        };

        // Admin check runs immediately after a successful login
        let admin = match session.user.email.as_deref() {
            Some(e) => self.validate_admin(e).await,
            None => false,
        };
        let principal = Principal::from_user(&session.user, admin);
        if self.broadcaster.publish(Some(principal.clone())) == Published::InvalidationRequired {
            if let Err(e) = self.provider.sign_out(&session.access_token, SignOutScope::Global).await {
                warn!("teardown of non-admin session failed: {e}");
            }
            return Err(anyhow!(ACCESS_DENIED));
        }
        *self.session.write() = Some(session);
        Ok(principal)
    }

    /// Request a magic link. The allow-list check runs first: no link is ever
    /// sent to an unlisted address.
    pub async fn sign_in_with_magic_link(&self, email: &str) -> Result<()> {
        if !self.validate_admin(email).await {
            return Err(anyhow!(ACCESS_DENIED));
        }
        let redirect = self.base.join("/auth/callback")?;
        self.provider
            .send_magic_link(&email.trim().to_lowercase(), redirect.as_str())
            .await
            .map_err(|e| anyhow!("magic link request failed: {e}"))
    }

    /// Follow a magic-link/OAuth callback URL, capturing the session cookies
    /// the way a browser would.
    pub async fn follow_callback(&self, code: &str) -> Result<()> {
        let mut url = self.base.join("/auth/callback")?;
        url.query_pairs_mut().append_pair("code", code);
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("callback failed: HTTP {}", resp.status()));
        }
        Ok(())
    }

    /// Re-resolve the current user from the stored session plus the
    /// server-side admin check, publishing the outcome. Provider failures
    /// resolve to signed-out (fail closed).
    pub async fn refresh_user(&self) -> Result<Option<Principal>> {
        let token = self.session.read().as_ref().map(|s| s.access_token.clone());
        let Some(token) = token else {
            self.broadcaster.publish(None);
            return Ok(None);
        };
        let user = match self.provider.get_user(&token).await {
            Ok(u) => u,
            Err(e) => {
                warn!("user lookup failed: {e}");
                None
            }
        };
        let Some(user) = user else {
            *self.session.write() = None;
            self.broadcaster.publish(None);
            return Ok(None);
        };
        let admin = match user.email.as_deref() {
            Some(e) => self.validate_admin(e).await,
            None => false,
        };
        let principal = Principal::from_user(&user, admin);
        if self.broadcaster.publish(Some(principal.clone())) == Published::InvalidationRequired {
            warn!(
                "non-admin user attempted to access admin panel: {}",
                user.email.unwrap_or_default()
            );
            self.sign_out().await?;
            return Ok(None);
        }
        Ok(Some(principal))
    }

    /// Rotate the stored session. A refreshed non-admin principal is signed
    /// out rather than kept.
    pub async fn refresh_session(&self) -> Result<Option<Principal>> {
        let refresh = self.session.read().as_ref().map(|s| s.refresh_token.clone());
        let Some(refresh) = refresh else {
            return Ok(None);
        };
        let session = self
            .provider
            .refresh_session(&refresh)
            .await
            .map_err(|e| anyhow!("session refresh failed: {e}"))?;
        let admin = match session.user.email.as_deref() {
            Some(e) => self.validate_admin(e).await,
            None => false,
        };
        let principal = Principal::from_user(&session.user, admin);
        if self.broadcaster.publish(Some(principal.clone())) == Published::InvalidationRequired {
            if let Err(e) = self.provider.sign_out(&session.access_token, SignOutScope::Global).await {
                warn!("teardown of refreshed non-admin session failed: {e}");
            }
            *self.session.write() = None;
            return Err(anyhow!("Session invalid for admin panel"));
        }
        *self.session.write() = Some(session);
        Ok(Some(principal))
    }

    /// Re-validate the stored session's email; used before privileged calls.
    pub async fn validate_admin_session(&self) -> bool {
        let email = self.session.read().as_ref().and_then(|s| s.user.email.clone());
        match email {
            Some(e) => self.validate_admin(&e).await,
            None => false,
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        let taken = self.session.write().take();
        if let Some(session) = taken {
            if let Err(e) = self.provider.sign_out(&session.access_token, SignOutScope::Global).await {
                warn!("provider sign-out failed: {e}");
            }
        }
        // Server-side cookie teardown as well
        if let Ok(url) = self.base.join("/auth/logout") {
            let _ = self.http.post(url).send().await;
        }
        self.broadcaster.publish(None);
        Ok(())
    }

    pub async fn fetch_settings(&self) -> Result<Vec<Setting>> {
        let url = self.base.join("/api/settings")?;
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("settings fetch failed: HTTP {}", resp.status()));
        }
        Ok(resp.json::<Vec<Setting>>().await?)
    }

    pub async fn save_settings(&self, rows: &[Setting]) -> Result<()> {
        let url = self.base.join("/api/settings")?;
        let resp = self.http.post(url).json(&rows).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("settings save failed: HTTP {}", resp.status()));
        }
        Ok(())
    }
}
