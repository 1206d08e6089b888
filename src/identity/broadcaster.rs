//! Client auth-state broadcaster: a single current-value slot with
//! synchronous subscriber notification. One instance per client context,
//! created once at start; updates are driven by provider events, not timers.

use tokio::sync::watch;

use super::principal::Principal;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub principal: Option<Principal>,
    pub loading: bool,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.principal.as_ref().map(|p| p.admin).unwrap_or(false)
    }
}

/// Outcome of a publish. Non-admin principals are never stored; when
/// `InvalidationRequired` comes back the owner must run the same sign-out
/// path the server gate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Stored,
    Cleared,
    InvalidationRequired,
}

#[derive(Debug)]
pub struct AuthBroadcaster {
    tx: watch::Sender<AuthSnapshot>,
}

impl Default for AuthBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthSnapshot { principal: None, loading: true });
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AuthSnapshot {
        self.tx.borrow().clone()
    }

    pub fn set_loading(&self, loading: bool) {
        let principal = self.tx.borrow().principal.clone();
        self.tx.send_replace(AuthSnapshot { principal, loading });
    }

    /// Replace the slot. A non-admin principal clears it instead and reports
    /// that invalidation is required.
    pub fn publish(&self, principal: Option<Principal>) -> Published {
        match principal {
            Some(p) if !p.admin => {
                self.tx.send_replace(AuthSnapshot { principal: None, loading: false });
                Published::InvalidationRequired
            }
            Some(p) => {
                self.tx.send_replace(AuthSnapshot { principal: Some(p), loading: false });
                Published::Stored
            }
            None => {
                self.tx.send_replace(AuthSnapshot { principal: None, loading: false });
                Published::Cleared
            }
        }
    }

    pub fn clear(&self) {
        let _ = self.publish(None);
    }
}
