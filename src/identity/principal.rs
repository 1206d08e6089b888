use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderUser;

/// Authenticated identity plus the derived admin flag. The flag is computed
/// from the allow-list at evaluation time and is never persisted with the
/// identity or read back from client-writable storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn from_user(user: &ProviderUser, admin: bool) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            admin,
            created_at: user.created_at,
            last_sign_in_at: user.last_sign_in_at,
        }
    }
}
