//! Static admin allow-list evaluator.
//! The set is built once at startup and never mutated afterwards; membership
//! is recomputed on every request rather than cached in any client-visible
//! state. Fail closed: no email, or an empty list, means no admin.

use std::collections::HashSet;

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct AllowList {
    emails: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let emails = entries
            .into_iter()
            .map(|e| normalize(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails }
    }

    /// Parse the comma-separated `ALLOWED_ADMIN_EMAILS` form.
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    /// Membership check with normalization. None/empty input is never admin.
    pub fn is_admin(&self, email: Option<&str>) -> bool {
        let Some(email) = email else { return false; };
        let norm = normalize(email);
        if norm.is_empty() {
            return false;
        }
        self.emails.contains(&norm)
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }
}
