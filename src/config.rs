//! Process-wide configuration, read from the environment once at startup and
//! injected into the server state. There is no runtime mutation path; a
//! changed allow-list requires a process restart.

use anyhow::{Context, Result};

use crate::allowlist::AllowList;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    /// Root URL of the hosted provider; auth endpoints live under `auth/v1`.
    pub provider_url: String,
    pub provider_key: String,
    /// Settings REST endpoint; defaults to `<provider_url>/rest/v1`.
    pub settings_url: String,
    pub admins: AllowList,
    pub secure_cookies: bool,
}

pub fn parse_port(s: &str) -> Option<u16> {
    s.trim().parse::<u16>().ok()
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let provider_url = env_opt("PANELGATE_PROVIDER_URL")
            .context("Missing env PANELGATE_PROVIDER_URL")?
            .trim_end_matches('/')
            .to_string();
        let provider_key =
            env_opt("PANELGATE_PROVIDER_KEY").context("Missing env PANELGATE_PROVIDER_KEY")?;
        let settings_url = env_opt("PANELGATE_SETTINGS_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("{}/rest/v1", provider_url));
        let http_port = env_opt("PANELGATE_HTTP_PORT")
            .and_then(|v| parse_port(&v))
            .unwrap_or(8080);
        let secure_cookies = env_opt("PANELGATE_SECURE_COOKIES")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);
        let admins = AllowList::from_csv(&env_opt("ALLOWED_ADMIN_EMAILS").unwrap_or_default());
        Ok(Self {
            http_port,
            provider_url,
            provider_key,
            settings_url,
            admins,
            secure_cookies,
        })
    }
}
