//! Session cookie relay. The provider session is carried opaquely in an
//! httpOnly cookie; a non-httpOnly flag cookie mirrors auth state for UI
//! chrome. The admin flag never rides in either cookie.

use axum::http::{HeaderMap, HeaderValue};
use base64::Engine;

use super::provider::ProviderSession;

pub const SESSION_COOKIE: &str = "panel_session";
pub const UI_FLAG_COOKIE: &str = "panel_admin";

/// Seven days, matching the provider session relay lifetime.
pub const SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 7;

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

/// Cookie payload codec: base64url (no padding) over the provider session
/// JSON. Anything that fails to decode is treated as no session.
pub fn encode_session(session: &ProviderSession) -> String {
    let json = serde_json::to_vec(session).unwrap_or_default();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

pub fn decode_session(raw: &str) -> Option<ProviderSession> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(raw).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn session_from_headers(headers: &HeaderMap) -> Option<ProviderSession> {
    let raw = parse_cookie(headers, SESSION_COOKIE)?;
    decode_session(&raw)
}

fn secure_suffix(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

pub fn set_session_cookie(session: &ProviderSession, secure: bool) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        SESSION_COOKIE,
        encode_session(session),
        SESSION_MAX_AGE_SECS,
        secure_suffix(secure)
    ))
    .unwrap()
}

/// Client-readable flag for UI state only; never consulted for access control.
pub fn set_ui_flag_cookie(secure: bool) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=true; SameSite=Lax; Path=/; Max-Age={}{}",
        UI_FLAG_COOKIE,
        SESSION_MAX_AGE_SECS,
        secure_suffix(secure)
    ))
    .unwrap()
}

pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; SameSite=Lax; Path=/{}",
        SESSION_COOKIE,
        secure_suffix(secure)
    ))
    .unwrap()
}

pub fn clear_ui_flag_cookie(secure: bool) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; SameSite=Lax; Path=/{}",
        UI_FLAG_COOKIE,
        secure_suffix(secure)
    ))
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ProviderUser;

    fn session() -> ProviderSession {
        ProviderSession {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            expires_in: Some(SESSION_MAX_AGE_SECS),
            user: ProviderUser {
                id: "u1".into(),
                email: Some("admin@x.com".into()),
                created_at: None,
                last_sign_in_at: None,
            },
        }
    }

    #[test]
    fn session_survives_the_cookie_codec() {
        let original = session();
        let decoded = decode_session(&encode_session(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn garbage_cookie_values_are_no_session() {
        assert!(decode_session("not base64!").is_none());
        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"nope\":1}");
        assert!(decode_session(&b64).is_none());
    }

    #[test]
    fn parse_cookie_picks_the_named_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("other=1; panel_session=abc; panel_admin=true"),
        );
        assert_eq!(parse_cookie(&headers, SESSION_COOKIE).as_deref(), Some("abc"));
        assert_eq!(parse_cookie(&headers, UI_FLAG_COOKIE).as_deref(), Some("true"));
        assert!(parse_cookie(&headers, "missing").is_none());
    }

    #[test]
    fn session_cookie_attributes() {
        let hv = set_session_cookie(&session(), true);
        let s = hv.to_str().unwrap();
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("SameSite=Lax"));
        assert!(s.contains("Max-Age=604800"));
        assert!(s.contains("Secure"));
        let hv = set_session_cookie(&session(), false);
        assert!(!hv.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn ui_flag_cookie_is_client_readable() {
        let hv = set_ui_flag_cookie(false);
        assert!(!hv.to_str().unwrap().contains("HttpOnly"));
    }

    #[test]
    fn clear_cookies_expire_immediately() {
        for hv in [clear_session_cookie(false), clear_ui_flag_cookie(false)] {
            let s = hv.to_str().unwrap();
            assert!(s.contains("Max-Age=0"));
            assert!(s.contains("Expires=Thu, 01 Jan 1970"));
        }
    }
}
