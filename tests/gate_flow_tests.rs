//! Gate integration tests: boot the real server on an ephemeral port and
//! drive the auth surface with an HTTP client. Redirects stay unfollowed so
//! Location headers and cookies can be asserted directly.

use std::sync::Arc;

use panelgate::allowlist::AllowList;
use panelgate::config::AppConfig;
use panelgate::identity::{
    encode_session, AuthProvider, ProviderUser, RoutePolicy, StaticAuthProvider, SESSION_COOKIE,
};
use panelgate::server::{router, AppState};
use panelgate::settings::{MemorySettingsStore, Setting, SettingsStore};

fn user(id: &str, email: &str) -> ProviderUser {
    ProviderUser {
        id: id.into(),
        email: Some(email.into()),
        created_at: None,
        last_sign_in_at: None,
    }
}

fn test_config(admins: &[&str]) -> AppConfig {
    AppConfig {
        http_port: 0,
        provider_url: "http://provider.invalid".into(),
        provider_key: "test-key".into(),
        settings_url: "http://provider.invalid/rest/v1".into(),
        admins: AllowList::new(admins.iter().copied()),
        secure_cookies: false,
    }
}

async fn start_server(
    admins: &[&str],
) -> (String, Arc<StaticAuthProvider>, Arc<MemorySettingsStore>) {
    let provider = Arc::new(StaticAuthProvider::new());
    let settings = Arc::new(MemorySettingsStore::new());
    let state = AppState {
        cfg: Arc::new(test_config(admins)),
        provider: provider.clone() as Arc<dyn AuthProvider>,
        settings: settings.clone() as Arc<dyn SettingsStore>,
        policy: Arc::new(RoutePolicy::default()),
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), provider, settings)
}

fn bare_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(resp: &reqwest::Response) -> String {
    resp.headers()
        .get("location")
        .expect("redirect should carry a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

fn set_cookies(resp: &reqwest::Response) -> Vec<String> {
    resp.headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

fn session_cookie_header(provider: &StaticAuthProvider, u: ProviderUser) -> (String, String) {
    let session = provider.issue_session(u);
    let header = format!("{}={}", SESSION_COOKIE, encode_session(&session));
    (header, session.access_token)
}

#[tokio::test]
async fn anonymous_protected_request_redirects_to_login_with_return_target() {
    let (base, _provider, _settings) = start_server(&["admin@x.com"]).await;
    let resp = bare_client().get(format!("{base}/dashboard")).send().await.unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/login?redirect=%2Fdashboard");
}

#[tokio::test]
async fn admin_callback_sets_cookies_and_lands_on_dashboard() {
    let (base, provider, _settings) = start_server(&["admin@x.com"]).await;
    // Email differs from the listed entry by case and whitespace only
    provider.register_code("c-admin", user("u1", "Admin@X.com "));

    let resp = bare_client()
        .get(format!("{base}/auth/callback?code=c-admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/dashboard");
    let cookies = set_cookies(&resp);
    let session = cookies.iter().find(|c| c.starts_with("panel_session=")).unwrap();
    assert!(session.contains("HttpOnly"));
    assert!(session.contains("Max-Age=604800"));
    let flag = cookies.iter().find(|c| c.starts_with("panel_admin=true")).unwrap();
    assert!(!flag.contains("HttpOnly"));

    // The cookie now opens the protected page
    let cookie = session.split(';').next().unwrap().to_string();
    let page = bare_client()
        .get(format!("{base}/dashboard"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), 200);
}

#[tokio::test]
async fn callback_next_parameter_only_honors_relative_paths() {
    let (base, provider, _settings) = start_server(&["admin@x.com"]).await;
    provider.register_code("c1", user("u1", "admin@x.com"));
    provider.register_code("c2", user("u1", "admin@x.com"));

    let resp = bare_client()
        .get(format!("{base}/auth/callback?code=c1&next=/settings"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/settings");

    let resp = bare_client()
        .get(format!("{base}/auth/callback?code=c2&next=https://evil.example"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/dashboard");
}

#[tokio::test]
async fn non_admin_callback_destroys_the_session_in_the_same_request() {
    let (base, provider, _settings) = start_server(&["admin@x.com"]).await;
    let session = provider.register_code("c-guest", user("u2", "guest@x.com"));

    let resp = bare_client()
        .get(format!("{base}/auth/callback?code=c-guest"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert!(location(&resp).starts_with("/login?error=unauthorized"));
    assert!(!provider.token_is_live(&session.access_token));
    // No durable session cookie: only clearing headers come back
    let cookies = set_cookies(&resp);
    assert!(cookies.iter().any(|c| c.starts_with("panel_session=deleted")));
    assert!(!cookies.iter().any(|c| c.starts_with("panel_session=") && !c.contains("deleted")));
}

#[tokio::test]
async fn non_admin_session_is_invalidated_on_protected_paths() {
    let (base, provider, _settings) = start_server(&["admin@x.com"]).await;
    let (cookie, token) = session_cookie_header(&provider, user("u2", "guest@x.com"));

    let resp = bare_client()
        .get(format!("{base}/dashboard"))
        .header("cookie", cookie.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert!(location(&resp).starts_with("/login?error=unauthorized"));
    assert!(!provider.token_is_live(&token));

    // The revoked session is anonymous on the next request
    let resp = bare_client()
        .get(format!("{base}/dashboard"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), "/login?redirect=%2Fdashboard");
}

#[tokio::test]
async fn admin_is_bounced_from_login_to_dashboard() {
    let (base, provider, _settings) = start_server(&["admin@x.com"]).await;
    let (cookie, _token) = session_cookie_header(&provider, user("u1", "admin@x.com"));

    let resp = bare_client()
        .get(format!("{base}/login"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(location(&resp), "/dashboard");
}

#[tokio::test]
async fn callback_error_paths_redirect_with_reason_codes() {
    let (base, _provider, _settings) = start_server(&["admin@x.com"]).await;

    let resp = bare_client().get(format!("{base}/auth/callback")).send().await.unwrap();
    assert_eq!(location(&resp), "/login?error=missing_code");

    let resp = bare_client()
        .get(format!("{base}/auth/callback?error=access_denied&error_description=link%20expired"))
        .send()
        .await
        .unwrap();
    let loc = location(&resp);
    assert!(loc.starts_with("/login?error=oauth_error"));
    assert!(loc.contains("link%20expired"));

    let resp = bare_client()
        .get(format!("{base}/auth/callback?code=never-registered"))
        .send()
        .await
        .unwrap();
    assert!(location(&resp).starts_with("/login?error=auth_error"));
}

#[tokio::test]
async fn validate_admin_checks_the_list_and_rejects_bad_payloads() {
    let (base, _provider, _settings) = start_server(&["admin@x.com"]).await;
    let client = bare_client();

    let resp = client
        .post(format!("{base}/auth/validate-admin"))
        .json(&serde_json::json!({"email": "Admin@X.com "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["isAdmin"], true);

    let resp = client
        .post(format!("{base}/auth/validate-admin"))
        .json(&serde_json::json!({"email": "guest@x.com"}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["isAdmin"], false);

    // Non-string email is a 400, not a type-coerced lookup
    let resp = client
        .post(format!("{base}/auth/validate-admin"))
        .json(&serde_json::json!({"email": 42}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["isAdmin"], false);

    let resp = client
        .post(format!("{base}/auth/validate-admin"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn auth_user_reports_each_decision() {
    let (base, provider, _settings) = start_server(&["admin@x.com"]).await;
    let client = bare_client();

    let resp = client.get(format!("{base}/auth/user")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["isAuthenticated"], false);
    assert!(body["user"].is_null());

    let (cookie, _token) = session_cookie_header(&provider, user("u1", "admin@x.com"));
    let resp = client
        .get(format!("{base}/auth/user"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["isAdmin"], true);
    assert_eq!(body["user"]["email"], "admin@x.com");
    assert_eq!(body["user"]["isAdmin"], true);

    let (cookie, token) = session_cookie_header(&provider, user("u2", "guest@x.com"));
    let resp = client
        .get(format!("{base}/auth/user"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert!(!provider.token_is_live(&token));
}

#[tokio::test]
async fn logout_revokes_the_session_and_clears_cookies() {
    let (base, provider, _settings) = start_server(&["admin@x.com"]).await;
    let (cookie, token) = session_cookie_header(&provider, user("u1", "admin@x.com"));

    let resp = bare_client()
        .post(format!("{base}/auth/logout"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!provider.token_is_live(&token));
    let cookies = set_cookies(&resp);
    assert!(cookies.iter().any(|c| c.starts_with("panel_session=deleted")));
    assert!(cookies.iter().any(|c| c.starts_with("panel_admin=deleted")));

    // Without a session there is nothing to invalidate; still a clean 200
    let resp = bare_client().post(format!("{base}/auth/logout")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn settings_api_is_admin_gated_and_roundtrips() {
    let (base, provider, settings) = start_server(&["admin@x.com"]).await;
    settings.seed(&[("site_name", "Panel")]);
    let client = bare_client();

    let resp = client.get(format!("{base}/api/settings")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let (guest_cookie, guest_token) = session_cookie_header(&provider, user("u2", "guest@x.com"));
    let resp = client
        .get(format!("{base}/api/settings"))
        .header("cookie", guest_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert!(!provider.token_is_live(&guest_token));

    let (cookie, _token) = session_cookie_header(&provider, user("u1", "admin@x.com"));
    let resp = client
        .post(format!("{base}/api/settings"))
        .header("cookie", cookie.clone())
        .json(&vec![
            Setting { name: "site_name".into(), value: "Admin Panel".into() },
            Setting { name: "session_timeout".into(), value: "30".into() },
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/api/settings"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let rows: Vec<Setting> = resp.json().await.unwrap();
    assert!(rows.contains(&Setting { name: "site_name".into(), value: "Admin Panel".into() }));
    assert!(rows.contains(&Setting { name: "session_timeout".into(), value: "30".into() }));
}
