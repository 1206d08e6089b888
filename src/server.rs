//!
//! panelgate HTTP server
//! ---------------------
//! Axum-based HTTP surface for the admin panel: gate middleware over the page
//! routes, auth API routes relaying the hosted identity provider, and the
//! admin-gated settings API.
//!
//! Responsibilities:
//! - Per-request authorization gate ahead of every page response.
//! - OAuth/magic-link callback exchange with same-request admin enforcement.
//! - Session relay via cookies; sign-out and cookie clearing.
//! - Settings bulk read/upsert endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::identity::{
    self, AuthProvider, AuthzDecision, GateAction, Principal, ProviderUser, RestAuthProvider,
    RoutePolicy, SignOutScope,
};
use crate::settings::{RestSettingsStore, Setting, SettingsStore};

const ACCESS_DENIED_PANEL: &str = "Access denied. Admin privileges required for this panel.";
const ACCESS_DENIED_CALLBACK: &str =
    "Access denied. This panel is restricted to authorized administrators only.";

/// Shared server state injected into all handlers.
///
/// Holds the immutable process configuration (allow-list included), the
/// provider client, the settings store and the route policy the gate applies.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<AppConfig>,
    pub provider: Arc<dyn AuthProvider>,
    pub settings: Arc<dyn SettingsStore>,
    pub policy: Arc<RoutePolicy>,
}

/// Start the panelgate HTTP server from environment configuration.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(AppConfig::from_env()?).await
}

pub async fn run_with_config(cfg: AppConfig) -> anyhow::Result<()> {
    if cfg.admins.is_empty() {
        warn!("ALLOWED_ADMIN_EMAILS is empty; every sign-in will be rejected");
    } else {
        info!("admin allow-list loaded with {} entries", cfg.admins.len());
    }
    let provider: Arc<dyn AuthProvider> =
        Arc::new(RestAuthProvider::new(&cfg.provider_url, &cfg.provider_key)?);
    let settings: Arc<dyn SettingsStore> =
        Arc::new(RestSettingsStore::new(&cfg.settings_url, &cfg.provider_key));
    let http_port = cfg.http_port;
    let state = AppState {
        cfg: Arc::new(cfg),
        provider,
        settings,
        policy: Arc::new(RoutePolicy::default()),
    };

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting panelgate on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Mount all routes. Page routes run behind the gate middleware; API routes
/// sit outside it and perform their own per-request checks.
pub fn router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/", get(root))
        .route("/login", get(login_page))
        .route("/dashboard", get(dashboard_page))
        .route("/users", get(users_page))
        .route("/settings", get(settings_page))
        .layer(middleware::from_fn_with_state(state.clone(), gate_middleware));

    let api = Router::new()
        .route("/auth/callback", get(auth_callback))
        .route("/auth/logout", post(auth_logout))
        .route("/auth/user", get(auth_user))
        .route("/auth/validate-admin", post(validate_admin))
        .route("/api/settings", get(settings_get).post(settings_put));

    pages.merge(api).with_state(state)
}

/// Resolve the provider user behind the session cookie. Any provider failure
/// resolves to no user (fail closed, never fail open).
async fn current_provider_user(state: &AppState, headers: &HeaderMap) -> Option<ProviderUser> {
    let session = identity::session_from_headers(headers)?;
    match state.provider.get_user(&session.access_token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("provider user lookup failed, treating request as anonymous: {e}");
            None
        }
    }
}

async fn invalidate_session(state: &AppState, headers: &HeaderMap, scope: SignOutScope) {
    if let Some(session) = identity::session_from_headers(headers) {
        if let Err(e) = state.provider.sign_out(&session.access_token, scope).await {
            warn!("provider sign-out failed: {e}");
        }
    }
}

fn append_clear_cookies(headers: &mut HeaderMap, secure: bool) {
    headers.append(SET_COOKIE, identity::clear_session_cookie(secure));
    headers.append(SET_COOKIE, identity::clear_ui_flag_cookie(secure));
}

/// Surface an error as a login redirect with a reason code and, when there is
/// one, a human-readable message.
fn login_redirect(err: &AppError) -> Response {
    let (reason, message) = err.redirect_fields();
    let url = if message.is_empty() {
        format!("/login?error={}", reason)
    } else {
        format!("/login?error={}&message={}", reason, urlencoding::encode(&message))
    };
    Redirect::to(&url).into_response()
}

/// Request-level interception for the page routes: decide
/// Anonymous/NonAdmin/Admin before any protected body is produced, and
/// re-derive admin status from the allow-list on every request.
async fn gate_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();
    let user = current_provider_user(&state, &headers).await;
    let (decision, principal) = identity::evaluate(&state.cfg.admins, user.as_ref());

    match state.policy.decide(&path, decision) {
        GateAction::Allow => next.run(request).await,
        GateAction::RedirectToLogin { next: wanted } => Redirect::to(&format!(
            "{}?redirect={}",
            state.policy.login_path,
            urlencoding::encode(&wanted)
        ))
        .into_response(),
        GateAction::RedirectToLanding => Redirect::to(&state.policy.landing_path).into_response(),
        GateAction::InvalidateAndRedirect => {
            let email = principal
                .and_then(|p| p.email)
                .map(|e| e.trim().to_lowercase())
                .unwrap_or_default();
            warn!("non-admin session rejected on {}: {}", path, email);
            invalidate_session(&state, &headers, SignOutScope::Local).await;
            let mut resp =
                login_redirect(&AppError::unauthorized("unauthorized", ACCESS_DENIED_PANEL));
            append_clear_cookies(resp.headers_mut(), state.cfg.secure_cookies);
            resp
        }
    }
}

async fn root() -> impl IntoResponse {
    "panelgate ok"
}

#[derive(Debug, Deserialize)]
struct LoginPageQuery {
    error: Option<String>,
    message: Option<String>,
    redirect: Option<String>,
}

// Page bodies are deliberately minimal; the panel chrome is out of scope.
async fn login_page(Query(q): Query<LoginPageQuery>) -> impl IntoResponse {
    Json(json!({
        "page": "login",
        "error": q.error,
        "message": q.message,
        "redirect": q.redirect,
    }))
}

async fn dashboard_page() -> impl IntoResponse {
    Json(json!({"page": "dashboard"}))
}

async fn users_page() -> impl IntoResponse {
    Json(json!({"page": "users"}))
}

async fn settings_page() -> impl IntoResponse {
    Json(json!({"page": "settings"}))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    next: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Only relative targets are honored; anything else lands on the default page.
fn sanitize_next(next: Option<&str>, landing: &str) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => landing.to_string(),
    }
}

/// OAuth/magic-link callback: exchange the code, then re-run the gate before
/// any durable cookie is set. A non-admin principal is torn down in the same
/// request; there is no window where a non-admin cookie exists.
async fn auth_callback(State(state): State<AppState>, Query(q): Query<CallbackQuery>) -> Response {
    if let Some(err) = q.error {
        let description = q.error_description.unwrap_or_default();
        error!("oauth error on callback: {} {}", err, description);
        let msg = if description.is_empty() { err } else { description };
        return Redirect::to(&format!(
            "/login?error=oauth_error&message={}",
            urlencoding::encode(&msg)
        ))
        .into_response();
    }

    let Some(code) = q.code else {
        error!("auth callback missing code parameter");
        return login_redirect(&AppError::missing_credential("missing_code", ""));
    };

    let session = match state.provider.exchange_code(&code).await {
        Ok(s) => s,
        Err(e) => {
            error!("code exchange failed: {e}");
            return login_redirect(&AppError::provider("auth_error", e.to_string().as_str()));
        }
    };

    let Some(email) = session.user.email.clone().filter(|e| !e.trim().is_empty()) else {
        error!("no user email found after code exchange");
        return login_redirect(&AppError::no_session("no_session", ""));
    };
    let email = email.trim().to_lowercase();

    let (decision, _) = identity::evaluate(&state.cfg.admins, Some(&session.user));
    if decision != AuthzDecision::Admin {
        warn!("unauthorized admin panel access attempt by: {}", email);
        if let Err(e) = state.provider.sign_out(&session.access_token, SignOutScope::Local).await {
            warn!("sign-out of unauthorized session failed: {e}");
        }
        let mut resp =
            login_redirect(&AppError::unauthorized("unauthorized", ACCESS_DENIED_CALLBACK));
        append_clear_cookies(resp.headers_mut(), state.cfg.secure_cookies);
        return resp;
    }

    let target = sanitize_next(q.next.as_deref(), &state.policy.landing_path);
    let mut resp = Redirect::to(&target).into_response();
    resp.headers_mut()
        .append(SET_COOKIE, identity::set_session_cookie(&session, state.cfg.secure_cookies));
    resp.headers_mut()
        .append(SET_COOKIE, identity::set_ui_flag_cookie(state.cfg.secure_cookies));
    info!("successful admin panel login: {}", email);
    resp
}

async fn auth_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session) = identity::session_from_headers(&headers) {
        if let Err(e) = state.provider.sign_out(&session.access_token, SignOutScope::Global).await {
            error!("sign-out failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to sign out", "details": e.to_string()})),
            )
                .into_response();
        }
        info!("user signed out");
    }
    let mut resp =
        (StatusCode::OK, Json(json!({"message": "Successfully signed out"}))).into_response();
    append_clear_cookies(resp.headers_mut(), state.cfg.secure_cookies);
    resp
}

fn anonymous_user_body() -> Json<serde_json::Value> {
    Json(json!({"user": null, "isAuthenticated": false, "isAdmin": false}))
}

async fn auth_user(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(session) = identity::session_from_headers(&headers) else {
        return (StatusCode::OK, anonymous_user_body()).into_response();
    };

    let user = match state.provider.get_user(&session.access_token).await {
        Ok(u) => u,
        Err(e) => {
            error!("user lookup failed: {e}");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Failed to get user", "details": e.to_string()})),
            )
                .into_response();
        }
    };

    match identity::evaluate(&state.cfg.admins, user.as_ref()) {
        (AuthzDecision::Admin, Some(p)) => (
            StatusCode::OK,
            Json(json!({
                "user": {
                    "id": p.id,
                    "email": p.email,
                    "created_at": p.created_at,
                    "last_sign_in_at": p.last_sign_in_at,
                    "isAdmin": true,
                },
                "isAuthenticated": true,
                "isAdmin": true,
            })),
        )
            .into_response(),
        (AuthzDecision::NonAdmin, Some(p)) => {
            let email = p.email.map(|e| e.trim().to_lowercase()).unwrap_or_default();
            warn!("unauthorized access attempt by: {}", email);
            invalidate_session(&state, &headers, SignOutScope::Global).await;
            let mut resp = (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "user": null,
                    "isAuthenticated": false,
                    "isAdmin": false,
                    "error": "Access denied. Admin privileges required.",
                })),
            )
                .into_response();
            append_clear_cookies(resp.headers_mut(), state.cfg.secure_cookies);
            resp
        }
        _ => (StatusCode::OK, anonymous_user_body()).into_response(),
    }
}

/// Allow-list membership check for clients. The list itself is never exposed;
/// only the boolean leaves the server.
async fn validate_admin(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let Some(email) = payload.get("email").and_then(|v| v.as_str()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Email is required", "isAdmin": false})),
        )
            .into_response();
    };
    let is_admin = state.cfg.admins.is_admin(Some(email));
    if is_admin {
        info!("admin validation successful for: {}", email);
    } else {
        warn!("admin validation failed for: {}", email);
    }
    (StatusCode::OK, Json(json!({"isAdmin": is_admin}))).into_response()
}

/// Same per-request check the gate runs; the settings API sits outside the
/// page middleware. A non-admin session is torn down here as well.
async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Principal, Response> {
    let Some(session) = identity::session_from_headers(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Authentication required"})),
        )
            .into_response());
    };
    let user = match state.provider.get_user(&session.access_token).await {
        Ok(u) => u,
        Err(e) => {
            warn!("provider user lookup failed on settings route: {e}");
            None
        }
    };
    match identity::evaluate(&state.cfg.admins, user.as_ref()) {
        (AuthzDecision::Admin, Some(p)) => Ok(p),
        (AuthzDecision::NonAdmin, Some(p)) => {
            let email = p.email.map(|e| e.trim().to_lowercase()).unwrap_or_default();
            warn!("non-admin settings access rejected: {}", email);
            invalidate_session(state, headers, SignOutScope::Local).await;
            let mut resp = (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "Access denied. Admin privileges required."})),
            )
                .into_response();
            append_clear_cookies(resp.headers_mut(), state.cfg.secure_cookies);
            Err(resp)
        }
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Authentication required"})),
        )
            .into_response()),
    }
}

async fn settings_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.settings.fetch_all().await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => {
            error!("settings read failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load settings"})),
            )
                .into_response()
        }
    }
}

async fn settings_put(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Setting>>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.settings.upsert_all(&rows).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"message": "Settings saved", "count": rows.len()})),
        )
            .into_response(),
        Err(e) => {
            error!("settings upsert failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to save settings"})),
            )
                .into_response()
        }
    }
}
