//! Central identity handling for panelgate: principal model, provider client,
//! session cookie relay, the per-request authorization gate and the client
//! auth-state broadcaster. Keep the public surface thin and split
//! implementation across sub-modules.

mod broadcaster;
mod gate;
mod principal;
mod provider;
mod session;

pub use broadcaster::{AuthBroadcaster, AuthSnapshot, Published};
pub use gate::{evaluate, AuthzDecision, GateAction, RoutePolicy, AUTH_ROUTES, PROTECTED_ROUTES};
pub use principal::Principal;
pub use provider::{
    AuthProvider, ProviderError, ProviderSession, ProviderUser, RestAuthProvider, SignOutScope,
    StaticAuthProvider,
};
pub use session::{
    clear_session_cookie, clear_ui_flag_cookie, decode_session, encode_session, parse_cookie,
    session_from_headers, set_session_cookie, set_ui_flag_cookie, SESSION_COOKIE,
    SESSION_MAX_AGE_SECS, UI_FLAG_COOKIE,
};
