//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the HTTP handlers,
//! the gate middleware and the panel client, along with mappers to JSON
//! status codes and login-redirect reason codes.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    MissingCredential { code: String, message: String },
    Provider { code: String, message: String },
    NoSession { code: String, message: String },
    Unauthorized { code: String, message: String },
    UserInput { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::MissingCredential { code, .. }
            | AppError::Provider { code, .. }
            | AppError::NoSession { code, .. }
            | AppError::Unauthorized { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::MissingCredential { message, .. }
            | AppError::Provider { message, .. }
            | AppError::NoSession { message, .. }
            | AppError::Unauthorized { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn missing_credential<S: Into<String>>(code: S, msg: S) -> Self { AppError::MissingCredential { code: code.into(), message: msg.into() } }
    pub fn provider<S: Into<String>>(code: S, msg: S) -> Self { AppError::Provider { code: code.into(), message: msg.into() } }
    pub fn no_session<S: Into<String>>(code: S, msg: S) -> Self { AppError::NoSession { code: code.into(), message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code for JSON routes.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::MissingCredential { .. } => 400,
            AppError::Provider { .. } => 502,
            AppError::NoSession { .. } => 401,
            AppError::Unauthorized { .. } => 403,
            AppError::UserInput { .. } => 400,
            AppError::Internal { .. } => 500,
        }
    }

    /// Login-redirect mapping: return (reason code, human-readable message).
    /// The reason lands in the `error` query parameter, the message in
    /// `message`; raw internals never ride along.
    pub fn redirect_fields(&self) -> (&'static str, String) {
        let msg = self.message().to_string();
        match self {
            AppError::MissingCredential { .. } => ("missing_code", msg),
            AppError::Provider { .. } => ("auth_error", msg),
            AppError::NoSession { .. } => ("no_session", msg),
            AppError::Unauthorized { .. } => ("unauthorized", msg),
            AppError::UserInput { .. } => ("invalid_request", msg),
            AppError::Internal { .. } => ("unexpected", msg),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        AppError::Internal { code: "unexpected".into(), message: err.to_string() }
    }
}
