//! Authentication-adjacent state.
//!
//! Credential issuance and verification live outside this crate; what lives
//! here is the request principal carried through extensions and the negative
//! cache of revoked credentials.

mod revocation;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub use revocation::RevocationSet;

/// Authenticated caller, inserted into request extensions by the routing
/// layer after credential verification.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Serialize)]
struct AuthErrorBody {
    error: AuthErrorMessage,
}

#[derive(Debug, Serialize)]
struct AuthErrorMessage {
    code: &'static str,
    message: &'static str,
}

/// Structured authentication denial.
#[derive(Debug)]
pub enum AuthError {
    /// The credential is syntactically valid but has been revoked.
    Revoked,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Revoked => (
                StatusCode::UNAUTHORIZED,
                Json(AuthErrorBody {
                    error: AuthErrorMessage {
                        code: "revoked",
                        message: "credential has been revoked",
                    },
                }),
            )
                .into_response(),
        }
    }
}
