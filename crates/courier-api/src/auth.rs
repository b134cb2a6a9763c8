//! # Authentication Middleware
//!
//! Bearer token middleware that turns the `Authorization` header into a
//! [`Caller`] (user id + role) for the lifecycle service.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}   e.g. supplier:42:s3cret
//! Bearer {secret}                    operator identity (super_admin, no user)
//! ```
//!
//! `user_id` may be empty only for `super_admin`. Every authenticated request
//! gets its [`Caller`] inserted into the request extensions; handlers pull it
//! out with the [`Authenticated`] extractor.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use courier_core::{Caller, Role, UserId};

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Extractor ───────────────────────────────────────────────────────────────

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authenticated(pub Caller);

/// Extracts the caller the auth middleware injected into extensions.
/// Returns 401 if none is present.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .copied()
            .map(Authenticated)
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Return 403 unless the caller is a super admin.
pub fn require_super_admin(caller: &Caller) -> Result<(), AppError> {
    if caller.is_super_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            Role::SuperAdmin,
            caller.role
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of two secrets. A length mismatch still performs
/// one comparison so the timing does not depend on where the inputs differ.
pub(crate) fn constant_time_eq(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token in the format `{role}:{user_id}:{secret}` or `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<Caller, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.as_slice() {
        [secret] => {
            if constant_time_eq(secret.as_bytes(), expected_secret.as_bytes()) {
                Ok(Caller::operator())
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, user, secret] => {
            if !constant_time_eq(secret.as_bytes(), expected_secret.as_bytes()) {
                return Err("invalid bearer token".into());
            }
            let role: Role = role.parse().map_err(|e| format!("{e}"))?;

            if user.is_empty() {
                return match role {
                    Role::SuperAdmin => Ok(Caller::operator()),
                    other => Err(format!("role '{other}' requires a user id")),
                };
            }
            let user_id = user
                .parse::<i64>()
                .map_err(|e| format!("invalid user_id: {e}"))
                .and_then(|raw| UserId::new(raw).map_err(|e| format!("invalid user_id: {e}")))?;

            Ok(Caller::new(user_id, role))
        }
        _ => Err("invalid token format: expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject the resulting [`Caller`].
///
/// When `AuthConfig.token` is `None`, every request runs as the operator
/// identity (auth disabled / development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(header_value) if header_value.starts_with("Bearer ") => {
                    let provided = &header_value[7..];
                    match parse_bearer_token(provided, expected) {
                        Ok(caller) => {
                            request.extensions_mut().insert(caller);
                            next.run(request).await
                        }
                        Err(msg) => {
                            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                            unauthorized_response(&msg)
                        }
                    }
                }
                Some(_) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request.extensions_mut().insert(Caller::operator());
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
