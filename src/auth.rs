use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    repository::RepositoryState,
};

/// Development-only header naming the acting user id directly.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of a session token. Signed with the configured session secret and checked
/// on every authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id, as a decimal string.
    pub sub: String,
    /// Expiration time (seconds since the epoch). Always validated.
    pub exp: usize,
    /// Issued at (seconds since the epoch).
    pub iat: usize,
}

/// Identity
///
/// The authenticated actor of one request. Produced by the session resolver,
/// immutable for the rest of the request and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: i32,
    pub role_id: i32,
}

/// issue_session_token
///
/// Signs a session token for `user_id`, valid for the configured TTL.
///
/// No route issues tokens. In deployment they come from an external issuer that
/// shares `SESSION_SECRET`; this function produces the same claims for tooling and
/// tests.
pub fn issue_session_token(config: &AppConfig, user_id: i32) -> Result<String, AppError> {
    let now = usize::try_from(Utc::now().timestamp())
        .map_err(|_| AppError::unexpected("system clock is before the unix epoch"))?;
    let ttl = usize::try_from(config.session_ttl_secs)
        .map_err(|_| AppError::unexpected("session TTL does not fit in usize"))?;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now.saturating_add(ttl),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.session_secret.as_bytes()),
    )
    .map_err(|e| AppError::unexpected(format!("failed to sign session token: {e}")))
}

/// resolve_session
///
/// The session resolver. Turns request credentials into an [`Identity`]:
///
/// 1. Local bypass: in `Env::Local` only, an `x-user-id` header naming an existing
///    user is accepted as is.
/// 2. Token extraction: `Authorization: Bearer <token>`.
/// 3. Token validation: signature and expiry.
/// 4. Persistence check: the subject must still exist, so deleted users lose access
///    immediately.
///
/// Missing or invalid credentials fail with `Unauthenticated`. A persistence failure
/// is not a credential problem and propagates as an unexpected error.
pub async fn resolve_session(
    headers: &HeaderMap,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<Identity, AppError> {
    if config.env == Env::Local {
        let bypass_id = headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i32>().ok());

        if let Some(user_id) = bypass_id {
            if let Some(user) = repo.find_user(user_id).await? {
                tracing::debug!(user_id, "session resolved through local bypass header");
                return Ok(Identity {
                    id: user.id,
                    role_id: user.role_id,
                });
            }
        }
        // Otherwise fall through to the regular token flow.
    }

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            tracing::debug!("missing bearer token");
            AppError::Unauthenticated
        })?;

    let decoding_key = DecodingKey::from_secret(config.session_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
            other => tracing::debug!(reason = ?other, "session token rejected"),
        }
        AppError::Unauthenticated
    })?;

    let user_id = token_data.claims.sub.parse::<i32>().map_err(|_| {
        tracing::debug!("session token subject is not a user id");
        AppError::Unauthenticated
    })?;

    let user = repo.find_user(user_id).await?.ok_or_else(|| {
        tracing::debug!(user_id, "session token names a user that no longer exists");
        AppError::Unauthenticated
    })?;

    Ok(Identity {
        id: user.id,
        role_id: user.role_id,
    })
}

/// Identity Extractor
///
/// Declaring an `Identity` argument makes a handler auth-required: the session is
/// resolved before any other argument is extracted, and a failure short-circuits
/// into the error translator.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        resolve_session(&parts.headers, &repo, &config).await
    }
}
