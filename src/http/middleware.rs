//! Authentication middleware: API keys, Supabase JWTs and the cron secret

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error};
use uuid::Uuid;

use crate::app::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const SESSION_COOKIE: &str = "sb-access-token";

/// JWT claims from Supabase auth token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    #[serde(default)]
    pub aud: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Verify an HS256 token and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }

    let header_b64 = parts[0];
    let payload_b64 = parts[1];
    let signature_b64 = parts[2];

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{}.{}", header_b64, payload_b64).as_bytes());

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: JwtClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    if claims.exp < Utc::now().timestamp() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Extract the token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Hex SHA-256, the form API keys are stored in
pub fn hash_api_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.trim().as_bytes()))
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Invalid cron secret")]
    InvalidCronSecret,

    #[error("Credential lookup failed: {0}")]
    Lookup(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Lookup(msg) => {
                error!(error = %msg, "API key lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        };
        let message = match &self {
            AuthError::Lookup(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    ApiKey,
    Bearer,
    Cookie,
}

/// Tenant resolved for the request, placed in request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub source: AuthSource,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
    if let Some(raw_key) = header_str(headers, API_KEY_HEADER) {
        let key = state
            .credentials
            .find_api_key(&hash_api_key(raw_key))
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?
            .ok_or(AuthError::InvalidApiKey)?;
        debug!(key_id = %key.id, "Authenticated with API key");
        return Ok(AuthenticatedUser {
            user_id: key.user_id,
            source: AuthSource::ApiKey,
        });
    }

    let secret = &state.config.supabase_jwt_secret;
    if let Some(token) = header_str(headers, header::AUTHORIZATION.as_str()).and_then(extract_bearer_token) {
        let claims = verify_jwt(token, secret)?;
        return Ok(AuthenticatedUser {
            user_id: claims.sub,
            source: AuthSource::Bearer,
        });
    }

    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let claims = verify_jwt(cookie.value(), secret)?;
        return Ok(AuthenticatedUser {
            user_id: claims.sub,
            source: AuthSource::Cookie,
        });
    }

    Err(AuthError::MissingCredentials)
}

/// Middleware to require a tenant
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = authenticate(&state, request.headers()).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Middleware for scheduler-only routes
pub async fn require_cron(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = header_str(request.headers(), header::AUTHORIZATION.as_str())
        .and_then(extract_bearer_token)
        .ok_or(AuthError::MissingCredentials)?;
    if !cron_secret_matches(token, &state.config.cron_secret) {
        return Err(AuthError::InvalidCronSecret);
    }
    Ok(next.run(request).await)
}

/// Constant-time check: both sides are MACed under the secret and compared with `verify_slice`
fn cron_secret_matches(presented: &str, secret: &str) -> bool {
    let tag = |message: &str| {
        HmacSha256::new_from_slice(secret.as_bytes()).map(|mut mac| {
            mac.update(message.as_bytes());
            mac
        })
    };
    let (Ok(expected), Ok(provided)) = (tag(secret), tag(presented)) else {
        return false;
    };
    provided
        .verify_slice(&expected.finalize().into_bytes())
        .is_ok()
}
