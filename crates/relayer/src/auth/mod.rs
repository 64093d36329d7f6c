//! Session tokens and the cookie check guarding user-facing routes.

mod middleware;

pub use middleware::require_session;

use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Which half of a session a token represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

/// Access and refresh token pair.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Create a signed token.
pub fn create_token(
    user_id: i64,
    email: &str,
    kind: TokenKind,
    secret: &str,
    ttl_secs: u64,
) -> Result<String> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs() as i64;
    let claims = Claims {
        user_id,
        email: email.to_string(),
        kind,
        exp: now + ttl_secs as i64,
        iat: now,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Validate signature and expiry. `None` for any invalid token.
pub fn validate_token(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .ok()
}

/// Issue both tokens with the configured lifetimes.
pub fn issue_session(user_id: i64, email: &str, config: &Config) -> Result<SessionTokens> {
    Ok(SessionTokens {
        access_token: create_token(
            user_id,
            email,
            TokenKind::Access,
            &config.jwt_secret,
            config.access_token_ttl_secs,
        )?,
        refresh_token: create_token(
            user_id,
            email,
            TokenKind::Refresh,
            &config.jwt_secret,
            config.refresh_token_ttl_secs,
        )?,
    })
}
