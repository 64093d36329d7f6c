//! Cookie-based session check.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{validate_token, TokenKind};
use crate::config::Config;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    error: &'static str,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            status: StatusCode::UNAUTHORIZED.as_u16(),
            error: "user unauthorized",
        }),
    )
        .into_response()
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Reject requests without a valid access token cookie; otherwise expose the
/// claims to handlers as an extension.
pub async fn require_session(
    State(config): State<Arc<Config>>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = cookie_value(req.headers(), shared::ACCESS_TOKEN_COOKIE)
        .filter(|token| !token.is_empty())
        .and_then(|token| validate_token(token, &config.jwt_secret))
        .filter(|claims| claims.kind == TokenKind::Access);

    match claims {
        Some(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        None => unauthorized(),
    }
}
