use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64ct::{Base64, Encoding};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Guard for super-admin routes: HTTP Basic credentials matching config.
pub struct SuperAdmin;

/// Splits a `Basic <base64(login:password)>` header value.
pub(crate) fn parse_basic(value: &str) -> Option<(String, String)> {
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = Base64::decode_vec(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_string(), password.to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for SuperAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let Some((login, password)) = parse_basic(auth) else {
            warn!("malformed basic auth header");
            return Err(ApiError::Unauthorized);
        };

        let expected = &state.config.super_admin;
        if login != expected.login || password != expected.password {
            warn!(%login, "super admin credentials rejected");
            return Err(ApiError::Unauthorized);
        }
        Ok(SuperAdmin)
    }
}
