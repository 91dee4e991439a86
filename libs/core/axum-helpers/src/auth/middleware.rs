use super::jwt::{JwtAuth, TokenError};
use crate::errors::AppError;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid bearer token with 401.
///
/// On success the verified [`JwtClaims`](super::JwtClaims) are inserted into
/// request extensions for `Extension<JwtClaims>` extractors.
pub async fn jwt_auth_middleware(
    State(auth): State<JwtAuth>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(request.headers()) else {
        tracing::debug!("No bearer token on request");
        return Err(AppError::Unauthorized("Authentication required".to_string()));
    };

    let claims = auth.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        match e {
            TokenError::Expired => AppError::TokenExpired,
            _ => AppError::Unauthorized("Invalid token".to_string()),
        }
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
