use crate::{
    error::{AppError, AppResult},
    models::Role,
    state::AppState,
    utils::cookie::{read_cookie, SESSION_COOKIE},
};
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
    Extension,
};
use uuid::Uuid;

/// The signed-in user behind a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    /// The token the request was made with, needed to sign it out.
    pub access_token: String,
}

impl AuthUser {
    pub fn require_role(&self, role: Role) -> AppResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Resolves the session token to a profile and stores [`AuthUser`] in the
/// request extensions.
pub async fn auth_middleware(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Prefer Authorization: Bearer, fall back to the session cookie.
    let token = bearer_token(&headers)
        .or_else(|| read_cookie(&headers, SESSION_COOKIE))
        .ok_or(AppError::Unauthorized)?;

    let identity = state.auth.session(&token).await?;
    let profile = state
        .store
        .find_profile(identity.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(AuthUser {
        user_id: profile.id,
        role: profile.role(),
        access_token: token,
    });

    Ok(next.run(request).await)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?
        .strip_prefix("Bearer ")?
        .trim();

    (!token.is_empty()).then(|| token.to_string())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
