use crate::backend::AuthSession;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{Role, UserModel};
use crate::response::ApiResponse;
use crate::services::auth::{AuthService, LoginRequest, SignupRequest};
use crate::state::AppState;
use crate::utils::cookie::{clear_session_cookie, session_cookie};
use anyhow::anyhow;
use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// NGOs only
    pub operation_area: Option<String>,
}

impl From<UserModel> for UserResponse {
    fn from(user: UserModel) -> Self {
        Self {
            role: user.role(),
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            latitude: user.latitude,
            longitude: user.longitude,
            operation_area: user.operation_area,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Bearer token for subsequent requests
    pub token: String,
    /// Seconds until the token expires
    pub expires_in: u64,
    pub user: UserResponse,
}

fn session_response(user: UserModel, session: AuthSession) -> AppResult<Response> {
    let cookie = session_cookie(&session.access_token, session.expires_in);
    let body = SessionResponse {
        token: session.access_token,
        expires_in: session.expires_in,
        user: UserResponse::from(user),
    };

    let mut response = ApiResponse::ok(body).into_response();
    let value = HeaderValue::from_str(&cookie)
        .map_err(|e| AppError::Internal(anyhow!("Invalid session cookie: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account and profile created", body = SessionResponse),
        (status = 400, description = "Invalid form fields", body = AppError),
        (status = 409, description = "Email already registered", body = AppError),
    ),
    tag = "auth"
)]
pub async fn signup(
    Extension(state): Extension<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<Response> {
    let (user, session) = AuthService::new(&state).signup(payload).await?;
    session_response(user, session)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionResponse),
        (status = 400, description = "Invalid form fields", body = AppError),
        (status = 401, description = "Wrong email, password or role", body = AppError),
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(state): Extension<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Response> {
    let (user, session) = AuthService::new(&state).login(payload).await?;
    session_response(user, session)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Session ended"),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
) -> AppResult<Response> {
    AuthService::new(&state)
        .logout(&auth_user.access_token)
        .await?;

    let mut response =
        ApiResponse::with_message((), "Logged out".to_string()).into_response();
    let value = HeaderValue::from_str(&clear_session_cookie())
        .map_err(|e| AppError::Internal(anyhow!("Invalid session cookie: {}", e)))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    security(("jwt_token" = [])),
    responses(
        (status = 200, description = "Current profile", body = UserResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn me(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let user = AuthService::new(&state)
        .current_user(auth_user.user_id)
        .await?;
    Ok(ApiResponse::ok(UserResponse::from(user)))
}
