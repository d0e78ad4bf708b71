use crate::error::{AppError, AppResult};
use crate::handlers::complaint::parse_status;
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::{map::MapView, AuthService, MapService};
use crate::state::AppState;
use axum::{extract::Query, response::IntoResponse, Extension};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct MapQuery {
    pub status: Option<String>,
    /// NGOs only: limit complaint markers to this radius around the NGO
    pub radius_km: Option<f64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/map/markers",
    security(("jwt_token" = [])),
    params(MapQuery),
    responses(
        (status = 200, description = "Markers and default view for the caller", body = MapView),
        (status = 400, description = "Unknown status or bad radius", body = AppError),
    ),
    tag = "map"
)]
pub async fn map_markers(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
    Query(query): Query<MapQuery>,
) -> AppResult<impl IntoResponse> {
    let status = parse_status(query.status.as_deref())?;
    if query.radius_km.is_some_and(|r| !r.is_finite() || r < 0.0) {
        return Err(AppError::Validation(
            "radius_km must be a non-negative number".to_string(),
        ));
    }

    let viewer = AuthService::new(&state)
        .current_user(auth_user.user_id)
        .await?;
    let view = MapService::new(&state)
        .markers(&viewer, status, query.radius_km)
        .await?;
    Ok(ApiResponse::ok(view))
}
