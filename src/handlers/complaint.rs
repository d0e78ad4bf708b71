use crate::backend::ComplaintFilter;
use crate::error::{AppError, AppResult};
use crate::handlers::upload::{multipart_error, read_image};
use crate::middleware::AuthUser;
use crate::models::{Complaint, ComplaintStatus, Role};
use crate::response::{ApiResponse, PaginatedResponse};
use crate::services::complaint::{ComplaintService, ComplaintSubmission, NearbyComplaint};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query},
    response::IntoResponse,
    Extension,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// Multipart body for filing a complaint.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ComplaintForm {
    description: String,
    latitude: f64,
    longitude: f64,
    /// Optional photo: JPG, PNG or WebP, at most 5MB
    #[schema(value_type = Option<String>, format = Binary)]
    image: Option<Vec<u8>>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ComplaintListQuery {
    /// `Reported`, `Active` or `Completed`
    pub status: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct NearbyQuery {
    /// Defaults to the configured radius (10 km)
    pub radius_km: Option<f64>,
    pub status: Option<String>,
}

pub(crate) fn parse_status(raw: Option<&str>) -> AppResult<Option<ComplaintStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Unknown status '{}'", raw))),
        None => Ok(None),
    }
}

impl ComplaintListQuery {
    fn into_filter(self) -> AppResult<(ComplaintFilter, u64, u64)> {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let filter = ComplaintFilter::all()
            .with_status(parse_status(self.status.as_deref())?)
            .paged(page, per_page);
        Ok((filter, page, per_page))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/complaints",
    security(("jwt_token" = [])),
    request_body(content_type = "multipart/form-data", content = ComplaintForm),
    responses(
        (status = 200, description = "Complaint filed", body = Complaint),
        (status = 400, description = "Invalid form fields", body = AppError),
        (status = 403, description = "Only citizens can file complaints", body = AppError),
        (status = 413, description = "Image larger than 5MB", body = AppError),
        (status = 502, description = "Image upload failed", body = AppError),
    ),
    tag = "complaints"
)]
pub async fn submit_complaint(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    auth_user.require_role(Role::Citizen)?;

    let mut submission = ComplaintSubmission::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => submission.image = read_image(field).await?,
            "description" => {
                submission.description = Some(field.text().await.map_err(multipart_error)?)
            }
            "latitude" => submission.latitude = Some(field.text().await.map_err(multipart_error)?),
            "longitude" => {
                submission.longitude = Some(field.text().await.map_err(multipart_error)?)
            }
            _ => {}
        }
    }

    let complaint = ComplaintService::new(&state)
        .submit(auth_user.user_id, auth_user.role, submission)
        .await?;
    Ok(ApiResponse::with_message(
        complaint,
        "Complaint submitted".to_string(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/complaints",
    security(("jwt_token" = [])),
    params(ComplaintListQuery),
    responses(
        (status = 200, description = "Complaints, newest first", body = PaginatedResponse<Complaint>),
        (status = 400, description = "Unknown status", body = AppError),
    ),
    tag = "complaints"
)]
pub async fn list_complaints(
    Extension(state): Extension<AppState>,
    _auth_user: AuthUser,
    Query(query): Query<ComplaintListQuery>,
) -> AppResult<impl IntoResponse> {
    let (filter, page, per_page) = query.into_filter()?;
    let (items, total) = ComplaintService::new(&state).list(filter).await?;
    Ok(ApiResponse::ok(PaginatedResponse::new(
        items, total, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/complaints/mine",
    security(("jwt_token" = [])),
    params(ComplaintListQuery),
    responses(
        (status = 200, description = "The caller's own complaints", body = PaginatedResponse<Complaint>),
    ),
    tag = "complaints"
)]
pub async fn my_complaints(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ComplaintListQuery>,
) -> AppResult<impl IntoResponse> {
    let (filter, page, per_page) = query.into_filter()?;
    let (items, total) = ComplaintService::new(&state)
        .mine(auth_user.user_id, filter)
        .await?;
    Ok(ApiResponse::ok(PaginatedResponse::new(
        items, total, page, per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/complaints/nearby",
    security(("jwt_token" = [])),
    params(NearbyQuery),
    responses(
        (status = 200, description = "Complaints around the NGO", body = Vec<NearbyComplaint>),
        (status = 403, description = "NGOs only", body = AppError),
    ),
    tag = "complaints"
)]
pub async fn nearby_complaints(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
    Query(query): Query<NearbyQuery>,
) -> AppResult<impl IntoResponse> {
    let status = parse_status(query.status.as_deref())?;
    let items = ComplaintService::new(&state)
        .nearby(auth_user.user_id, auth_user.role, query.radius_km, status)
        .await?;
    Ok(ApiResponse::ok(items))
}

#[utoipa::path(
    get,
    path = "/api/v1/complaints/{id}",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    responses(
        (status = 200, description = "Complaint", body = Complaint),
        (status = 404, description = "Not found", body = AppError),
    ),
    tag = "complaints"
)]
pub async fn get_complaint(
    Extension(state): Extension<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let complaint = ComplaintService::new(&state).get(id).await?;
    Ok(ApiResponse::ok(complaint))
}

#[utoipa::path(
    post,
    path = "/api/v1/complaints/{id}/accept",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    responses(
        (status = 200, description = "Accepted; repeating it changes nothing", body = Complaint),
        (status = 403, description = "NGOs only", body = AppError),
        (status = 404, description = "Not found", body = AppError),
        (status = 409, description = "Complaint already completed", body = AppError),
    ),
    tag = "complaints"
)]
pub async fn accept_complaint(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let complaint = ComplaintService::new(&state)
        .accept(auth_user.user_id, auth_user.role, id)
        .await?;
    Ok(ApiResponse::ok(complaint))
}

#[utoipa::path(
    post,
    path = "/api/v1/complaints/{id}/completion",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    request_body(content_type = "multipart/form-data", content = crate::handlers::upload::ImageForm),
    responses(
        (status = 200, description = "Completion proof stored", body = Complaint),
        (status = 400, description = "Missing or invalid image", body = AppError),
        (status = 403, description = "Caller has not accepted this complaint", body = AppError),
        (status = 409, description = "Not active, or proof already uploaded", body = AppError),
    ),
    tag = "complaints"
)]
pub async fn upload_completion(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("image") {
            upload = read_image(field).await?;
            break;
        }
    }

    let complaint = ComplaintService::new(&state)
        .upload_completion(auth_user.user_id, auth_user.role, id, upload)
        .await?;
    Ok(ApiResponse::ok(complaint))
}

#[utoipa::path(
    post,
    path = "/api/v1/complaints/{id}/approve",
    security(("jwt_token" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    responses(
        (status = 200, description = "Complaint completed", body = Complaint),
        (status = 403, description = "Only the reporting citizen can approve", body = AppError),
        (status = 409, description = "No proof yet, or already completed", body = AppError),
    ),
    tag = "complaints"
)]
pub async fn approve_completion(
    Extension(state): Extension<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let complaint = ComplaintService::new(&state)
        .approve(auth_user.user_id, id)
        .await?;
    Ok(ApiResponse::ok(complaint))
}
