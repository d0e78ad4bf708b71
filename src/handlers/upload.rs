use crate::error::{AppError, AppResult, FormErrors};
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::complaint::ImageUpload;
use crate::utils::image::{validate_image, ImageError, ImagePreview};
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart,
    },
    http::StatusCode,
    response::IntoResponse,
};
use utoipa::ToSchema;

/// Multipart body with a single image part.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImageForm {
    /// JPG, PNG or WebP, at most 5MB, 200 to 2048 pixels per side
    #[schema(value_type = String, format = Binary)]
    image: Vec<u8>,
}

pub(crate) fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Image(ImageError::TooLarge)
    } else {
        AppError::Validation(format!("Failed to read upload: {}", err.body_text()))
    }
}

/// Read an image part. A part without content (no file chosen) is `None`.
pub(crate) async fn read_image(field: Field<'_>) -> AppResult<Option<ImageUpload>> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field.bytes().await.map_err(multipart_error)?;

    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(ImageUpload {
        data: data.to_vec(),
        content_type,
    }))
}

pub(crate) fn missing_image(message: &str) -> AppError {
    let mut errors = FormErrors::new();
    errors.add("image", message);
    AppError::InvalidForm(errors)
}

/// Check an image and echo it back as a data URL. Nothing is stored.
#[utoipa::path(
    post,
    path = "/api/v1/uploads/preview",
    security(("jwt_token" = [])),
    request_body(content_type = "multipart/form-data", content = ImageForm),
    responses(
        (status = 200, description = "Image accepted", body = ImagePreview),
        (status = 400, description = "Wrong type, bad dimensions or corrupted", body = AppError),
        (status = 413, description = "Image larger than 5MB", body = AppError),
    ),
    tag = "uploads"
)]
pub async fn preview_image(
    _auth_user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("image") {
            upload = read_image(field).await?;
            break;
        }
    }

    let upload = upload.ok_or_else(|| missing_image("Please choose an image"))?;
    let image = validate_image(upload.data, &upload.content_type)?;
    tracing::debug!(
        width = image.dimensions.width,
        height = image.dimensions.height,
        "Image preview generated"
    );

    Ok(ApiResponse::ok(ImagePreview::from_image(&image)))
}
