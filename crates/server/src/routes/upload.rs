//! Pet photo upload.

use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Response},
};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::routes::response::ok;
use crate::services::cloudinary::{MAX_UPLOAD_BYTES, validate_image};
use crate::state::AppState;

/// Request body limit for the upload route (file plus multipart framing).
pub const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

/// Upload an image from multipart field `file`.
///
/// POST /api/upload
///
/// # Errors
///
/// Returns 400 for a missing, empty, oversized or non-image file, 503 if
/// Cloudinary isn't configured and 502 if Cloudinary rejects the upload.
pub async fn upload(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    mut multipart: Multipart,
) -> Result<Response> {
    let cloudinary = state.cloudinary()?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            file = Some(bytes);
            break;
        }
    }

    let bytes = file.ok_or_else(|| AppError::BadRequest("Missing file field".to_owned()))?;
    validate_image(&bytes)?;

    let image = cloudinary.upload(bytes.to_vec()).await?;
    tracing::info!(user_id = %caller.id, public_id = %image.public_id, "Photo uploaded");

    Ok(ok(image).into_response())
}
