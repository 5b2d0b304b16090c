use crate::AppState;
use crate::api::models::crop::{CropForm, CropResponse, ErrorResponse};
use crate::errors::{Error, Result};
use crate::upload::UploadRequest;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use tracing::{debug, info, instrument};

#[utoipa::path(
    post,
    path = "/api/crop-image",
    tag = "crop",
    summary = "Slice an image into carousel tiles",
    description = "Resizes the uploaded image to 1080*n x 1080 (stretching if needed) and cuts it into n square 1080x1080 JPEG tiles.",
    request_body(
        content = CropForm,
        content_type = "multipart/form-data",
        description = "Image file and tile count"
    ),
    responses(
        (status = 200, description = "Tiles stored, in left-to-right order", body = CropResponse),
        (status = 400, description = "Missing file or invalid n", body = ErrorResponse),
        (status = 405, description = "Only POST is allowed", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Decode, resize or storage failure", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn crop_image(State(state): State<AppState>, multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<Json<CropResponse>> {
    let mut multipart = multipart.map_err(|e| {
        debug!(error = %e.body_text(), "Rejected non-multipart body");
        Error::BadRequest {
            message: "A requisição deve ser multipart/form-data.".to_string(),
        }
    })?;

    let upload = UploadRequest::from_multipart(
        &mut multipart,
        &state.config.upload.temp_dir(),
        state.config.limits.max_tiles,
    )
    .await?;
    info!(n = upload.n, file_name = ?upload.file_name, bytes = upload.size, "Processing crop request");

    let tiles = state.pipeline.run(&upload).await?;
    upload.close();

    Ok(Json(CropResponse {
        image_paths: tiles.into_iter().map(|tile| tile.url).collect(),
    }))
}

/// Any method other than POST on the crop route
pub async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}
