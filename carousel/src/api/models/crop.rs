use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Successful crop: one URL per tile, in tile order
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CropResponse {
    #[schema(example = json!(["/imagens/cropped/cropped-1718000000000-0.jpg"]))]
    pub image_paths: Vec<String>,
}

/// Failure body shared by every non-2xx response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Valor de n inválido.")]
    pub error: String,
}

/// Multipart form accepted by `POST /api/crop-image` (documentation only)
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct CropForm {
    /// Image to slice
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Number of 1080x1080 tiles, at least 1
    #[schema(value_type = String, example = "3")]
    pub n: String,
}
