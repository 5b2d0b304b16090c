//! OpenAPI document for the crop API, served at `/api-docs/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "carousel",
        description = "Slices a wide image into square 1080x1080 tiles for an Instagram carousel."
    ),
    paths(api::handlers::crop::crop_image),
    components(schemas(
        api::models::crop::CropForm,
        api::models::crop::CropResponse,
        api::models::crop::ErrorResponse,
    )),
    tags(
        (name = "crop", description = "Image slicing")
    )
)]
pub struct ApiDoc;
