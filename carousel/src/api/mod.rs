//! API layer: route handlers and the JSON shapes they exchange.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/crop-image` | [`handlers::crop::crop_image`] |
//! | `GET /` | [`handlers::static_assets::serve_embedded_asset`] |
//!
//! The crop endpoint is documented with `utoipa`; the rendered reference lives at `/docs`.

pub mod handlers;
pub mod models;
