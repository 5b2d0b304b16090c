//! HTTP request handlers.
//!
//! - [`crop`]: the `POST /api/crop-image` endpoint
//! - [`static_assets`]: the embedded upload form

pub mod crop;
pub mod static_assets;
