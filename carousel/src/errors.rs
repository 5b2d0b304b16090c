use crate::api::models::crop::ErrorResponse;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The crop endpoint only accepts POST
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Multipart body carried no usable `file` field
    #[error("Missing uploaded file")]
    MissingFile,

    /// `n` was absent, not an integer, or out of range
    #[error("Invalid tile count: {raw:?}")]
    InvalidCount { raw: Option<String> },

    /// Malformed request body
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeded the configured body limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// The canvas did not come out of the resize step at the expected size
    #[error("Resize produced {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    ResizeFailure {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::MissingFile | Error::InvalidCount { .. } | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ResizeFailure { .. } | Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the message shown to the client, without leaking internal details
    pub fn user_message(&self) -> String {
        match self {
            Error::MethodNotAllowed => "Método não permitido.".to_string(),
            Error::MissingFile => "Arquivo não encontrado.".to_string(),
            Error::InvalidCount { .. } => "Valor de n inválido.".to_string(),
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::ResizeFailure { .. } => "Falha ao redimensionar a imagem para as dimensões esperadas.".to_string(),
            Error::Internal { .. } | Error::Other(_) => "Erro interno do servidor.".to_string(),
        }
    }

    pub fn internal(operation: impl Into<String>) -> Self {
        Error::Internal {
            operation: operation.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::ResizeFailure { .. } => {
                tracing::error!("Canvas normalization failed: {}", self);
            }
            Error::MethodNotAllowed
            | Error::MissingFile
            | Error::InvalidCount { .. }
            | Error::BadRequest { .. }
            | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.user_message(),
        });

        let mut response = (status, body).into_response();
        if matches!(self, Error::MethodNotAllowed) {
            response.headers_mut().insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Other(anyhow::Error::new(err).context("image processing failed"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(anyhow::Error::new(err).context("I/O failed"))
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
