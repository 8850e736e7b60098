use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

use super::super::helpers::error_chain_fmt;
use crate::domain::ValidationError;
use crate::mailer_client::VendorApiError;
use crate::secrets::SecretAccessError;

#[derive(thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    ValidationError(#[from] ValidationError),
    #[error("Failed to resolve the mailer api key.")]
    SecretError(#[from] SecretAccessError),
    #[error("The mailer api reported a terminal status.")]
    VendorError(#[from] VendorApiError),
    #[error("Failed to reach the mailer api.")]
    TransportError(#[from] reqwest::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for DispatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DispatchError::SecretError(_)
            | DispatchError::VendorError(_)
            | DispatchError::TransportError(_)
            | DispatchError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        match self {
            DispatchError::ValidationError(e) => {
                HttpResponse::BadRequest().json(json!({ "error": e.to_string() }))
            }
            _ => HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}
