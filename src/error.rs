use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AppError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no captains found")]
    NoCaptainsFound,

    #[error("identity not connected: {0}")]
    IdentityNotConnected(String),

    #[error("address not found: {0}")]
    AddressNotFound(String),

    #[error("no route between the given locations")]
    NoRoute,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidArguments(_) => "invalid_arguments",
            AppError::InvalidCoordinate(_) => "invalid_coordinate",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::NoCaptainsFound => "no_captains_found",
            AppError::IdentityNotConnected(_) => "identity_not_connected",
            AppError::AddressNotFound(_) => "address_not_found",
            AppError::NoRoute => "no_route",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidArguments(_) | AppError::InvalidCoordinate(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) | AppError::AddressNotFound(_) | AppError::NoCaptainsFound => {
                StatusCode::NOT_FOUND
            }
            AppError::NoRoute => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) | AppError::IdentityNotConnected(_) => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}
