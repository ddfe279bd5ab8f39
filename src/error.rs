use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    MalformedPayload(String),

    #[error("One or more products no longer exist")]
    ProductNotFound,

    #[error("Insufficient stock for \"{0}\"")]
    InsufficientStock(String),

    #[error("Not found")]
    NotFound,

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Admin access required")]
    Forbidden,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Order was updated concurrently")]
    Conflict,

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload { .. }
            | AppError::ProductNotFound
            | AppError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::EmailTaken | AppError::Conflict => StatusCode::CONFLICT,
            AppError::Database { .. } | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{self:?}");
        }

        (status, self.to_string()).into_response()
    }
}

/// JSON body extractor that reports malformed payloads as 400 instead of
/// axum's default 422.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::MalformedPayload(e.body_text()))?;

        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn test_insufficient_stock_message() {
        let err = AppError::InsufficientStock("Sneaker".to_string());
        assert_eq!(err.to_string(), "Insufficient stock for \"Sneaker\"");
    }

    #[test]
    fn test_product_not_found_message() {
        assert_eq!(
            AppError::ProductNotFound.to_string(),
            "One or more products no longer exist"
        );
    }
}
