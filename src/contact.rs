use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use crate::{
    auth::valid_email,
    error::{AppError, Payload},
    models::{ContactMessage, ContactPayload},
    state::AppState,
};

/// Stores the message. Delivery to the shop inbox is handled by an external
/// mail pipeline reading this table.
pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<ContactPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.name.trim().is_empty() || payload.message.trim().is_empty() {
        return Err(AppError::MalformedPayload(
            "Name and message are required".to_string(),
        ));
    }

    if !valid_email(&payload.email) {
        return Err(AppError::MalformedPayload("Invalid email".to_string()));
    }

    let message = sqlx::query_as::<_, ContactMessage>(
        "INSERT INTO contact_messages (name, email, message) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(payload.name.trim())
    .bind(&payload.email)
    .bind(payload.message.trim())
    .fetch_one(&state.db)
    .await?;

    info!("Contact message {} stored", message.id);

    Ok((StatusCode::CREATED, Json(message)))
}
