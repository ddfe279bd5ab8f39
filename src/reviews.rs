use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, Payload},
    models::{Review, ReviewPayload},
    state::AppState,
};

pub async fn list_reviews_handler(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, AppError> {
    let reviews = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC",
    )
    .bind(product_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(reviews))
}

pub async fn create_review_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Payload(payload): Payload<ReviewPayload>,
) -> Result<impl IntoResponse, AppError> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::MalformedPayload(
            "Rating must be between 1 and 5".to_string(),
        ));
    }

    let review = sqlx::query_as::<_, Review>(
        "INSERT INTO reviews (product_id, user_id, rating, comment) \
         VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(product_id)
    .bind(user.id)
    .bind(payload.rating)
    .bind(&payload.comment)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match e {
        // FK violation means the product is gone
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::ProductNotFound,
        other => AppError::Database(other),
    })?;

    Ok((StatusCode::CREATED, Json(review)))
}
