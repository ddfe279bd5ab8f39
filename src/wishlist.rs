use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError, models::Product, state::AppState};

pub async fn list_wishlist_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Product>>, AppError> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT p.* FROM products p \
         JOIN wishlist_items w ON w.product_id = p.id \
         WHERE w.user_id = $1 \
         ORDER BY w.created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(products))
}

pub async fn add_wishlist_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    sqlx::query(
        "INSERT INTO wishlist_items (user_id, product_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(user.id)
    .bind(product_id)
    .execute(&state.db)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::ProductNotFound,
        other => AppError::Database(other),
    })?;

    Ok(StatusCode::CREATED)
}

pub async fn remove_wishlist_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
        .bind(user.id)
        .bind(product_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
