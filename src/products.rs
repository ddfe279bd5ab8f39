//! # Catalog
//!
//! Public browsing plus the admin CRUD surface.
//!
//! Search is plain `ILIKE` against name and description; at this catalog
//! size a dedicated search engine would be overkill. Images live in external
//! storage and are referenced by URL only.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    error::{AppError, Payload},
    models::{Product, ProductPayload, ProductQuery},
    state::AppState,
    stock::in_stock,
};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let search = query.search.map(|s| format!("%{s}%"));

    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products \
         WHERE ($1::TEXT IS NULL OR name ILIKE $1 OR description ILIKE $1) \
         AND ($2::TEXT IS NULL OR category = $2) \
         ORDER BY created_at DESC \
         LIMIT $3 OFFSET $4",
    )
    .bind(search)
    .bind(query.category)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(products))
}

pub async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(product))
}

pub async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Payload(payload): Payload<ProductPayload>,
) -> Result<impl IntoResponse, AppError> {
    validate(&payload)?;

    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (name, description, price, category, image_url, stock_quantity, in_stock) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.price)
    .bind(&payload.category)
    .bind(&payload.image_url)
    .bind(payload.stock_quantity)
    .bind(in_stock(payload.stock_quantity))
    .fetch_one(&state.db)
    .await?;

    info!("Product {} created", product.id);

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<ProductPayload>,
) -> Result<Json<Product>, AppError> {
    validate(&payload)?;

    let product = sqlx::query_as::<_, Product>(
        "UPDATE products \
         SET name = $1, description = $2, price = $3, category = $4, image_url = $5, \
             stock_quantity = $6, in_stock = $7, updated_at = now() \
         WHERE id = $8 RETURNING *",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.price)
    .bind(&payload.category)
    .bind(&payload.image_url)
    .bind(payload.stock_quantity)
    .bind(in_stock(payload.stock_quantity))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound)?;

    Ok(Json(product))
}

pub async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    info!("Product {id} deleted");

    Ok(StatusCode::NO_CONTENT)
}

fn validate(payload: &ProductPayload) -> Result<(), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::MalformedPayload(
            "Product name is required".to_string(),
        ));
    }

    if payload.price < Decimal::ZERO {
        return Err(AppError::MalformedPayload(
            "Price must be non-negative".to_string(),
        ));
    }

    if payload.stock_quantity < 0 {
        return Err(AppError::MalformedPayload(
            "Stock quantity must be non-negative".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::validate;
    use crate::models::ProductPayload;

    fn payload() -> ProductPayload {
        ProductPayload {
            name: "Sneaker".to_string(),
            description: None,
            price: Decimal::new(2999, 2),
            category: Some("shoes".to_string()),
            image_url: None,
            stock_quantity: 10,
        }
    }

    #[test]
    fn test_validate_accepts_product() {
        assert!(validate(&payload()).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let mut p = payload();
        p.name = "   ".to_string();
        assert!(validate(&p).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_stock() {
        let mut p = payload();
        p.stock_quantity = -1;
        assert!(validate(&p).is_err());
    }
}
