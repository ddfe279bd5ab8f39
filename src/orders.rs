//! # Checkout
//!
//! Order placement is the one operation here with real correctness hazards.
//! Two checkouts racing for the last unit must never both succeed, and a
//! failure partway through a multi-item order must leave nothing behind.
//!
//! ## Transaction shape
//!
//! Everything runs in a single Postgres transaction:
//!
//! 1. Lock each product with `SELECT ... FOR UPDATE`, sorted by product id.
//!    The sort gives all checkouts one global lock order, so two orders
//!    holding the same pair of products in opposite sequence cannot deadlock.
//! 2. Check and decrement stock per row while the lock is held. Reading and
//!    writing under the same lock is what rules out the lost-update race
//!    where both checkouts read "stock = 1" and both decrement.
//! 3. Insert the order and its line items, then commit.
//!
//! Any failure propagates out with `?`; the `Transaction` drop guard rolls
//! back, releasing locks and discarding partial decrements on every exit
//! path.
//!
//! ## Snapshots
//!
//! Line items freeze `product_name` and `price` as submitted by the client.
//! They are not re-read from the catalog, and they never change when the
//! product is later edited or deleted.
//!
//! ## Trusted total
//!
//! The order total is stored as the client sent it, not recomputed from the
//! line items. Known gap, kept as-is pending a product decision.
use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, Payload},
    models::{Order, OrderItem, OrderItemInput, PlaceOrderPayload},
    state::AppState,
    stock::{take, write_stock},
};

#[derive(Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Payload(payload): Payload<PlaceOrderPayload>,
) -> Result<impl IntoResponse, AppError> {
    let order = place_order(&state.db, user.id, &payload).await?;

    info!("Order {} placed by {}", order.id, user.id);

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<OrderWithItems>>, AppError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    let ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    Ok(Json(
        orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect(),
    ))
}

pub async fn place_order(
    db: &PgPool,
    user_id: Uuid,
    payload: &PlaceOrderPayload,
) -> Result<Order, AppError> {
    validate(payload)?;

    let mut tx = db.begin().await?;

    for item in lock_order(&payload.items) {
        reserve(&mut tx, item).await?;
    }

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (user_id, total, shipping_address) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(user_id)
    .bind(payload.total)
    .bind(&payload.shipping_address)
    .fetch_one(&mut *tx)
    .await?;

    // items are recorded in the sequence the client gave them
    for item in &payload.items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, product_name, price, quantity, size) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order.id)
        .bind(item.product_id)
        .bind(snapshot_name(item))
        .bind(item.price)
        .bind(item.quantity)
        .bind(&item.size)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(order)
}

/// Lock and decrement one product row. The lock is held until the enclosing
/// transaction ends, so the read-check-write below is atomic with respect to
/// every other checkout touching this product.
async fn reserve(
    tx: &mut Transaction<'_, Postgres>,
    item: &OrderItemInput,
) -> Result<(), AppError> {
    let row = sqlx::query_as::<_, (i32, String)>(
        "SELECT stock_quantity, name FROM products WHERE id = $1 FOR UPDATE",
    )
    .bind(item.product_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some((stock, name)) = row else {
        return Err(AppError::ProductNotFound);
    };

    let Some(remaining) = take(stock, item.quantity) else {
        return Err(AppError::InsufficientStock(name));
    };

    write_stock(tx, item.product_id, remaining).await?;

    #[cfg(feature = "verbose")]
    info!("Reserved {} x {}", item.quantity, item.product_id);

    Ok(())
}

/// Items sorted by product id, the global lock acquisition order.
fn lock_order(items: &[OrderItemInput]) -> Vec<&OrderItemInput> {
    let mut sorted: Vec<&OrderItemInput> = items.iter().collect();
    sorted.sort_by_key(|item| item.product_id);

    sorted
}

fn snapshot_name(item: &OrderItemInput) -> &str {
    item.product_name.as_deref().unwrap_or("Product")
}

fn validate(payload: &PlaceOrderPayload) -> Result<(), AppError> {
    if payload.items.is_empty() {
        return Err(AppError::MalformedPayload(
            "Order must contain at least one item".to_string(),
        ));
    }

    if payload.total < Decimal::ZERO {
        return Err(AppError::MalformedPayload(
            "Total must be non-negative".to_string(),
        ));
    }

    if !payload.shipping_address.is_object() {
        return Err(AppError::MalformedPayload(
            "Shipping address is required".to_string(),
        ));
    }

    for item in &payload.items {
        if item.quantity < 1 {
            return Err(AppError::MalformedPayload(
                "Item quantity must be at least 1".to_string(),
            ));
        }

        if item.price < Decimal::ZERO {
            return Err(AppError::MalformedPayload(
                "Item price must be non-negative".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    use super::{lock_order, snapshot_name, validate};
    use crate::models::{OrderItemInput, PlaceOrderPayload};

    fn item(product_id: Uuid, quantity: i32) -> OrderItemInput {
        OrderItemInput {
            product_id,
            quantity,
            price: Decimal::new(1999, 2),
            size: None,
            product_name: Some("Sneaker".to_string()),
        }
    }

    fn payload(items: Vec<OrderItemInput>) -> PlaceOrderPayload {
        PlaceOrderPayload {
            items,
            total: Decimal::new(1999, 2),
            shipping_address: json!({ "city": "Lafayette" }),
        }
    }

    #[test]
    fn test_lock_order_sorts_by_product_id() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        let items = vec![item(high, 1), item(low, 1)];
        let sorted = lock_order(&items);

        assert_eq!(sorted[0].product_id, low);
        assert_eq!(sorted[1].product_id, high);
    }

    #[test]
    fn test_lock_order_is_stable_for_duplicates() {
        let id = Uuid::from_u128(7);

        let items = vec![item(id, 1), item(id, 2)];
        let sorted = lock_order(&items);

        assert_eq!(sorted[0].quantity, 1);
        assert_eq!(sorted[1].quantity, 2);
    }

    #[test]
    fn test_snapshot_name_fallback() {
        let mut line = item(Uuid::from_u128(1), 1);
        assert_eq!(snapshot_name(&line), "Sneaker");

        line.product_name = None;
        assert_eq!(snapshot_name(&line), "Product");
    }

    #[test]
    fn test_validate_rejects_empty_items() {
        assert!(validate(&payload(vec![])).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let items = vec![item(Uuid::from_u128(1), 0)];
        assert!(validate(&payload(items)).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_price() {
        let mut line = item(Uuid::from_u128(1), 1);
        line.price = Decimal::new(-1, 0);
        assert!(validate(&payload(vec![line])).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_total() {
        let mut order = payload(vec![item(Uuid::from_u128(1), 1)]);
        order.total = Decimal::new(-1, 0);
        assert!(validate(&order).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_address() {
        let mut order = payload(vec![item(Uuid::from_u128(1), 1)]);
        order.shipping_address = serde_json::Value::Null;
        assert!(validate(&order).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_order() {
        let items = vec![item(Uuid::from_u128(1), 1), item(Uuid::from_u128(2), 3)];
        assert!(validate(&payload(items)).is_ok());
    }
}
