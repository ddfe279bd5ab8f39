//! # Order Administration
//!
//! Listing and status transitions. Stock follows the status: cancelling an
//! order hands its units back, and reviving a cancelled order has to win
//! them again through the same row-locked decrement checkout uses.
//!
//! A status change claims the transition with a guarded update before it
//! touches stock, so two admins racing on the same order cannot both run the
//! compensation; the loser gets a 409.
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    error::{AppError, Payload},
    models::{Order, OrderItem, OrderStatus, StatusPayload},
    state::AppState,
    stock::{decrement_stock, restore_stock},
};

pub async fn list_all_orders_handler(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(orders))
}

pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(order_id): Path<Uuid>,
    Payload(payload): Payload<StatusPayload>,
) -> Result<Json<Order>, AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.status == payload.status {
        return Ok(Json(order));
    }

    // Claim the transition first. The guard on the old status means only one
    // of several concurrent requests flips the row; the rest see zero rows
    // and never reach the stock compensation.
    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $1, updated_at = now() WHERE id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(payload.status)
    .bind(order_id)
    .bind(order.status)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Conflict)?;

    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(&state.db)
        .await?;

    match transition(order.status, payload.status) {
        StockAction::Release => release_items(&state.db, &items).await?,
        StockAction::Reserve => {
            if let Err(e) = reserve_items(&state.db, &items).await {
                // hand the claimed transition back before surfacing the shortfall
                sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
                    .bind(order.status)
                    .bind(order_id)
                    .execute(&state.db)
                    .await?;

                return Err(e);
            }
        }
        StockAction::Keep => {}
    }

    info!("Order {} moved to {:?}", order_id, payload.status);

    Ok(Json(updated))
}

#[derive(Debug, PartialEq, Eq)]
enum StockAction {
    Keep,
    Release,
    Reserve,
}

/// Stock side of a status change. Only crossing the `cancelled` boundary
/// moves stock.
fn transition(from: OrderStatus, to: OrderStatus) -> StockAction {
    if from == to {
        return StockAction::Keep;
    }

    match (from, to) {
        (_, OrderStatus::Cancelled) => StockAction::Release,
        (OrderStatus::Cancelled, _) => StockAction::Reserve,
        _ => StockAction::Keep,
    }
}

/// Hand every line's units back to the catalog. Lines whose product has been
/// deleted are skipped; there is no row left to restock.
async fn release_items(db: &PgPool, items: &[OrderItem]) -> Result<(), AppError> {
    for item in items {
        if let Some(product_id) = item.product_id {
            restore_stock(db, product_id, item.quantity).await?;
        }
    }

    Ok(())
}

/// Win back every line's units. Each decrement is its own short transaction,
/// so a shortfall partway through is compensated by restoring what was
/// already taken before reporting the failure.
async fn reserve_items(db: &PgPool, items: &[OrderItem]) -> Result<(), AppError> {
    let mut taken: Vec<&OrderItem> = Vec::new();

    for item in items {
        let reserved = match item.product_id {
            Some(product_id) => decrement_stock(db, product_id, item.quantity).await?,
            None => false,
        };

        if !reserved {
            for prev in &taken {
                if let Some(product_id) = prev.product_id {
                    restore_stock(db, product_id, prev.quantity).await?;
                }
            }

            return Err(AppError::InsufficientStock(item.product_name.clone()));
        }

        taken.push(item);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{StockAction, transition};
    use crate::models::OrderStatus;

    #[test]
    fn test_cancelling_releases_stock() {
        assert_eq!(
            transition(OrderStatus::Pending, OrderStatus::Cancelled),
            StockAction::Release
        );
        assert_eq!(
            transition(OrderStatus::Shipped, OrderStatus::Cancelled),
            StockAction::Release
        );
    }

    #[test]
    fn test_reviving_reserves_stock() {
        assert_eq!(
            transition(OrderStatus::Cancelled, OrderStatus::Pending),
            StockAction::Reserve
        );
        assert_eq!(
            transition(OrderStatus::Cancelled, OrderStatus::Completed),
            StockAction::Reserve
        );
    }

    #[test]
    fn test_transitions_between_live_statuses_keep_stock() {
        assert_eq!(
            transition(OrderStatus::Pending, OrderStatus::Shipped),
            StockAction::Keep
        );
        assert_eq!(
            transition(OrderStatus::Processing, OrderStatus::Completed),
            StockAction::Keep
        );
    }

    #[test]
    fn test_same_status_is_a_no_op() {
        assert_eq!(
            transition(OrderStatus::Cancelled, OrderStatus::Cancelled),
            StockAction::Keep
        );
        assert_eq!(
            transition(OrderStatus::Pending, OrderStatus::Pending),
            StockAction::Keep
        );
    }
}
