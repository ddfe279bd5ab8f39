//! # Stock Adjustment
//!
//! Row-locked mutations of `products.stock_quantity`.
//!
//! Every committed write keeps `in_stock == (stock_quantity > 0)`. The
//! arithmetic lives in [`take`] so checkout and the standalone primitives
//! share one decision path.
//!
//! [`decrement_stock`] is the soft variant: it reports `false` instead of
//! failing when stock is short, since callers outside a multi-item checkout
//! (status transitions, compensations) want to inspect the outcome rather
//! than abort a surrounding operation.
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub fn in_stock(stock_quantity: i32) -> bool {
    stock_quantity > 0
}

/// Remaining stock after reserving `requested` units, or `None` if the
/// reservation cannot be satisfied.
pub fn take(stock_quantity: i32, requested: i32) -> Option<i32> {
    if requested < 1 || stock_quantity < requested {
        return None;
    }

    Some(stock_quantity - requested)
}

/// Stock after handing `returned` units back, clamped at the type ceiling so
/// a restore can never wrap.
pub fn give_back(stock_quantity: i32, returned: i32) -> i32 {
    stock_quantity.saturating_add(returned)
}

/// Reserve `quantity` units outside of checkout. Returns `false` with no
/// mutation when the product is gone or stock is short.
pub async fn decrement_stock(
    db: &PgPool,
    product_id: Uuid,
    quantity: i32,
) -> Result<bool, sqlx::Error> {
    let mut tx = db.begin().await?;

    let stock = sqlx::query_scalar::<_, i32>(
        "SELECT stock_quantity FROM products WHERE id = $1 FOR UPDATE",
    )
    .bind(product_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(stock) = stock else {
        return Ok(false);
    };

    let Some(remaining) = take(stock, quantity) else {
        return Ok(false);
    };

    write_stock(&mut tx, product_id, remaining).await?;
    tx.commit().await?;

    Ok(true)
}

/// Hand `quantity` units back, e.g. when an order is cancelled. A missing
/// product is a no-op: there is nothing left to restock.
pub async fn restore_stock(
    db: &PgPool,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    let stock = sqlx::query_scalar::<_, i32>(
        "SELECT stock_quantity FROM products WHERE id = $1 FOR UPDATE",
    )
    .bind(product_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(stock) = stock else {
        return Ok(());
    };

    write_stock(&mut tx, product_id, give_back(stock, quantity)).await?;
    tx.commit().await?;

    Ok(())
}

pub async fn write_stock(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
    remaining: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE products SET stock_quantity = $1, in_stock = $2, updated_at = now() WHERE id = $3",
    )
    .bind(remaining)
    .bind(in_stock(remaining))
    .bind(product_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{give_back, in_stock, take};

    #[test]
    fn test_take_within_stock() {
        assert_eq!(take(5, 2), Some(3));
        assert_eq!(take(5, 5), Some(0));
    }

    #[test]
    fn test_take_shortfall() {
        assert_eq!(take(1, 2), None);
        assert_eq!(take(0, 1), None);
    }

    #[test]
    fn test_take_rejects_non_positive_requests() {
        assert_eq!(take(5, 0), None);
        assert_eq!(take(5, -1), None);
    }

    #[test]
    fn test_in_stock_boundary() {
        assert!(in_stock(1));
        assert!(!in_stock(0));
    }

    #[test]
    fn test_give_back_adds_units() {
        assert_eq!(give_back(0, 3), 3);
        assert_eq!(give_back(7, 2), 9);
    }

    #[test]
    fn test_give_back_saturates_instead_of_wrapping() {
        assert_eq!(give_back(i32::MAX, 1), i32::MAX);
        assert_eq!(give_back(i32::MAX - 1, 5), i32::MAX);
    }

    #[test]
    fn test_exact_drain_leaves_out_of_stock() {
        let remaining = take(3, 3).unwrap();
        assert_eq!(remaining, 0);
        assert!(!in_stock(remaining));
    }
}
