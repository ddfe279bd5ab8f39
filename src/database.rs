//! # Postgres
//!
//! Relational store.
//!
//! Holds every long-lived row: users, the product catalog, orders with their
//! line items, reviews, wishlists, and contact messages.
//!
//! All concurrency control is delegated here. Order placement takes exclusive
//! row locks (`SELECT ... FOR UPDATE`) inside a single transaction, so two
//! checkouts racing for the same product are serialized by the database, not
//! by anything in-process.
use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

pub async fn init_postgres(database_url: &str) -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}
