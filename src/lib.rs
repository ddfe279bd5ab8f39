//! Storefront REST backend.
//!
//! Catalog browsing, accounts, checkout, reviews, wishlists, and a contact
//! form, plus an admin surface for products and orders. Postgres holds all
//! state; the one operation with real hazards is checkout, documented in
//! [`orders`].
//!
//! # Layout
//!
//! - [`orders`] / [`stock`] — the order-placement transaction and the
//!   row-locked stock primitives it shares with admin status transitions
//! - [`products`], [`reviews`], [`wishlist`], [`contact`] — request/response
//!   plumbing over their tables
//! - [`auth`] — registration, login, bearer-token extractors
//! - [`admin`] — order listing and status updates
//!
//! # Setup
//!
//! ```sh
//! docker run -d -p 5432:5432 -e POSTGRES_PASSWORD=postgres postgres:17
//! JWT_SECRET=dev-secret cargo run
//! ```
//!
//! Migrations in `migrations/` run automatically at startup.
use std::time::Duration;

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, patch, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod admin;
pub mod auth;
pub mod config;
pub mod contact;
pub mod database;
pub mod error;
pub mod models;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod state;
pub mod stock;
pub mod wishlist;

use admin::{list_all_orders_handler, update_status_handler};
use auth::{login_handler, register_handler};
use contact::contact_handler;
use orders::{create_order_handler, list_orders_handler};
use products::{
    create_product_handler, delete_product_handler, get_product_handler, list_products_handler,
    update_product_handler,
};
use reviews::{create_review_handler, list_reviews_handler};
use state::AppState;
use wishlist::{add_wishlist_handler, list_wishlist_handler, remove_wishlist_handler};

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/products", get(list_products_handler))
        .route("/products/{id}", get(get_product_handler))
        .route(
            "/products/{id}/reviews",
            get(list_reviews_handler).post(create_review_handler),
        )
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/contact", post(contact_handler))
        .route("/orders", post(create_order_handler).get(list_orders_handler))
        .route("/wishlist", get(list_wishlist_handler))
        .route(
            "/wishlist/{product_id}",
            post(add_wishlist_handler).delete(remove_wishlist_handler),
        )
        .route("/admin/products", post(create_product_handler))
        .route(
            "/admin/products/{id}",
            put(update_product_handler).delete(delete_product_handler),
        )
        .route("/admin/orders", get(list_all_orders_handler))
        .route("/admin/orders/{id}/status", patch(update_status_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
