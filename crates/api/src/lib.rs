//! HTTP API server for the BazaarHub order core.
//!
//! Provides REST endpoints for the catalog, carts, checkout and order
//! fulfilment, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{admin, cart, catalog, orders};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Catalog
        .route(
            "/products",
            get(catalog::list_products::<S>).post(admin::create_product::<S>),
        )
        .route("/products/{id}", get(catalog::get_product::<S>))
        .route("/variants/{id}", get(catalog::get_variant::<S>))
        .route("/variants/{id}/stock", put(admin::restock::<S>))
        .route("/variants/{id}/price", put(admin::set_price::<S>))
        // Cart
        .route(
            "/cart",
            get(cart::list::<S>)
                .post(cart::add::<S>)
                .delete(cart::remove_many::<S>),
        )
        .route(
            "/cart/{line_id}",
            put(cart::set_quantity::<S>).delete(cart::remove::<S>),
        )
        // Orders
        .route("/orders", post(orders::place::<S>).get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/cancel", put(orders::cancel::<S>))
        .route(
            "/orders/{id}/items/{item_id}/cancel",
            put(orders::cancel_item::<S>),
        )
        // Fulfilment
        .route("/allOrders", get(admin::list_orders::<S>))
        .route("/allOrders/{id}/status", put(admin::set_order_status::<S>))
        .route(
            "/allOrders/{id}/items/{item_id}/status",
            put(admin::set_item_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
