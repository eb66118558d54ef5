//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! Everything is served under `/api/v1` as JSON.
//!
//! ```text
//! GET    /health                        - Liveness
//! GET    /health/ready                  - Database readiness
//!
//! # Auth (rate limited)
//! POST   /auth/register                 - Create a customer account
//! POST   /auth/login                    - Exchange credentials for a token
//! GET    /auth/profile                  - Current user
//!
//! # Users
//! GET    /users                         - All users (admin)
//! GET    /users/{id}                    - One user (self or admin)
//! PATCH  /users/{id}                    - Update user (self or admin)
//! DELETE /users/{id}                    - Delete user (admin)
//!
//! # Catalog
//! GET    /categories                    - Categories by name
//! POST   /categories                    - Create (admin)
//! GET    /categories/{id}               - Category with product count
//! PATCH  /categories/{id}               - Update (admin)
//! DELETE /categories/{id}               - Delete (admin)
//! GET    /products                      - Filtered, paginated listing
//! POST   /products                      - Create (admin)
//! GET    /products/{id}                 - Product with category
//! PATCH  /products/{id}                 - Update (admin)
//! DELETE /products/{id}                 - Delete or deactivate (admin)
//! PATCH  /products/{id}/stock           - Relative stock change (admin)
//! GET    /products/{id}/check-stock     - Availability for a quantity
//!
//! # Cart (user or X-Session-Id)
//! GET    /cart                          - Current cart
//! POST   /cart/add                      - Add units of a product
//! PATCH  /cart/items/{id}               - Set line quantity
//! DELETE /cart/items/{id}               - Remove line
//! DELETE /cart/clear                    - Remove all lines
//! POST   /cart/merge                    - Merge guest cart (user)
//!
//! # Orders
//! POST   /orders                        - Checkout (user)
//! GET    /orders                        - All orders (admin)
//! GET    /orders/my-orders              - Own orders
//! GET    /orders/stats                  - Shop statistics (admin)
//! GET    /orders/my-stats               - Own statistics
//! GET    /orders/{id}                   - One order (buyer or admin)
//! PATCH  /orders/{id}/status            - Change status (admin)
//! ```

pub mod auth;
pub mod cart;
pub mod categories;
pub mod health;
pub mod orders;
pub mod products;
pub mod users;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::from_fn,
    routing::{delete, get, patch, post},
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::middleware::{SESSION_ID_HEADER, auth_rate_limiter, request_id_middleware};
use crate::state::AppState;

/// Plain confirmation body.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

/// Create the auth routes router.
pub fn auth_routes(rate_limit: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/profile", get(auth::profile));

    if rate_limit {
        router.layer(auth_rate_limiter())
    } else {
        router
    }
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new().route("/", get(users::index)).route(
        "/{id}",
        get(users::show).patch(users::update).delete(users::delete),
    )
}

/// Create the category routes router.
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(categories::index).post(categories::create))
        .route(
            "/{id}",
            get(categories::show)
                .patch(categories::update)
                .delete(categories::delete),
        )
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .patch(products::update)
                .delete(products::delete),
        )
        .route("/{id}/stock", patch(products::adjust_stock))
        .route("/{id}/check-stock", get(products::check_stock))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route(
            "/items/{id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
        .route("/clear", delete(cart::clear))
        .route("/merge", post(cart::merge))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/my-orders", get(orders::mine))
        .route("/stats", get(orders::stats))
        .route("/my-stats", get(orders::my_stats))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", patch(orders::update_status))
}

/// Create all `/api/v1` routes.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes(rate_limit))
        .nest("/users", user_routes())
        .nest("/categories", category_routes())
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
}

/// The full application: routes plus tracing, request ids and CORS.
pub fn app(state: AppState) -> Router {
    let config = state.config();
    let cors = cors_layer(&config.cors_origins);

    Router::new()
        .nest("/api/v1", routes(config.rate_limit))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured frontend origins. Unparseable origins are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(SESSION_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .allow_credentials(true)
}
