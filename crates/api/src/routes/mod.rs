//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                    - Liveness
//! GET    /health/ready              - Readiness (store ping)
//!
//! # Auth
//! POST   /auth/signup               - Create account, returns token
//! POST   /auth/login                - Exchange credentials for token
//! GET    /auth/me                   - Current user (auth)
//!
//! # Designs (auth)
//! POST   /designs/generate          - Generate a design from a prompt
//! GET    /designs                   - Caller's designs, newest first
//! GET    /designs/{id}              - One design
//!
//! # Cart (auth)
//! GET    /cart                      - Priced cart
//! POST   /cart                      - Add a line
//! PATCH  /cart/{id}                 - Change quantity
//! DELETE /cart/{id}                 - Remove a line
//!
//! # Payment (auth)
//! POST   /payment/create-intent     - Intent for the cart total
//! POST   /payment/confirm           - Confirm payment, place order
//! POST   /payment/test-flow         - Test-mode checkout in one call
//!
//! # Orders (auth)
//! GET    /orders                    - Caller's orders, newest first
//! GET    /orders/{id}               - One order
//!
//! # Admin (admin)
//! PATCH  /admin/orders/{id}/status  - Move an order along its lifecycle
//! POST   /admin/test-email          - Send a sample order email to the operator
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod designs;
pub mod health;
pub mod orders;
pub mod payment;

use axum::{
    Router,
    extract::{FromRequest, FromRequestParts},
    routing::{get, patch, post},
};

use crate::error::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejections use the API's error shape.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path extractor whose rejections use the API's error shape.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
}

/// Create the design routes router.
pub fn design_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(designs::index))
        .route("/generate", post(designs::generate))
        .route("/{id}", get(designs::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add))
        .route("/{id}", patch(cart::update).delete(cart::remove))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-intent", post(payment::create_intent))
        .route("/confirm", post(payment::confirm))
        .route("/test-flow", post(payment::test_flow))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/status", patch(admin::update_order_status))
        .route("/test-email", post(admin::send_test_email))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes())
        .nest("/designs", design_routes())
        .nest("/cart", cart_routes())
        .nest("/payment", payment_routes())
        .nest("/orders", order_routes())
        .nest("/admin", admin_routes())
}
