//! HTTP route handlers for the Pawdia API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /verify/{short_id}                  - Email verification short link (HTML)
//!
//! # Auth (rate limited)
//! POST /api/auth/register                  - Create account
//! POST /api/auth/login                     - Sign in
//! GET  /api/auth/me                        - Current user
//! POST /api/auth/verify-email              - Verify email (JSON)
//! GET  /api/auth/verify-email?token=       - Verify email (HTML)
//! POST /api/auth/resend-verification       - Resend verification email
//! POST /api/auth/forgot-password           - Send reset link
//! POST /api/auth/reset-password            - Reset password with token
//! POST /api/auth/change-password           - Change password (auth)
//!
//! # Users (auth)
//! GET  /api/users/profile                  - Profile
//! PUT  /api/users/profile                  - Update name
//! GET  /api/users/credits                  - Balance and subscription
//! GET  /api/users/credits/history          - Ledger entries
//! POST /api/users/credits/use              - Spend credits
//! GET  /api/users/orders                   - Order history
//!
//! # Catalogue
//! GET  /api/products                       - Active products (cached)
//! GET  /api/products/{id}                  - Product detail
//!
//! # Payments (auth)
//! GET  /api/payments/credit-packs          - Credit pack offers
//! POST /api/payments/create-order          - Start PayPal checkout
//! POST /api/payments/capture-order         - Capture and fulfil
//! POST /api/payments/cancel-order          - Cancel pending order
//! GET  /api/payments/orders/{id}           - Order detail
//!
//! # Subscriptions
//! GET  /api/subscriptions/plans            - Plan offers
//! POST /api/subscriptions/subscribe        - Start plan checkout (auth)
//! GET  /api/subscriptions/status           - Current subscription (auth)
//! POST /api/subscriptions/cancel           - Cancel subscription (auth)
//!
//! # Media (auth)
//! POST /api/upload                         - Upload pet photo
//! GET  /api/generate/styles                - Portrait styles
//! POST /api/generate                       - Generate portraits (rate limited)
//!
//! # Admin (admin only)
//! GET  /api/admin/stats
//! GET  /api/admin/users
//! GET|PUT|DELETE /api/admin/users/{id}
//! POST /api/admin/users/{id}/credits
//! GET|POST /api/admin/products
//! PUT|DELETE /api/admin/products/{id}
//! GET  /api/admin/orders
//! PUT  /api/admin/orders/{id}/status
//! ```

pub mod admin;
pub mod auth;
pub mod generate;
pub mod payments;
pub mod products;
pub mod response;
pub mod subscriptions;
pub mod upload;
pub mod users;
pub mod verify;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

use crate::middleware::{auth_rate_limiter, generation_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route(
            "/verify-email",
            get(verify::token_link).post(auth::verify_email),
        )
        .route("/resend-verification", post(auth::resend_verification))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/change-password", post(auth::change_password))
        .layer(auth_rate_limiter())
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(users::profile).put(users::update_profile))
        .route("/credits", get(users::credits))
        .route("/credits/history", get(users::credit_history))
        .route("/credits/use", post(users::use_credits))
        .route("/orders", get(users::orders))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/credit-packs", get(payments::credit_packs))
        .route("/create-order", post(payments::create_order))
        .route("/capture-order", post(payments::capture_order))
        .route("/cancel-order", post(payments::cancel_order))
        .route("/orders/{id}", get(payments::get_order))
}

/// Create the subscription routes router.
pub fn subscription_routes() -> Router<AppState> {
    Router::new()
        .route("/plans", get(subscriptions::plans))
        .route("/subscribe", post(subscriptions::subscribe))
        .route("/status", get(subscriptions::status))
        .route("/cancel", post(subscriptions::cancel))
}

/// Create the generation routes router.
pub fn generate_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(generate::generate).layer(generation_rate_limiter()),
        )
        .route("/styles", get(generate::styles))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(admin::stats))
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            get(admin::get_user)
                .put(admin::update_user)
                .delete(admin::delete_user),
        )
        .route("/users/{id}/credits", post(admin::adjust_credits))
        .route(
            "/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/products/{id}",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}/status", put(admin::update_order_status))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/verify/{short_id}", get(verify::short_link))
        .nest("/api/auth", auth_routes())
        .nest("/api/users", user_routes())
        .nest("/api/products", product_routes())
        .nest("/api/payments", payment_routes())
        .nest("/api/subscriptions", subscription_routes())
        .route(
            "/api/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(upload::UPLOAD_BODY_LIMIT)),
        )
        .nest("/api/generate", generate_routes())
        .nest("/api/admin", admin_routes())
}
