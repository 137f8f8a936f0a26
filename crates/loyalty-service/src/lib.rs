//! Loyalty Points Service
//!
//! Administrators register customers and record purchases; every whole
//! currency unit spent earns one point. Customers log in with their
//! customer ID to see their balance and purchase history.
//!
//! ## Endpoints
//!
//! - `POST /admin-login` - Start an admin session
//! - `POST /customer-login` - Start a customer session
//! - `GET /logout`, `GET /customer-logout` - End the session
//! - `POST /admin/create-customer` - Register a customer (admin)
//! - `POST /customer/register` - Register a customer (self-service)
//! - `POST /admin/add-purchase` - Record a purchase (admin)
//! - `GET /api/customer/{customer_id}` - Profile and purchase history
//! - `GET /health` - Health check

pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod pages;
pub mod schema;
pub mod session;
pub mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use auth::{Authenticator, StaticCredentials};
pub use config::{Config, SessionBackend};
pub use handlers::{ApiError, AppState};
pub use session::{MemorySessionStore, RedisSessionStore, SessionStore, Sessions};
pub use storage::Storage;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        // Pages
        .route("/", get(pages::index_page))
        .route("/admin", get(pages::admin_login_page))
        .route("/admin-dashboard", get(pages::admin_dashboard_page))
        .route(
            "/customer-login",
            get(pages::customer_login_page).post(handlers::customer_login_handler),
        )
        .route("/customer-signup", get(pages::customer_signup_page))
        .route(
            "/customer-dashboard/{customer_id}",
            get(pages::customer_dashboard_page),
        )
        // Sessions
        .route("/admin-login", post(handlers::admin_login_handler))
        .route("/logout", get(handlers::logout_handler))
        .route("/customer-logout", get(handlers::logout_handler))
        // Customers and purchases
        .route(
            "/admin/create-customer",
            post(handlers::create_customer_handler),
        )
        .route(
            "/customer/register",
            post(handlers::register_customer_handler),
        )
        .route("/admin/add-purchase", post(handlers::add_purchase_handler))
        .route(
            "/api/customer/{customer_id}",
            get(handlers::dashboard_handler),
        )
        .nest_service("/static", static_files)
        .with_state(shared_state)
        .layer(TraceLayer::new_for_http())
}
