//! API request handlers for the loyalty service

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use loyalty_common::{Amount, CustomerId, Error};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    auth::Authenticator,
    models::{
        AddPurchaseForm, AddPurchaseResponse, AdminLoginForm, CustomerLoginForm,
        DashboardResponse, NewCustomer, RegisterCustomerForm, RegisterCustomerResponse,
    },
    session::{CurrentSession, Sessions},
    storage::Storage,
};

/// Shared application state
pub struct AppState {
    pub storage: Storage,
    pub sessions: Sessions,
    pub authenticator: Arc<dyn Authenticator>,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn new(
        storage: Storage,
        sessions: Sessions,
        authenticator: Arc<dyn Authenticator>,
        static_dir: PathBuf,
    ) -> Self {
        Self {
            storage,
            sessions,
            authenticator,
            static_dir,
        }
    }
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::DuplicateCustomer { .. } => StatusCode::CONFLICT,
            Error::CustomerNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidCredentials | Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::InvalidAmount(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::TransactionConflict => StatusCode::CONFLICT,
            Error::Storage(_) | Error::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !err.is_recoverable() {
            tracing::error!("Request failed: {}", err);
        }

        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "loyalty-service"
    }))
}

/// Verify admin credentials and start an admin session
pub async fn admin_login_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Form(form): Form<AdminLoginForm>,
) -> Result<Response, ApiError> {
    if let Err(e) = state
        .authenticator
        .authenticate(&form.username, &form.password)
        .await
    {
        warn!("Rejected admin login for user: {}", form.username);
        return Err(e.into());
    }

    let token = state.sessions.login_admin(&session).await?;
    info!("Admin logged in: {}", form.username);

    Ok((
        [(header::SET_COOKIE, state.sessions.cookie(&token))],
        Redirect::to("/admin-dashboard"),
    )
        .into_response())
}

/// Start a customer session for an existing customer
pub async fn customer_login_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Form(form): Form<CustomerLoginForm>,
) -> Result<Response, ApiError> {
    let customer_id = CustomerId::parse(&form.customer_id)?;

    let customer = state
        .storage
        .find_customer(&customer_id)
        .await?
        .ok_or_else(|| Error::CustomerNotFound(customer_id.to_string()))?;

    let token = state
        .sessions
        .login_customer(&session, customer.customer_id.clone())
        .await?;
    info!("Customer logged in: {}", customer.customer_id);

    Ok((
        [(header::SET_COOKIE, state.sessions.cookie(&token))],
        Redirect::to(&format!("/customer-dashboard/{}", customer.customer_id)),
    )
        .into_response())
}

/// Clear all session state for the caller
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> Response {
    state.sessions.logout(&session).await;

    (
        [(header::SET_COOKIE, state.sessions.clear_cookie())],
        Redirect::to("/"),
    )
        .into_response()
}

/// Admin-initiated registration
pub async fn create_customer_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Form(form): Form<RegisterCustomerForm>,
) -> Result<Json<RegisterCustomerResponse>, ApiError> {
    session.require_admin()?;
    info!("Admin registering customer: {}", form.name.trim());

    let customer_id = register(&state, &form).await?;

    Ok(Json(RegisterCustomerResponse {
        message: "Customer created".to_string(),
        customer_id,
    }))
}

/// Self-service registration
pub async fn register_customer_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterCustomerForm>,
) -> Result<Json<RegisterCustomerResponse>, ApiError> {
    info!("Self-service registration: {}", form.name.trim());

    let customer_id = register(&state, &form).await?;

    Ok(Json(RegisterCustomerResponse {
        message: "Registration successful".to_string(),
        customer_id,
    }))
}

async fn register(state: &AppState, form: &RegisterCustomerForm) -> Result<CustomerId, Error> {
    let customer = NewCustomer::new(&form.name, &form.phone, &form.email)?;
    state.storage.register_customer(&customer).await
}

/// Record a purchase and credit its points
pub async fn add_purchase_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Form(form): Form<AddPurchaseForm>,
) -> Result<Json<AddPurchaseResponse>, ApiError> {
    session.require_admin()?;

    let amount: Amount = form.amount.parse()?;
    let customer_id = CustomerId::parse(&form.customer_id)?;

    let receipt = state.storage.record_purchase(&customer_id, amount).await?;

    Ok(Json(AddPurchaseResponse {
        message: "Purchase added".to_string(),
        receipt,
    }))
}

/// Customer profile and purchase history
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Path(customer_id): Path<String>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let customer_id = CustomerId::parse(&customer_id)?;
    if !session.can_view(&customer_id) {
        return Err(Error::NotAuthenticated.into());
    }

    let dashboard = state.storage.dashboard(&customer_id).await?;

    Ok(Json(dashboard.into()))
}
