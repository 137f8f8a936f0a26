//! Server-rendered pages. Markup is static; dashboards fetch their data from the JSON API.

use axum::{
    extract::Path,
    response::{Html, IntoResponse, Redirect, Response},
};
use loyalty_common::CustomerId;

use crate::session::CurrentSession;

const INDEX: &str = include_str!("../templates/index.html");
const ADMIN_LOGIN: &str = include_str!("../templates/admin_login.html");
const ADMIN_DASHBOARD: &str = include_str!("../templates/admin_dashboard.html");
const CUSTOMER_LOGIN: &str = include_str!("../templates/customer_login.html");
const CUSTOMER_SIGNUP: &str = include_str!("../templates/customer_signup.html");
const CUSTOMER_DASHBOARD: &str = include_str!("../templates/customer_dashboard.html");

pub async fn index_page() -> Html<&'static str> {
    Html(INDEX)
}

pub async fn admin_login_page() -> Html<&'static str> {
    Html(ADMIN_LOGIN)
}

pub async fn customer_login_page() -> Html<&'static str> {
    Html(CUSTOMER_LOGIN)
}

pub async fn customer_signup_page() -> Html<&'static str> {
    Html(CUSTOMER_SIGNUP)
}

/// Admin-only; anonymous callers go back to the admin login
pub async fn admin_dashboard_page(session: CurrentSession) -> Response {
    if session.is_admin() {
        Html(ADMIN_DASHBOARD).into_response()
    } else {
        Redirect::to("/admin").into_response()
    }
}

/// Visible to the customer it belongs to, or to an admin
pub async fn customer_dashboard_page(
    session: CurrentSession,
    Path(customer_id): Path<String>,
) -> Response {
    match CustomerId::parse(&customer_id) {
        // Parsed identifiers are `TNM` plus digits, safe to splice into markup
        Ok(id) if session.can_view(&id) => {
            Html(CUSTOMER_DASHBOARD.replace("{{customer_id}}", id.as_str())).into_response()
        }
        _ => Redirect::to("/customer-login").into_response(),
    }
}
