//! REST API: routes under `/api`, plus `/health`.

pub mod auth;
pub mod disputes;
pub mod extract;
pub mod kametis;
pub mod loans;
pub mod notifications;
pub mod payments;
pub mod payouts;
pub mod users;

use crate::error::AppError;
use crate::AppState;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Headroom for multipart boundaries and form fields around an upload
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the HTTP router over shared application state.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;
    let cors = cors_layer(state.config.cors_origin.as_deref());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        // Auth
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me).patch(auth::update_profile))
        // Kametis
        .route("/api/kametis", get(kametis::list_open).post(kametis::create))
        .route("/api/kametis/mine", get(kametis::list_mine))
        .route(
            "/api/kametis/{id}",
            get(kametis::get).patch(kametis::update).delete(kametis::cancel),
        )
        .route("/api/kametis/{id}/join", post(kametis::join))
        .route("/api/kametis/{id}/leave", post(kametis::leave))
        .route("/api/kametis/{id}/start", post(kametis::start))
        .route("/api/kametis/{id}/readiness", get(kametis::readiness))
        .route(
            "/api/kametis/{id}/payments",
            get(payments::list_for_kameti).post(payments::initiate),
        )
        .route(
            "/api/kametis/{id}/payouts",
            get(payouts::list).post(payouts::release),
        )
        .route(
            "/api/kametis/{id}/disputes",
            get(disputes::list_for_kameti).post(disputes::raise),
        )
        // Payments
        .route("/api/payments/callback", post(payments::callback))
        .route("/api/payments/{id}", get(payments::get))
        .route("/api/payments/{id}/receipt", post(payments::upload_receipt))
        .route("/api/payments/{id}/confirm", post(payments::confirm))
        .route("/api/payments/{id}/reject", post(payments::reject))
        // Disputes
        .route(
            "/api/disputes/{id}",
            get(disputes::get).patch(disputes::edit).delete(disputes::delete),
        )
        .route("/api/disputes/{id}/status", post(disputes::update_status))
        .route("/api/disputes/{id}/evidence", post(disputes::upload_evidence))
        // Loans
        .route("/api/loans", get(loans::list_open).post(loans::request))
        .route("/api/loans/mine", get(loans::list_mine))
        .route("/api/loans/{id}", get(loans::get).delete(loans::cancel))
        .route("/api/loans/{id}/pledges", post(loans::pledge))
        .route("/api/loans/{id}/repayments", post(loans::repay))
        // Notifications
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/{id}/read", post(notifications::mark_read))
        // Users
        .route("/api/users/{id}/risk", get(users::user_risk))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Healthy only when the database answers
async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.database.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("No such route".to_string())
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(_)) => {
            warn!("Ignoring invalid CORS_ORIGIN");
            layer
        }
        None => layer,
    }
}
