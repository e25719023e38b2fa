use crate::api::extract::{read_file_field, AuthUser};
use crate::error::AppResult;
use crate::gateway::SIGNATURE_HEADER;
use crate::models::{Payment, PaymentMethod};
use crate::services::payment_service::InitiatedPayment;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Gateway
}

#[derive(Debug, Deserialize)]
pub struct RoundQuery {
    pub round: Option<i32>,
}

pub async fn initiate(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
    Json(req): Json<InitiatePaymentRequest>,
) -> AppResult<(StatusCode, Json<InitiatedPayment>)> {
    let initiated = state.payments.initiate(kameti_id, &user, req.method).await?;
    Ok((StatusCode::CREATED, Json(initiated)))
}

pub async fn list_for_kameti(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
    Query(query): Query<RoundQuery>,
) -> AppResult<Json<Vec<Payment>>> {
    Ok(Json(state.payments.list(kameti_id, &user, query.round).await?))
}

/// Gateway callback; the signature covers the raw body
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Payment>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let payment = state
        .payments
        .handle_callback(&body, signature)
        .await
        .inspect_err(|e| warn!("Gateway callback rejected: {}", e))?;

    Ok(Json(payment))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<Payment>> {
    Ok(Json(state.payments.get(payment_id, &user).await?))
}

pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(payment_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Payment>> {
    let file = read_file_field(multipart).await?;
    let payment = state
        .payments
        .submit_receipt(payment_id, &user, &file.file_name, &file.bytes)
        .await?;
    Ok(Json(payment))
}

pub async fn confirm(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<Payment>> {
    Ok(Json(state.payments.confirm(payment_id, &user).await?))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<Payment>> {
    Ok(Json(state.payments.reject(payment_id, &user).await?))
}
