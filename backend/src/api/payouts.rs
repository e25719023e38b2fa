use crate::api::extract::AuthUser;
use crate::error::AppResult;
use crate::models::Payout;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<Json<Vec<Payout>>> {
    Ok(Json(state.payouts.list(kameti_id, &user).await?))
}

/// Admin releases the current round's pot
pub async fn release(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<Payout>)> {
    let payout = state.payouts.release(kameti_id, &user).await?;
    Ok((StatusCode::CREATED, Json(payout)))
}
