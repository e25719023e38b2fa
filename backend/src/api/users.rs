use crate::api::extract::AuthUser;
use crate::error::AppResult;
use crate::risk::RiskScore;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

/// Risk score of a user, for themselves, admins and fellow members
pub async fn user_risk(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<RiskScore>> {
    Ok(Json(state.risk.score_visible_to(user_id, &user).await?))
}
