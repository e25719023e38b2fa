use crate::api::extract::{read_file_field, AuthUser};
use crate::error::{AppError, AppResult};
use crate::models::{Dispute, DisputeStatus};
use crate::services::dispute_service::NewDispute;
use crate::AppState;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RaiseDisputeRequest {
    pub respondent_id: Option<Uuid>,
    pub subject: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct EditDisputeRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisputeStatusRequest {
    pub status: String,
    pub resolution: Option<String>,
}

pub async fn raise(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
    Json(req): Json<RaiseDisputeRequest>,
) -> AppResult<(StatusCode, Json<Dispute>)> {
    let dispute = state
        .disputes
        .raise(
            kameti_id,
            &user,
            NewDispute {
                respondent_id: req.respondent_id,
                subject: &req.subject,
                description: &req.description,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(dispute)))
}

pub async fn list_for_kameti(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<Json<Vec<Dispute>>> {
    Ok(Json(state.disputes.list(kameti_id, &user).await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(dispute_id): Path<Uuid>,
) -> AppResult<Json<Dispute>> {
    Ok(Json(state.disputes.get(dispute_id, &user).await?))
}

pub async fn edit(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(dispute_id): Path<Uuid>,
    Json(req): Json<EditDisputeRequest>,
) -> AppResult<Json<Dispute>> {
    let dispute = state
        .disputes
        .edit(
            dispute_id,
            &user,
            req.subject.as_deref(),
            req.description.as_deref(),
        )
        .await?;
    Ok(Json(dispute))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(dispute_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.disputes.delete(dispute_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(dispute_id): Path<Uuid>,
    Json(req): Json<DisputeStatusRequest>,
) -> AppResult<Json<Dispute>> {
    let next = DisputeStatus::from_str(&req.status).map_err(AppError::Validation)?;
    let dispute = state
        .disputes
        .update_status(dispute_id, &user, next, req.resolution.as_deref())
        .await?;
    Ok(Json(dispute))
}

pub async fn upload_evidence(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(dispute_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Dispute>> {
    let file = read_file_field(multipart).await?;
    let dispute = state
        .disputes
        .attach_evidence(dispute_id, &user, &file.file_name, &file.bytes)
        .await?;
    Ok(Json(dispute))
}
