use crate::api::extract::AuthUser;
use crate::error::AppResult;
use crate::models::{Frequency, Kameti, KametiMember};
use crate::repositories::KametiChanges;
use crate::services::kameti_service::{KametiDetail, NewKameti, RoundStatus};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateKametiRequest {
    pub name: String,
    pub description: Option<String>,
    pub contribution_amount: Decimal,
    pub frequency: Frequency,
    pub max_members: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKametiRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub contribution_amount: Option<Decimal>,
    pub max_members: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Kametis still accepting members
pub async fn list_open(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Vec<Kameti>>> {
    let kametis = state.kametis.list_open(query.limit, query.offset).await?;
    Ok(Json(kametis))
}

pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Kameti>>> {
    Ok(Json(state.kametis.list_mine(&user).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateKametiRequest>,
) -> AppResult<(StatusCode, Json<Kameti>)> {
    let kameti = state
        .kametis
        .create(
            &user,
            NewKameti {
                name: &req.name,
                description: req.description.as_deref(),
                contribution_amount: req.contribution_amount,
                frequency: req.frequency,
                max_members: req.max_members,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(kameti)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<Json<KametiDetail>> {
    Ok(Json(state.kametis.get(kameti_id, &user).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
    Json(req): Json<UpdateKametiRequest>,
) -> AppResult<Json<Kameti>> {
    let changes = KametiChanges {
        name: req.name.as_deref(),
        description: req.description.as_deref(),
        contribution_amount: req.contribution_amount,
        max_members: req.max_members,
    };

    Ok(Json(state.kametis.update(kameti_id, &user, changes).await?))
}

/// `DELETE` cancels a kameti that has not started
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<Json<Kameti>> {
    Ok(Json(state.kametis.cancel(kameti_id, &user).await?))
}

pub async fn join(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<KametiMember>)> {
    let member = state.kametis.join(kameti_id, &user).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn leave(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.kametis.leave(kameti_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<Json<Kameti>> {
    Ok(Json(state.kametis.start(kameti_id, &user).await?))
}

pub async fn readiness(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(kameti_id): Path<Uuid>,
) -> AppResult<Json<RoundStatus>> {
    Ok(Json(state.kametis.round_status(kameti_id, &user).await?))
}
