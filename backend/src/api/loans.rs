use crate::api::extract::AuthUser;
use crate::api::kametis::PageQuery;
use crate::error::AppResult;
use crate::models::Loan;
use crate::services::loan_service::{LoanDetail, MyLoans, NewLoan};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LoanRequest {
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub term_days: i32,
    pub purpose: String,
}

/// Body for pledges and repayments
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

pub async fn request(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(req): Json<LoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state
        .loans
        .request(
            &user,
            NewLoan {
                amount: req.amount,
                interest_rate: req.interest_rate,
                term_days: req.term_days,
                purpose: &req.purpose,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

pub async fn list_open(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.loans.list_open(query.limit, query.offset).await?))
}

pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<MyLoans>> {
    Ok(Json(state.loans.list_mine(&user).await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(loan_id): Path<Uuid>,
) -> AppResult<Json<LoanDetail>> {
    Ok(Json(state.loans.get(loan_id).await?))
}

pub async fn pledge(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(loan_id): Path<Uuid>,
    Json(req): Json<AmountRequest>,
) -> AppResult<Json<Loan>> {
    Ok(Json(state.loans.pledge(loan_id, &user, req.amount).await?))
}

pub async fn repay(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(loan_id): Path<Uuid>,
    Json(req): Json<AmountRequest>,
) -> AppResult<Json<Loan>> {
    Ok(Json(state.loans.repay(loan_id, &user, req.amount).await?))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(loan_id): Path<Uuid>,
) -> AppResult<Json<Loan>> {
    Ok(Json(state.loans.cancel(loan_id, &user).await?))
}
