use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::AppError;
use crate::models::card::CardStatus;
use crate::services::access_guard::{self, Principal};
use crate::services::balance_ledger::{self, BalanceAction};
use crate::services::card_vault::{self, CardAction};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/cards", post(issue_card).get(list_cards))
        .route("/api/cards/status-requests", get(list_status_requests))
        .route("/api/cards/:card_id", axum::routing::delete(delete_card))
        .route("/api/cards/:card_id/status", axum::routing::patch(set_card_status))
        .route("/api/cards/:card_id/status-request", post(request_status_change))
        .route("/api/cards/:card_id/balance", get(get_balance).post(adjust_balance))
        .route("/api/transfers", post(transfer))
}

#[derive(Debug, Deserialize)]
struct IssueCardParams {
    owner_id: Uuid,
    validity_months: Option<u32>,
}

async fn issue_card(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<IssueCardParams>,
) -> Result<impl IntoResponse, AppError> {
    access_guard::require_admin(&principal)?;

    let card = card_vault::issue(
        &state.pool,
        &state.key_vault,
        &state.number_index,
        params.owner_id,
        params.validity_months,
        state.config.default_validity_months,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(card)))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<i64>,
    size: Option<i64>,
}

impl PageParams {
    fn limit_offset(&self) -> (i64, i64) {
        let size = self.size.unwrap_or(20).clamp(1, 100);
        let page = self.page.unwrap_or(0).max(0);

        (size, page * size)
    }
}

#[derive(Debug, Deserialize)]
struct ListCardsParams {
    status: Option<CardStatus>,
    page: Option<i64>,
    size: Option<i64>,
}

async fn list_cards(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListCardsParams>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = PageParams {
        page: params.page,
        size: params.size,
    }
    .limit_offset();

    let listing = card_vault::list(
        &state.pool,
        &state.key_vault,
        &principal,
        params.status,
        limit,
        offset,
    )
    .await?;

    Ok(Json(listing))
}

async fn list_status_requests(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    access_guard::require_admin(&principal)?;

    let (limit, offset) = params.limit_offset();
    let requests = card_vault::list_status_requests(&state.pool, limit, offset).await?;

    Ok(Json(requests))
}

async fn delete_card(
    State(state): State<AppState>,
    principal: Principal,
    Path(card_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    access_guard::require_admin(&principal)?;

    card_vault::delete(&state.pool, &state.key_vault, &state.number_index, card_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    action: CardAction,
}

async fn set_card_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(card_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, AppError> {
    access_guard::require_admin(&principal)?;

    card_vault::set_status(&state.pool, card_id, body.action).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn request_status_change(
    State(state): State<AppState>,
    principal: Principal,
    Path(card_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, AppError> {
    card_vault::request_status_change(&state.pool, &principal, card_id, body.action).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct BalanceResponse {
    balance: Decimal,
}

async fn get_balance(
    State(state): State<AppState>,
    principal: Principal,
    Path(card_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let balance = balance_ledger::get_balance(&state.pool, &principal, card_id).await?;

    Ok(Json(BalanceResponse { balance }))
}

#[derive(Debug, Deserialize)]
struct BalanceBody {
    action: BalanceAction,
    amount: Decimal,
}

async fn adjust_balance(
    State(state): State<AppState>,
    principal: Principal,
    Path(card_id): Path<Uuid>,
    Json(body): Json<BalanceBody>,
) -> Result<impl IntoResponse, AppError> {
    let balance =
        balance_ledger::adjust(&state.pool, &principal, card_id, body.action, body.amount).await?;

    Ok(Json(BalanceResponse { balance }))
}

#[derive(Debug, Deserialize)]
struct TransferBody {
    from: Uuid,
    to: Uuid,
    amount: Decimal,
}

async fn transfer(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<TransferBody>,
) -> Result<impl IntoResponse, AppError> {
    balance_ledger::transfer(&state.pool, &principal, body.from, body.to, body.amount).await?;

    Ok(StatusCode::NO_CONTENT)
}
