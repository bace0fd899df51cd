//! Host and administrative routes.
//!
//! Thin callers into the registry and the withdrawal engine; no business
//! rules live here.

use super::{into_api_error, ApiError, AppState};
use crate::application::balance::HostBalance;
use crate::application::withdrawals::BatchItemOutcome;
use crate::domain::money::Amount;
use crate::domain::payment_account::{PaymentAccount, PaymentDetails};
use crate::domain::withdrawal::{WithdrawalRequest, WithdrawalType};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentAccountPayload {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub details: PaymentDetails,
}

#[derive(Debug, Deserialize)]
pub struct AdminActionPayload {
    pub admin_id: Uuid,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetDefaultPayload {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalPayload {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub withdrawal_type: WithdrawalType,
    pub payment_account_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PayoutBatchPayload {
    pub request_ids: Vec<Uuid>,
}

pub async fn create_payment_account(
    State(state): State<AppState>,
    Json(payload): Json<CreatePaymentAccountPayload>,
) -> Result<(StatusCode, Json<PaymentAccount>), ApiError> {
    let account = state
        .registry
        .create(payload.user_id, payload.details)
        .await
        .map_err(into_api_error)?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn validate_payment_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<AdminActionPayload>,
) -> Result<Json<PaymentAccount>, ApiError> {
    let account = state
        .registry
        .validate(account_id, payload.admin_id)
        .await
        .map_err(into_api_error)?;
    Ok(Json(account))
}

pub async fn set_default_payment_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<SetDefaultPayload>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .set_default(payload.user_id, account_id)
        .await
        .map_err(into_api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn host_balance(
    State(state): State<AppState>,
    Path(host_id): Path<Uuid>,
) -> Result<Json<HostBalance>, ApiError> {
    let balance = state
        .balance
        .balance_for(host_id)
        .await
        .map_err(into_api_error)?;
    Ok(Json(balance))
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Json(payload): Json<CreateWithdrawalPayload>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), ApiError> {
    let amount = Amount::new(payload.amount).map_err(into_api_error)?;
    let request = state
        .withdrawal_engine
        .create(
            payload.user_id,
            amount,
            payload.withdrawal_type,
            payload.payment_account_id,
        )
        .await
        .map_err(into_api_error)?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_open_withdrawals(
    State(state): State<AppState>,
) -> Result<Json<Vec<WithdrawalRequest>>, ApiError> {
    let open = state
        .withdrawal_engine
        .list_open()
        .await
        .map_err(into_api_error)?;
    Ok(Json(open))
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<AdminActionPayload>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    let request = state
        .withdrawal_engine
        .approve(request_id, payload.admin_id, payload.note)
        .await
        .map_err(into_api_error)?;
    Ok(Json(request))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<AdminActionPayload>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    let request = state
        .withdrawal_engine
        .reject(request_id, payload.admin_id, payload.note)
        .await
        .map_err(into_api_error)?;
    Ok(Json(request))
}

pub async fn pay_withdrawal(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<WithdrawalRequest>, ApiError> {
    let request = state
        .withdrawal_engine
        .mark_paid(request_id)
        .await
        .map_err(into_api_error)?;
    Ok(Json(request))
}

pub async fn payout_batch(
    State(state): State<AppState>,
    Json(payload): Json<PayoutBatchPayload>,
) -> Json<Vec<BatchItemOutcome>> {
    Json(
        state
            .withdrawal_engine
            .mark_paid_batch(&payload.request_ids)
            .await,
    )
}
