//! HTTP surface: the provider webhook endpoint plus the thin host/admin
//! routes over the settlement engines.

pub mod admin;
pub mod webhook;

use crate::application::accounts::PaymentAccountRegistry;
use crate::application::balance::BalanceCalculator;
use crate::application::booking_engine::BookingEngine;
use crate::application::withdrawals::WithdrawalEngine;
use crate::config::WebhookSettings;
use crate::error::SettlementError;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub booking_engine: Arc<BookingEngine>,
    pub withdrawal_engine: Arc<WithdrawalEngine>,
    pub registry: Arc<PaymentAccountRegistry>,
    pub balance: Arc<BalanceCalculator>,
    pub webhook: WebhookSettings,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/payments", post(webhook::handle_payment_webhook))
        .route("/payment-accounts", post(admin::create_payment_account))
        .route(
            "/payment-accounts/{id}/validate",
            post(admin::validate_payment_account),
        )
        .route(
            "/payment-accounts/{id}/default",
            post(admin::set_default_payment_account),
        )
        .route("/hosts/{id}/balance", get(admin::host_balance))
        .route("/withdrawals", post(admin::create_withdrawal))
        .route("/withdrawals/pending", get(admin::list_open_withdrawals))
        .route("/withdrawals/{id}/approve", post(admin::approve_withdrawal))
        .route("/withdrawals/{id}/reject", post(admin::reject_withdrawal))
        .route("/withdrawals/{id}/pay", post(admin::pay_withdrawal))
        .route("/withdrawals/payout-batch", post(admin::payout_batch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Maps the settlement taxonomy onto response codes for the host/admin
/// routes. The webhook endpoint has its own acknowledgement policy.
pub fn into_api_error(err: SettlementError) -> ApiError {
    let status = match &err {
        SettlementError::SignatureInvalid
        | SettlementError::MissingEventMetadata(_)
        | SettlementError::InvalidPaymentAccountFields(_)
        | SettlementError::ValidationError(_) => StatusCode::BAD_REQUEST,
        SettlementError::NotFound(_) | SettlementError::BookingNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        SettlementError::InsufficientBalance { .. }
        | SettlementError::InvalidTransition(_)
        | SettlementError::ConcurrentBalanceViolation(_) => StatusCode::CONFLICT,
        SettlementError::StoreError(_) | SettlementError::IoError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
