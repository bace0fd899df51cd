//! Payment-provider webhook endpoint.
//!
//! Verification happens on the raw body before any parsing. Acknowledgement
//! policy: 400 only for an invalid signature or a recognized event with
//! broken metadata, 5xx only for infrastructure failures (the one case where
//! provider redelivery helps), 200 for everything else — including bookings
//! we could not find, which are fixed by reconciliation rather than by
//! blocking the provider's retry queue.

use super::AppState;
use crate::domain::event::{self, WebhookEvent};
use crate::error::SettlementError;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, warn};

pub const SIGNATURE_HEADER: &str = "payment-signature";

pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Err(e) = event::verify_signature(
        &state.webhook.signing_secret,
        &body,
        signature,
        state.webhook.timestamp_tolerance,
        Utc::now(),
    ) {
        warn!("rejected webhook: {e}");
        return reply(StatusCode::BAD_REQUEST, "invalid signature");
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(e) => {
            // Kept for manual review; the provider cannot fix this payload
            // by redelivering it.
            warn!("unprocessable webhook payload: {e}");
            return reply(StatusCode::BAD_REQUEST, "unprocessable event");
        }
    };

    match state.booking_engine.apply(event).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))),
        Err(SettlementError::MissingEventMetadata(field)) => {
            warn!(%field, "event metadata incomplete, flagged for review");
            reply(StatusCode::BAD_REQUEST, "missing event metadata")
        }
        Err(SettlementError::StoreError(e)) => {
            error!("store failure during webhook processing: {e}");
            reply(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable")
        }
        Err(SettlementError::IoError(e)) => {
            error!("infrastructure failure during webhook processing: {e}");
            reply(StatusCode::INTERNAL_SERVER_ERROR, "infrastructure error")
        }
        // Durably recorded or recoverable by reconciliation: acknowledge so
        // the provider does not storm us with redeliveries.
        Err(e) => {
            error!("webhook business effect failed, acknowledging anyway: {e}");
            (StatusCode::OK, Json(json!({ "received": true })))
        }
    }
}

fn reply(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}
