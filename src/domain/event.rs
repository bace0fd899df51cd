//! Signed webhook envelopes from the payment provider.
//!
//! The raw body is verified against the signature header before any parsing,
//! then classified into a tagged union with one variant per recognized event
//! type. Unrecognized types land in `Unknown` and are acknowledged upstream
//! without any state change.

use super::booking::BookingDraft;
use super::money::{Amount, CommissionRate};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const EVENT_PAYMENT_INTENT_CREATED: &str = "payment_intent.created";
pub const EVENT_PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_PAYMENT_INTENT_CAPTURED: &str = "payment_intent.captured";
pub const EVENT_PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const EVENT_DISPUTE_CREATED: &str = "charge.dispute.created";
pub const EVENT_DISPUTE_CLOSED: &str = "charge.dispute.closed";
pub const EVENT_CHARGE_REFUNDED: &str = "charge.refunded";

/// Verifies a `t=<unix>,v1=<hex hmac>` header over `"{t}.{body}"`.
///
/// Rejects stale timestamps outside `tolerance` so a captured payload cannot
/// be replayed later.
pub fn verify_signature(
    secret: &str,
    body: &str,
    header: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<Vec<u8>> = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signature = hex::decode(value).ok(),
            _ => {}
        }
    }
    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(SettlementError::SignatureInvalid),
    };

    let age = (now.timestamp() - timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(SettlementError::SignatureInvalid);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SettlementError::SignatureInvalid)?;
    mac.update(format!("{timestamp}.{body}").as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| SettlementError::SignatureInvalid)
}

/// Produces the signature header for `body` at `timestamp`. Used by the
/// provider fake and by tests.
pub fn sign_payload(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{timestamp}.{body}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

/// The outer shape every provider event shares.
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[allow(dead_code)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// Booking metadata attached to a payment session at checkout time.
///
/// All values arrive as strings (provider metadata is a string map); parsing
/// into a `BookingDraft` is where completeness is enforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub product_id: Option<String>,
    pub host_id: Option<String>,
    pub guest_id: Option<String>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub guest_count: Option<String>,
    pub price_amount: Option<String>,
    pub commission_rate: Option<String>,
}

impl SessionMetadata {
    pub fn into_draft(self) -> Result<BookingDraft> {
        Ok(BookingDraft {
            product_id: parse_field("product_id", self.product_id, |s| Uuid::parse_str(s).ok())?,
            host_id: parse_field("host_id", self.host_id, |s| Uuid::parse_str(s).ok())?,
            guest_id: parse_field("guest_id", self.guest_id, |s| Uuid::parse_str(s).ok())?,
            check_in: parse_field("check_in", self.check_in, |s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
            })?,
            check_out: parse_field("check_out", self.check_out, |s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
            })?,
            guest_count: parse_field("guest_count", self.guest_count, |s| s.parse().ok())?,
            price: parse_field("price_amount", self.price_amount, |s| {
                s.parse().ok().and_then(|d| Amount::new(d).ok())
            })?,
            commission_rate: parse_field("commission_rate", self.commission_rate, |s| {
                s.parse().ok().and_then(|d| CommissionRate::new(d).ok())
            })?,
        })
    }
}

fn parse_field<T>(
    name: &str,
    value: Option<String>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T> {
    let raw = value.ok_or_else(|| SettlementError::MissingEventMetadata(name.to_string()))?;
    parse(&raw).ok_or_else(|| {
        SettlementError::MissingEventMetadata(format!("{name}: unparseable value {raw:?}"))
    })
}

/// A checkout session as returned by the provider, either inside a
/// `checkout.session.completed` event or from a session lookup during
/// booking reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    #[serde(rename = "payment_intent")]
    pub payment_ref: String,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    metadata: SessionMetadata,
}

#[derive(Debug, Deserialize)]
struct DisputeObject {
    payment_intent: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    payment_intent: String,
}

/// One variant per recognized provider event type.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    PaymentIntentCreated {
        payment_ref: String,
        metadata: SessionMetadata,
    },
    PaymentIntentSucceeded {
        payment_ref: String,
    },
    PaymentIntentCaptured {
        payment_ref: String,
    },
    PaymentIntentFailed {
        payment_ref: String,
    },
    CheckoutSessionCompleted(CheckoutSession),
    DisputeCreated {
        payment_ref: String,
    },
    DisputeClosed {
        payment_ref: String,
        merchant_won: bool,
    },
    ChargeRefunded {
        payment_ref: String,
    },
    Unknown {
        event_type: String,
    },
}

impl WebhookEvent {
    /// Classifies a verified event body. Unknown types parse successfully
    /// into `Unknown`; recognized types with a malformed payload are a
    /// metadata error.
    pub fn parse(body: &str) -> Result<Self> {
        let envelope: EventEnvelope = serde_json::from_str(body)
            .map_err(|e| SettlementError::MissingEventMetadata(format!("malformed envelope: {e}")))?;
        let object = envelope.data.object;

        let event = match envelope.event_type.as_str() {
            EVENT_PAYMENT_INTENT_CREATED => {
                let intent: PaymentIntentObject = from_object(object)?;
                Self::PaymentIntentCreated {
                    payment_ref: intent.id,
                    metadata: intent.metadata,
                }
            }
            EVENT_PAYMENT_INTENT_SUCCEEDED => {
                let intent: PaymentIntentObject = from_object(object)?;
                Self::PaymentIntentSucceeded {
                    payment_ref: intent.id,
                }
            }
            EVENT_PAYMENT_INTENT_CAPTURED => {
                let intent: PaymentIntentObject = from_object(object)?;
                Self::PaymentIntentCaptured {
                    payment_ref: intent.id,
                }
            }
            EVENT_PAYMENT_INTENT_FAILED => {
                let intent: PaymentIntentObject = from_object(object)?;
                Self::PaymentIntentFailed {
                    payment_ref: intent.id,
                }
            }
            EVENT_CHECKOUT_COMPLETED => Self::CheckoutSessionCompleted(from_object(object)?),
            EVENT_DISPUTE_CREATED => {
                let dispute: DisputeObject = from_object(object)?;
                Self::DisputeCreated {
                    payment_ref: dispute.payment_intent,
                }
            }
            EVENT_DISPUTE_CLOSED => {
                let dispute: DisputeObject = from_object(object)?;
                Self::DisputeClosed {
                    payment_ref: dispute.payment_intent,
                    merchant_won: dispute.status.as_deref() == Some("won"),
                }
            }
            EVENT_CHARGE_REFUNDED => {
                let charge: ChargeObject = from_object(object)?;
                Self::ChargeRefunded {
                    payment_ref: charge.payment_intent,
                }
            }
            other => Self::Unknown {
                event_type: other.to_string(),
            },
        };
        Ok(event)
    }
}

fn from_object<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> Result<T> {
    serde_json::from_value(object)
        .map_err(|e| SettlementError::MissingEventMetadata(format!("malformed payload: {e}")))
}
