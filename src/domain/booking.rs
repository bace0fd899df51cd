use super::money::{Amount, Balance, CommissionRate};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Unpaid,
    Paid,
    Disputed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Confirmed,
    Cancelled,
    CheckedOut,
}

/// A reservation of a listing for a date range, carrying its own payment and
/// lifecycle state.
///
/// Bookings are never deleted; cancellation is a state. Once set, the
/// `external_payment_ref` is immutable and unique across bookings — it is the
/// idempotency key for webhook replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub product_id: Uuid,
    pub host_id: Uuid,
    pub guest_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: u32,
    pub price: Amount,
    pub commission_rate: CommissionRate,
    pub external_payment_ref: Option<String>,
    pub payment_state: PaymentState,
    pub lifecycle_state: LifecycleState,
    /// Set when the provider captured the charge, which may lag payment
    /// success when capture is manual. Marks the booking payout-eligible.
    pub captured_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields a checkout session must carry for a booking to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDraft {
    pub product_id: Uuid,
    pub host_id: Uuid,
    pub guest_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: u32,
    pub price: Amount,
    pub commission_rate: CommissionRate,
}

impl Booking {
    /// A placeholder row created from a `payment_intent.created` event,
    /// before any money has moved.
    pub fn pending(draft: BookingDraft, payment_ref: String, now: DateTime<Utc>) -> Self {
        Self::from_draft(draft, payment_ref, PaymentState::Unpaid, now)
    }

    /// A booking created directly in the paid state, from a completed
    /// checkout session.
    pub fn paid(draft: BookingDraft, payment_ref: String, now: DateTime<Utc>) -> Self {
        Self::from_draft(draft, payment_ref, PaymentState::Paid, now)
    }

    fn from_draft(
        draft: BookingDraft,
        payment_ref: String,
        payment_state: PaymentState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: draft.product_id,
            host_id: draft.host_id,
            guest_id: draft.guest_id,
            check_in: draft.check_in,
            check_out: draft.check_out,
            guest_count: draft.guest_count,
            price: draft.price,
            commission_rate: draft.commission_rate,
            external_payment_ref: Some(payment_ref),
            payment_state,
            lifecycle_state: LifecycleState::Confirmed,
            captured_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Payment succeeded. Idempotent: re-applying to a paid booking changes
    /// nothing.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> bool {
        if self.payment_state == PaymentState::Paid
            && self.lifecycle_state == LifecycleState::Confirmed
        {
            return false;
        }
        self.payment_state = PaymentState::Paid;
        self.lifecycle_state = LifecycleState::Confirmed;
        self.updated_at = now;
        true
    }

    /// The charge was captured; the booking becomes payout-eligible.
    pub fn mark_captured(&mut self, now: DateTime<Utc>) -> bool {
        let changed = self.mark_paid(now) || self.captured_at.is_none();
        if self.captured_at.is_none() {
            self.captured_at = Some(now);
            self.updated_at = now;
        }
        changed
    }

    pub fn mark_payment_failed(&mut self, now: DateTime<Utc>) {
        self.payment_state = PaymentState::Unpaid;
        self.lifecycle_state = LifecycleState::Cancelled;
        self.updated_at = now;
    }

    /// A dispute provisionally reverses the paid state until resolution.
    pub fn open_dispute(&mut self, now: DateTime<Utc>) {
        self.payment_state = PaymentState::Disputed;
        self.lifecycle_state = LifecycleState::Cancelled;
        self.updated_at = now;
    }

    /// Dispute resolution: won by the merchant restores the booking, lost
    /// leaves it cancelled and unpaid.
    pub fn close_dispute(&mut self, won: bool, now: DateTime<Utc>) {
        if won {
            self.payment_state = PaymentState::Paid;
            self.lifecycle_state = LifecycleState::Confirmed;
        } else {
            self.payment_state = PaymentState::Unpaid;
            self.lifecycle_state = LifecycleState::Cancelled;
        }
        self.updated_at = now;
    }

    pub fn mark_refunded(&mut self, now: DateTime<Utc>) {
        self.payment_state = PaymentState::Refunded;
        self.lifecycle_state = LifecycleState::Cancelled;
        self.updated_at = now;
    }

    /// Whether this booking contributes to the host's earned balance.
    pub fn counts_toward_earnings(&self) -> bool {
        self.payment_state == PaymentState::Paid
            && self.lifecycle_state != LifecycleState::Cancelled
    }

    /// The host's share of the booking price, after commission.
    pub fn host_earnings(&self) -> Balance {
        self.commission_rate.host_share(self.price)
    }
}
