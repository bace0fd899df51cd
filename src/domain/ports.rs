//! Boundary traits between the settlement core and its collaborators.
//!
//! Every store is constructed once at process start and passed in, so there
//! is no hidden global client and tests can substitute fakes per component.

use super::booking::Booking;
use super::event::CheckoutSession;
use super::payment_account::PaymentAccount;
use super::withdrawal::{WithdrawalRequest, WithdrawalStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

pub type BookingStoreRef = Arc<dyn BookingStore>;
pub type PaymentAccountStoreRef = Arc<dyn PaymentAccountStore>;
pub type WithdrawalStoreRef = Arc<dyn WithdrawalStore>;
pub type ProviderClientRef = Arc<dyn PaymentProviderClient>;
pub type NotifierRef = Arc<dyn NotificationSender>;

/// An advisory lock token. Holding it serializes writers for one key;
/// dropping it releases the key.
pub type AdvisoryGuard = OwnedMutexGuard<()>;

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts a new booking. Fails with `ConcurrentBalanceViolation` if a
    /// booking with the same payment ref already exists (unique index).
    async fn insert(&self, booking: Booking) -> Result<()>;
    async fn update(&self, booking: Booking) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Booking>>;
    async fn find_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Booking>>;
    async fn for_host(&self, host_id: Uuid) -> Result<Vec<Booking>>;
    /// Serializes webhook processing for one payment ref. Processing for
    /// different refs proceeds in parallel.
    async fn lock_payment_ref(&self, payment_ref: &str) -> AdvisoryGuard;
}

#[async_trait]
pub trait PaymentAccountStore: Send + Sync {
    async fn insert(&self, account: PaymentAccount) -> Result<()>;
    async fn update(&self, account: PaymentAccount) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PaymentAccount>>;
    async fn for_user(&self, user_id: Uuid) -> Result<Vec<PaymentAccount>>;
    /// Serializes default-flag changes per user so exactly one default
    /// survives concurrent writes.
    async fn lock_user(&self, user_id: Uuid) -> AdvisoryGuard;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    async fn insert(&self, request: WithdrawalRequest) -> Result<()>;
    async fn update(&self, request: WithdrawalRequest) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<WithdrawalRequest>>;
    async fn for_user(&self, user_id: Uuid) -> Result<Vec<WithdrawalRequest>>;
    async fn list_by_status(&self, status: WithdrawalStatus) -> Result<Vec<WithdrawalRequest>>;
    /// Serializes balance-affecting writes for one host. The balance
    /// re-check and the request insert must both happen under this guard.
    async fn lock_host(&self, host_id: Uuid) -> AdvisoryGuard;
}

/// Outbound calls to the payment provider.
#[async_trait]
pub trait PaymentProviderClient: Send + Sync {
    /// Looks up the checkout session attached to a payment ref, used to
    /// reconstruct a booking when a success event races ahead of the
    /// checkout-completed event.
    async fn find_session_by_payment_ref(
        &self,
        payment_ref: &str,
    ) -> Result<Option<CheckoutSession>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentFailed,
    DisputeOpened,
    RefundIssued,
    WithdrawalApproved,
    WithdrawalRejected,
    WithdrawalPaid,
}

/// Fire-and-forget notification delivery. Failures are logged by callers and
/// never block a state transition.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn notify(
        &self,
        recipient: Uuid,
        kind: NotificationKind,
        variables: serde_json::Value,
    ) -> Result<()>;
}
