//! Host balance derivation.
//!
//! A host's balance is never stored; it is re-derived from booking and
//! withdrawal history on every read. Earned money comes from paid,
//! non-cancelled bookings net of commission; every withdrawal request that
//! has not been rejected holds a claim against it.

use crate::config::WithdrawalSettings;
use crate::domain::money::Balance;
use crate::domain::ports::{BookingStoreRef, WithdrawalStoreRef};
use crate::domain::withdrawal::WithdrawalStatus;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HostBalance {
    pub total_earned: Balance,
    /// Claims held by all non-rejected withdrawal requests (paid included).
    pub reserved: Balance,
    /// The part of `reserved` an admin has committed to, approved or paid.
    pub committed: Balance,
    /// The part of `reserved` already paid out.
    pub withdrawn: Balance,
    pub available: Balance,
    pub can_withdraw_partial: bool,
    pub can_withdraw_full: bool,
}

pub struct BalanceCalculator {
    bookings: BookingStoreRef,
    withdrawals: WithdrawalStoreRef,
    partial_threshold: Decimal,
}

impl BalanceCalculator {
    pub fn new(
        bookings: BookingStoreRef,
        withdrawals: WithdrawalStoreRef,
        settings: &WithdrawalSettings,
    ) -> Self {
        Self {
            bookings,
            withdrawals,
            partial_threshold: settings.partial_threshold,
        }
    }

    /// Re-aggregates the host's balance from stored history.
    ///
    /// A read followed by a withdrawal insert is only safe when both happen
    /// under the withdrawal store's host lock; callers that are about to
    /// write must hold it before calling this.
    pub async fn balance_for(&self, host_id: Uuid) -> Result<HostBalance> {
        let mut total_earned = Balance::ZERO;
        for booking in self.bookings.for_host(host_id).await? {
            if booking.counts_toward_earnings() {
                total_earned += booking.host_earnings();
            }
        }

        let mut reserved = Balance::ZERO;
        let mut committed = Balance::ZERO;
        let mut withdrawn = Balance::ZERO;
        for request in self.withdrawals.for_user(host_id).await? {
            if request.reserves_balance() {
                reserved += request.amount.into();
            }
            match request.status {
                WithdrawalStatus::Approved => committed += request.amount.into(),
                WithdrawalStatus::Paid => {
                    committed += request.amount.into();
                    withdrawn += request.amount.into();
                }
                _ => {}
            }
        }

        let available = total_earned - reserved;
        Ok(HostBalance {
            total_earned,
            reserved,
            committed,
            withdrawn,
            available,
            can_withdraw_partial: available.value() >= self.partial_threshold,
            can_withdraw_full: available.value() > Decimal::ZERO,
        })
    }
}
