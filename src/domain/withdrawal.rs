use super::money::{Amount, Balance};
use super::payment_account::{PaymentAccount, PaymentDetails, PaymentMethod};
use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    AccountValidation,
    Approved,
    Paid,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalType {
    PartialHalf,
    Full,
}

/// A host's request to move part of their available balance to a payout
/// destination.
///
/// `payment_details` is an immutable snapshot of the account's fields at
/// request time; later edits to the account never change it. Every status
/// except `Rejected` holds a claim on the host's balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Amount,
    /// Available balance observed when the request was created, kept for
    /// audit.
    pub available_balance_snapshot: Balance,
    pub withdrawal_type: WithdrawalType,
    pub payment_account_id: Uuid,
    pub payment_method: PaymentMethod,
    pub payment_details: PaymentDetails,
    pub status: WithdrawalStatus,
    pub admin_notes: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    /// Builds a new request snapshotting the payout account. The initial
    /// status depends on whether the account has been admin-validated.
    pub fn new(
        user_id: Uuid,
        amount: Amount,
        available: Balance,
        withdrawal_type: WithdrawalType,
        account: &PaymentAccount,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if Balance::from(amount) > available {
            return Err(SettlementError::InsufficientBalance {
                requested: amount.value(),
                available: available.value(),
            });
        }
        let status = if account.is_validated {
            WithdrawalStatus::Pending
        } else {
            WithdrawalStatus::AccountValidation
        };
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            available_balance_snapshot: available,
            withdrawal_type,
            payment_account_id: account.id,
            payment_method: account.method(),
            payment_details: account.details.clone(),
            status,
            admin_notes: None,
            processed_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether this request still holds a claim on the host's balance.
    pub fn reserves_balance(&self) -> bool {
        self.status != WithdrawalStatus::Rejected
    }

    pub fn approve(&mut self, note: Option<String>, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            WithdrawalStatus::Pending | WithdrawalStatus::AccountValidation => {
                self.status = WithdrawalStatus::Approved;
                self.admin_notes = note;
                self.processed_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            other => Err(SettlementError::InvalidTransition(format!(
                "cannot approve withdrawal in status {other:?}"
            ))),
        }
    }

    /// Marks the payout executed. From this point the reservation is
    /// permanent; rejection is no longer possible.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            WithdrawalStatus::Approved => {
                self.status = WithdrawalStatus::Paid;
                self.paid_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            other => Err(SettlementError::InvalidTransition(format!(
                "cannot mark paid withdrawal in status {other:?}"
            ))),
        }
    }

    pub fn reject(&mut self, note: Option<String>, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            WithdrawalStatus::Pending
            | WithdrawalStatus::AccountValidation
            | WithdrawalStatus::Approved => {
                self.status = WithdrawalStatus::Rejected;
                self.admin_notes = note;
                self.processed_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            other => Err(SettlementError::InvalidTransition(format!(
                "cannot reject withdrawal in status {other:?}"
            ))),
        }
    }
}
