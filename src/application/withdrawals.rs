//! Withdrawal request lifecycle.
//!
//! Creation re-reads the host's balance and inserts the request under the
//! store's per-host advisory lock, so two racing requests can never together
//! reserve more than the available balance: the loser observes the winner's
//! reservation and fails with `InsufficientBalance`. State transitions hold
//! the same lock, so a racing pair of admin decisions resolves to one winner
//! and one `InvalidTransition`, and approval re-reads the balance before
//! committing its claim.

use super::balance::BalanceCalculator;
use crate::domain::money::Amount;
use crate::domain::ports::{
    NotificationKind, NotifierRef, PaymentAccountStoreRef, WithdrawalStoreRef,
};
use crate::domain::withdrawal::{WithdrawalRequest, WithdrawalStatus, WithdrawalType};
use crate::error::{Result, SettlementError};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct WithdrawalEngine {
    withdrawals: WithdrawalStoreRef,
    accounts: PaymentAccountStoreRef,
    balance: Arc<BalanceCalculator>,
    notifier: NotifierRef,
}

/// Per-item result of a bulk payout run.
#[derive(Debug, Serialize)]
pub struct BatchItemOutcome {
    pub request_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
}

impl WithdrawalEngine {
    pub fn new(
        withdrawals: WithdrawalStoreRef,
        accounts: PaymentAccountStoreRef,
        balance: Arc<BalanceCalculator>,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            withdrawals,
            accounts,
            balance,
            notifier,
        }
    }

    /// Creates a withdrawal request against the host's current balance.
    ///
    /// Balance re-read and insert happen under one host lock. The payout
    /// account's fields are snapshotted into the request; the initial status
    /// is `AccountValidation` when the account is not yet admin-validated.
    pub async fn create(
        &self,
        user_id: Uuid,
        amount: Amount,
        withdrawal_type: WithdrawalType,
        account_id: Uuid,
    ) -> Result<WithdrawalRequest> {
        let account = self
            .accounts
            .get(account_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| {
                SettlementError::NotFound(format!("payment account {account_id} for user {user_id}"))
            })?;

        let _guard = self.withdrawals.lock_host(user_id).await;
        let balance = self.balance.balance_for(user_id).await?;

        let allowed = match withdrawal_type {
            WithdrawalType::PartialHalf => balance.can_withdraw_partial,
            WithdrawalType::Full => balance.can_withdraw_full,
        };
        if !allowed {
            return Err(SettlementError::InsufficientBalance {
                requested: amount.value(),
                available: balance.available.value(),
            });
        }

        let request = WithdrawalRequest::new(
            user_id,
            amount,
            balance.available,
            withdrawal_type,
            &account,
            Utc::now(),
        )?;
        self.withdrawals.insert(request.clone()).await?;
        info!(
            request_id = %request.id,
            %user_id,
            amount = %request.amount,
            status = ?request.status,
            "withdrawal request created"
        );
        Ok(request)
    }

    /// Approves a request from review. A request parked in account
    /// validation can only move on once its account has since been validated,
    /// and the amount must still be covered by the host's current earnings.
    pub async fn approve(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        note: Option<String>,
    ) -> Result<WithdrawalRequest> {
        let user_id = self.get(request_id).await?.user_id;
        let _guard = self.withdrawals.lock_host(user_id).await;
        let mut request = self.get(request_id).await?;
        if request.status == WithdrawalStatus::AccountValidation {
            let validated = self
                .accounts
                .get(request.payment_account_id)
                .await?
                .is_some_and(|a| a.is_validated);
            if !validated {
                return Err(SettlementError::InvalidTransition(format!(
                    "withdrawal {request_id} awaits validation of account {}",
                    request.payment_account_id
                )));
            }
        }

        // A refund or lost dispute may have clawed earnings back since the
        // request was created. Approved and paid claims must stay within
        // what the host is still owed.
        let balance = self.balance.balance_for(user_id).await?;
        if balance.committed + request.amount.into() > balance.total_earned {
            return Err(SettlementError::InsufficientBalance {
                requested: request.amount.value(),
                available: (balance.total_earned - balance.committed).value(),
            });
        }

        request.approve(note, Utc::now())?;
        self.withdrawals.update(request.clone()).await?;
        info!(request_id = %request.id, %admin_id, "withdrawal approved");
        self.notify_host(&request, NotificationKind::WithdrawalApproved)
            .await;
        Ok(request)
    }

    /// Rejects a request, immediately releasing its balance reservation.
    pub async fn reject(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        note: Option<String>,
    ) -> Result<WithdrawalRequest> {
        let user_id = self.get(request_id).await?.user_id;
        let _guard = self.withdrawals.lock_host(user_id).await;
        let mut request = self.get(request_id).await?;
        request.reject(note, Utc::now())?;
        self.withdrawals.update(request.clone()).await?;
        info!(request_id = %request.id, %admin_id, "withdrawal rejected");
        self.notify_host(&request, NotificationKind::WithdrawalRejected)
            .await;
        Ok(request)
    }

    /// Records payout execution. Past this point the reservation is
    /// permanent.
    pub async fn mark_paid(&self, request_id: Uuid) -> Result<WithdrawalRequest> {
        let user_id = self.get(request_id).await?.user_id;
        let _guard = self.withdrawals.lock_host(user_id).await;
        let mut request = self.get(request_id).await?;
        request.mark_paid(Utc::now())?;
        self.withdrawals.update(request.clone()).await?;
        info!(request_id = %request.id, "withdrawal paid out");
        self.notify_host(&request, NotificationKind::WithdrawalPaid)
            .await;
        Ok(request)
    }

    /// Bulk payout execution: each request independently, continuing past
    /// individual failures.
    pub async fn mark_paid_batch(&self, request_ids: &[Uuid]) -> Vec<BatchItemOutcome> {
        let mut outcomes = Vec::with_capacity(request_ids.len());
        for &request_id in request_ids {
            let outcome = match self.mark_paid(request_id).await {
                Ok(_) => BatchItemOutcome {
                    request_id,
                    success: true,
                    error: None,
                },
                Err(e) => {
                    warn!(%request_id, "batch payout item failed: {e}");
                    BatchItemOutcome {
                        request_id,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Requests awaiting an admin decision, review queue first.
    pub async fn list_open(&self) -> Result<Vec<WithdrawalRequest>> {
        let mut open = self
            .withdrawals
            .list_by_status(WithdrawalStatus::AccountValidation)
            .await?;
        open.extend(
            self.withdrawals
                .list_by_status(WithdrawalStatus::Pending)
                .await?,
        );
        open.sort_by_key(|r| r.created_at);
        Ok(open)
    }

    pub async fn get(&self, request_id: Uuid) -> Result<WithdrawalRequest> {
        self.withdrawals
            .get(request_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("withdrawal request {request_id}")))
    }

    async fn notify_host(&self, request: &WithdrawalRequest, kind: NotificationKind) {
        let variables = json!({
            "request_id": request.id,
            "amount": request.amount,
            "status": request.status,
        });
        if let Err(e) = self.notifier.notify(request.user_id, kind, variables).await {
            warn!(user_id = %request.user_id, ?kind, "notification delivery failed: {e}");
        }
    }
}
