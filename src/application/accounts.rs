//! Payout-destination registry.

use crate::domain::payment_account::{PaymentAccount, PaymentDetails};
use crate::domain::ports::PaymentAccountStoreRef;
use crate::error::{Result, SettlementError};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

pub struct PaymentAccountRegistry {
    accounts: PaymentAccountStoreRef,
}

impl PaymentAccountRegistry {
    pub fn new(accounts: PaymentAccountStoreRef) -> Self {
        Self { accounts }
    }

    /// Registers a payout destination. Field completeness is checked against
    /// the method's required shape; the user's first account becomes the
    /// default automatically.
    pub async fn create(&self, user_id: Uuid, details: PaymentDetails) -> Result<PaymentAccount> {
        let _guard = self.accounts.lock_user(user_id).await;
        let is_first = self.accounts.for_user(user_id).await?.is_empty();
        let account = PaymentAccount::new(user_id, details, is_first, Utc::now())?;
        self.accounts.insert(account.clone()).await?;
        info!(%user_id, account_id = %account.id, method = ?account.method(), "payment account created");
        Ok(account)
    }

    /// Makes `account_id` the user's default, flipping the previous default
    /// off in the same locked section.
    pub async fn set_default(&self, user_id: Uuid, account_id: Uuid) -> Result<()> {
        let _guard = self.accounts.lock_user(user_id).await;
        let accounts = self.accounts.for_user(user_id).await?;
        if !accounts.iter().any(|a| a.id == account_id) {
            return Err(SettlementError::NotFound(format!(
                "payment account {account_id} for user {user_id}"
            )));
        }
        let now = Utc::now();
        for mut account in accounts {
            let should_be_default = account.id == account_id;
            if account.is_default != should_be_default {
                account.is_default = should_be_default;
                account.updated_at = now;
                self.accounts.update(account).await?;
            }
        }
        Ok(())
    }

    /// Admin validation of a payout destination. Idempotent; a precondition
    /// for withdrawals to leave account-validation review.
    pub async fn validate(&self, account_id: Uuid, admin_id: Uuid) -> Result<PaymentAccount> {
        let mut account = self.get(account_id).await?;
        account.mark_validated(admin_id, Utc::now());
        self.accounts.update(account.clone()).await?;
        info!(account_id = %account.id, %admin_id, "payment account validated");
        Ok(account)
    }

    pub async fn get(&self, account_id: Uuid) -> Result<PaymentAccount> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("payment account {account_id}")))
    }

    pub async fn for_user(&self, user_id: Uuid) -> Result<Vec<PaymentAccount>> {
        self.accounts.for_user(user_id).await
    }
}
