//! In-memory store adapters.
//!
//! Thread-safe `Arc<RwLock<HashMap>>` implementations of the store ports,
//! with keyed advisory locks for the critical sections the engines rely on
//! (per-payment-ref webhook serialization, per-host balance writes) and a
//! unique index on the booking payment ref.

use crate::domain::booking::Booking;
use crate::domain::payment_account::PaymentAccount;
use crate::domain::ports::{
    AdvisoryGuard, BookingStore, PaymentAccountStore, WithdrawalStore,
};
use crate::domain::withdrawal::{WithdrawalRequest, WithdrawalStatus};
use crate::error::{Result, SettlementError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// One advisory mutex per key, created on first use.
struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: K) -> AdvisoryGuard {
        let lock = self
            .locks
            .lock()
            .await
            .entry(key)
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

#[derive(Default)]
struct BookingTable {
    by_id: HashMap<Uuid, Booking>,
    /// Unique index: one booking per external payment ref.
    by_payment_ref: HashMap<String, Uuid>,
}

pub struct InMemoryBookingStore {
    table: Arc<RwLock<BookingTable>>,
    ref_locks: KeyedLocks<String>,
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(BookingTable::default())),
            ref_locks: KeyedLocks::new(),
        }
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: Booking) -> Result<()> {
        let mut table = self.table.write().await;
        if let Some(payment_ref) = &booking.external_payment_ref {
            if table.by_payment_ref.contains_key(payment_ref) {
                return Err(SettlementError::ConcurrentBalanceViolation(format!(
                    "payment ref {payment_ref}"
                )));
            }
            table
                .by_payment_ref
                .insert(payment_ref.clone(), booking.id);
        }
        table.by_id.insert(booking.id, booking);
        Ok(())
    }

    async fn update(&self, booking: Booking) -> Result<()> {
        let mut table = self.table.write().await;
        let existing = table
            .by_id
            .get(&booking.id)
            .ok_or_else(|| SettlementError::NotFound(format!("booking {}", booking.id)))?;
        // A payment ref, once set, never changes.
        if existing.external_payment_ref.is_some()
            && existing.external_payment_ref != booking.external_payment_ref
        {
            return Err(SettlementError::StoreError(format!(
                "attempted to change payment ref of booking {}",
                booking.id
            )));
        }
        table.by_id.insert(booking.id, booking);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>> {
        Ok(self.table.read().await.by_id.get(&id).cloned())
    }

    async fn find_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Booking>> {
        let table = self.table.read().await;
        Ok(table
            .by_payment_ref
            .get(payment_ref)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn for_host(&self, host_id: Uuid) -> Result<Vec<Booking>> {
        Ok(self
            .table
            .read()
            .await
            .by_id
            .values()
            .filter(|b| b.host_id == host_id)
            .cloned()
            .collect())
    }

    async fn lock_payment_ref(&self, payment_ref: &str) -> AdvisoryGuard {
        self.ref_locks.acquire(payment_ref.to_string()).await
    }
}

pub struct InMemoryPaymentAccountStore {
    accounts: Arc<RwLock<HashMap<Uuid, PaymentAccount>>>,
    user_locks: KeyedLocks<Uuid>,
}

impl Default for InMemoryPaymentAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            user_locks: KeyedLocks::new(),
        }
    }
}

#[async_trait]
impl PaymentAccountStore for InMemoryPaymentAccountStore {
    async fn insert(&self, account: PaymentAccount) -> Result<()> {
        self.accounts.write().await.insert(account.id, account);
        Ok(())
    }

    async fn update(&self, account: PaymentAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if !accounts.contains_key(&account.id) {
            return Err(SettlementError::NotFound(format!(
                "payment account {}",
                account.id
            )));
        }
        accounts.insert(account.id, account);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentAccount>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn for_user(&self, user_id: Uuid) -> Result<Vec<PaymentAccount>> {
        let mut accounts: Vec<_> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn lock_user(&self, user_id: Uuid) -> AdvisoryGuard {
        self.user_locks.acquire(user_id).await
    }
}

pub struct InMemoryWithdrawalStore {
    requests: Arc<RwLock<HashMap<Uuid, WithdrawalRequest>>>,
    host_locks: KeyedLocks<Uuid>,
}

impl Default for InMemoryWithdrawalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWithdrawalStore {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            host_locks: KeyedLocks::new(),
        }
    }
}

#[async_trait]
impl WithdrawalStore for InMemoryWithdrawalStore {
    async fn insert(&self, request: WithdrawalRequest) -> Result<()> {
        self.requests.write().await.insert(request.id, request);
        Ok(())
    }

    async fn update(&self, request: WithdrawalRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        if !requests.contains_key(&request.id) {
            return Err(SettlementError::NotFound(format!(
                "withdrawal request {}",
                request.id
            )));
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WithdrawalRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn for_user(&self, user_id: Uuid) -> Result<Vec<WithdrawalRequest>> {
        Ok(self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: WithdrawalStatus) -> Result<Vec<WithdrawalRequest>> {
        Ok(self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn lock_host(&self, host_id: Uuid) -> AdvisoryGuard {
        self.host_locks.acquire(host_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::BookingDraft;
    use crate::domain::money::{Amount, CommissionRate};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn booking(payment_ref: &str) -> Booking {
        Booking::paid(
            BookingDraft {
                product_id: Uuid::new_v4(),
                host_id: Uuid::new_v4(),
                guest_id: Uuid::new_v4(),
                check_in: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                check_out: NaiveDate::from_ymd_opt(2026, 9, 5).unwrap(),
                guest_count: 2,
                price: Amount::new(dec!(200)).unwrap(),
                commission_rate: CommissionRate::new(dec!(0.10)).unwrap(),
            },
            payment_ref.into(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn payment_ref_index_is_unique() {
        let store = InMemoryBookingStore::new();
        store.insert(booking("pi_1")).await.unwrap();

        let duplicate = store.insert(booking("pi_1")).await;
        assert!(matches!(
            duplicate,
            Err(SettlementError::ConcurrentBalanceViolation(_))
        ));
    }

    #[tokio::test]
    async fn payment_ref_is_immutable_on_update() {
        let store = InMemoryBookingStore::new();
        let mut b = booking("pi_1");
        store.insert(b.clone()).await.unwrap();

        b.external_payment_ref = Some("pi_other".into());
        assert!(matches!(
            store.update(b).await,
            Err(SettlementError::StoreError(_))
        ));
    }

    #[tokio::test]
    async fn advisory_lock_serializes_same_key_only() {
        let store = Arc::new(InMemoryBookingStore::new());

        let guard = store.lock_payment_ref("pi_1").await;
        // A different key is not blocked.
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock_payment_ref("pi_2"),
        )
        .await;
        assert!(other.is_ok());

        // The same key is blocked until the guard drops.
        let same = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock_payment_ref("pi_1"),
        )
        .await;
        assert!(same.is_err());

        drop(guard);
        let reacquired = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.lock_payment_ref("pi_1"),
        )
        .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let store = InMemoryBookingStore::new();
        assert!(matches!(
            store.update(booking("pi_1")).await,
            Err(SettlementError::NotFound(_))
        ));
    }
}
