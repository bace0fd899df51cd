//! End-to-end settlement scenarios across the engines: provider events in,
//! balances and withdrawal decisions out.

use rust_decimal_macros::dec;
use staypay::application::accounts::PaymentAccountRegistry;
use staypay::application::balance::BalanceCalculator;
use staypay::application::booking_engine::BookingEngine;
use staypay::application::withdrawals::WithdrawalEngine;
use staypay::config::{RetryPolicy, WithdrawalSettings};
use staypay::domain::event::{CheckoutSession, SessionMetadata, WebhookEvent};
use staypay::domain::money::{Amount, Balance};
use staypay::domain::payment_account::PaymentDetails;
use staypay::domain::withdrawal::{WithdrawalStatus, WithdrawalType};
use staypay::error::SettlementError;
use staypay::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryPaymentAccountStore, InMemoryWithdrawalStore,
};
use staypay::infrastructure::notifier::TracingNotifier;
use staypay::infrastructure::provider::RecordedProviderClient;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    booking_engine: BookingEngine,
    withdrawal_engine: WithdrawalEngine,
    registry: PaymentAccountRegistry,
    balance: Arc<BalanceCalculator>,
    provider: Arc<RecordedProviderClient>,
    host: Uuid,
}

fn harness() -> Harness {
    let bookings = Arc::new(InMemoryBookingStore::new());
    let withdrawals = Arc::new(InMemoryWithdrawalStore::new());
    let accounts = Arc::new(InMemoryPaymentAccountStore::new());
    let provider = Arc::new(RecordedProviderClient::new());
    let notifier = Arc::new(TracingNotifier);

    let balance = Arc::new(BalanceCalculator::new(
        bookings.clone(),
        withdrawals.clone(),
        &WithdrawalSettings {
            partial_threshold: dec!(100),
        },
    ));
    Harness {
        booking_engine: BookingEngine::new(
            bookings,
            provider.clone(),
            notifier.clone(),
            RetryPolicy {
                attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        ),
        withdrawal_engine: WithdrawalEngine::new(
            withdrawals,
            accounts.clone(),
            balance.clone(),
            notifier,
        ),
        registry: PaymentAccountRegistry::new(accounts),
        balance,
        provider,
        host: Uuid::new_v4(),
    }
}

impl Harness {
    fn metadata(&self, price: &str) -> SessionMetadata {
        SessionMetadata {
            product_id: Some(Uuid::new_v4().to_string()),
            host_id: Some(self.host.to_string()),
            guest_id: Some(Uuid::new_v4().to_string()),
            check_in: Some("2026-09-01".into()),
            check_out: Some("2026-09-05".into()),
            guest_count: Some("2".into()),
            price_amount: Some(price.into()),
            commission_rate: Some("0.10".into()),
        }
    }

    async fn paid_booking(&self, payment_ref: &str, price: &str) {
        self.booking_engine
            .apply(WebhookEvent::CheckoutSessionCompleted(CheckoutSession {
                payment_ref: payment_ref.into(),
                metadata: self.metadata(price),
            }))
            .await
            .unwrap();
    }

    async fn available(&self) -> Balance {
        self.balance.balance_for(self.host).await.unwrap().available
    }

    async fn validated_account(&self) -> Uuid {
        let account = self
            .registry
            .create(
                self.host,
                PaymentDetails::DigitalWallet {
                    wallet_email: "host@pay.example".into(),
                },
            )
            .await
            .unwrap();
        self.registry
            .validate(account.id, Uuid::new_v4())
            .await
            .unwrap();
        account.id
    }
}

#[tokio::test]
async fn booking_payment_flows_into_withdrawable_balance() {
    let h = harness();
    // price 200, commission 10%: the host earns 180.
    h.paid_booking("pi_1", "200").await;
    assert_eq!(h.available().await, Balance::new(dec!(180.0)));

    let account_id = h.validated_account().await;
    let request = h
        .withdrawal_engine
        .create(
            h.host,
            Amount::new(dec!(100)).unwrap(),
            WithdrawalType::PartialHalf,
            account_id,
        )
        .await
        .unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(h.available().await, Balance::new(dec!(80.0)));

    let admin = Uuid::new_v4();
    h.withdrawal_engine
        .approve(request.id, admin, Some("payout run 34".into()))
        .await
        .unwrap();
    h.withdrawal_engine.mark_paid(request.id).await.unwrap();

    let balance = h.balance.balance_for(h.host).await.unwrap();
    assert_eq!(balance.withdrawn, Balance::new(dec!(100)));
    assert_eq!(balance.available, Balance::new(dec!(80.0)));
}

#[tokio::test]
async fn replayed_webhook_leaves_balance_unchanged() {
    let h = harness();
    h.paid_booking("pi_1", "200").await;
    let once = h.available().await;

    h.paid_booking("pi_1", "200").await;
    h.booking_engine
        .apply(WebhookEvent::PaymentIntentSucceeded {
            payment_ref: "pi_1".into(),
        })
        .await
        .unwrap();

    assert_eq!(h.available().await, once);
}

#[tokio::test]
async fn dispute_cycle_suspends_then_restores_earnings() {
    let h = harness();
    h.paid_booking("pi_1", "200").await;
    assert_eq!(h.available().await, Balance::new(dec!(180.0)));

    h.booking_engine
        .apply(WebhookEvent::DisputeCreated {
            payment_ref: "pi_1".into(),
        })
        .await
        .unwrap();
    assert_eq!(h.available().await, Balance::ZERO);

    h.booking_engine
        .apply(WebhookEvent::DisputeClosed {
            payment_ref: "pi_1".into(),
            merchant_won: true,
        })
        .await
        .unwrap();
    assert_eq!(h.available().await, Balance::new(dec!(180.0)));
}

#[tokio::test]
async fn lost_dispute_keeps_earnings_out() {
    let h = harness();
    h.paid_booking("pi_1", "200").await;
    h.booking_engine
        .apply(WebhookEvent::DisputeCreated {
            payment_ref: "pi_1".into(),
        })
        .await
        .unwrap();
    h.booking_engine
        .apply(WebhookEvent::DisputeClosed {
            payment_ref: "pi_1".into(),
            merchant_won: false,
        })
        .await
        .unwrap();
    assert_eq!(h.available().await, Balance::ZERO);
}

#[tokio::test]
async fn out_of_order_success_event_reconstructs_booking() {
    let h = harness();
    h.provider.record_session(CheckoutSession {
        payment_ref: "pi_race".into(),
        metadata: h.metadata("200"),
    });

    h.booking_engine
        .apply(WebhookEvent::PaymentIntentSucceeded {
            payment_ref: "pi_race".into(),
        })
        .await
        .unwrap();

    assert_eq!(h.available().await, Balance::new(dec!(180.0)));
}

#[tokio::test]
async fn create_then_reject_is_a_balance_round_trip() {
    let h = harness();
    h.paid_booking("pi_1", "200").await;
    let account_id = h.validated_account().await;
    let before = h.available().await;

    let request = h
        .withdrawal_engine
        .create(
            h.host,
            Amount::new(dec!(150)).unwrap(),
            WithdrawalType::Full,
            account_id,
        )
        .await
        .unwrap();
    assert_ne!(h.available().await, before);

    h.withdrawal_engine
        .reject(request.id, Uuid::new_v4(), Some("account mismatch".into()))
        .await
        .unwrap();
    assert_eq!(h.available().await, before);
}

#[tokio::test]
async fn refund_claws_back_unreserved_earnings() {
    let h = harness();
    h.paid_booking("pi_1", "200").await;
    h.booking_engine
        .apply(WebhookEvent::ChargeRefunded {
            payment_ref: "pi_1".into(),
        })
        .await
        .unwrap();
    assert_eq!(h.available().await, Balance::ZERO);

    let account_id = h.validated_account().await;
    let result = h
        .withdrawal_engine
        .create(
            h.host,
            Amount::new(dec!(10)).unwrap(),
            WithdrawalType::Full,
            account_id,
        )
        .await;
    assert!(matches!(
        result,
        Err(SettlementError::InsufficientBalance { .. })
    ));
}

#[tokio::test]
async fn refund_between_request_and_approval_blocks_the_payout() {
    let h = harness();
    h.paid_booking("pi_1", "200").await;
    let account_id = h.validated_account().await;
    let request = h
        .withdrawal_engine
        .create(
            h.host,
            Amount::new(dec!(180)).unwrap(),
            WithdrawalType::Full,
            account_id,
        )
        .await
        .unwrap();

    h.booking_engine
        .apply(WebhookEvent::ChargeRefunded {
            payment_ref: "pi_1".into(),
        })
        .await
        .unwrap();

    let result = h
        .withdrawal_engine
        .approve(request.id, Uuid::new_v4(), None)
        .await;
    assert!(matches!(
        result,
        Err(SettlementError::InsufficientBalance { .. })
    ));

    let balance = h.balance.balance_for(h.host).await.unwrap();
    assert_eq!(balance.total_earned, Balance::ZERO);
    assert_eq!(balance.committed, Balance::ZERO);
}

#[tokio::test]
async fn committed_withdrawals_never_exceed_earnings_across_bookings() {
    let h = harness();
    h.paid_booking("pi_1", "200").await; // 180
    h.paid_booking("pi_2", "100").await; // 90
    let account_id = h.validated_account().await;
    let admin = Uuid::new_v4();

    let mut committed = dec!(0);
    for amount in [dec!(120), dec!(120), dec!(120)] {
        if let Ok(request) = h
            .withdrawal_engine
            .create(
                h.host,
                Amount::new(amount).unwrap(),
                WithdrawalType::Full,
                account_id,
            )
            .await
        {
            h.withdrawal_engine
                .approve(request.id, admin, None)
                .await
                .unwrap();
            committed += amount;
        }
    }

    let balance = h.balance.balance_for(h.host).await.unwrap();
    assert!(committed <= balance.total_earned.value());
    assert_eq!(committed, dec!(240)); // two of three fit under 270
}
