//! Booking payment state machine.
//!
//! Consumes verified provider events and drives each booking's
//! lifecycle/payment state. Events can arrive duplicated and out of order:
//! processing is serialized per payment ref, creation is a find-or-create
//! keyed on the ref, and a success event racing ahead of its checkout event
//! reconstructs the booking from the provider's session.

use crate::config::RetryPolicy;
use crate::domain::booking::Booking;
use crate::domain::event::{SessionMetadata, WebhookEvent};
use crate::domain::ports::{
    BookingStoreRef, NotificationKind, NotifierRef, ProviderClientRef,
};
use crate::error::{Result, SettlementError};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct BookingEngine {
    bookings: BookingStoreRef,
    provider: ProviderClientRef,
    notifier: NotifierRef,
    lookup_retry: RetryPolicy,
}

impl BookingEngine {
    pub fn new(
        bookings: BookingStoreRef,
        provider: ProviderClientRef,
        notifier: NotifierRef,
        lookup_retry: RetryPolicy,
    ) -> Self {
        Self {
            bookings,
            provider,
            notifier,
            lookup_retry,
        }
    }

    /// Applies one verified event. Replaying the same event is a no-op: no
    /// second booking, no double transition.
    pub async fn apply(&self, event: WebhookEvent) -> Result<()> {
        let Some(payment_ref) = event_payment_ref(&event) else {
            if let WebhookEvent::Unknown { event_type } = &event {
                debug!(%event_type, "ignoring unrecognized event type");
            }
            return Ok(());
        };
        let payment_ref = payment_ref.to_string();

        // Serialize per ref; different bookings proceed in parallel.
        let _guard = self.bookings.lock_payment_ref(&payment_ref).await;

        match event {
            WebhookEvent::PaymentIntentCreated { metadata, .. } => {
                self.handle_intent_created(&payment_ref, metadata).await
            }
            WebhookEvent::CheckoutSessionCompleted(session) => {
                self.handle_checkout_completed(&payment_ref, session.metadata)
                    .await
            }
            WebhookEvent::PaymentIntentSucceeded { .. } => {
                self.handle_payment_succeeded(&payment_ref).await
            }
            WebhookEvent::PaymentIntentCaptured { .. } => {
                self.handle_payment_captured(&payment_ref).await
            }
            WebhookEvent::PaymentIntentFailed { .. } => {
                self.handle_payment_failed(&payment_ref).await
            }
            WebhookEvent::DisputeCreated { .. } => self.handle_dispute_created(&payment_ref).await,
            WebhookEvent::DisputeClosed { merchant_won, .. } => {
                self.handle_dispute_closed(&payment_ref, merchant_won).await
            }
            WebhookEvent::ChargeRefunded { .. } => self.handle_refunded(&payment_ref).await,
            WebhookEvent::Unknown { .. } => unreachable!("filtered above"),
        }
    }

    /// Pre-capture placeholder: a confirmed, unpaid booking.
    async fn handle_intent_created(
        &self,
        payment_ref: &str,
        metadata: SessionMetadata,
    ) -> Result<()> {
        if self.bookings.find_by_payment_ref(payment_ref).await?.is_some() {
            return Ok(());
        }
        if metadata == SessionMetadata::default() {
            // Intents created outside our checkout carry no metadata; the
            // checkout event will create the booking.
            debug!(payment_ref, "intent without metadata, deferring creation");
            return Ok(());
        }
        let draft = metadata.into_draft()?;
        let booking = Booking::pending(draft, payment_ref.to_string(), Utc::now());
        info!(payment_ref, booking_id = %booking.id, "created placeholder booking");
        self.bookings.insert(booking).await
    }

    async fn handle_checkout_completed(
        &self,
        payment_ref: &str,
        metadata: SessionMetadata,
    ) -> Result<()> {
        match self.bookings.find_by_payment_ref(payment_ref).await? {
            Some(mut booking) => {
                if booking.mark_paid(Utc::now()) {
                    self.bookings.update(booking).await?;
                }
                Ok(())
            }
            None => {
                let draft = metadata.into_draft()?;
                let booking = Booking::paid(draft, payment_ref.to_string(), Utc::now());
                info!(payment_ref, booking_id = %booking.id, "created booking from checkout session");
                self.bookings.insert(booking).await
            }
        }
    }

    async fn handle_payment_succeeded(&self, payment_ref: &str) -> Result<()> {
        if let Some(mut booking) = self.bookings.find_by_payment_ref(payment_ref).await? {
            if booking.mark_paid(Utc::now()) {
                self.bookings.update(booking).await?;
            }
            return Ok(());
        }

        // The success event outran the checkout event. Ask the provider for
        // the session and re-run creation; never fabricate from partial data.
        match self.provider.find_session_by_payment_ref(payment_ref).await? {
            Some(session) => {
                let draft = session.metadata.into_draft()?;
                let booking = Booking::paid(draft, payment_ref.to_string(), Utc::now());
                info!(payment_ref, booking_id = %booking.id, "reconstructed booking from provider session");
                self.bookings.insert(booking).await
            }
            None => {
                warn!(payment_ref, "payment succeeded for unknown booking and no session found");
                Err(SettlementError::BookingNotFound {
                    payment_ref: payment_ref.to_string(),
                })
            }
        }
    }

    async fn handle_payment_captured(&self, payment_ref: &str) -> Result<()> {
        let mut booking = self.require_booking(payment_ref).await?;
        if booking.mark_captured(Utc::now()) {
            info!(payment_ref, booking_id = %booking.id, "charge captured, booking payout-eligible");
            self.bookings.update(booking).await?;
        }
        Ok(())
    }

    async fn handle_payment_failed(&self, payment_ref: &str) -> Result<()> {
        let mut booking = self.require_booking(payment_ref).await?;
        booking.mark_payment_failed(Utc::now());
        self.bookings.update(booking.clone()).await?;
        self.notify_guest(
            booking.guest_id,
            NotificationKind::PaymentFailed,
            json!({ "booking_id": booking.id }),
        )
        .await;
        Ok(())
    }

    async fn handle_dispute_created(&self, payment_ref: &str) -> Result<()> {
        // The booking row may not be visible yet right after the originating
        // payment event; retry with backoff instead of a fixed wait.
        let mut booking = self.find_with_retry(payment_ref).await?;
        booking.open_dispute(Utc::now());
        self.bookings.update(booking.clone()).await?;
        self.notify_guest(
            booking.guest_id,
            NotificationKind::DisputeOpened,
            json!({ "booking_id": booking.id }),
        )
        .await;
        Ok(())
    }

    async fn handle_dispute_closed(&self, payment_ref: &str, merchant_won: bool) -> Result<()> {
        let mut booking = self.find_with_retry(payment_ref).await?;
        booking.close_dispute(merchant_won, Utc::now());
        info!(payment_ref, merchant_won, booking_id = %booking.id, "dispute closed");
        self.bookings.update(booking).await
    }

    async fn handle_refunded(&self, payment_ref: &str) -> Result<()> {
        let mut booking = self.require_booking(payment_ref).await?;
        booking.mark_refunded(Utc::now());
        self.bookings.update(booking.clone()).await?;
        self.notify_guest(
            booking.guest_id,
            NotificationKind::RefundIssued,
            json!({ "booking_id": booking.id }),
        )
        .await;
        Ok(())
    }

    async fn require_booking(&self, payment_ref: &str) -> Result<Booking> {
        self.bookings
            .find_by_payment_ref(payment_ref)
            .await?
            .ok_or_else(|| SettlementError::BookingNotFound {
                payment_ref: payment_ref.to_string(),
            })
    }

    async fn find_with_retry(&self, payment_ref: &str) -> Result<Booking> {
        let mut attempt = 0;
        loop {
            if let Some(booking) = self.bookings.find_by_payment_ref(payment_ref).await? {
                return Ok(booking);
            }
            if attempt + 1 >= self.lookup_retry.attempts {
                warn!(payment_ref, attempts = self.lookup_retry.attempts, "booking not visible after retries");
                return Err(SettlementError::BookingNotFound {
                    payment_ref: payment_ref.to_string(),
                });
            }
            tokio::time::sleep(self.lookup_retry.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    async fn notify_guest(
        &self,
        guest_id: Uuid,
        kind: NotificationKind,
        variables: serde_json::Value,
    ) {
        if let Err(e) = self.notifier.notify(guest_id, kind, variables).await {
            warn!(%guest_id, ?kind, "notification delivery failed: {e}");
        }
    }
}

fn event_payment_ref(event: &WebhookEvent) -> Option<&str> {
    match event {
        WebhookEvent::PaymentIntentCreated { payment_ref, .. }
        | WebhookEvent::PaymentIntentSucceeded { payment_ref }
        | WebhookEvent::PaymentIntentCaptured { payment_ref }
        | WebhookEvent::PaymentIntentFailed { payment_ref }
        | WebhookEvent::DisputeCreated { payment_ref }
        | WebhookEvent::DisputeClosed { payment_ref, .. }
        | WebhookEvent::ChargeRefunded { payment_ref } => Some(payment_ref),
        WebhookEvent::CheckoutSessionCompleted(session) => Some(&session.payment_ref),
        WebhookEvent::Unknown { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{LifecycleState, PaymentState};
    use crate::domain::event::CheckoutSession;
    use crate::domain::ports::BookingStore;
    use crate::infrastructure::in_memory::InMemoryBookingStore;
    use crate::infrastructure::notifier::TracingNotifier;
    use crate::infrastructure::provider::RecordedProviderClient;
    use std::sync::Arc;
    use std::time::Duration;

    fn metadata() -> SessionMetadata {
        SessionMetadata {
            product_id: Some(Uuid::new_v4().to_string()),
            host_id: Some(Uuid::new_v4().to_string()),
            guest_id: Some(Uuid::new_v4().to_string()),
            check_in: Some("2026-09-01".into()),
            check_out: Some("2026-09-05".into()),
            guest_count: Some("2".into()),
            price_amount: Some("200".into()),
            commission_rate: Some("0.10".into()),
        }
    }

    fn engine(
        bookings: Arc<InMemoryBookingStore>,
        provider: Arc<RecordedProviderClient>,
    ) -> BookingEngine {
        BookingEngine::new(
            bookings,
            provider,
            Arc::new(TracingNotifier),
            RetryPolicy {
                attempts: 3,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    fn checkout_event(payment_ref: &str) -> WebhookEvent {
        WebhookEvent::CheckoutSessionCompleted(CheckoutSession {
            payment_ref: payment_ref.into(),
            metadata: metadata(),
        })
    }

    #[tokio::test]
    async fn checkout_completed_creates_paid_booking() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = engine(bookings.clone(), Arc::new(RecordedProviderClient::new()));

        engine.apply(checkout_event("pi_1")).await.unwrap();

        let booking = bookings.find_by_payment_ref("pi_1").await.unwrap().unwrap();
        assert_eq!(booking.payment_state, PaymentState::Paid);
        assert_eq!(booking.lifecycle_state, LifecycleState::Confirmed);
    }

    #[tokio::test]
    async fn replayed_event_is_idempotent() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = engine(bookings.clone(), Arc::new(RecordedProviderClient::new()));

        engine.apply(checkout_event("pi_1")).await.unwrap();
        let first = bookings.find_by_payment_ref("pi_1").await.unwrap().unwrap();

        engine.apply(checkout_event("pi_1")).await.unwrap();
        engine
            .apply(WebhookEvent::PaymentIntentSucceeded {
                payment_ref: "pi_1".into(),
            })
            .await
            .unwrap();

        let replayed = bookings.find_by_payment_ref("pi_1").await.unwrap().unwrap();
        assert_eq!(replayed.id, first.id);
        assert_eq!(bookings.for_host(first.host_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn checkout_without_metadata_is_rejected() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = engine(bookings.clone(), Arc::new(RecordedProviderClient::new()));

        let result = engine
            .apply(WebhookEvent::CheckoutSessionCompleted(CheckoutSession {
                payment_ref: "pi_1".into(),
                metadata: SessionMetadata::default(),
            }))
            .await;
        assert!(matches!(
            result,
            Err(SettlementError::MissingEventMetadata(_))
        ));
        assert!(bookings.find_by_payment_ref("pi_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn success_ahead_of_checkout_reconstructs_from_session() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let provider = Arc::new(RecordedProviderClient::new());
        provider.record_session(CheckoutSession {
            payment_ref: "pi_race".into(),
            metadata: metadata(),
        });
        let engine = engine(bookings.clone(), provider);

        engine
            .apply(WebhookEvent::PaymentIntentSucceeded {
                payment_ref: "pi_race".into(),
            })
            .await
            .unwrap();

        let booking = bookings.find_by_payment_ref("pi_race").await.unwrap().unwrap();
        assert_eq!(booking.payment_state, PaymentState::Paid);
        assert_eq!(booking.lifecycle_state, LifecycleState::Confirmed);
    }

    #[tokio::test]
    async fn success_with_no_session_does_not_fabricate() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = engine(bookings.clone(), Arc::new(RecordedProviderClient::new()));

        let result = engine
            .apply(WebhookEvent::PaymentIntentSucceeded {
                payment_ref: "pi_ghost".into(),
            })
            .await;
        assert!(matches!(
            result,
            Err(SettlementError::BookingNotFound { .. })
        ));
        assert!(bookings.find_by_payment_ref("pi_ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dispute_cycle_restores_booking_when_won() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = engine(bookings.clone(), Arc::new(RecordedProviderClient::new()));

        engine.apply(checkout_event("pi_1")).await.unwrap();
        engine
            .apply(WebhookEvent::DisputeCreated {
                payment_ref: "pi_1".into(),
            })
            .await
            .unwrap();

        let disputed = bookings.find_by_payment_ref("pi_1").await.unwrap().unwrap();
        assert_eq!(disputed.payment_state, PaymentState::Disputed);
        assert_eq!(disputed.lifecycle_state, LifecycleState::Cancelled);

        engine
            .apply(WebhookEvent::DisputeClosed {
                payment_ref: "pi_1".into(),
                merchant_won: true,
            })
            .await
            .unwrap();

        let restored = bookings.find_by_payment_ref("pi_1").await.unwrap().unwrap();
        assert_eq!(restored.payment_state, PaymentState::Paid);
        assert_eq!(restored.lifecycle_state, LifecycleState::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn dispute_lookup_retries_until_row_is_visible() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = Arc::new(engine(bookings.clone(), Arc::new(RecordedProviderClient::new())));

        let late_writer = {
            let bookings = bookings.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                let draft = metadata().into_draft().unwrap();
                bookings
                    .insert(Booking::paid(draft, "pi_late".into(), Utc::now()))
                    .await
                    .unwrap();
            })
        };

        engine
            .apply(WebhookEvent::DisputeCreated {
                payment_ref: "pi_late".into(),
            })
            .await
            .unwrap();
        late_writer.await.unwrap();

        let booking = bookings.find_by_payment_ref("pi_late").await.unwrap().unwrap();
        assert_eq!(booking.payment_state, PaymentState::Disputed);
    }

    #[tokio::test]
    async fn payment_failed_cancels_booking() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = engine(bookings.clone(), Arc::new(RecordedProviderClient::new()));

        engine
            .apply(WebhookEvent::PaymentIntentCreated {
                payment_ref: "pi_1".into(),
                metadata: metadata(),
            })
            .await
            .unwrap();
        engine
            .apply(WebhookEvent::PaymentIntentFailed {
                payment_ref: "pi_1".into(),
            })
            .await
            .unwrap();

        let booking = bookings.find_by_payment_ref("pi_1").await.unwrap().unwrap();
        assert_eq!(booking.payment_state, PaymentState::Unpaid);
        assert_eq!(booking.lifecycle_state, LifecycleState::Cancelled);
    }

    #[tokio::test]
    async fn unknown_event_is_ignored() {
        let bookings = Arc::new(InMemoryBookingStore::new());
        let engine = engine(bookings.clone(), Arc::new(RecordedProviderClient::new()));
        engine
            .apply(WebhookEvent::Unknown {
                event_type: "invoice.created".into(),
            })
            .await
            .unwrap();
    }
}
