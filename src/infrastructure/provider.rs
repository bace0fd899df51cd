use crate::domain::event::CheckoutSession;
use crate::domain::ports::PaymentProviderClient;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Provider client answering session lookups from recorded checkout
/// sessions. Stands in for the provider's REST API in tests and local runs;
/// a network-backed client implements the same port in deployment.
#[derive(Default)]
pub struct RecordedProviderClient {
    sessions: RwLock<HashMap<String, CheckoutSession>>,
}

impl RecordedProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session(&self, session: CheckoutSession) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.insert(session.payment_ref.clone(), session);
    }
}

#[async_trait]
impl PaymentProviderClient for RecordedProviderClient {
    async fn find_session_by_payment_ref(
        &self,
        payment_ref: &str,
    ) -> Result<Option<CheckoutSession>> {
        let sessions = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(sessions.get(payment_ref).cloned())
    }
}
