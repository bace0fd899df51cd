//! Process configuration.
//!
//! Consolidates everything the binary reads from flags or environment into a
//! validated `Settings` value that is constructed once and passed down.

use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::time::Duration;

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the HTTP server binds to.
    pub bind: SocketAddr,
    /// Webhook signing configuration.
    pub webhook: WebhookSettings,
    /// Withdrawal policy knobs.
    pub withdrawals: WithdrawalSettings,
    /// Retry policy for booking lookups that may race the originating
    /// payment event (dispute handling).
    pub booking_lookup_retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Shared secret used to verify the provider signature header.
    pub signing_secret: String,
    /// Maximum accepted age of a signed event timestamp.
    pub timestamp_tolerance: Duration,
}

#[derive(Debug, Clone)]
pub struct WithdrawalSettings {
    /// Minimum available balance before a partial withdrawal is allowed.
    pub partial_threshold: Decimal,
}

/// Bounded retry with exponential backoff.
///
/// Attempt `n` (zero-based) sleeps `base_delay * 2^n` before retrying, up to
/// `attempts` total tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: ([127, 0, 0, 1], 3000).into(),
            webhook: WebhookSettings {
                signing_secret: String::new(),
                timestamp_tolerance: Duration::from_secs(300),
            },
            withdrawals: WithdrawalSettings {
                partial_threshold: Decimal::new(100, 0),
            },
            booking_lookup_retry: RetryPolicy {
                attempts: 5,
                base_delay: Duration::from_millis(50),
            },
        }
    }
}
