use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use staypay::application::accounts::PaymentAccountRegistry;
use staypay::application::balance::BalanceCalculator;
use staypay::application::booking_engine::BookingEngine;
use staypay::application::withdrawals::WithdrawalEngine;
use staypay::config::{RetryPolicy, Settings, WebhookSettings, WithdrawalSettings};
use staypay::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryPaymentAccountStore, InMemoryWithdrawalStore,
};
use staypay::infrastructure::notifier::TracingNotifier;
use staypay::infrastructure::provider::RecordedProviderClient;
use staypay::interfaces::http::{router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Shared secret for verifying provider webhook signatures
    #[arg(long, env = "STAYPAY_WEBHOOK_SECRET")]
    webhook_secret: String,

    /// Accepted age of webhook signature timestamps, in seconds
    #[arg(long, default_value_t = 300)]
    webhook_tolerance_secs: u64,

    /// Minimum available balance for partial withdrawals
    #[arg(long, default_value = "100")]
    partial_threshold: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings {
        bind: cli.bind,
        webhook: WebhookSettings {
            signing_secret: cli.webhook_secret,
            timestamp_tolerance: Duration::from_secs(cli.webhook_tolerance_secs),
        },
        withdrawals: WithdrawalSettings {
            partial_threshold: cli.partial_threshold,
        },
        booking_lookup_retry: RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(50),
        },
    };

    let bookings = Arc::new(InMemoryBookingStore::new());
    let withdrawals = Arc::new(InMemoryWithdrawalStore::new());
    let accounts = Arc::new(InMemoryPaymentAccountStore::new());
    let provider = Arc::new(RecordedProviderClient::new());
    let notifier = Arc::new(TracingNotifier);

    let balance = Arc::new(BalanceCalculator::new(
        bookings.clone(),
        withdrawals.clone(),
        &settings.withdrawals,
    ));
    let state = AppState {
        booking_engine: Arc::new(BookingEngine::new(
            bookings,
            provider,
            notifier.clone(),
            settings.booking_lookup_retry,
        )),
        withdrawal_engine: Arc::new(WithdrawalEngine::new(
            withdrawals,
            accounts.clone(),
            balance.clone(),
            notifier,
        )),
        registry: Arc::new(PaymentAccountRegistry::new(accounts)),
        balance,
        webhook: settings.webhook.clone(),
    };

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .into_diagnostic()?;
    tracing::info!(bind = %settings.bind, "settlement server listening");
    axum::serve(listener, router(state)).await.into_diagnostic()?;

    Ok(())
}
