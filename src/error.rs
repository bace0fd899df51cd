use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SettlementError>;

#[derive(Error, Debug)]
pub enum SettlementError {
    /// The webhook body does not match the provider signature header.
    /// Nothing may be mutated after this error.
    #[error("webhook signature verification failed")]
    SignatureInvalid,

    /// A recognized event arrived without the metadata required to act on it.
    #[error("event is missing required metadata: {0}")]
    MissingEventMetadata(String),

    /// A payment event referenced a booking we do not have and could not
    /// reconstruct from the provider session. Fixed by reconciliation, not by
    /// failing the webhook.
    #[error("no booking found for payment ref {payment_ref}")]
    BookingNotFound { payment_ref: String },

    #[error("requested {requested} exceeds available balance {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("invalid payment account fields: {0}")]
    InvalidPaymentAccountFields(String),

    /// A concurrent writer won a store-level race (e.g. two inserts against
    /// the same payment ref). The losing operation was not applied.
    #[error("concurrent update conflict on {0}")]
    ConcurrentBalanceViolation(String),

    /// An operation was requested from a state that does not allow it.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    /// Store or other infrastructure failure. The only case where the webhook
    /// endpoint answers 5xx so the provider retries delivery.
    #[error("store error: {0}")]
    StoreError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
