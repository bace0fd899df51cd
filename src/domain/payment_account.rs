use crate::error::{Result, SettlementError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    MobileMoney,
    DigitalWallet,
    CashTransferNetwork,
    CardPayout,
}

/// Method-specific payout fields, one coherent set per method.
///
/// This is the type snapshotted into withdrawal requests: a closed variant
/// keyed by method rather than an open blob, so a snapshot can never carry a
/// field its method does not define.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
    BankTransfer {
        account_holder: String,
        account_number: String,
        bank_name: String,
    },
    MobileMoney {
        phone_number: String,
    },
    DigitalWallet {
        wallet_email: String,
    },
    CashTransferNetwork {
        recipient_name: String,
        id_document: String,
    },
    CardPayout {
        card_holder: String,
        card_token: String,
    },
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::BankTransfer { .. } => PaymentMethod::BankTransfer,
            Self::MobileMoney { .. } => PaymentMethod::MobileMoney,
            Self::DigitalWallet { .. } => PaymentMethod::DigitalWallet,
            Self::CashTransferNetwork { .. } => PaymentMethod::CashTransferNetwork,
            Self::CardPayout { .. } => PaymentMethod::CardPayout,
        }
    }

    /// Checks field completeness for the variant's method.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::BankTransfer {
                account_holder,
                account_number,
                bank_name,
            } => {
                require_nonempty("account_holder", account_holder)?;
                require_nonempty("bank_name", bank_name)?;
                if account_number.len() < 6
                    || !account_number.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    return Err(invalid("bank transfer requires an account identifier"));
                }
                Ok(())
            }
            Self::MobileMoney { phone_number } => {
                let digits = phone_number.strip_prefix('+').unwrap_or(phone_number);
                if digits.len() < 9 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(invalid("mobile money requires a valid phone number"));
                }
                Ok(())
            }
            Self::DigitalWallet { wallet_email } => {
                let valid = wallet_email
                    .split_once('@')
                    .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
                if !valid {
                    return Err(invalid("digital wallet requires an email handle"));
                }
                Ok(())
            }
            Self::CashTransferNetwork {
                recipient_name,
                id_document,
            } => {
                require_nonempty("recipient_name", recipient_name)?;
                require_nonempty("id_document", id_document)?;
                Ok(())
            }
            Self::CardPayout {
                card_holder,
                card_token,
            } => {
                require_nonempty("card_holder", card_holder)?;
                require_nonempty("card_token", card_token)?;
                Ok(())
            }
        }
    }
}

fn require_nonempty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(invalid(&format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn invalid(msg: &str) -> SettlementError {
    SettlementError::InvalidPaymentAccountFields(msg.to_string())
}

/// A registered payout destination.
///
/// Never hard-deleted while a withdrawal request references it. At most one
/// default account per user; the first account a user registers becomes the
/// default automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub details: PaymentDetails,
    pub is_default: bool,
    pub is_validated: bool,
    pub validated_by: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAccount {
    pub fn new(
        user_id: Uuid,
        details: PaymentDetails,
        is_default: bool,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        details.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            details,
            is_default,
            is_validated: false,
            validated_by: None,
            validated_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn method(&self) -> PaymentMethod {
        self.details.method()
    }

    /// Admin validation. Idempotent: a second call keeps the original
    /// validator and timestamp.
    pub fn mark_validated(&mut self, admin_id: Uuid, now: DateTime<Utc>) {
        if self.is_validated {
            return;
        }
        self.is_validated = true;
        self.validated_by = Some(admin_id);
        self.validated_at = Some(now);
        self.updated_at = now;
    }
}
