//! Payment records.
//!
//! A payment is written once per completed purchase in the in-platform
//! currency and grants paid searches. Rows are never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Result, TelegramId};

/// A completed purchase of searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Row identifier.
    pub id: i64,

    /// The paying user.
    pub telegram_id: TelegramId,

    /// Amount paid in the in-platform currency.
    pub amount: i32,

    /// Searches granted by this payment.
    pub searches_count: i32,

    /// Payment-provider charge reference.
    ///
    /// Expected to be unique per transaction, but not enforced.
    pub telegram_payment_charge_id: Option<String>,

    /// When the payment was recorded.
    pub created_at: DateTime<Utc>,
}

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    /// The paying user.
    pub telegram_id: TelegramId,

    /// Amount paid.
    pub amount: i32,

    /// Searches to grant.
    pub searches_count: i32,

    /// Payment-provider charge reference.
    pub telegram_payment_charge_id: Option<String>,
}

impl NewPayment {
    /// Build a payment record input.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidAmount` if the amount is negative or the
    /// searches count is not positive.
    pub fn new(
        telegram_id: TelegramId,
        amount: i32,
        searches_count: i32,
        telegram_payment_charge_id: Option<String>,
    ) -> Result<Self> {
        if amount < 0 {
            return Err(CoreError::InvalidAmount(format!(
                "payment amount must not be negative, got {amount}"
            )));
        }
        if searches_count <= 0 {
            return Err(CoreError::InvalidAmount(format!(
                "searches count must be positive, got {searches_count}"
            )));
        }
        Ok(Self {
            telegram_id,
            amount,
            searches_count,
            telegram_payment_charge_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_payment() {
        let p = NewPayment::new(TelegramId::new(1), 50, 5, Some("ch_1".into())).unwrap();
        assert_eq!(p.searches_count, 5);
    }

    #[test]
    fn rejects_non_positive_count() {
        assert!(matches!(
            NewPayment::new(TelegramId::new(1), 50, 0, None),
            Err(CoreError::InvalidAmount(_))
        ));
    }

    #[test]
    fn rejects_negative_amount() {
        assert!(NewPayment::new(TelegramId::new(1), -1, 1, None).is_err());
    }
}
