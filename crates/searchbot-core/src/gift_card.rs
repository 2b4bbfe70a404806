//! Gift card types for searchbot.
//!
//! A gift card is a 12-character code from `A-Z0-9` that grants a fixed number
//! of paid searches. Codes are stored raw (`ABCD2345WXYZ`) next to a display
//! variant (`ABCD-2345-WXYZ`). Users may type either form, in any case.
//!
//! A card moves from unredeemed to redeemed exactly once. The redeemed flag,
//! redeemer and redemption time are always set together, and the change is
//! recorded in a `GiftCardRedemption` audit row in the same transaction.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{CoreError, Result, TelegramId};

/// Length of an issued gift card code, without separators.
pub const CODE_LENGTH: usize = 12;

/// Characters an issued code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Characters per group in the formatted code.
const GROUP_LENGTH: usize = 4;

// ============================================================================
// Codes
// ============================================================================

/// A validated gift card code in its raw (unformatted, upper-case) form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GiftCardCode(String);

impl GiftCardCode {
    /// Generate a random code using the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Parse user or operator input.
    ///
    /// Hyphens and whitespace are ignored and letters are upper-cased, so
    /// `abcd-2345-wxyz` and `ABCD2345WXYZ` are the same code.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCode` unless exactly 12 ASCII letters or
    /// digits remain after normalization.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized: String = input
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.chars().count() != CODE_LENGTH {
            return Err(CoreError::InvalidCode {
                reason: format!(
                    "expected {CODE_LENGTH} characters, got {}",
                    normalized.chars().count()
                ),
            });
        }
        if let Some(bad) = normalized.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(CoreError::InvalidCode {
                reason: format!("unexpected character {bad:?}"),
            });
        }

        Ok(Self(normalized))
    }

    /// The raw code as stored in `gift_cards.code`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The display form, `XXXX-XXXX-XXXX`.
    #[must_use]
    pub fn formatted(&self) -> String {
        format_code(&self.0)
    }
}

impl FromStr for GiftCardCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GiftCardCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<GiftCardCode> for String {
    fn from(code: GiftCardCode) -> Self {
        code.0
    }
}

impl fmt::Debug for GiftCardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GiftCardCode({})", self.0)
    }
}

impl fmt::Display for GiftCardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// Render a code for display.
///
/// Twelve-character codes are grouped as `XXXX-XXXX-XXXX`; anything else is
/// returned upper-cased without separators.
#[must_use]
pub fn format_code(code: &str) -> String {
    let raw: String = code
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if raw.len() != CODE_LENGTH || !raw.is_ascii() {
        return raw;
    }

    raw.as_bytes()
        .chunks(GROUP_LENGTH)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Default batch identifier, e.g. `batch_20260101_093000`.
#[must_use]
pub fn default_batch_id(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}_{}", now.format("%Y%m%d_%H%M%S"))
}

// ============================================================================
// Records
// ============================================================================

/// A redeemable gift card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCard {
    /// Row identifier.
    pub id: i64,

    /// Raw code (unique).
    pub code: String,

    /// Display form of the code.
    pub code_formatted: String,

    /// Searches granted on redemption.
    pub searches_amount: i32,

    /// Issuance batch, for bulk-issued cards.
    pub batch_id: Option<String>,

    /// Whether the card has been redeemed.
    pub is_redeemed: bool,

    /// Who redeemed the card.
    pub redeemed_by: Option<TelegramId>,

    /// When the card was redeemed.
    pub redeemed_at: Option<DateTime<Utc>>,

    /// When the card was issued.
    pub created_at: DateTime<Utc>,
}

impl GiftCard {
    /// Check that the redemption columns agree with the redeemed flag.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        if self.is_redeemed {
            self.redeemed_by.is_some() && self.redeemed_at.is_some()
        } else {
            self.redeemed_by.is_none() && self.redeemed_at.is_none()
        }
    }
}

/// Input for issuing a gift card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGiftCard {
    /// Raw code.
    pub code: String,

    /// Display form of the code.
    pub code_formatted: String,

    /// Searches granted on redemption.
    pub searches_amount: i32,

    /// Issuance batch.
    pub batch_id: Option<String>,
}

impl NewGiftCard {
    /// Issue a card for a validated code.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidAmount` if `searches_amount` is not positive.
    pub fn issue(
        code: &GiftCardCode,
        searches_amount: i32,
        batch_id: Option<String>,
    ) -> Result<Self> {
        Self::new(code.as_str(), searches_amount, batch_id)
    }

    /// Build a card from an arbitrary code.
    ///
    /// The code is upper-cased with separators removed; it need not follow
    /// the issued 12-character format.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCode` for an empty code and
    /// `CoreError::InvalidAmount` if `searches_amount` is not positive.
    pub fn new(code: &str, searches_amount: i32, batch_id: Option<String>) -> Result<Self> {
        let raw: String = code
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if raw.is_empty() {
            return Err(CoreError::InvalidCode {
                reason: "code must not be empty".to_string(),
            });
        }
        if searches_amount <= 0 {
            return Err(CoreError::InvalidAmount(format!(
                "searches amount must be positive, got {searches_amount}"
            )));
        }

        Ok(Self {
            code_formatted: format_code(&raw),
            code: raw,
            searches_amount,
            batch_id,
        })
    }
}

/// Audit record of a gift card redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCardRedemption {
    /// Row identifier.
    pub id: i64,

    /// The redeeming user.
    pub telegram_id: TelegramId,

    /// The redeemed card.
    pub gift_card_id: i64,

    /// Searches granted, copied from the card at redemption time.
    pub searches_amount: i32,

    /// Raw code, copied from the card at redemption time.
    pub code: String,

    /// When the card was redeemed.
    pub redeemed_at: DateTime<Utc>,
}

/// Aggregate gift card statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionStats {
    /// Cards issued.
    pub total_cards: i64,
    /// Cards redeemed.
    pub redeemed_cards: i64,
    /// Cards still redeemable.
    pub unredeemed_cards: i64,
    /// Searches across all cards.
    pub total_searches: i64,
    /// Searches on redeemed cards.
    pub redeemed_searches: i64,
    /// Searches on cards still redeemable.
    pub unredeemed_searches: i64,
    /// Redemption audit rows.
    pub total_redemptions: i64,
    /// Distinct users who redeemed at least one card.
    pub unique_users: i64,
}

impl fmt::Display for RedemptionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== GIFT CARD STATISTICS ===")?;
        writeln!(f)?;
        writeln!(f, "Total Cards Created: {}", self.total_cards)?;
        writeln!(f, "Cards Redeemed: {}", self.redeemed_cards)?;
        writeln!(f, "Cards Unredeemed: {}", self.unredeemed_cards)?;
        writeln!(f)?;
        writeln!(f, "Total Searches Distributed: {}", self.total_searches)?;
        writeln!(f, "Searches Redeemed: {}", self.redeemed_searches)?;
        writeln!(f, "Searches Remaining: {}", self.unredeemed_searches)?;
        writeln!(f)?;
        writeln!(f, "Total Redemptions: {}", self.total_redemptions)?;
        write!(f, "Unique Users: {}", self.unique_users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_code_is_valid() {
        for _ in 0..100 {
            let code = GiftCardCode::generate();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert_eq!(GiftCardCode::parse(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn parse_accepts_formatted_lowercase() {
        let code = GiftCardCode::parse(" abcd-2345-wxyz ").unwrap();
        assert_eq!(code.as_str(), "ABCD2345WXYZ");
        assert_eq!(code.formatted(), "ABCD-2345-WXYZ");
        assert_eq!(code.to_string(), "ABCD-2345-WXYZ");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let err = GiftCardCode::parse("ABC123").unwrap_err();
        assert!(matches!(err, CoreError::InvalidCode { .. }));
    }

    #[test]
    fn parse_rejects_symbols() {
        assert!(GiftCardCode::parse("ABCD2345WXY!").is_err());
        assert!(GiftCardCode::parse("ABCD2345WXYÄ").is_err());
    }

    #[test]
    fn format_leaves_short_codes_alone() {
        assert_eq!(format_code("abc123"), "ABC123");
        assert_eq!(format_code("abcd2345wxyz"), "ABCD-2345-WXYZ");
    }

    #[test]
    fn new_gift_card_normalizes() {
        let card = NewGiftCard::new("abc123", 5, None).unwrap();
        assert_eq!(card.code, "ABC123");
        assert_eq!(card.code_formatted, "ABC123");
    }

    #[test]
    fn new_gift_card_validates() {
        assert!(matches!(
            NewGiftCard::new("ABC123", 0, None),
            Err(CoreError::InvalidAmount(_))
        ));
        assert!(matches!(
            NewGiftCard::new(" - ", 5, None),
            Err(CoreError::InvalidCode { .. })
        ));
    }

    #[test]
    fn batch_id_uses_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(default_batch_id("batch", now), "batch_20260102_030405");
    }

    #[test]
    fn card_consistency() {
        let mut card = GiftCard {
            id: 1,
            code: "ABC123".into(),
            code_formatted: "ABC123".into(),
            searches_amount: 5,
            batch_id: None,
            is_redeemed: false,
            redeemed_by: None,
            redeemed_at: None,
            created_at: Utc::now(),
        };
        assert!(card.is_consistent());

        card.is_redeemed = true;
        assert!(!card.is_consistent());

        card.redeemed_by = Some(TelegramId::new(42));
        card.redeemed_at = Some(Utc::now());
        assert!(card.is_consistent());
    }

    #[test]
    fn stats_display() {
        let stats = RedemptionStats {
            total_cards: 10,
            redeemed_cards: 3,
            unredeemed_cards: 7,
            total_searches: 50,
            redeemed_searches: 15,
            unredeemed_searches: 35,
            total_redemptions: 3,
            unique_users: 2,
        };
        let text = stats.to_string();
        assert!(text.contains("Cards Redeemed: 3"));
        assert!(text.ends_with("Unique Users: 2"));
    }
}
