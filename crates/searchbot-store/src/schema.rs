//! Database schema definitions.
//!
//! The DDL lives in `migrations/`; this module names the tables, indexes and
//! constraints the store refers to.

/// Table names.
pub mod table {
    /// Users and their search allowances, keyed by `telegram_id`.
    pub const USERS: &str = "users";

    /// One row per search run.
    pub const SEARCHES: &str = "searches";

    /// Completed purchases of searches.
    pub const PAYMENTS: &str = "payments";

    /// Issued gift cards, unique by `code`.
    pub const GIFT_CARDS: &str = "gift_cards";

    /// Audit trail of gift card redemptions.
    pub const GIFT_CARD_REDEMPTIONS: &str = "gift_card_redemptions";
}

/// Constraint names raised by the database.
pub mod constraint {
    /// `users.telegram_id` is unique.
    pub const USERS_TELEGRAM_ID_KEY: &str = "users_telegram_id_key";

    /// `gift_cards.code` is unique.
    pub const GIFT_CARDS_CODE_KEY: &str = "gift_cards_code_key";

    /// One redemption row per gift card.
    pub const REDEMPTIONS_GIFT_CARD_ID_KEY: &str = "gift_card_redemptions_gift_card_id_key";

    /// `searches.telegram_id` references `users`.
    pub const SEARCHES_TELEGRAM_ID_FKEY: &str = "searches_telegram_id_fkey";

    /// `payments.telegram_id` references `users`.
    pub const PAYMENTS_TELEGRAM_ID_FKEY: &str = "payments_telegram_id_fkey";

    /// `gift_cards.redeemed_by` references `users`.
    pub const GIFT_CARDS_REDEEMED_BY_FKEY: &str = "gift_cards_redeemed_by_fkey";

    /// `gift_card_redemptions.telegram_id` references `users`.
    pub const REDEMPTIONS_TELEGRAM_ID_FKEY: &str = "gift_card_redemptions_telegram_id_fkey";

    /// `gift_card_redemptions.gift_card_id` references `gift_cards`.
    pub const REDEMPTIONS_GIFT_CARD_ID_FKEY: &str = "gift_card_redemptions_gift_card_id_fkey";

    /// Redeemed flag, redeemer and timestamp move together.
    pub const GIFT_CARDS_REDEMPTION_CONSISTENT: &str = "gift_cards_redemption_consistent";

    /// A redeemed card cannot be un-redeemed or re-assigned.
    pub const GIFT_CARDS_REDEMPTION_FROZEN: &str = "gift_cards_redemption_frozen";

    /// Redemption rows may only point at redeemed cards.
    pub const REDEMPTIONS_REQUIRES_REDEEMED: &str = "gift_card_redemptions_requires_redeemed";
}

/// Lookup indexes created by the initial migration.
pub const INDEXES: &[&str] = &[
    "idx_users_telegram_id",
    "idx_searches_telegram_id",
    "idx_searches_search_id",
    "idx_payments_telegram_id",
    "idx_gift_cards_code",
    "idx_gift_cards_batch_id",
    "idx_gift_cards_redeemed_by",
    "idx_gift_card_redemptions_telegram_id",
    "idx_gift_card_redemptions_gift_card_id",
];

/// Returns all table names, parents before children.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        table::USERS,
        table::SEARCHES,
        table::PAYMENTS,
        table::GIFT_CARDS,
        table::GIFT_CARD_REDEMPTIONS,
    ]
}
