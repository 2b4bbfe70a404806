//! Storage layer for searchbot.
//!
//! This crate owns the relational schema (see `migrations/`) and exposes the
//! operations the bot and the operator tooling run against it.
//!
//! # Architecture
//!
//! The schema has five tables:
//!
//! - `users`: one row per platform user, unique by `telegram_id`
//! - `searches`: search events, referencing `users`
//! - `payments`: completed purchases, referencing `users`
//! - `gift_cards`: issued codes, unique by `code`
//! - `gift_card_redemptions`: audit rows, referencing `users` and `gift_cards`
//!
//! Two backends implement [`Store`]: [`PgStore`] for PostgreSQL and
//! [`MemoryStore`], which enforces the same keys and guards in memory.
//!
//! # Example
//!
//! ```no_run
//! use searchbot_core::{GiftCardCode, NewGiftCard, NewUser, TelegramId};
//! use searchbot_store::{PgStore, Store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PgStore::connect("postgres://localhost/searchbot", 5).await?;
//! store.migrate().await?;
//!
//! let user = store.get_or_create_user(&NewUser::new(TelegramId::new(42))).await?;
//! assert_eq!(user.free_searches, 1);
//!
//! let code = GiftCardCode::generate();
//! store.insert_gift_card(&NewGiftCard::issue(&code, 5, None)?).await?;
//! let redemption = store.redeem_gift_card(user.telegram_id, code.as_str()).await?;
//! assert_eq!(redemption.searches_amount, 5);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use searchbot_core::{
    AllowanceKind, GiftCard, GiftCardRedemption, NewGiftCard, NewPayment, NewSearch, NewUser,
    Payment, RedemptionStats, Search, SearchId, TelegramId, User,
};

/// The storage trait defining all database operations.
///
/// Implementations must keep the schema's constraints: unique telegram ids
/// and gift card codes, foreign keys from every child row to `users`, and a
/// gift card redeemed at most once.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert a new user with the default allowances.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the telegram id is already taken.
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    /// Return the user, creating it on first interaction.
    ///
    /// An existing user's display name is refreshed when a new one is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_or_create_user(&self, user: &NewUser) -> Result<User>;

    /// Get a user by telegram id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user(&self, telegram_id: TelegramId) -> Result<Option<User>>;

    /// Spend one search, free allowance first.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user doesn't exist.
    /// - `StoreError::InsufficientSearches` if both allowances are empty.
    async fn consume_search(&self, telegram_id: TelegramId) -> Result<AllowanceKind>;

    /// Add paid searches to a user and return the updated row.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn add_paid_searches(&self, telegram_id: TelegramId, amount: i32) -> Result<User>;

    // =========================================================================
    // Search Operations
    // =========================================================================

    /// Record a search event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ForeignKey` if the user doesn't exist.
    async fn record_search(&self, search: &NewSearch) -> Result<Search>;

    /// Get a search by its generated identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_search(&self, search_id: &SearchId) -> Result<Option<Search>>;

    /// Mark a search as unlocked. Unlocking twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the search doesn't exist.
    async fn unlock_search(&self, search_id: &SearchId) -> Result<Search>;

    /// List a user's searches, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_searches_by_user(
        &self,
        telegram_id: TelegramId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Search>>;

    // =========================================================================
    // Payment Operations
    // =========================================================================

    /// Record a completed payment and credit its searches atomically.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ForeignKey` if the user doesn't exist.
    async fn record_payment(&self, payment: &NewPayment) -> Result<Payment>;

    /// List a user's payments, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_payments_by_user(&self, telegram_id: TelegramId) -> Result<Vec<Payment>>;

    /// Find a payment by its provider charge reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_payment_by_charge_id(&self, charge_id: &str) -> Result<Option<Payment>>;

    // =========================================================================
    // Gift Card Operations
    // =========================================================================

    /// Issue a gift card.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the code already exists.
    async fn insert_gift_card(&self, card: &NewGiftCard) -> Result<GiftCard>;

    /// Get a gift card by raw code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_gift_card(&self, code: &str) -> Result<Option<GiftCard>>;

    /// List the cards of one issuance batch, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_gift_cards_by_batch(&self, batch_id: &str) -> Result<Vec<GiftCard>>;

    /// Redeem a gift card for a user.
    ///
    /// In one transaction: check the card is unredeemed, set flag, redeemer
    /// and timestamp together, credit the user's paid searches and write the
    /// audit row. Of several concurrent attempts on one card, exactly one
    /// succeeds.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the card or the user doesn't exist.
    /// - `StoreError::AlreadyRedeemed` if the card was redeemed before.
    async fn redeem_gift_card(&self, telegram_id: TelegramId, code: &str)
        -> Result<GiftCardRedemption>;

    /// List a user's redemptions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_redemptions_by_user(
        &self,
        telegram_id: TelegramId,
    ) -> Result<Vec<GiftCardRedemption>>;

    /// Aggregate statistics over all cards and redemptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn redemption_stats(&self) -> Result<RedemptionStats>;
}
