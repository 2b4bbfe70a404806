//! PostgreSQL storage implementation.
//!
//! This module provides the `PgStore` implementation of the `Store` trait.
//! Multi-row changes (payments, redemptions, consuming a search) run inside a
//! single transaction; the gift card row is locked with `FOR UPDATE` so that
//! concurrent redemptions of one code serialize on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use searchbot_core::{
    AllowanceKind, CoreError, GiftCard, GiftCardRedemption, NewGiftCard, NewPayment, NewSearch,
    NewUser, Payment, RedemptionStats, Search, SearchId, TelegramId, User,
};

use crate::error::{page_bounds, Result, StoreError};
use crate::Store;

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be established.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        tracing::debug!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Migration` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Applying migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Migrations applied");
        Ok(())
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(FromRow)]
struct UserRow {
    id: i64,
    telegram_id: i64,
    username: Option<String>,
    free_searches: i32,
    paid_searches: i32,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            telegram_id: TelegramId::new(row.telegram_id),
            username: row.username,
            free_searches: row.free_searches,
            paid_searches: row.paid_searches,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct SearchRow {
    id: i64,
    telegram_id: i64,
    search_id: String,
    results_count: i32,
    is_unlocked: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<SearchRow> for Search {
    type Error = StoreError;

    fn try_from(row: SearchRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            telegram_id: TelegramId::new(row.telegram_id),
            search_id: row.search_id.parse::<SearchId>().map_err(CoreError::from)?,
            results_count: row.results_count,
            is_unlocked: row.is_unlocked,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentRow {
    id: i64,
    telegram_id: i64,
    amount: i32,
    searches_count: i32,
    telegram_payment_charge_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id,
            telegram_id: TelegramId::new(row.telegram_id),
            amount: row.amount,
            searches_count: row.searches_count,
            telegram_payment_charge_id: row.telegram_payment_charge_id,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct GiftCardRow {
    id: i64,
    code: String,
    code_formatted: String,
    searches_amount: i32,
    batch_id: Option<String>,
    is_redeemed: bool,
    redeemed_by: Option<i64>,
    redeemed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<GiftCardRow> for GiftCard {
    fn from(row: GiftCardRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            code_formatted: row.code_formatted,
            searches_amount: row.searches_amount,
            batch_id: row.batch_id,
            is_redeemed: row.is_redeemed,
            redeemed_by: row.redeemed_by.map(TelegramId::new),
            redeemed_at: row.redeemed_at,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct RedemptionRow {
    id: i64,
    telegram_id: i64,
    gift_card_id: i64,
    searches_amount: i32,
    code: String,
    redeemed_at: DateTime<Utc>,
}

impl From<RedemptionRow> for GiftCardRedemption {
    fn from(row: RedemptionRow) -> Self {
        Self {
            id: row.id,
            telegram_id: TelegramId::new(row.telegram_id),
            gift_card_id: row.gift_card_id,
            searches_amount: row.searches_amount,
            code: row.code,
            redeemed_at: row.redeemed_at,
        }
    }
}

fn require_positive(amount: i32, what: &str) -> Result<()> {
    if amount <= 0 {
        let reason = format!("{what} must be positive, got {amount}");
        return Err(CoreError::InvalidAmount(reason).into());
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            r"
            INSERT INTO users (telegram_id, username)
            VALUES ($1, $2)
            RETURNING id, telegram_id, username, free_searches, paid_searches, created_at
            ",
        )
        .bind(user.telegram_id.get())
        .bind(&user.username)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(telegram_id = %user.telegram_id, "Created user");
        Ok(row.into())
    }

    async fn get_or_create_user(&self, user: &NewUser) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            r"
            INSERT INTO users (telegram_id, username)
            VALUES ($1, $2)
            ON CONFLICT (telegram_id)
                DO UPDATE SET username = COALESCE(EXCLUDED.username, users.username)
            RETURNING id, telegram_id, username, free_searches, paid_searches, created_at
            ",
        )
        .bind(user.telegram_id.get())
        .bind(&user.username)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_user(&self, telegram_id: TelegramId) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            r"
            SELECT id, telegram_id, username, free_searches, paid_searches, created_at
            FROM users
            WHERE telegram_id = $1
            ",
        )
        .bind(telegram_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn consume_search(&self, telegram_id: TelegramId) -> Result<AllowanceKind> {
        let mut tx = self.pool.begin().await?;

        let balance: Option<(i32, i32)> = sqlx::query_as(
            "SELECT free_searches, paid_searches FROM users WHERE telegram_id = $1 FOR UPDATE",
        )
        .bind(telegram_id.get())
        .fetch_optional(&mut *tx)
        .await?;

        let (free, paid) = balance.ok_or_else(|| StoreError::not_found("user", telegram_id))?;

        let kind = if free > 0 {
            AllowanceKind::Free
        } else if paid > 0 {
            AllowanceKind::Paid
        } else {
            return Err(StoreError::InsufficientSearches { telegram_id });
        };

        let sql = match kind {
            AllowanceKind::Free => {
                "UPDATE users SET free_searches = free_searches - 1 WHERE telegram_id = $1"
            }
            AllowanceKind::Paid => {
                "UPDATE users SET paid_searches = paid_searches - 1 WHERE telegram_id = $1"
            }
        };
        sqlx::query(sql)
            .bind(telegram_id.get())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(%telegram_id, allowance = ?kind, "Consumed search");
        Ok(kind)
    }

    async fn add_paid_searches(&self, telegram_id: TelegramId, amount: i32) -> Result<User> {
        require_positive(amount, "searches amount")?;

        let row: Option<UserRow> = sqlx::query_as(
            r"
            UPDATE users
            SET paid_searches = paid_searches + $2
            WHERE telegram_id = $1
            RETURNING id, telegram_id, username, free_searches, paid_searches, created_at
            ",
        )
        .bind(telegram_id.get())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        let user: User = row
            .ok_or_else(|| StoreError::not_found("user", telegram_id))?
            .into();

        tracing::info!(%telegram_id, amount, paid_searches = user.paid_searches, "Added paid searches");
        Ok(user)
    }

    // =========================================================================
    // Search Operations
    // =========================================================================

    async fn record_search(&self, search: &NewSearch) -> Result<Search> {
        let row: SearchRow = sqlx::query_as(
            r"
            INSERT INTO searches (telegram_id, search_id, results_count)
            VALUES ($1, $2, $3)
            RETURNING id, telegram_id, search_id, results_count, is_unlocked, created_at
            ",
        )
        .bind(search.telegram_id.get())
        .bind(search.search_id.as_str())
        .bind(search.results_count)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_search(&self, search_id: &SearchId) -> Result<Option<Search>> {
        let row: Option<SearchRow> = sqlx::query_as(
            r"
            SELECT id, telegram_id, search_id, results_count, is_unlocked, created_at
            FROM searches
            WHERE search_id = $1
            ORDER BY id
            LIMIT 1
            ",
        )
        .bind(search_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Search::try_from).transpose()
    }

    async fn unlock_search(&self, search_id: &SearchId) -> Result<Search> {
        let row: Option<SearchRow> = sqlx::query_as(
            r"
            UPDATE searches
            SET is_unlocked = TRUE
            WHERE search_id = $1
            RETURNING id, telegram_id, search_id, results_count, is_unlocked, created_at
            ",
        )
        .bind(search_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let search: Search = row
            .ok_or_else(|| StoreError::not_found("search", search_id))?
            .try_into()?;

        tracing::debug!(%search_id, telegram_id = %search.telegram_id, "Unlocked search");
        Ok(search)
    }

    async fn list_searches_by_user(
        &self,
        telegram_id: TelegramId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Search>> {
        page_bounds(limit, offset)?;
        let rows: Vec<SearchRow> = sqlx::query_as(
            r"
            SELECT id, telegram_id, search_id, results_count, is_unlocked, created_at
            FROM searches
            WHERE telegram_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(telegram_id.get())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Search::try_from).collect()
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    async fn record_payment(&self, payment: &NewPayment) -> Result<Payment> {
        require_positive(payment.searches_count, "searches count")?;

        let mut tx = self.pool.begin().await?;

        // A missing user surfaces as the payments foreign key below.
        sqlx::query("SELECT 1 FROM users WHERE telegram_id = $1 FOR UPDATE")
            .bind(payment.telegram_id.get())
            .fetch_optional(&mut *tx)
            .await?;

        let row: PaymentRow = sqlx::query_as(
            r"
            INSERT INTO payments (telegram_id, amount, searches_count, telegram_payment_charge_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, telegram_id, amount, searches_count, telegram_payment_charge_id, created_at
            ",
        )
        .bind(payment.telegram_id.get())
        .bind(payment.amount)
        .bind(payment.searches_count)
        .bind(&payment.telegram_payment_charge_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET paid_searches = paid_searches + $2 WHERE telegram_id = $1")
            .bind(payment.telegram_id.get())
            .bind(payment.searches_count)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            telegram_id = %payment.telegram_id,
            amount = payment.amount,
            searches = payment.searches_count,
            charge_id = ?payment.telegram_payment_charge_id,
            "Recorded payment"
        );
        Ok(row.into())
    }

    async fn list_payments_by_user(&self, telegram_id: TelegramId) -> Result<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            r"
            SELECT id, telegram_id, amount, searches_count, telegram_payment_charge_id, created_at
            FROM payments
            WHERE telegram_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(telegram_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_payment_by_charge_id(&self, charge_id: &str) -> Result<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r"
            SELECT id, telegram_id, amount, searches_count, telegram_payment_charge_id, created_at
            FROM payments
            WHERE telegram_payment_charge_id = $1
            ORDER BY id
            LIMIT 1
            ",
        )
        .bind(charge_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    // =========================================================================
    // Gift Card Operations
    // =========================================================================

    async fn insert_gift_card(&self, card: &NewGiftCard) -> Result<GiftCard> {
        require_positive(card.searches_amount, "searches amount")?;

        let row: GiftCardRow = sqlx::query_as(
            r"
            INSERT INTO gift_cards (code, code_formatted, searches_amount, batch_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, code, code_formatted, searches_amount, batch_id,
                      is_redeemed, redeemed_by, redeemed_at, created_at
            ",
        )
        .bind(&card.code)
        .bind(&card.code_formatted)
        .bind(card.searches_amount)
        .bind(&card.batch_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(code = %card.code_formatted, batch_id = ?card.batch_id, "Issued gift card");
        Ok(row.into())
    }

    async fn get_gift_card(&self, code: &str) -> Result<Option<GiftCard>> {
        let row: Option<GiftCardRow> = sqlx::query_as(
            r"
            SELECT id, code, code_formatted, searches_amount, batch_id,
                   is_redeemed, redeemed_by, redeemed_at, created_at
            FROM gift_cards
            WHERE code = $1
            ",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_gift_cards_by_batch(&self, batch_id: &str) -> Result<Vec<GiftCard>> {
        let rows: Vec<GiftCardRow> = sqlx::query_as(
            r"
            SELECT id, code, code_formatted, searches_amount, batch_id,
                   is_redeemed, redeemed_by, redeemed_at, created_at
            FROM gift_cards
            WHERE batch_id = $1
            ORDER BY id
            ",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn redeem_gift_card(
        &self,
        telegram_id: TelegramId,
        code: &str,
    ) -> Result<GiftCardRedemption> {
        let mut tx = self.pool.begin().await?;

        // Lock the card; a concurrent redemption waits here and then sees
        // the committed flag.
        let card: GiftCardRow = sqlx::query_as(
            r"
            SELECT id, code, code_formatted, searches_amount, batch_id,
                   is_redeemed, redeemed_by, redeemed_at, created_at
            FROM gift_cards
            WHERE code = $1
            FOR UPDATE
            ",
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("gift card", code))?;

        if card.is_redeemed {
            return Err(StoreError::AlreadyRedeemed {
                code: card.code,
                redeemed_at: card.redeemed_at.unwrap_or(card.created_at),
            });
        }

        let credited = sqlx::query(
            "UPDATE users SET paid_searches = paid_searches + $2 WHERE telegram_id = $1",
        )
        .bind(telegram_id.get())
        .bind(card.searches_amount)
        .execute(&mut *tx)
        .await?;

        if credited.rows_affected() == 0 {
            return Err(StoreError::not_found("user", telegram_id));
        }

        let (redeemed_at,): (DateTime<Utc>,) = sqlx::query_as(
            r"
            UPDATE gift_cards
            SET is_redeemed = TRUE, redeemed_by = $2, redeemed_at = NOW()
            WHERE id = $1 AND is_redeemed = FALSE
            RETURNING redeemed_at
            ",
        )
        .bind(card.id)
        .bind(telegram_id.get())
        .fetch_one(&mut *tx)
        .await?;

        let redemption: RedemptionRow = sqlx::query_as(
            r"
            INSERT INTO gift_card_redemptions
                (telegram_id, gift_card_id, searches_amount, code, redeemed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, telegram_id, gift_card_id, searches_amount, code, redeemed_at
            ",
        )
        .bind(telegram_id.get())
        .bind(card.id)
        .bind(card.searches_amount)
        .bind(&card.code)
        .bind(redeemed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            %telegram_id,
            code = %card.code_formatted,
            searches = card.searches_amount,
            "Gift card redeemed"
        );
        Ok(redemption.into())
    }

    async fn list_redemptions_by_user(
        &self,
        telegram_id: TelegramId,
    ) -> Result<Vec<GiftCardRedemption>> {
        let rows: Vec<RedemptionRow> = sqlx::query_as(
            r"
            SELECT id, telegram_id, gift_card_id, searches_amount, code, redeemed_at
            FROM gift_card_redemptions
            WHERE telegram_id = $1
            ORDER BY redeemed_at DESC, id DESC
            ",
        )
        .bind(telegram_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn redemption_stats(&self) -> Result<RedemptionStats> {
        let (total_cards, redeemed_cards, total_searches, redeemed_searches): (i64, i64, i64, i64) =
            sqlx::query_as(
                r"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE is_redeemed),
                       COALESCE(SUM(searches_amount), 0)::BIGINT,
                       COALESCE(SUM(searches_amount) FILTER (WHERE is_redeemed), 0)::BIGINT
                FROM gift_cards
                ",
            )
            .fetch_one(&self.pool)
            .await?;

        let (total_redemptions, unique_users): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT telegram_id) FROM gift_card_redemptions",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(RedemptionStats {
            total_cards,
            redeemed_cards,
            unredeemed_cards: total_cards - redeemed_cards,
            total_searches,
            redeemed_searches,
            unredeemed_searches: total_searches - redeemed_searches,
            total_redemptions,
            unique_users,
        })
    }
}
