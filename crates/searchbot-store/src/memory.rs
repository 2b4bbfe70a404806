//! In-memory storage implementation.
//!
//! `MemoryStore` keeps every table behind one mutex, so each operation is
//! atomic and isolated. It raises the same errors as the PostgreSQL schema
//! for unique keys, foreign keys and the redemption guards, which makes it
//! suitable for exercising callers without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use searchbot_core::{
    AllowanceKind, CoreError, GiftCard, GiftCardRedemption, NewGiftCard, NewPayment, NewSearch,
    NewUser, Payment, RedemptionStats, Search, SearchId, TelegramId, User, DEFAULT_FREE_SEARCHES,
    DEFAULT_PAID_SEARCHES,
};

use crate::error::{page_bounds, Result, StoreError};
use crate::schema::constraint;
use crate::Store;

#[derive(Default)]
struct Tables {
    users: BTreeMap<TelegramId, User>,
    searches: Vec<Search>,
    payments: Vec<Payment>,
    gift_cards: Vec<GiftCard>,
    redemptions: Vec<GiftCardRedemption>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_user(&self, telegram_id: TelegramId, fkey: &str) -> Result<()> {
        if self.users.contains_key(&telegram_id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKey {
                constraint: fkey.to_string(),
            })
        }
    }

    fn insert_user(&mut self, user: &NewUser) -> User {
        let row = User {
            id: self.next_id(),
            telegram_id: user.telegram_id,
            username: user.username.clone(),
            free_searches: DEFAULT_FREE_SEARCHES,
            paid_searches: DEFAULT_PAID_SEARCHES,
            created_at: Utc::now(),
        };
        self.users.insert(user.telegram_id, row.clone());
        row
    }
}

/// Add to an allowance, failing like an `INTEGER` column on overflow.
fn credit(balance: i32, amount: i32) -> Result<i32> {
    balance
        .checked_add(amount)
        .ok_or_else(|| StoreError::Database("integer out of range".to_string()))
}

fn require_positive(amount: i32, what: &str) -> Result<()> {
    if amount <= 0 {
        let reason = format!("{what} must be positive, got {amount}");
        return Err(CoreError::InvalidAmount(reason).into());
    }
    Ok(())
}

/// Storage held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.contains_key(&user.telegram_id) {
            return Err(StoreError::Conflict {
                constraint: constraint::USERS_TELEGRAM_ID_KEY.to_string(),
            });
        }
        Ok(tables.insert_user(user))
    }

    async fn get_or_create_user(&self, user: &NewUser) -> Result<User> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.users.get_mut(&user.telegram_id) {
            if user.username.is_some() {
                existing.username.clone_from(&user.username);
            }
            return Ok(existing.clone());
        }
        Ok(tables.insert_user(user))
    }

    async fn get_user(&self, telegram_id: TelegramId) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&telegram_id).cloned())
    }

    async fn consume_search(&self, telegram_id: TelegramId) -> Result<AllowanceKind> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&telegram_id)
            .ok_or_else(|| StoreError::not_found("user", telegram_id))?;

        let kind = user
            .next_allowance()
            .ok_or(StoreError::InsufficientSearches { telegram_id })?;
        match kind {
            AllowanceKind::Free => user.free_searches -= 1,
            AllowanceKind::Paid => user.paid_searches -= 1,
        }
        Ok(kind)
    }

    async fn add_paid_searches(&self, telegram_id: TelegramId, amount: i32) -> Result<User> {
        require_positive(amount, "searches amount")?;

        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(&telegram_id)
            .ok_or_else(|| StoreError::not_found("user", telegram_id))?;
        user.paid_searches = credit(user.paid_searches, amount)?;
        Ok(user.clone())
    }

    // =========================================================================
    // Search Operations
    // =========================================================================

    async fn record_search(&self, search: &NewSearch) -> Result<Search> {
        let mut tables = self.tables.lock().await;
        tables.require_user(search.telegram_id, constraint::SEARCHES_TELEGRAM_ID_FKEY)?;

        let row = Search {
            id: tables.next_id(),
            telegram_id: search.telegram_id,
            search_id: search.search_id.clone(),
            results_count: search.results_count,
            is_unlocked: false,
            created_at: Utc::now(),
        };
        tables.searches.push(row.clone());
        Ok(row)
    }

    async fn get_search(&self, search_id: &SearchId) -> Result<Option<Search>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .searches
            .iter()
            .find(|s| &s.search_id == search_id)
            .cloned())
    }

    async fn unlock_search(&self, search_id: &SearchId) -> Result<Search> {
        let mut tables = self.tables.lock().await;
        let mut unlocked = None;
        for search in tables.searches.iter_mut().filter(|s| &s.search_id == search_id) {
            search.is_unlocked = true;
            unlocked.get_or_insert_with(|| search.clone());
        }
        unlocked.ok_or_else(|| StoreError::not_found("search", search_id))
    }

    async fn list_searches_by_user(
        &self,
        telegram_id: TelegramId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Search>> {
        let (limit, offset) = page_bounds(limit, offset)?;
        let tables = self.tables.lock().await;
        Ok(tables
            .searches
            .iter()
            .rev()
            .filter(|s| s.telegram_id == telegram_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    async fn record_payment(&self, payment: &NewPayment) -> Result<Payment> {
        require_positive(payment.searches_count, "searches count")?;

        let mut tables = self.tables.lock().await;
        tables.require_user(payment.telegram_id, constraint::PAYMENTS_TELEGRAM_ID_FKEY)?;
        let balance = tables
            .users
            .get(&payment.telegram_id)
            .map_or(Ok(0), |u| credit(u.paid_searches, payment.searches_count))?;

        let row = Payment {
            id: tables.next_id(),
            telegram_id: payment.telegram_id,
            amount: payment.amount,
            searches_count: payment.searches_count,
            telegram_payment_charge_id: payment.telegram_payment_charge_id.clone(),
            created_at: Utc::now(),
        };
        tables.payments.push(row.clone());
        if let Some(user) = tables.users.get_mut(&payment.telegram_id) {
            user.paid_searches = balance;
        }
        Ok(row)
    }

    async fn list_payments_by_user(&self, telegram_id: TelegramId) -> Result<Vec<Payment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .rev()
            .filter(|p| p.telegram_id == telegram_id)
            .cloned()
            .collect())
    }

    async fn find_payment_by_charge_id(&self, charge_id: &str) -> Result<Option<Payment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .find(|p| p.telegram_payment_charge_id.as_deref() == Some(charge_id))
            .cloned())
    }

    // =========================================================================
    // Gift Card Operations
    // =========================================================================

    async fn insert_gift_card(&self, card: &NewGiftCard) -> Result<GiftCard> {
        require_positive(card.searches_amount, "searches amount")?;

        let mut tables = self.tables.lock().await;
        if tables.gift_cards.iter().any(|c| c.code == card.code) {
            return Err(StoreError::Conflict {
                constraint: constraint::GIFT_CARDS_CODE_KEY.to_string(),
            });
        }

        let row = GiftCard {
            id: tables.next_id(),
            code: card.code.clone(),
            code_formatted: card.code_formatted.clone(),
            searches_amount: card.searches_amount,
            batch_id: card.batch_id.clone(),
            is_redeemed: false,
            redeemed_by: None,
            redeemed_at: None,
            created_at: Utc::now(),
        };
        tables.gift_cards.push(row.clone());
        Ok(row)
    }

    async fn get_gift_card(&self, code: &str) -> Result<Option<GiftCard>> {
        let tables = self.tables.lock().await;
        Ok(tables.gift_cards.iter().find(|c| c.code == code).cloned())
    }

    async fn list_gift_cards_by_batch(&self, batch_id: &str) -> Result<Vec<GiftCard>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .gift_cards
            .iter()
            .filter(|c| c.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect())
    }

    async fn redeem_gift_card(
        &self,
        telegram_id: TelegramId,
        code: &str,
    ) -> Result<GiftCardRedemption> {
        let mut tables = self.tables.lock().await;

        let index = tables
            .gift_cards
            .iter()
            .position(|c| c.code == code)
            .ok_or_else(|| StoreError::not_found("gift card", code))?;

        let card = &tables.gift_cards[index];
        if card.is_redeemed {
            return Err(StoreError::AlreadyRedeemed {
                code: card.code.clone(),
                redeemed_at: card.redeemed_at.unwrap_or(card.created_at),
            });
        }
        let (gift_card_id, searches_amount, card_code) =
            (card.id, card.searches_amount, card.code.clone());

        let user = tables
            .users
            .get_mut(&telegram_id)
            .ok_or_else(|| StoreError::not_found("user", telegram_id))?;
        user.paid_searches = credit(user.paid_searches, searches_amount)?;

        let now = Utc::now();
        let card = &mut tables.gift_cards[index];
        card.is_redeemed = true;
        card.redeemed_by = Some(telegram_id);
        card.redeemed_at = Some(now);

        let redemption = GiftCardRedemption {
            id: tables.next_id(),
            telegram_id,
            gift_card_id,
            searches_amount,
            code: card_code,
            redeemed_at: now,
        };
        tables.redemptions.push(redemption.clone());
        Ok(redemption)
    }

    async fn list_redemptions_by_user(
        &self,
        telegram_id: TelegramId,
    ) -> Result<Vec<GiftCardRedemption>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .redemptions
            .iter()
            .rev()
            .filter(|r| r.telegram_id == telegram_id)
            .cloned()
            .collect())
    }

    async fn redemption_stats(&self) -> Result<RedemptionStats> {
        let tables = self.tables.lock().await;

        let mut stats = RedemptionStats::default();
        for card in &tables.gift_cards {
            stats.total_cards += 1;
            stats.total_searches += i64::from(card.searches_amount);
            if card.is_redeemed {
                stats.redeemed_cards += 1;
                stats.redeemed_searches += i64::from(card.searches_amount);
            }
        }
        stats.unredeemed_cards = stats.total_cards - stats.redeemed_cards;
        stats.unredeemed_searches = stats.total_searches - stats.redeemed_searches;

        stats.total_redemptions = i64::try_from(tables.redemptions.len()).unwrap_or(i64::MAX);
        let mut users: Vec<TelegramId> = tables.redemptions.iter().map(|r| r.telegram_id).collect();
        users.sort_unstable();
        users.dedup();
        stats.unique_users = i64::try_from(users.len()).unwrap_or(i64::MAX);

        Ok(stats)
    }
}
