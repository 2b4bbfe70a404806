//! PostgreSQL integration tests.
//!
//! These tests run against a live database and apply the migrations to it.
//! Set `DATABASE_URL` to a scratch database the role may create roles in.
//!
//! Run with: cargo test -p searchbot-store --test postgres -- --ignored

use std::sync::Arc;

use searchbot_core::{GiftCardCode, NewGiftCard, NewPayment, NewSearch, NewUser, TelegramId};
use searchbot_store::{schema, PgStore, Store, StoreError};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/searchbot_test".to_string());
    let store = PgStore::connect(&url, 20)
        .await
        .expect("Failed to connect to PostgreSQL");
    store.migrate().await.expect("Failed to apply migrations");
    store
}

/// A telegram id no other test run is likely to use.
fn fresh_telegram_id() -> TelegramId {
    TelegramId::new(rand::random_range(1_000_000..i64::MAX))
}

async fn fresh_user(store: &PgStore) -> TelegramId {
    let id = fresh_telegram_id();
    store.create_user(&NewUser::new(id)).await.unwrap();
    id
}

async fn fresh_card(store: &PgStore, searches: i32) -> GiftCardCode {
    let code = GiftCardCode::generate();
    store
        .insert_gift_card(&NewGiftCard::issue(&code, searches, Some("it_batch".into())).unwrap())
        .await
        .unwrap();
    code
}

// ============================================================================
// Schema
// ============================================================================

#[tokio::test]
#[ignore]
async fn lookup_indexes_exist() {
    let store = store().await;

    for index in schema::INDEXES {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT indexname::TEXT FROM pg_indexes WHERE indexname = $1")
                .bind(*index)
                .fetch_optional(store.pool())
                .await
                .unwrap();
        assert!(found.is_some(), "missing index {index}");
    }
}

#[tokio::test]
#[ignore]
async fn every_table_has_row_level_security_for_service_role() {
    let store = store().await;

    for table in schema::all_tables() {
        let (rls,): (bool,) =
            sqlx::query_as("SELECT relrowsecurity FROM pg_class WHERE oid = $1::text::regclass")
                .bind(table)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert!(rls, "row level security disabled on {table}");

        let (policies,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM pg_policies
             WHERE tablename = $1 AND policyname = $2 AND 'service_role' = ANY(roles)",
        )
        .bind(table)
        .bind(format!("service_role_all_{table}"))
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(policies, 1, "missing service_role policy on {table}");
    }
}

// ============================================================================
// Constraints
// ============================================================================

#[tokio::test]
#[ignore]
async fn duplicate_telegram_id_rejected() {
    let store = store().await;
    let id = fresh_user(&store).await;

    let err = store.create_user(&NewUser::new(id)).await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");
}

#[tokio::test]
#[ignore]
async fn duplicate_gift_card_code_rejected() {
    let store = store().await;
    let code = fresh_card(&store, 5).await;

    let err = store
        .insert_gift_card(&NewGiftCard::issue(&code, 5, None).unwrap())
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err}");
}

#[tokio::test]
#[ignore]
async fn children_require_existing_user() {
    let store = store().await;
    let ghost = fresh_telegram_id();

    let err = store.record_search(&NewSearch::new(ghost, 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::ForeignKey { .. }), "got {err}");

    let payment = NewPayment::new(ghost, 10, 1, None).unwrap();
    let err = store.record_payment(&payment).await.unwrap_err();
    assert!(matches!(err, StoreError::ForeignKey { .. }), "got {err}");

    let code = fresh_card(&store, 5).await;
    let err = store.redeem_gift_card(ghost, code.as_str()).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "user", .. }), "got {err}");
}

#[tokio::test]
#[ignore]
async fn redemption_row_requires_existing_card() {
    let store = store().await;
    let user = fresh_user(&store).await;

    let err: StoreError = sqlx::query(
        "INSERT INTO gift_card_redemptions (telegram_id, gift_card_id, searches_amount, code)
         VALUES ($1, -1, 5, 'MISSING')",
    )
    .bind(user.get())
    .execute(store.pool())
    .await
    .unwrap_err()
    .into();
    assert!(matches!(err, StoreError::ForeignKey { .. }), "got {err}");
}

#[tokio::test]
#[ignore]
async fn redemption_row_requires_redeemed_card() {
    let store = store().await;
    let user = fresh_user(&store).await;
    let code = fresh_card(&store, 5).await;
    let card = store.get_gift_card(code.as_str()).await.unwrap().unwrap();

    let err: StoreError = sqlx::query(
        "INSERT INTO gift_card_redemptions (telegram_id, gift_card_id, searches_amount, code)
         VALUES ($1, $2, 5, $3)",
    )
    .bind(user.get())
    .bind(card.id)
    .bind(code.as_str())
    .execute(store.pool())
    .await
    .unwrap_err()
    .into();
    assert!(matches!(err, StoreError::Constraint { .. }), "got {err}");
}

#[tokio::test]
#[ignore]
async fn redeemed_flag_cannot_be_reverted() {
    let store = store().await;
    let user = fresh_user(&store).await;
    let code = fresh_card(&store, 5).await;
    store.redeem_gift_card(user, code.as_str()).await.unwrap();

    let err: StoreError = sqlx::query(
        "UPDATE gift_cards SET is_redeemed = FALSE, redeemed_by = NULL, redeemed_at = NULL
         WHERE code = $1",
    )
    .bind(code.as_str())
    .execute(store.pool())
    .await
    .unwrap_err()
    .into();
    assert!(matches!(err, StoreError::Constraint { .. }), "got {err}");

    let card = store.get_gift_card(code.as_str()).await.unwrap().unwrap();
    assert!(card.is_redeemed);
    assert_eq!(card.redeemed_by, Some(user));
}

#[tokio::test]
#[ignore]
async fn redemption_columns_move_together() {
    let store = store().await;
    let code = fresh_card(&store, 5).await;

    let err: StoreError = sqlx::query("UPDATE gift_cards SET is_redeemed = TRUE WHERE code = $1")
        .bind(code.as_str())
        .execute(store.pool())
        .await
        .unwrap_err()
        .into();
    assert!(matches!(err, StoreError::Constraint { .. }), "got {err}");
}

// ============================================================================
// Redemption flow
// ============================================================================

#[tokio::test]
#[ignore]
async fn redeem_grants_searches_and_writes_audit_row() {
    let store = store().await;
    let user = fresh_telegram_id();
    let created = store.get_or_create_user(&NewUser::new(user)).await.unwrap();
    assert_eq!(created.free_searches, 1);
    assert_eq!(created.paid_searches, 0);

    let code = fresh_card(&store, 5).await;
    let redemption = store.redeem_gift_card(user, code.as_str()).await.unwrap();
    assert_eq!(redemption.searches_amount, 5);
    assert_eq!(redemption.code, code.as_str());

    let card = store.get_gift_card(code.as_str()).await.unwrap().unwrap();
    assert!(card.is_redeemed);
    assert_eq!(card.redeemed_by, Some(user));
    assert_eq!(card.redeemed_at, Some(redemption.redeemed_at));

    let user_row = store.get_user(user).await.unwrap().unwrap();
    assert_eq!(user_row.paid_searches, 5);

    let history = store.list_redemptions_by_user(user).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].gift_card_id, card.id);

    let err = store.redeem_gift_card(user, code.as_str()).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyRedeemed { .. }), "got {err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_redemptions_single_winner() {
    let store = Arc::new(store().await);
    let code = fresh_card(&store, 3).await;

    let mut users = Vec::new();
    for _ in 0..8 {
        users.push(fresh_user(&store).await);
    }

    let mut tasks = tokio::task::JoinSet::new();
    for user in users {
        let store = Arc::clone(&store);
        let code = code.clone();
        tasks.spawn(async move { store.redeem_gift_card(user, code.as_str()).await });
    }

    let mut winners = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => winners += 1,
            Err(StoreError::AlreadyRedeemed { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);

    let card = store.get_gift_card(code.as_str()).await.unwrap().unwrap();
    let rows: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM gift_card_redemptions WHERE gift_card_id = $1")
            .bind(card.id)
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(rows.0, 1);
}

// ============================================================================
// Searches and payments
// ============================================================================

#[tokio::test]
#[ignore]
async fn search_lifecycle() {
    let store = store().await;
    let user = fresh_user(&store).await;

    let search = store.record_search(&NewSearch::new(user, 4)).await.unwrap();
    assert!(!search.is_unlocked);

    let unlocked = store.unlock_search(&search.search_id).await.unwrap();
    assert!(unlocked.is_unlocked);

    let listed = store.list_searches_by_user(user, 10, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].results_count, 4);

    let err = store.list_searches_by_user(user, -1, 0).await.unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)), "got {err}");
}

#[tokio::test]
#[ignore]
async fn payment_and_consumption() {
    let store = store().await;
    let user = fresh_user(&store).await;

    let charge = format!("charge_{user}");
    let payment = NewPayment::new(user, 50, 2, Some(charge.clone())).unwrap();
    store.record_payment(&payment).await.unwrap();

    let found = store.find_payment_by_charge_id(&charge).await.unwrap().unwrap();
    assert_eq!(found.searches_count, 2);

    let mut kinds = Vec::new();
    for _ in 0..3 {
        kinds.push(store.consume_search(user).await.unwrap());
    }
    assert_eq!(kinds[0], searchbot_core::AllowanceKind::Free);
    assert_eq!(kinds[2], searchbot_core::AllowanceKind::Paid);

    let err = store.consume_search(user).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientSearches { .. }), "got {err}");
}

#[tokio::test]
#[ignore]
async fn paid_allowance_overflow_rolls_back_payment() {
    let store = store().await;
    let user = fresh_user(&store).await;
    store.add_paid_searches(user, i32::MAX).await.unwrap();

    let err = store.add_paid_searches(user, 1).await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)), "got {err}");

    let payment = NewPayment::new(user, 10, 1, None).unwrap();
    let err = store.record_payment(&payment).await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)), "got {err}");
    assert!(store.list_payments_by_user(user).await.unwrap().is_empty());
}
