//! Gift card operations behind the admin subcommands.
//!
//! Everything here is generic over [`Store`], so the same code runs against
//! PostgreSQL in production and [`searchbot_store::MemoryStore`] in tests.

use std::path::{Path, PathBuf};

use serde::Serialize;

use searchbot_core::{
    CoreError, GiftCard, GiftCardCode, GiftCardRedemption, NewGiftCard, NewUser, TelegramId,
};
use searchbot_store::Store;

use crate::error::{AdminError, Result};

/// Codes drawn per card before giving up on collisions.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

// ============================================================================
// Generate
// ============================================================================

/// Outcome of a generation run.
#[derive(Debug, Default)]
pub struct GenerateReport {
    /// Cards inserted.
    pub issued: Vec<GiftCard>,
    /// Cards that could not be inserted.
    pub failed: usize,
}

/// Issue `count` cards worth `searches` each under `batch_id`.
///
/// A code that collides with an existing card is redrawn. A card that still
/// can't be inserted is logged and skipped, so the cards issued before and
/// after it are kept in the report.
///
/// # Errors
///
/// Returns `CoreError::InvalidAmount` if `searches` is not positive.
pub async fn generate_cards<S: Store + ?Sized>(
    store: &S,
    count: u32,
    searches: i32,
    batch_id: &str,
) -> Result<GenerateReport> {
    if searches <= 0 {
        return Err(CoreError::InvalidAmount(format!(
            "searches amount must be positive, got {searches}"
        ))
        .into());
    }

    let mut report = GenerateReport {
        issued: Vec::with_capacity(count as usize),
        failed: 0,
    };
    for n in 1..=count {
        match issue_unique(store, searches, batch_id).await {
            Ok(card) => report.issued.push(card),
            Err(e) => {
                tracing::error!(
                    card = n,
                    batch_id = %batch_id,
                    error = %e,
                    "Failed to create gift card"
                );
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        batch_id = %batch_id,
        issued = report.issued.len(),
        failed = report.failed,
        searches,
        "Generated gift cards"
    );
    Ok(report)
}

async fn issue_unique<S: Store + ?Sized>(
    store: &S,
    searches: i32,
    batch_id: &str,
) -> Result<GiftCard> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = GiftCardCode::generate();
        let card = NewGiftCard::issue(&code, searches, Some(batch_id.to_string()))?;
        match store.insert_gift_card(&card).await {
            Ok(card) => return Ok(card),
            Err(e) if e.is_conflict() => {
                tracing::debug!(attempt, code = %code, "Gift card code collision, redrawing");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AdminError::CodeExhausted {
        attempts: MAX_CODE_ATTEMPTS,
    })
}

#[derive(Serialize)]
struct CardRecord<'a> {
    #[serde(rename = "Code")]
    code: &'a str,
    #[serde(rename = "Formatted")]
    formatted: &'a str,
    #[serde(rename = "Searches")]
    searches: i32,
    #[serde(rename = "Batch")]
    batch: &'a str,
    #[serde(rename = "Created")]
    created: String,
}

/// Export file name for a batch.
#[must_use]
pub fn export_path(dir: &Path, batch_id: &str) -> PathBuf {
    dir.join(format!("gift_cards_{batch_id}.csv"))
}

/// Write the issued cards of a batch to `dir`.
///
/// Returns the file written, or `None` when there is nothing to export.
///
/// # Errors
///
/// Returns an error if the directory or file can't be written.
pub fn export_batch(dir: &Path, batch_id: &str, cards: &[GiftCard]) -> Result<Option<PathBuf>> {
    if cards.is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(dir)?;
    let path = export_path(dir, batch_id);
    write_cards_csv(&path, cards)?;
    Ok(Some(path))
}

/// Write cards as CSV with the columns `Code,Formatted,Searches,Batch,Created`.
///
/// # Errors
///
/// Returns an error if the file can't be created or written.
pub fn write_cards_csv(path: &Path, cards: &[GiftCard]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for card in cards {
        writer.serialize(CardRecord {
            code: &card.code,
            formatted: &card.code_formatted,
            searches: card.searches_amount,
            batch: card.batch_id.as_deref().unwrap_or_default(),
            created: card.created_at.to_rfc3339(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// Import
// ============================================================================

/// Outcome of an import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Cards inserted.
    pub imported: Vec<GiftCard>,
    /// Rows with an empty or malformed code.
    pub invalid: usize,
    /// Codes already present.
    pub duplicates: usize,
}

/// Read the `Code` (or `code`) column of a CSV file.
///
/// Empty cells are dropped; the codes are returned as written.
///
/// # Errors
///
/// Returns `AdminError::MissingCodeColumn` if the header has no code column,
/// or a CSV/IO error.
pub fn read_codes_csv(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| matches!(h.trim(), "Code" | "code"))
        .ok_or_else(|| AdminError::MissingCodeColumn {
            path: path.display().to_string(),
        })?;

    let mut codes = Vec::new();
    for record in reader.records() {
        let record = record?;
        match record.get(column).map(str::trim) {
            Some(code) if !code.is_empty() => codes.push(code.to_string()),
            _ => {}
        }
    }
    Ok(codes)
}

/// Insert externally produced codes worth `searches` each.
///
/// Malformed codes and codes already on file are counted and skipped.
///
/// # Errors
///
/// Returns `CoreError::InvalidAmount` if `searches` is not positive, or any
/// storage error other than a duplicate code.
pub async fn import_cards<S: Store + ?Sized>(
    store: &S,
    codes: &[String],
    searches: i32,
    batch_id: &str,
) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for raw in codes {
        let code = match GiftCardCode::parse(raw) {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(code = %raw, error = %e, "Skipping malformed code");
                report.invalid += 1;
                continue;
            }
        };
        let card = NewGiftCard::issue(&code, searches, Some(batch_id.to_string()))?;
        match store.insert_gift_card(&card).await {
            Ok(card) => report.imported.push(card),
            Err(e) if e.is_conflict() => {
                tracing::warn!(code = %code, "Skipping code already on file");
                report.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(
        batch_id = %batch_id,
        imported = report.imported.len(),
        invalid = report.invalid,
        duplicates = report.duplicates,
        "Imported gift cards"
    );
    Ok(report)
}

// ============================================================================
// Redeem and stats
// ============================================================================

/// Redeem `input` for `telegram_id`, registering the user if needed.
///
/// # Errors
///
/// - `CoreError::InvalidCode` if `input` is not a well-formed code.
/// - `StoreError::NotFound` if no card has that code.
/// - `StoreError::AlreadyRedeemed` if the card was used before.
pub async fn redeem<S: Store + ?Sized>(
    store: &S,
    telegram_id: TelegramId,
    input: &str,
) -> Result<GiftCardRedemption> {
    let code = GiftCardCode::parse(input)?;
    store.get_or_create_user(&NewUser::new(telegram_id)).await?;
    Ok(store.redeem_gift_card(telegram_id, code.as_str()).await?)
}

/// Searches a user has obtained from gift cards.
///
/// # Errors
///
/// Returns an error if the storage operation fails.
pub async fn user_gift_searches<S: Store + ?Sized>(
    store: &S,
    telegram_id: TelegramId,
) -> Result<i64> {
    let redemptions = store.list_redemptions_by_user(telegram_id).await?;
    Ok(redemptions
        .iter()
        .map(|r| i64::from(r.searches_amount))
        .sum())
}
