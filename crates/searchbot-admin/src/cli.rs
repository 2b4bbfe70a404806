//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use searchbot_core::TelegramId;

/// Searchbot admin - gift card issuance and schema management
#[derive(Debug, Parser)]
#[command(name = "searchbot-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Admin subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply database migrations
    Migrate,

    /// Generate gift cards and export them to CSV
    #[command(alias = "gen")]
    Generate {
        /// Number of cards
        #[arg(long)]
        count: u32,
        /// Searches per card
        #[arg(long)]
        searches: i32,
        /// Batch ID (default: batch_<timestamp>)
        #[arg(long)]
        batch: Option<String>,
        /// Output directory (default: GIFT_CARD_EXPORT_DIR)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Import gift card codes from a CSV file with a `Code` column
    Import {
        /// CSV file path
        file: PathBuf,
        /// Searches per card
        #[arg(long)]
        searches: i32,
        /// Batch ID (default: import_<timestamp>)
        #[arg(long)]
        batch: Option<String>,
    },

    /// Redeem a gift card on behalf of a user
    Redeem {
        /// The redeeming user's telegram id
        #[arg(long)]
        telegram_id: TelegramId,
        /// Code, with or without dashes
        code: String,
    },

    /// Show gift card statistics
    Stats,

    /// Show searches a user obtained from gift cards
    UserStats {
        /// The user's telegram id
        #[arg(long)]
        telegram_id: TelegramId,
    },
}
