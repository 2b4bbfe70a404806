//! Searchbot admin - gift cards and schema management
//!
//! Reads `DATABASE_URL` and friends from the environment; see `AdminConfig`.

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use searchbot_admin::cli::{Cli, Commands};
use searchbot_admin::{commands, AdminConfig};
use searchbot_core::default_batch_id;
use searchbot_store::{PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,searchbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AdminConfig::from_env();

    tracing::debug!(
        database_configured = %config.database_url.is_some(),
        max_connections = config.max_connections,
        export_dir = %config.export_dir.display(),
        "Admin configuration loaded"
    );

    if let Err(e) = run(cli.command, &config).await {
        tracing::error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

async fn run(
    command: Commands,
    config: &AdminConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = PgStore::connect(config.require_database_url()?, config.max_connections).await?;

    match command {
        Commands::Migrate => {
            store.migrate().await?;
            println!("Migrations applied");
        }
        Commands::Generate {
            count,
            searches,
            batch,
            out,
        } => {
            let batch = batch.unwrap_or_else(|| default_batch_id("batch", Utc::now()));
            let report = commands::generate_cards(&store, count, searches, &batch).await?;

            let dir = out.unwrap_or_else(|| config.export_dir.clone());
            let Some(path) = commands::export_batch(&dir, &batch, &report.issued)? else {
                println!("No cards were created");
                return Ok(());
            };

            println!(
                "Generated {} gift cards in batch {batch} ({} failed)",
                report.issued.len(),
                report.failed
            );
            println!("Exported to {}", path.display());
            for card in report.issued.iter().take(5) {
                println!("  {}", card.code_formatted);
            }
        }
        Commands::Import {
            file,
            searches,
            batch,
        } => {
            let batch = batch.unwrap_or_else(|| default_batch_id("import", Utc::now()));
            let codes = commands::read_codes_csv(&file)?;
            let report = commands::import_cards(&store, &codes, searches, &batch).await?;
            println!(
                "Imported {} gift cards into batch {batch} ({} malformed, {} duplicate)",
                report.imported.len(),
                report.invalid,
                report.duplicates
            );
        }
        Commands::Redeem { telegram_id, code } => {
            let redemption = commands::redeem(&store, telegram_id, &code).await?;
            println!(
                "Redeemed {} for user {telegram_id}: +{} searches",
                searchbot_core::format_code(&redemption.code),
                redemption.searches_amount
            );
        }
        Commands::Stats => {
            println!("{}", store.redemption_stats().await?);
        }
        Commands::UserStats { telegram_id } => {
            let total = commands::user_gift_searches(&store, telegram_id).await?;
            println!("User {telegram_id} obtained {total} searches from gift cards");
        }
    }

    Ok(())
}
