//! SnapCart CLI - Receipt tracker with spending analytics
//!
//! Usage:
//!   snapcart init                          Initialize database
//!   snapcart receipts add --file r.txt     Extract, parse and store a receipt
//!   snapcart analytics summary             Show spending analytics
//!   snapcart serve --port 8080             Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.db_path.clone());

    match cli.command {
        Commands::Init => commands::cmd_init(&db_path, cli.no_encrypt),
        Commands::Receipts { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None => commands::cmd_receipts_list(&db, None, None, None, None),
                Some(ReceiptsAction::List {
                    store,
                    category,
                    from,
                    to,
                }) => commands::cmd_receipts_list(
                    &db,
                    store.as_deref(),
                    category.as_deref(),
                    from.as_deref(),
                    to.as_deref(),
                ),
                Some(ReceiptsAction::Show { id }) => commands::cmd_receipts_show(&db, id),
                Some(ReceiptsAction::Add { file, category }) => {
                    let category =
                        category.unwrap_or_else(|| config.receipts.default_category.clone());
                    commands::cmd_receipts_add(&db, &file, &category).map(|_| ())
                }
                Some(ReceiptsAction::Delete { id }) => commands::cmd_receipts_delete(&db, id),
            }
        }
        Commands::Analytics { action } => {
            let db = commands::open_db(&db_path, cli.no_encrypt)?;
            match action {
                None => commands::cmd_analytics_summary(&db, false),
                Some(AnalyticsAction::Summary { json }) => {
                    commands::cmd_analytics_summary(&db, json)
                }
                Some(AnalyticsAction::Monthly) => commands::cmd_analytics_monthly(&db),
                Some(AnalyticsAction::TopItems { limit }) => {
                    commands::cmd_analytics_top_items(&db, limit)
                }
                Some(AnalyticsAction::Categories) => commands::cmd_analytics_categories(&db),
                Some(AnalyticsAction::Recent { limit }) => commands::cmd_analytics_recent(
                    &db,
                    limit.unwrap_or(config.receipts.recent_limit),
                ),
            }
        }
        Commands::Serve {
            port,
            host,
            static_dir,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            commands::cmd_serve(
                &db_path,
                &config,
                &host,
                port,
                cli.no_encrypt,
                static_dir.as_deref(),
            )
            .await
        }
    }
}
