//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SnapCart - Track grocery receipts and see where the money goes
#[derive(Parser)]
#[command(name = "snapcart")]
#[command(about = "Receipt tracker with spending analytics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (defaults to the configured path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SNAPCART_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage receipts (default: list)
    Receipts {
        #[command(subcommand)]
        action: Option<ReceiptsAction>,
    },

    /// Show spending analytics (default: summary)
    Analytics {
        #[command(subcommand)]
        action: Option<AnalyticsAction>,
    },

    /// Start the web server
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Directory containing the web client's static files
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ReceiptsAction {
    /// List receipts
    List {
        /// Store name contains (case-insensitive)
        #[arg(long)]
        store: Option<String>,

        /// Category (case-insensitive)
        #[arg(long)]
        category: Option<String>,

        /// Created on or after (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Created on or before (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Show a receipt with its line items
    Show {
        /// Receipt ID
        id: i64,
    },

    /// Add a receipt from a text file (extract, parse and store)
    Add {
        /// Path to the receipt file
        #[arg(short, long)]
        file: PathBuf,

        /// Receipt category (defaults to the configured category)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Delete a receipt
    Delete {
        /// Receipt ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum AnalyticsAction {
    /// Totals, monthly spending, top items and categories
    Summary {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Spending per month
    Monthly,

    /// Most frequently purchased items
    TopItems {
        /// Number of items to show (all when omitted)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Spending per category
    Categories,

    /// Most recent receipts
    Recent {
        /// Number of receipts to show (defaults to the configured limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
}
