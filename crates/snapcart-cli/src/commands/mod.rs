//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analytics` - Spending analytics (summary, monthly, top items, categories, recent)
//! - `core` - Init command and shared utilities (open_db, load_config)
//! - `receipts` - Receipt commands (list, show, add, delete)
//! - `serve` - Web server command

pub mod analytics;
pub mod core;
pub mod receipts;
pub mod serve;

// Re-export command functions for main.rs
pub use analytics::*;
pub use self::core::*;
pub use receipts::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
