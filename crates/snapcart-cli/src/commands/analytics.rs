//! Analytics command implementations

use anyhow::{Context, Result};
use snapcart_core::analytics::Aggregation;
use snapcart_core::db::Database;
use snapcart_core::AggregationEngine;

use super::truncate;

/// How many top items the text summary lists
const SUMMARY_TOP_ITEMS: usize = 10;

/// Widest bar in the monthly chart
const BAR_WIDTH: f64 = 30.0;

fn summarize(db: &Database) -> Result<Aggregation> {
    let receipts = db
        .receipts_snapshot()
        .context("Failed to read receipts")?;
    Ok(AggregationEngine::new().compute_summary(&receipts))
}

fn print_skipped(aggregation: &Aggregation) {
    if aggregation.skipped.is_empty() {
        return;
    }
    println!(
        "\n⚠️  {} receipt(s) excluded from analytics:",
        aggregation.skipped.len()
    );
    for skipped in &aggregation.skipped {
        println!("   #{} {}", skipped.id, skipped.reason);
    }
}

fn bar(amount: f64, max: f64) -> String {
    if max <= 0.0 {
        return String::new();
    }
    "█".repeat(((amount / max) * BAR_WIDTH).round() as usize)
}

/// Print the full analytics summary
pub fn cmd_analytics_summary(db: &Database, json: bool) -> Result<()> {
    let aggregation = summarize(db)?;
    let summary = &aggregation.summary;

    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("\n📊 Spending Summary");
    println!("{}", "─".repeat(50));
    println!("  Total spent:     ${:.2}", summary.total_spent);
    println!("  Receipts:        {}", summary.total_receipts);
    println!("  Average receipt: ${:.2}", summary.average_receipt_amount);

    if !summary.monthly_spending.is_empty() {
        println!("\n  By month:");
        for (month, amount) in summary.monthly_spending.iter() {
            println!("    {}  {:>10}", month, format!("${:.2}", amount));
        }
    }

    if !summary.category_spending.is_empty() {
        println!("\n  By category:");
        for (category, amount) in &summary.category_spending {
            println!(
                "    {:<20} {:>10}",
                truncate(category, 20),
                format!("${:.2}", amount)
            );
        }
    }

    if !summary.top_items.is_empty() {
        println!("\n  Top items:");
        for (name, count) in summary.top_items.iter().take(SUMMARY_TOP_ITEMS) {
            println!("    {:<28} {:>4}x", truncate(name, 28), count);
        }
        if summary.top_items.len() > SUMMARY_TOP_ITEMS {
            println!(
                "    ... and {} more (snapcart analytics top-items)",
                summary.top_items.len() - SUMMARY_TOP_ITEMS
            );
        }
    }

    print_skipped(&aggregation);
    println!();
    Ok(())
}

/// Print spending per month, oldest first
pub fn cmd_analytics_monthly(db: &Database) -> Result<()> {
    let aggregation = summarize(db)?;
    let monthly = &aggregation.summary.monthly_spending;

    if monthly.is_empty() {
        println!("No spending recorded yet");
        print_skipped(&aggregation);
        return Ok(());
    }

    let max = monthly.values().copied().fold(0.0_f64, f64::max);

    println!("\n📅 Monthly Spending");
    println!("{}", "─".repeat(50));
    for (month, amount) in monthly.iter() {
        println!(
            "  {}  {:>10}  {}",
            month,
            format!("${:.2}", amount),
            bar(*amount, max)
        );
    }

    print_skipped(&aggregation);
    println!();
    Ok(())
}

/// Print the most frequently purchased items
pub fn cmd_analytics_top_items(db: &Database, limit: Option<usize>) -> Result<()> {
    let aggregation = summarize(db)?;
    let mut items = aggregation.summary.top_items.clone();
    if let Some(limit) = limit {
        items.truncate(limit);
    }

    if items.is_empty() {
        println!("No items recorded yet");
        print_skipped(&aggregation);
        return Ok(());
    }

    println!("\n🛒 Top Items");
    println!("{}", "─".repeat(50));
    for (rank, (name, count)) in items.iter().enumerate() {
        println!("  {:>3}. {:<32} {:>4}x", rank + 1, truncate(name, 32), count);
    }

    print_skipped(&aggregation);
    println!();
    Ok(())
}

/// Print spending per category
pub fn cmd_analytics_categories(db: &Database) -> Result<()> {
    let aggregation = summarize(db)?;
    let categories = &aggregation.summary.category_spending;

    if categories.is_empty() {
        println!("No spending recorded yet");
        print_skipped(&aggregation);
        return Ok(());
    }

    let total = aggregation.summary.total_spent;

    println!("\n🏷️  Spending by Category");
    println!("{}", "─".repeat(50));
    for (category, amount) in categories {
        let share = if total > 0.0 {
            amount / total * 100.0
        } else {
            0.0
        };
        let label = if category.is_empty() {
            "(none)"
        } else {
            category.as_str()
        };
        println!(
            "  {:<20} {:>10}  {:>5.1}%",
            truncate(label, 20),
            format!("${:.2}", amount),
            share
        );
    }

    print_skipped(&aggregation);
    println!();
    Ok(())
}

/// Print the most recent receipts
pub fn cmd_analytics_recent(db: &Database, limit: usize) -> Result<()> {
    let receipts = db
        .receipts_snapshot()
        .context("Failed to read receipts")?;
    let recent = AggregationEngine::new().recent_receipts(&receipts, limit);

    if recent.is_empty() {
        println!("No receipts found");
        return Ok(());
    }

    println!("\n🕒 Recent Receipts");
    println!("{}", "─".repeat(70));
    for receipt in &recent {
        println!(
            "  #{:<5} {:<26} {:>10}  {}",
            receipt.id,
            truncate(&receipt.store, 26),
            format!("${:.2}", receipt.total_amount),
            receipt.created_date
        );
    }

    println!();
    Ok(())
}
