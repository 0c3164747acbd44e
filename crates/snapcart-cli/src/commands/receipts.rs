//! Receipt CLI commands

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use snapcart_core::db::Database;
use snapcart_core::extract::{parse_receipt_text, PlainTextExtractor, TextExtractor};
use snapcart_core::models::{NewReceipt, Receipt, ReceiptFilter};

use super::truncate;

fn parse_date_arg(flag: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .with_context(|| format!("Invalid --{} date format (use YYYY-MM-DD)", flag))
        })
        .transpose()
}

/// Guess a content type from the file extension
fn content_type_for(file: &Path) -> Option<&'static str> {
    let ext = file.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "txt" | "text" => Some("text/plain"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "heic" => Some("image/heic"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// Date part of a stored timestamp
fn short_date(receipt: &Receipt) -> &str {
    receipt
        .created_date
        .get(..10)
        .unwrap_or(&receipt.created_date)
}

/// List receipts, optionally filtered
pub fn cmd_receipts_list(
    db: &Database,
    store: Option<&str>,
    category: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let filter = ReceiptFilter {
        store: store.map(str::to_string),
        category: category.map(str::to_string),
        from: parse_date_arg("from", from)?,
        to: parse_date_arg("to", to)?,
    };

    let receipts = db.list_receipts(&filter)?;

    if receipts.is_empty() {
        println!("No receipts found");
        return Ok(());
    }

    println!("\n🧾 Receipts ({})", receipts.len());
    println!("{}", "─".repeat(70));

    for receipt in &receipts {
        println!(
            "  #{:<5} {:<26} {:>10}  {:<14} {}",
            receipt.id,
            truncate(&receipt.store, 26),
            format!("${:.2}", receipt.total_amount),
            truncate(&receipt.category, 14),
            short_date(receipt)
        );
    }

    println!();
    Ok(())
}

/// Show a receipt with its line items
pub fn cmd_receipts_show(db: &Database, id: i64) -> Result<()> {
    let receipt = db
        .get_receipt(id)?
        .ok_or_else(|| anyhow!("Receipt #{} not found", id))?;

    println!("\n🧾 Receipt #{}", receipt.id);
    println!("{}", "─".repeat(50));
    println!("  Store:    {}", receipt.store);
    println!("  Category: {}", receipt.category);
    println!("  File:     {}", receipt.filename);
    println!("  Created:  {}", receipt.created_date);
    println!("  Modified: {}", receipt.last_modified_date);
    println!("  Total:    ${:.2}", receipt.total_amount);

    if receipt.items.is_empty() {
        println!("\n  No line items");
    } else {
        println!("\n  Items:");
        for item in &receipt.items {
            println!(
                "    {:<28} {:>3} x {:>8} = {:>9}",
                truncate(&item.name, 28),
                item.quantity,
                format!("${:.2}", item.price),
                format!("${:.2}", item.total_price())
            );
        }
    }

    println!();
    Ok(())
}

/// Extract, parse and store a receipt file, returning its ID
///
/// A file that was already added is reported and its existing ID returned.
pub fn cmd_receipts_add(db: &Database, file: &Path, category: &str) -> Result<i64> {
    if !file.exists() {
        return Err(anyhow!("File not found: {}", file.display()));
    }

    let data = std::fs::read(file).context("Failed to read receipt file")?;
    if data.is_empty() {
        return Err(anyhow!("Receipt file is empty: {}", file.display()));
    }

    // Compute content hash
    let mut hasher = Sha256::new();
    hasher.update(&data);
    let content_hash = format!("{:x}", hasher.finalize());

    if let Some(existing) = db.get_receipt_by_hash(&content_hash)? {
        println!("Receipt already exists with ID #{}", existing.id);
        println!("Use 'snapcart receipts show {}' to view it", existing.id);
        return Ok(existing.id);
    }

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("receipt")
        .to_string();

    let text = PlainTextExtractor
        .extract_text(&filename, content_type_for(file), &data)
        .context("Failed to extract receipt text")?;
    let parsed = parse_receipt_text(&text);

    println!("Parsing receipt...");
    println!("  Store:    {}", parsed.store);
    println!("  Items:    {} line items found", parsed.items.len());
    println!("  Total:    ${:.2}", parsed.total);

    let receipt_id = db
        .create_receipt(&NewReceipt {
            filename,
            extracted_text: text,
            total_amount: Some(parsed.total),
            items: parsed.items,
            store: parsed.store,
            category: Some(category.to_string()),
            content_hash: Some(content_hash),
            created_date: None,
        })
        .context("Failed to store receipt")?;

    println!("\n✓ Receipt #{} created ({})", receipt_id, category);
    Ok(receipt_id)
}

/// Delete a receipt
pub fn cmd_receipts_delete(db: &Database, id: i64) -> Result<()> {
    db.delete_receipt(id)
        .with_context(|| format!("Failed to delete receipt #{}", id))?;
    println!("✓ Receipt #{} deleted", id);
    Ok(())
}
