//! Receipt operations

use std::collections::HashMap;

use chrono::SecondsFormat;
use rusqlite::{params, Connection, OptionalExtension};

use super::{now_timestamp, Database};
use crate::analytics::{parse_created_date, MAX_AMOUNT};
use crate::error::{Error, Result};
use crate::models::*;

const RECEIPT_COLUMNS: &str = "id, filename, extracted_text, total_amount, store, category, \
                               content_hash, created_at, updated_at";

impl Database {
    /// Store a receipt and its line items
    ///
    /// The total defaults to the sum of the item line totals. A supplied
    /// `created_date` is normalized to UTC; otherwise the current time is used.
    pub fn create_receipt(&self, receipt: &NewReceipt) -> Result<i64> {
        validate_items(&receipt.items)?;
        let total = receipt
            .total_amount
            .unwrap_or_else(|| receipt.items_total());
        validate_total(total)?;

        let created_at = match &receipt.created_date {
            Some(raw) => parse_created_date(raw)
                .map_err(|e| Error::InvalidData(e.to_string()))?
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            None => now_timestamp(),
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO receipts (filename, extracted_text, total_amount, store, category,
             content_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                receipt.filename,
                receipt.extracted_text,
                total,
                receipt.store,
                normalize_category(receipt.category.as_deref()),
                receipt.content_hash,
                created_at,
                created_at,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::Duplicate(format!(
                    "A receipt with the same content already exists ({})",
                    receipt.filename
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        insert_items(&tx, id, &receipt.items)?;
        tx.commit()?;

        Ok(id)
    }

    /// Get receipt by ID, with its items
    pub fn get_receipt(&self, id: i64) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        fetch_receipt(&conn, id)
    }

    /// Get receipt by content hash (for deduplication)
    pub fn get_receipt_by_hash(&self, content_hash: &str) -> Result<Option<Receipt>> {
        let conn = self.conn()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM receipts WHERE content_hash = ?",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()?;

        match id {
            Some(id) => fetch_receipt(&conn, id),
            None => Ok(None),
        }
    }

    /// List receipts matching a filter, in ingestion order
    pub fn list_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>> {
        let conn = self.conn()?;

        // Build dynamic WHERE clause
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(store) = filter.store.as_deref().map(str::trim) {
            if !store.is_empty() {
                conditions.push("store LIKE ? COLLATE NOCASE");
                params.push(Box::new(format!("%{}%", store)));
            }
        }

        if let Some(category) = filter.category.as_deref().map(str::trim) {
            if !category.is_empty() {
                conditions.push("category = ? COLLATE NOCASE");
                params.push(Box::new(category.to_string()));
            }
        }

        // created_at is always stored as RFC 3339 UTC, so its date prefix compares lexically
        if let Some(from) = filter.from {
            conditions.push("substr(created_at, 1, 10) >= ?");
            params.push(Box::new(from.to_string()));
        }

        if let Some(to) = filter.to {
            conditions.push("substr(created_at, 1, 10) <= ?");
            params.push(Box::new(to.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM receipts {} ORDER BY id ASC",
            RECEIPT_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut receipts = stmt
            .query_map(params_refs.as_slice(), row_to_receipt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        attach_items(&conn, &mut receipts)?;
        Ok(receipts)
    }

    /// Every stored receipt, read inside one transaction
    ///
    /// Aggregation runs over this snapshot so a concurrent write can never be
    /// half-visible in a summary.
    pub fn receipts_snapshot(&self) -> Result<Vec<Receipt>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut receipts = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM receipts ORDER BY id ASC",
                RECEIPT_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], row_to_receipt)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        attach_items(&tx, &mut receipts)?;

        tx.commit()?;
        Ok(receipts)
    }

    /// Apply a partial update, bumping the last-modified timestamp
    ///
    /// Replacing `items` does not recompute the stored total.
    pub fn update_receipt(&self, id: i64, update: &ReceiptUpdate) -> Result<Receipt> {
        if let Some(items) = &update.items {
            validate_items(items)?;
        }
        if let Some(total) = update.total_amount {
            validate_total(total)?;
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists = tx
            .query_row("SELECT 1 FROM receipts WHERE id = ?", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(Error::NotFound(format!("Receipt {} not found", id)));
        }

        let mut sets = vec!["updated_at = ?"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now_timestamp())];

        if let Some(filename) = &update.filename {
            sets.push("filename = ?");
            params.push(Box::new(filename.clone()));
        }
        if let Some(text) = &update.extracted_text {
            sets.push("extracted_text = ?");
            params.push(Box::new(text.clone()));
        }
        if let Some(total) = update.total_amount {
            sets.push("total_amount = ?");
            params.push(Box::new(total));
        }
        if let Some(store) = &update.store {
            sets.push("store = ?");
            params.push(Box::new(store.clone()));
        }
        if let Some(category) = &update.category {
            sets.push("category = ?");
            params.push(Box::new(normalize_category(Some(category))));
        }
        params.push(Box::new(id));

        let sql = format!("UPDATE receipts SET {} WHERE id = ?", sets.join(", "));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        tx.execute(&sql, params_refs.as_slice())?;

        if let Some(items) = &update.items {
            tx.execute(
                "DELETE FROM receipt_items WHERE receipt_id = ?",
                params![id],
            )?;
            insert_items(&tx, id, items)?;
        }

        let receipt = fetch_receipt(&tx, id)?
            .ok_or_else(|| Error::NotFound(format!("Receipt {} not found", id)))?;
        tx.commit()?;

        Ok(receipt)
    }

    /// Delete a receipt and its items
    pub fn delete_receipt(&self, id: i64) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM receipt_items WHERE receipt_id = ?",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM receipts WHERE id = ?", params![id])?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Receipt {} not found", id)));
        }

        tx.commit()?;
        Ok(())
    }

    /// Count stored receipts
    pub fn count_receipts(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn normalize_category(category: Option<&str>) -> String {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string()
}

fn validate_total(total: f64) -> Result<()> {
    if !total.is_finite() || total < 0.0 {
        return Err(Error::InvalidData(format!(
            "Total amount must be a non-negative number, got {}",
            total
        )));
    }
    if total > MAX_AMOUNT {
        return Err(Error::InvalidData(format!(
            "Total amount {} exceeds the maximum of {}",
            total, MAX_AMOUNT
        )));
    }
    Ok(())
}

fn validate_items(items: &[ReceiptItem]) -> Result<()> {
    for (i, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(Error::InvalidData(format!("Item {} has an empty name", i + 1)));
        }
        if !item.price.is_finite() || item.price < 0.0 || item.price > MAX_AMOUNT {
            return Err(Error::InvalidData(format!(
                "Item {} ({}) has an invalid price {}",
                i + 1,
                item.name,
                item.price
            )));
        }
        if item.quantity == 0 {
            return Err(Error::InvalidData(format!(
                "Item {} ({}) must have a quantity of at least 1",
                i + 1,
                item.name
            )));
        }
    }
    Ok(())
}

fn insert_items(conn: &Connection, receipt_id: i64, items: &[ReceiptItem]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO receipt_items (receipt_id, position, name, price, quantity, category)
         VALUES (?, ?, ?, ?, ?, ?)",
    )?;

    for (position, item) in items.iter().enumerate() {
        stmt.execute(params![
            receipt_id,
            position as i64,
            item.name.trim(),
            item.price,
            item.quantity,
            normalize_category(Some(&item.category)),
        ])?;
    }
    Ok(())
}

fn fetch_receipt(conn: &Connection, id: i64) -> Result<Option<Receipt>> {
    let receipt = conn
        .query_row(
            &format!("SELECT {} FROM receipts WHERE id = ?", RECEIPT_COLUMNS),
            params![id],
            row_to_receipt,
        )
        .optional()?;

    match receipt {
        Some(mut receipt) => {
            receipt.items = load_items(conn, id)?;
            Ok(Some(receipt))
        }
        None => Ok(None),
    }
}

fn load_items(conn: &Connection, receipt_id: i64) -> Result<Vec<ReceiptItem>> {
    let mut stmt = conn.prepare(
        "SELECT name, price, quantity, category FROM receipt_items
         WHERE receipt_id = ? ORDER BY position ASC",
    )?;

    let items = stmt
        .query_map(params![receipt_id], row_to_item)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Fill in the items of already-loaded receipts with a single query
fn attach_items(conn: &Connection, receipts: &mut [Receipt]) -> Result<()> {
    if receipts.is_empty() {
        return Ok(());
    }

    let index: HashMap<i64, usize> = receipts
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id, i))
        .collect();

    let mut stmt = conn.prepare(
        "SELECT receipt_id, name, price, quantity, category FROM receipt_items
         ORDER BY receipt_id ASC, position ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        let receipt_id: i64 = row.get(0)?;
        let item = ReceiptItem {
            name: row.get(1)?,
            price: row.get(2)?,
            quantity: row.get(3)?,
            category: row.get(4)?,
        };
        Ok((receipt_id, item))
    })?;

    for row in rows {
        let (receipt_id, item) = row?;
        if let Some(&i) = index.get(&receipt_id) {
            receipts[i].items.push(item);
        }
    }

    Ok(())
}

fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
    Ok(Receipt {
        id: row.get(0)?,
        filename: row.get(1)?,
        extracted_text: row.get(2)?,
        items: Vec::new(),
        total_amount: row.get(3)?,
        store: row.get(4)?,
        category: row.get(5)?,
        content_hash: row.get(6)?,
        created_date: row.get(7)?,
        last_modified_date: row.get(8)?,
    })
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ReceiptItem> {
    Ok(ReceiptItem {
        name: row.get(0)?,
        price: row.get(1)?,
        quantity: row.get(2)?,
        category: row.get(3)?,
    })
}
