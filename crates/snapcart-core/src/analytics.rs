//! Aggregation engine - folds a snapshot of receipts into `AnalyticsData`
//!
//! The engine is a pure function of its input: it performs no I/O, never
//! mutates receipts, and returns identical output for an identical snapshot.
//!
//! Money is accumulated in integer cents. Each amount is rounded half-up to
//! the cent on entry, so long runs of additions cannot drift.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::error::{Error, Result, ValidationError};
use crate::models::{AnalyticsData, OrderedMap, Receipt, ReceiptItem, SkippedReceipt};

/// Naive datetime layouts accepted for `createdDate` (interpreted as UTC)
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Largest amount a single receipt or line item may carry
pub const MAX_AMOUNT: f64 = 1_000_000_000.0;

/// Convert a currency amount to whole cents, rounding half-up
///
/// The intermediate snap to 1e-6 cents absorbs binary representation error,
/// so `1.005` rounds to 101 cents rather than 100.
pub fn to_cents(amount: f64) -> i128 {
    let scaled = ((amount * 100.0) * 1e6).round() / 1e6;
    scaled.round() as i128
}

/// Convert whole cents back to a currency amount
pub fn from_cents(cents: i128) -> f64 {
    cents as f64 / 100.0
}

/// Sum `price * quantity` over line items, accumulated in cents
///
/// Saturates instead of overflowing; the write path rejects amounts above
/// [`MAX_AMOUNT`] long before that matters.
pub fn sum_line_totals(items: &[ReceiptItem]) -> f64 {
    let cents = items.iter().fold(0_i128, |acc, item| {
        acc.saturating_add(to_cents(item.price).saturating_mul(i128::from(item.quantity)))
    });
    from_cents(cents)
}

/// Parse an ISO 8601 creation timestamp into UTC
///
/// Accepts RFC 3339 (with `Z` or an offset), naive datetimes (UTC assumed),
/// and plain `YYYY-MM-DD` dates (UTC midnight).
pub fn parse_created_date(raw: &str) -> std::result::Result<DateTime<Utc>, ValidationError> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ValidationError::MalformedDate(raw.to_string()))
}

/// `YYYY-MM` bucket key for a month
fn month_key(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// Result of an aggregation pass
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub summary: AnalyticsData,
    /// Receipts excluded for failing validation, in input order
    pub skipped: Vec<SkippedReceipt>,
}

impl Aggregation {
    pub fn skipped_ids(&self) -> Vec<i64> {
        self.skipped.iter().map(|s| s.id).collect()
    }
}

/// A receipt that passed validation, reduced to what aggregation needs
struct ValidReceipt<'a> {
    receipt: &'a Receipt,
    cents: i128,
    month: (i32, u32),
}

/// Running totals for one pass over the snapshot
#[derive(Default)]
struct Accumulator<'a> {
    total_cents: i128,
    count: u64,
    monthly: BTreeMap<(i32, u32), i128>,
    categories: BTreeMap<&'a str, i128>,
    /// Item counts in first-appearance order
    items: Vec<(&'a str, u64)>,
    item_index: HashMap<&'a str, usize>,
}

impl<'a> Accumulator<'a> {
    fn add(&mut self, valid: ValidReceipt<'a>) {
        let receipt: &'a Receipt = valid.receipt;

        self.total_cents += valid.cents;
        self.count += 1;
        *self.monthly.entry(valid.month).or_insert(0) += valid.cents;
        *self.categories.entry(receipt.category.as_str()).or_insert(0) += valid.cents;

        for item in &receipt.items {
            let name = item.name.as_str();
            if name.trim().is_empty() {
                continue;
            }
            match self.item_index.get(name) {
                Some(&idx) => self.items[idx].1 += 1,
                None => {
                    self.item_index.insert(name, self.items.len());
                    self.items.push((name, 1));
                }
            }
        }
    }

    fn finish(mut self) -> AnalyticsData {
        if self.count == 0 {
            return AnalyticsData::default();
        }

        // Half-up integer division; totals are never negative
        let n = i128::from(self.count);
        let average_cents = (2 * self.total_cents + n) / (2 * n);

        // Stable sort keeps first-appearance order among equal counts
        self.items.sort_by(|a, b| b.1.cmp(&a.1));

        AnalyticsData {
            total_spent: from_cents(self.total_cents),
            total_receipts: self.count,
            average_receipt_amount: from_cents(average_cents),
            monthly_spending: self
                .monthly
                .into_iter()
                .map(|((y, m), cents)| (month_key(y, m), from_cents(cents)))
                .collect(),
            top_items: self
                .items
                .into_iter()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
            category_spending: self
                .categories
                .into_iter()
                .map(|(cat, cents)| (cat.to_string(), from_cents(cents)))
                .collect(),
        }
    }
}

/// Computes analytics summaries from receipt snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationEngine;

impl AggregationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate a receipt, reducing it to what aggregation needs
    fn check<'a>(
        &self,
        receipt: &'a Receipt,
    ) -> std::result::Result<ValidReceipt<'a>, ValidationError> {
        let amount = receipt.total_amount;
        if !amount.is_finite() {
            return Err(ValidationError::NonFiniteAmount);
        }
        if amount < 0.0 {
            return Err(ValidationError::NegativeAmount(amount));
        }
        if amount > MAX_AMOUNT {
            return Err(ValidationError::AmountOutOfRange(amount));
        }
        let created = parse_created_date(&receipt.created_date)?;

        Ok(ValidReceipt {
            receipt,
            cents: to_cents(amount),
            month: (created.year(), created.month()),
        })
    }

    /// Aggregate a snapshot, excluding (and reporting) invalid receipts
    pub fn compute_summary(&self, receipts: &[Receipt]) -> Aggregation {
        let mut acc = Accumulator::default();
        let mut skipped = Vec::new();

        for receipt in receipts {
            match self.check(receipt) {
                Ok(valid) => acc.add(valid),
                Err(e) => {
                    warn!(receipt_id = receipt.id, reason = %e, "Skipping invalid receipt");
                    skipped.push(SkippedReceipt {
                        id: receipt.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let summary = acc.finish();
        debug!(
            receipts = summary.total_receipts,
            skipped = skipped.len(),
            months = summary.monthly_spending.len(),
            "Computed analytics summary"
        );

        Aggregation { summary, skipped }
    }

    /// Aggregate a snapshot, failing on the first invalid receipt
    pub fn compute_summary_strict(&self, receipts: &[Receipt]) -> Result<AnalyticsData> {
        let mut acc = Accumulator::default();
        for receipt in receipts {
            let valid = self.check(receipt).map_err(|source| Error::Validation {
                id: receipt.id,
                source,
            })?;
            acc.add(valid);
        }
        Ok(acc.finish())
    }

    /// Monthly spending series, ascending by month
    pub fn monthly_spending(&self, receipts: &[Receipt]) -> OrderedMap<f64> {
        self.compute_summary(receipts).summary.monthly_spending
    }

    /// Item purchase counts, most frequent first
    pub fn top_items(&self, receipts: &[Receipt]) -> OrderedMap<u64> {
        self.compute_summary(receipts).summary.top_items
    }

    /// Spending per receipt category
    pub fn category_spending(&self, receipts: &[Receipt]) -> BTreeMap<String, f64> {
        self.compute_summary(receipts).summary.category_spending
    }

    /// Most recent receipts first; receipts with unparseable dates sort last
    pub fn recent_receipts(&self, receipts: &[Receipt], limit: usize) -> Vec<Receipt> {
        let mut dated: Vec<(Option<DateTime<Utc>>, &Receipt)> = receipts
            .iter()
            .map(|r| (parse_created_date(&r.created_date).ok(), r))
            .collect();

        // None < Some, so reversing the comparison puts undated receipts last
        dated.sort_by(|a, b| b.0.cmp(&a.0));

        dated
            .into_iter()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReceiptItem;

    fn receipt(id: i64, amount: f64, category: &str, date: &str, items: &[&str]) -> Receipt {
        Receipt {
            id,
            filename: format!("receipt_{}.txt", id),
            extracted_text: String::new(),
            items: items.iter().map(|n| ReceiptItem::new(*n, 1.0)).collect(),
            total_amount: amount,
            store: "Corner Shop".to_string(),
            category: category.to_string(),
            content_hash: None,
            created_date: date.to_string(),
            last_modified_date: date.to_string(),
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let result = AggregationEngine::new().compute_summary(&[]);
        let s = result.summary;
        assert_eq!(s.total_spent, 0.0);
        assert_eq!(s.total_receipts, 0);
        assert_eq!(s.average_receipt_amount, 0.0);
        assert!(s.monthly_spending.is_empty());
        assert!(s.top_items.is_empty());
        assert!(s.category_spending.is_empty());
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_two_receipt_example() {
        let receipts = vec![
            receipt(1, 50.00, "Groceries", "2025-01-15", &["Milk"]),
            receipt(2, 30.00, "Dining", "2025-02-10", &["Milk", "Coffee"]),
        ];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;

        assert_eq!(s.total_spent, 80.00);
        assert_eq!(s.total_receipts, 2);
        assert_eq!(s.average_receipt_amount, 40.00);
        assert_eq!(
            s.monthly_spending.clone().into_vec(),
            vec![("2025-01".to_string(), 50.00), ("2025-02".to_string(), 30.00)]
        );
        assert_eq!(s.category_spending.get("Groceries"), Some(&50.00));
        assert_eq!(s.category_spending.get("Dining"), Some(&30.00));
        assert_eq!(
            s.top_items.into_vec(),
            vec![("Milk".to_string(), 2), ("Coffee".to_string(), 1)]
        );
    }

    #[test]
    fn test_average_rounds_half_up() {
        let receipts = vec![
            receipt(1, 0.01, "A", "2025-01-01", &[]),
            receipt(2, 0.02, "A", "2025-01-02", &[]),
        ];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        assert_eq!(s.total_spent, 0.03);
        // 0.015 rounds up
        assert_eq!(s.average_receipt_amount, 0.02);

        let receipts = vec![
            receipt(1, 10.00, "A", "2025-01-01", &[]),
            receipt(2, 10.00, "A", "2025-01-02", &[]),
            receipt(3, 10.01, "A", "2025-01-03", &[]),
        ];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        assert_eq!(s.total_spent, 30.01);
        assert_eq!(s.average_receipt_amount, 10.00);
    }

    #[test]
    fn test_huge_amounts_are_skipped_not_overflowed() {
        let receipts = vec![
            receipt(1, 5e16, "A", "2025-01-01", &[]),
            receipt(2, 5e16, "A", "2025-01-02", &[]),
            receipt(3, 12.50, "A", "2025-01-03", &[]),
        ];
        let result = AggregationEngine::new().compute_summary(&receipts);
        assert_eq!(result.skipped_ids(), vec![1, 2]);
        assert!(result.skipped[0].reason.contains("exceeds"));
        assert_eq!(result.summary.total_spent, 12.50);

        let err = AggregationEngine::new()
            .compute_summary_strict(&receipts)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation {
                id: 1,
                source: ValidationError::AmountOutOfRange(_)
            }
        ));
    }

    #[test]
    fn test_many_maximal_receipts_sum_exactly() {
        let receipts: Vec<Receipt> = (0..100)
            .map(|i| receipt(i, MAX_AMOUNT, "A", "2025-01-01", &[]))
            .collect();
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        assert_eq!(s.total_spent, MAX_AMOUNT * 100.0);
        assert_eq!(s.average_receipt_amount, MAX_AMOUNT);
    }

    #[test]
    fn test_sum_line_totals_large_quantities() {
        let items = vec![ReceiptItem::new("Gold", 1e17).with_quantity(2)];
        let total = sum_line_totals(&items);
        assert!((total - 2e17).abs() / 2e17 < 1e-9);

        let items = vec![ReceiptItem::new("Debris", 1e300).with_quantity(u32::MAX)];
        assert!(sum_line_totals(&items).is_finite());

        let items = vec![ReceiptItem::new("Bolt", 0.01).with_quantity(u32::MAX)];
        assert_eq!(sum_line_totals(&items), f64::from(u32::MAX) / 100.0);

        let items = vec![
            ReceiptItem::new("Apples", 1.25).with_quantity(4),
            ReceiptItem::new("Honey", 6.0),
        ];
        assert_eq!(sum_line_totals(&items), 11.0);
    }

    #[test]
    fn test_no_drift_over_many_additions() {
        let receipts: Vec<Receipt> = (0..1000)
            .map(|i| receipt(i, 0.10, "Snacks", "2025-03-01", &[]))
            .collect();
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        assert_eq!(s.total_spent, 100.00);
        assert_eq!(s.average_receipt_amount, 0.10);
        assert_eq!(s.monthly_spending.get("2025-03"), Some(&100.00));
    }

    #[test]
    fn test_to_cents_rounding() {
        assert_eq!(to_cents(1.005), 101);
        assert_eq!(to_cents(2.675), 268);
        assert_eq!(to_cents(0.0), 0);
        assert_eq!(to_cents(19.99), 1999);
    }

    #[test]
    fn test_monthly_keys_ascending_across_years() {
        let receipts = vec![
            receipt(1, 5.00, "A", "2025-01-03T09:00:00Z", &[]),
            receipt(2, 7.00, "A", "2024-12-30T18:00:00Z", &[]),
            receipt(3, 3.00, "A", "2024-02-11", &[]),
            receipt(4, 1.50, "A", "2025-01-20", &[]),
        ];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        let keys: Vec<&str> = s.monthly_spending.keys().collect();
        assert_eq!(keys, vec!["2024-02", "2024-12", "2025-01"]);
        assert_eq!(s.monthly_spending.last(), Some(("2025-01", &6.50)));

        let bucket_sum: i128 = s
            .monthly_spending
            .values()
            .map(|v| to_cents(*v))
            .sum();
        assert_eq!(from_cents(bucket_sum), s.total_spent);
    }

    #[test]
    fn test_month_uses_utc() {
        // 00:30 on Feb 1st at +02:00 is still January in UTC
        let receipts = vec![receipt(1, 12.00, "A", "2025-02-01T00:30:00+02:00", &[])];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        assert_eq!(s.monthly_spending.keys().collect::<Vec<_>>(), vec!["2025-01"]);
    }

    #[test]
    fn test_category_spending_sums_to_total() {
        let receipts = vec![
            receipt(1, 12.34, "Groceries", "2025-01-01", &[]),
            receipt(2, 5.66, "groceries", "2025-01-02", &[]),
            receipt(3, 20.00, "Fuel", "2025-01-03", &[]),
        ];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        // Case-sensitive keys
        assert_eq!(s.category_spending.len(), 3);
        let sum: i128 = s.category_spending.values().map(|v| to_cents(*v)).sum();
        assert_eq!(from_cents(sum), s.total_spent);
    }

    #[test]
    fn test_empty_category_uses_empty_key() {
        let receipts = vec![receipt(1, 4.00, "", "2025-01-01", &[])];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        assert_eq!(s.category_spending.get(""), Some(&4.00));
    }

    #[test]
    fn test_top_items_order_and_ties() {
        let receipts = vec![
            receipt(1, 1.00, "A", "2025-01-01", &["Bread", "Eggs"]),
            receipt(2, 1.00, "A", "2025-01-02", &["Milk", "Milk", "Eggs"]),
            receipt(3, 1.00, "A", "2025-01-03", &["Butter", "Bread"]),
        ];
        let top = AggregationEngine::new().top_items(&receipts);
        // Bread, Eggs, Milk all have 2; first appearance decides
        assert_eq!(
            top.into_vec(),
            vec![
                ("Bread".to_string(), 2),
                ("Eggs".to_string(), 2),
                ("Milk".to_string(), 2),
                ("Butter".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_top_items_ignores_quantity_and_blank_names() {
        let mut r = receipt(1, 9.00, "A", "2025-01-01", &["Milk", "  ", "Bread"]);
        r.items[0].quantity = 6;
        r.items.push(ReceiptItem::new("Milk", 1.0));
        let top = AggregationEngine::new().top_items(&[r]);
        assert_eq!(top.get("Milk"), Some(&2));
        assert_eq!(top.get("Bread"), Some(&1));
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_invalid_receipts_are_skipped_and_reported() {
        let receipts = vec![
            receipt(1, 10.00, "A", "2025-01-01", &["Milk"]),
            receipt(2, -5.00, "A", "2025-01-01", &["Milk"]),
            receipt(3, 3.00, "A", "last tuesday", &["Milk"]),
            receipt(4, f64::NAN, "A", "2025-01-01", &[]),
        ];
        let result = AggregationEngine::new().compute_summary(&receipts);
        assert_eq!(result.skipped_ids(), vec![2, 3, 4]);
        assert_eq!(result.summary.total_receipts, 1);
        assert_eq!(result.summary.total_spent, 10.00);
        assert_eq!(result.summary.top_items.get("Milk"), Some(&1));
        assert!(result.skipped[1].reason.contains("last tuesday"));
    }

    #[test]
    fn test_all_invalid_yields_empty_summary() {
        let receipts = vec![receipt(1, -1.00, "A", "2025-01-01", &["Milk"])];
        let result = AggregationEngine::new().compute_summary(&receipts);
        assert_eq!(result.summary, AnalyticsData::default());
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn test_strict_mode_fails_on_invalid() {
        let receipts = vec![
            receipt(1, 10.00, "A", "2025-01-01", &[]),
            receipt(7, 2.00, "A", "2025-13-45", &[]),
        ];
        let err = AggregationEngine::new()
            .compute_summary_strict(&receipts)
            .unwrap_err();
        match err {
            Error::Validation { id, source } => {
                assert_eq!(id, 7);
                assert!(matches!(source, ValidationError::MalformedDate(_)));
            }
            other => panic!("unexpected error: {other}"),
        }

        let ok = AggregationEngine::new()
            .compute_summary_strict(&receipts[..1])
            .unwrap();
        assert_eq!(ok.total_spent, 10.00);
    }

    #[test]
    fn test_idempotent() {
        let receipts = vec![
            receipt(1, 50.00, "Groceries", "2025-01-15", &["Milk"]),
            receipt(2, 30.00, "Dining", "2025-02-10", &["Milk", "Coffee"]),
            receipt(3, -1.00, "Dining", "2025-02-10", &[]),
        ];
        let engine = AggregationEngine::new();
        let first = engine.compute_summary(&receipts);
        let second = engine.compute_summary(&receipts);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.summary).unwrap(),
            serde_json::to_string(&second.summary).unwrap()
        );
    }

    #[test]
    fn test_parse_created_date_formats() {
        for raw in [
            "2025-01-15",
            "2025-01-15T10:30:00Z",
            "2025-01-15T10:30:00.123Z",
            "2025-01-15T10:30:00",
            "2025-01-15 10:30:00",
            "2025-01-15T10:30:00.5",
        ] {
            let dt = parse_created_date(raw).unwrap();
            assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 1, 15), "{raw}");
        }
        assert!(parse_created_date("15/01/2025").is_err());
        assert!(parse_created_date("").is_err());
    }

    #[test]
    fn test_recent_receipts() {
        let receipts = vec![
            receipt(1, 1.00, "A", "2025-01-01", &[]),
            receipt(2, 1.00, "A", "garbage", &[]),
            receipt(3, 1.00, "A", "2025-03-01", &[]),
            receipt(4, 1.00, "A", "2025-02-01", &[]),
        ];
        let engine = AggregationEngine::new();
        let ids: Vec<i64> = engine
            .recent_receipts(&receipts, 10)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![3, 4, 1, 2]);

        assert_eq!(engine.recent_receipts(&receipts, 2).len(), 2);
    }

    #[test]
    fn test_summary_json_shape() {
        let receipts = vec![
            receipt(1, 50.00, "Groceries", "2025-01-15", &["Milk"]),
            receipt(2, 30.00, "Dining", "2025-02-10", &["Milk", "Coffee"]),
        ];
        let s = AggregationEngine::new().compute_summary(&receipts).summary;
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.starts_with(r#"{"totalSpent":80.0,"totalReceipts":2,"averageReceiptAmount":40.0"#));
        assert!(json.contains(r#""monthlySpending":{"2025-01":50.0,"2025-02":30.0}"#));
        assert!(json.contains(r#""topItems":{"Milk":2,"Coffee":1}"#));

        let back: AnalyticsData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
