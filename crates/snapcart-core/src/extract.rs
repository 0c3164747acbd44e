//! Receipt text extraction and line-item parsing
//!
//! OCR engines plug in through [`TextExtractor`]. The default
//! [`PlainTextExtractor`] only accepts uploads that are already text (for
//! example the output of an external OCR tool). [`parse_receipt_text`] turns
//! extracted text into a store name, line items and a total.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::analytics::sum_line_totals;
use crate::error::{Error, Result};
use crate::models::{ParsedReceipt, ReceiptItem};

/// Store name used when none of the header lines qualifies
pub const UNKNOWN_STORE: &str = "Unknown Store";

/// Prices at or above this are treated as noise (phone numbers, ids)
const MAX_ITEM_PRICE: f64 = 1000.0;

/// How many leading lines may hold the store name
const STORE_NAME_LINES: usize = 5;

/// Words that mark totals, payment and footer lines rather than items
const NON_ITEM_KEYWORDS: &[&str] = &[
    "total", "subtotal", "tax", "change", "cash", "card", "receipt", "thank",
];

/// Source of raw text for an uploaded receipt file
pub trait TextExtractor: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &'static str;

    /// Extract the receipt's text from the uploaded bytes
    fn extract_text(&self, filename: &str, content_type: Option<&str>, data: &[u8])
        -> Result<String>;
}

/// Accepts text uploads as-is; images need an OCR-backed extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn extract_text(
        &self,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<String> {
        let declared_text = content_type.is_some_and(|ct| ct.starts_with("text/"));
        let declared_binary = content_type
            .is_some_and(|ct| ct.starts_with("image/") || ct == "application/pdf");

        if declared_binary {
            return Err(Error::Extraction(format!(
                "{} is {} and no OCR backend is configured; upload the extracted text instead",
                filename,
                content_type.unwrap_or_default()
            )));
        }

        match std::str::from_utf8(data) {
            Ok(text) if declared_text || !text.contains('\0') => Ok(text.to_string()),
            _ => Err(Error::Extraction(format!(
                "{} is not a text file and no OCR backend is configured",
                filename
            ))),
        }
    }
}

fn item_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>[A-Za-z][A-Za-z0-9 \t\-&']{2,29}?)\s+\$?(?P<price>[0-9]+(?:\.[0-9]{1,2})?)$",
        )
        .expect("valid regex")
    })
}

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$?([0-9]+\.[0-9]{2})").expect("valid regex"))
}

fn long_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]{3,}").expect("valid regex"))
}

/// Whether a line is a header, footer, total or id line rather than an item
fn is_non_item_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.chars().count() < 3
        || NON_ITEM_KEYWORDS.iter().any(|kw| lower.contains(kw))
        || long_number_re().is_match(&lower)
}

fn plausible_price(price: f64) -> bool {
    price > 0.0 && price < MAX_ITEM_PRICE
}

/// Match `<name> [$]<price>` lines
fn parse_item_lines(lines: &[&str]) -> Vec<ReceiptItem> {
    lines
        .iter()
        .filter(|line| !is_non_item_line(line))
        .filter_map(|line| {
            let caps = item_line_re().captures(line)?;
            let name = caps.name("name")?.as_str().trim();
            let price: f64 = caps.name("price")?.as_str().parse().ok()?;
            plausible_price(price).then(|| ReceiptItem::new(name, price))
        })
        .collect()
}

/// Looser pass: any `d+.dd` on the line is the price, the rest is the name
fn parse_items_fallback(lines: &[&str]) -> Vec<ReceiptItem> {
    lines
        .iter()
        .filter(|line| !is_non_item_line(line))
        .filter_map(|line| {
            let caps = price_re().captures(line)?;
            let price: f64 = caps.get(1)?.as_str().parse().ok()?;
            let name = price_re().replace_all(line, "");
            let name = name.trim();
            (name.chars().count() > 2 && plausible_price(price))
                .then(|| ReceiptItem::new(name, price))
        })
        .collect()
}

/// Store name from the first few lines: 4-49 chars, no digits, not a title line
pub fn extract_store_name(text: &str) -> String {
    text.lines()
        .take(STORE_NAME_LINES)
        .map(str::trim)
        .find(|line| {
            let len = line.chars().count();
            len > 3
                && len < 50
                && !line.chars().any(|c| c.is_ascii_digit())
                && !line.to_lowercase().contains("receipt")
        })
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_STORE.to_string())
}

/// Line items in text order
pub fn parse_items(text: &str) -> Vec<ReceiptItem> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let items = parse_item_lines(&lines);
    if !items.is_empty() {
        return items;
    }
    parse_items_fallback(&lines)
}

/// Parse extracted receipt text into store, items and total
pub fn parse_receipt_text(text: &str) -> ParsedReceipt {
    let items = parse_items(text);
    let total = sum_line_totals(&items);
    let store = extract_store_name(text);

    debug!(store = %store, items = items.len(), total, "Parsed receipt text");

    ParsedReceipt {
        store,
        items,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROCERY_RECEIPT: &str = "\
FRESH MART
12 Market Street
Milk 3.49
Bread $2.50
Peanut Butter 4.99
Subtotal 10.98
Tax 0.88
TOTAL 11.86
VISA CARD ****1234
Thank you for shopping!";

    #[test]
    fn test_parse_grocery_receipt() {
        let parsed = parse_receipt_text(GROCERY_RECEIPT);
        assert_eq!(parsed.store, "FRESH MART");

        let names: Vec<&str> = parsed.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Milk", "Bread", "Peanut Butter"]);
        assert_eq!(parsed.items[0].price, 3.49);
        assert_eq!(parsed.items[1].price, 2.50);
        assert!(parsed.items.iter().all(|i| i.quantity == 1));
        assert!(parsed.items.iter().all(|i| i.category == "General"));
        assert_eq!(parsed.total, 10.98);
    }

    #[test]
    fn test_name_may_contain_digits() {
        let items = parse_items("Eggs 12 pack 2.99");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Eggs 12 pack");
        assert_eq!(items[0].price, 2.99);
    }

    #[test]
    fn test_skips_implausible_prices_and_id_lines() {
        let items = parse_items("Widget 0\nStore 4411 Main 2.00\nGadget 5.25");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Gadget");
    }

    #[test]
    fn test_fallback_pass() {
        // Leading price does not fit the primary pattern
        let items = parse_items("1x Organic Apples 4.50\n2x Pears 3.10");
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["1x Organic Apples", "2x Pears"]);
        assert_eq!(items[1].price, 3.10);
    }

    #[test]
    fn test_no_items() {
        let parsed = parse_receipt_text("RECEIPT\n#0042\nTOTAL 0.00");
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.total, 0.0);
        assert_eq!(parsed.store, UNKNOWN_STORE);
    }

    #[test]
    fn test_store_name_skips_title_and_numbers() {
        let text = "Receipt #42\nSALES RECEIPT\n555-1234\nBean There Cafe\nLatte 4.50";
        assert_eq!(extract_store_name(text), "Bean There Cafe");
    }

    #[test]
    fn test_plain_text_extractor() {
        let ex = PlainTextExtractor;
        let text = ex
            .extract_text("r.txt", Some("text/plain"), b"SHOP\nMilk 1.00")
            .unwrap();
        assert!(text.contains("Milk"));

        // Untyped uploads are accepted when they decode as text
        assert!(ex.extract_text("r.txt", None, b"SHOP").is_ok());

        let err = ex
            .extract_text("r.jpg", Some("image/jpeg"), &[0xff, 0xd8, 0xff])
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));

        assert!(ex.extract_text("blob", None, &[0xff, 0xfe, 0x00]).is_err());
    }
}
