//! Domain models for SnapCart
//!
//! JSON field names follow the web client's contract (camelCase).

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Category assigned when extraction or the client gives none
pub const DEFAULT_CATEGORY: &str = "General";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_quantity() -> u32 {
    1
}

/// A single line on a receipt
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    /// Unit price
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default = "default_category")]
    pub category: String,
}

impl ReceiptItem {
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            price,
            quantity: 1,
            category: default_category(),
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Line total (`price * quantity`), computed on demand so it cannot drift
    pub fn total_price(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

// Hand-written so `totalPrice` is always derived from price and quantity
impl Serialize for ReceiptItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ReceiptItem", 5)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("price", &self.price)?;
        s.serialize_field("quantity", &self.quantity)?;
        s.serialize_field("category", &self.category)?;
        s.serialize_field("totalPrice", &self.total_price())?;
        s.end()
    }
}

/// A stored receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: i64,
    pub filename: String,
    pub extracted_text: String,
    pub items: Vec<ReceiptItem>,
    /// Authoritative total (may include tax or discounts not itemized)
    pub total_amount: f64,
    pub store: String,
    pub category: String,
    /// SHA256 of the uploaded file, for deduplication
    pub content_hash: Option<String>,
    /// ISO 8601, set at ingestion
    pub created_date: String,
    /// ISO 8601, bumped on every update
    pub last_modified_date: String,
}

/// A receipt to be stored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReceipt {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    /// Computed from the items when absent
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub store: String,
    pub category: Option<String>,
    #[serde(skip_deserializing)]
    pub content_hash: Option<String>,
    /// Backfill an ingestion time (ISO 8601); defaults to now
    pub created_date: Option<String>,
}

impl NewReceipt {
    /// Sum of the item line totals, accumulated in cents
    pub fn items_total(&self) -> f64 {
        crate::analytics::sum_line_totals(&self.items)
    }
}

/// Partial update of a receipt; absent fields are left untouched
///
/// `id` and `createdDate` are immutable and ignored if sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptUpdate {
    pub filename: Option<String>,
    pub extracted_text: Option<String>,
    pub items: Option<Vec<ReceiptItem>>,
    pub total_amount: Option<f64>,
    pub store: Option<String>,
    pub category: Option<String>,
}

impl ReceiptUpdate {
    pub fn is_empty(&self) -> bool {
        self.filename.is_none()
            && self.extracted_text.is_none()
            && self.items.is_none()
            && self.total_amount.is_none()
            && self.store.is_none()
            && self.category.is_none()
    }
}

/// Filters for listing receipts
#[derive(Debug, Clone, Default)]
pub struct ReceiptFilter {
    /// Case-insensitive substring of the store name
    pub store: Option<String>,
    /// Case-insensitive category match
    pub category: Option<String>,
    /// Inclusive lower bound on the creation date
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the creation date
    pub to: Option<NaiveDate>,
}

/// Insertion-ordered string-keyed mapping, serialized as a JSON object
///
/// Analytics series whose order is part of the contract (months ascending,
/// top items by rank) use this instead of a hash map.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn first(&self) -> Option<(&str, &V)> {
        self.entries.first().map(|(k, v)| (k.as_str(), v))
    }

    pub fn last(&self) -> Option<(&str, &V)> {
        self.entries.last().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the first `len` entries
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn into_vec(self) -> Vec<(String, V)> {
        self.entries
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, V)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if entries.iter().any(|(k, _)| *k == key) {
                        return Err(serde::de::Error::custom(format!("duplicate key {key:?}")));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap { entries })
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// Analytics summary over a snapshot of receipts (never persisted)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub total_spent: f64,
    pub total_receipts: u64,
    pub average_receipt_amount: f64,
    /// `YYYY-MM` to amount, ascending chronological order
    pub monthly_spending: OrderedMap<f64>,
    /// Item name to number of line items, most frequent first
    pub top_items: OrderedMap<u64>,
    /// Receipt category to amount
    pub category_spending: BTreeMap<String, f64>,
}

/// A receipt excluded from aggregation, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedReceipt {
    pub id: i64,
    pub reason: String,
}

/// Text-derived receipt fields produced by the extraction parser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedReceipt {
    pub store: String,
    pub items: Vec<ReceiptItem>,
    pub total: f64,
}
