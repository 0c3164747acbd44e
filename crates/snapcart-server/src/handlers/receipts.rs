//! Receipt handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{get_actor, AppError, AppState, SuccessResponse};
use snapcart_core::extract::parse_receipt_text;
use snapcart_core::models::{NewReceipt, Receipt, ReceiptFilter, ReceiptUpdate};

/// Query parameters for listing receipts
#[derive(Debug, Default, Deserialize)]
pub struct ReceiptListQuery {
    /// Case-insensitive substring of the store name
    pub store: Option<String>,
    /// Case-insensitive category
    pub category: Option<String>,
    /// Inclusive start date (YYYY-MM-DD)
    pub from: Option<String>,
    /// Inclusive end date (YYYY-MM-DD)
    pub to: Option<String>,
}

fn parse_date_param(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => NaiveDate::parse_from_str(v, "%Y-%m-%d").map(Some).map_err(|_| {
            AppError::bad_request(&format!("Invalid {} date '{}', expected YYYY-MM-DD", name, v))
        }),
        None => Ok(None),
    }
}

fn fetch_receipt(state: &AppState, id: i64) -> Result<Receipt, AppError> {
    state
        .db
        .get_receipt(id)?
        .ok_or_else(|| AppError::not_found("Receipt not found"))
}

/// GET /api/receipts - List receipts with optional filters
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReceiptListQuery>,
    request: Request,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let actor = get_actor(request.headers());

    let filter = ReceiptFilter {
        store: params.store,
        category: params.category,
        from: parse_date_param("from", params.from.as_deref())?,
        to: parse_date_param("to", params.to.as_deref())?,
    };

    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(AppError::bad_request("'from' must not be after 'to'"));
        }
    }

    let receipts = state.db.list_receipts(&filter)?;

    state.db.log_audit(
        &actor,
        "list",
        Some("receipt"),
        None,
        Some(&format!("count={}", receipts.len())),
    )?;

    Ok(Json(receipts))
}

/// GET /api/receipts/:id - Get a single receipt
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Receipt>, AppError> {
    let actor = get_actor(request.headers());

    let receipt = fetch_receipt(&state, id)?;

    state
        .db
        .log_audit(&actor, "view", Some("receipt"), Some(id), None)?;

    Ok(Json(receipt))
}

/// POST /api/receipts - Store a receipt submitted as JSON
///
/// The total is computed from the items when `totalAmount` is absent.
pub async fn create_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewReceipt>,
) -> Result<Json<Receipt>, AppError> {
    let actor = get_actor(&headers);

    let mut new_receipt = body;
    if new_receipt.category.is_none() {
        new_receipt.category = Some(state.config.default_category.clone());
    }

    let id = state.db.create_receipt(&new_receipt)?;

    state.db.log_audit(
        &actor,
        "create",
        Some("receipt"),
        Some(id),
        Some(&format!("store={}", new_receipt.store)),
    )?;

    Ok(Json(fetch_receipt(&state, id)?))
}

/// POST /api/receipts/upload - Upload a receipt file
///
/// Expects multipart form with:
/// - file: receipt file (required)
/// - category: receipt category (optional, server default if absent)
///
/// The file's text is extracted and parsed into store, line items and a total.
/// Uploading the same bytes twice is rejected with 409.
pub async fn upload_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Receipt>, AppError> {
    let actor = get_actor(&headers);
    let max_size = state.config.max_upload_bytes;

    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut category: Option<String> = None;

    // Extract fields from multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("receipt").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read file data"))?;

                if bytes.len() > max_size {
                    return Err(AppError::bad_request(&format!(
                        "File too large. Maximum size is {} bytes",
                        max_size
                    )));
                }

                file = Some((filename, content_type, bytes.to_vec()));
            }
            "category" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("Failed to read category"))?;
                if !value.trim().is_empty() {
                    category = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let (filename, content_type, data) =
        file.ok_or_else(|| AppError::bad_request("Missing file field"))?;

    if data.is_empty() {
        return Err(AppError::bad_request("Please select a file to upload"));
    }

    // Compute content hash for deduplication
    let mut hasher = Sha256::new();
    hasher.update(&data);
    let content_hash = format!("{:x}", hasher.finalize());

    if let Some(existing) = state.db.get_receipt_by_hash(&content_hash)? {
        return Err(AppError::conflict(&format!(
            "Receipt already exists with ID {}",
            existing.id
        )));
    }

    let text = state
        .extractor
        .extract_text(&filename, content_type.as_deref(), &data)?;
    let parsed = parse_receipt_text(&text);

    let new_receipt = NewReceipt {
        filename: filename.clone(),
        extracted_text: text,
        total_amount: Some(parsed.total),
        items: parsed.items,
        store: parsed.store,
        category: Some(category.unwrap_or_else(|| state.config.default_category.clone())),
        content_hash: Some(content_hash),
        created_date: None,
    };

    let id = state.db.create_receipt(&new_receipt)?;

    info!(
        receipt_id = id,
        store = %new_receipt.store,
        items = new_receipt.items.len(),
        "Receipt uploaded"
    );

    state.db.log_audit(
        &actor,
        "upload",
        Some("receipt"),
        Some(id),
        Some(&format!(
            "file={}, items={}",
            filename,
            new_receipt.items.len()
        )),
    )?;

    Ok(Json(fetch_receipt(&state, id)?))
}

/// PUT /api/receipts/:id - Update a receipt
///
/// Fields absent from the body are left unchanged.
pub async fn update_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(update): Json<ReceiptUpdate>,
) -> Result<Json<Receipt>, AppError> {
    let actor = get_actor(&headers);

    if update.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }

    let receipt = state.db.update_receipt(id, &update)?;

    state
        .db
        .log_audit(&actor, "update", Some("receipt"), Some(id), None)?;

    Ok(Json(receipt))
}

/// DELETE /api/receipts/:id - Delete a receipt
pub async fn delete_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let actor = get_actor(request.headers());

    state.db.delete_receipt(id)?;

    state
        .db
        .log_audit(&actor, "delete", Some("receipt"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}
