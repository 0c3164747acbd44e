//! Analytics handlers
//!
//! Every endpoint aggregates a fresh snapshot of the receipt store. Receipts
//! that fail validation are left out and listed in the `x-skipped-receipts`
//! response header.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{get_actor, skipped_headers, AppError, AppState, MAX_PAGE_LIMIT};
use snapcart_core::analytics::Aggregation;
use snapcart_core::models::{AnalyticsData, OrderedMap, Receipt};

/// Query parameters for top items
#[derive(Debug, Deserialize)]
pub struct TopItemsQuery {
    /// Keep only the N most frequent items (all when absent)
    pub limit: Option<usize>,
}

/// Query parameters for recent receipts
#[derive(Debug, Deserialize)]
pub struct RecentReceiptsQuery {
    pub limit: Option<usize>,
}

/// Snapshot the store and aggregate it, recording the access
fn aggregate(state: &AppState, actor: &str, view: &str) -> Result<Aggregation, AppError> {
    let receipts = state.db.receipts_snapshot()?;
    let aggregation = state.engine.compute_summary(&receipts);

    let mut details = format!(
        "view={}, receipts={}",
        view, aggregation.summary.total_receipts
    );
    if !aggregation.skipped.is_empty() {
        details.push_str(&format!(", skipped={:?}", aggregation.skipped_ids()));
    }
    state
        .db
        .log_audit(actor, "view", Some("analytics"), None, Some(&details))?;

    Ok(aggregation)
}

/// GET /api/analytics/summary - Full analytics summary
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<(HeaderMap, Json<AnalyticsData>), AppError> {
    let actor = get_actor(request.headers());
    let aggregation = aggregate(&state, &actor, "summary")?;

    Ok((skipped_headers(&aggregation), Json(aggregation.summary)))
}

/// GET /api/analytics/monthly - Spending per month, ascending
pub async fn get_monthly_spending(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<(HeaderMap, Json<OrderedMap<f64>>), AppError> {
    let actor = get_actor(request.headers());
    let aggregation = aggregate(&state, &actor, "monthly")?;

    Ok((
        skipped_headers(&aggregation),
        Json(aggregation.summary.monthly_spending),
    ))
}

/// GET /api/analytics/top-items - Item purchase counts, most frequent first
pub async fn get_top_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopItemsQuery>,
    request: Request,
) -> Result<(HeaderMap, Json<OrderedMap<u64>>), AppError> {
    let actor = get_actor(request.headers());
    let aggregation = aggregate(&state, &actor, "top-items")?;

    let headers = skipped_headers(&aggregation);
    let mut items = aggregation.summary.top_items;
    if let Some(limit) = params.limit {
        items.truncate(limit);
    }

    Ok((headers, Json(items)))
}

/// GET /api/analytics/categories - Spending per receipt category
pub async fn get_category_spending(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<(HeaderMap, Json<BTreeMap<String, f64>>), AppError> {
    let actor = get_actor(request.headers());
    let aggregation = aggregate(&state, &actor, "categories")?;

    Ok((
        skipped_headers(&aggregation),
        Json(aggregation.summary.category_spending),
    ))
}

/// GET /api/analytics/recent-receipts - Newest receipts first
pub async fn get_recent_receipts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentReceiptsQuery>,
    request: Request,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let actor = get_actor(request.headers());
    let limit = params
        .limit
        .unwrap_or(state.config.recent_limit)
        .clamp(1, MAX_PAGE_LIMIT as usize);

    let receipts = state.db.receipts_snapshot()?;
    let recent = state.engine.recent_receipts(&receipts, limit);

    state.db.log_audit(
        &actor,
        "view",
        Some("analytics"),
        None,
        Some(&format!("view=recent-receipts, limit={}", limit)),
    )?;

    Ok(Json(recent))
}
