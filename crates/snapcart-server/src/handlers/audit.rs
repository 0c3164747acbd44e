//! Audit trail handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::Deserialize;

use crate::{get_actor, AppError, AppState, MAX_PAGE_LIMIT};
use snapcart_core::{AuditEntry, AuditFilter};

/// Query parameters for the audit trail
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    /// e.g. `receipt`, `analytics`
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub limit: Option<i64>,
}

impl AuditQuery {
    fn into_filter(self) -> AuditFilter {
        let defaults = AuditFilter::default();
        AuditFilter {
            action: self.action.filter(|a| !a.trim().is_empty()),
            entity_type: self.entity_type.filter(|t| !t.trim().is_empty()),
            entity_id: self.entity_id,
            limit: self
                .limit
                .unwrap_or(defaults.limit)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

/// GET /api/audit - Recent API access, newest first
///
/// `?entity_type=receipt&entity_id=7` gives the history of one receipt.
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQuery>,
    request: Request,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let actor = get_actor(request.headers());
    let filter = params.into_filter();

    let entries = state.db.list_audit_log(&filter)?;

    // Reading the trail is recorded after the read, so it never lists itself
    state.db.log_audit(
        &actor,
        "list",
        Some("audit_log"),
        None,
        Some(&format!("returned={}", entries.len())),
    )?;

    Ok(Json(entries))
}
