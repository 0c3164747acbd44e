//! SnapCart Web Server
//!
//! Axum-based REST API for the SnapCart receipt tracker.
//!
//! Features:
//! - Receipt upload (text extraction + line-item parsing) and CRUD
//! - Spending analytics computed from a consistent receipt snapshot
//! - Restrictive CORS policy and security headers
//! - Audit logging for all API access (reads and writes)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use snapcart_core::analytics::Aggregation;
use snapcart_core::db::Database;
use snapcart_core::{AggregationEngine, AppConfig, PlainTextExtractor, TextExtractor};

mod handlers;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Response header listing receipt ids excluded from an analytics result
pub const SKIPPED_RECEIPTS_HEADER: &str = "x-skipped-receipts";

/// Room for multipart boundaries and form fields on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,
    /// Category for uploads that don't name one
    pub default_category: String,
    /// Default size of the recent-receipts list
    pub recent_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            allowed_origins: config.server.allowed_origins.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
            default_category: config.receipts.default_category.clone(),
            recent_limit: config.receipts.recent_limit,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub engine: AggregationEngine,
    /// Turns uploaded files into receipt text
    pub extractor: Arc<dyn TextExtractor>,
}

/// Identify the caller for audit logging
///
/// The API is unauthenticated; a forwarding proxy's client address is
/// recorded when present, otherwise "local".
pub fn get_actor(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "local".to_string())
}

/// Headers reporting receipts excluded from an aggregation (empty if none)
pub(crate) fn skipped_headers(aggregation: &Aggregation) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if aggregation.skipped.is_empty() {
        return headers;
    }

    let ids = aggregation
        .skipped_ids()
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    // Ids are ASCII digits and commas, always a valid header value
    if let Ok(value) = HeaderValue::from_str(&ids) {
        headers.insert(HeaderName::from_static(SKIPPED_RECEIPTS_HEADER), value);
    }
    headers
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, static_dir: Option<&str>, config: ServerConfig) -> Router {
    create_router_with_extractor(db, static_dir, config, Arc::new(PlainTextExtractor))
}

/// Create the application router with a custom text extractor (e.g. an OCR backend)
pub fn create_router_with_extractor(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    extractor: Arc<dyn TextExtractor>,
) -> Router {
    info!(extractor = extractor.name(), "Receipt text extractor configured");

    let body_limit = config.max_upload_bytes + MULTIPART_OVERHEAD;

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        engine: AggregationEngine::new(),
        extractor,
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Analytics
        .route("/analytics/summary", get(handlers::get_summary))
        .route("/analytics/monthly", get(handlers::get_monthly_spending))
        .route("/analytics/top-items", get(handlers::get_top_items))
        .route("/analytics/categories", get(handlers::get_category_spending))
        .route(
            "/analytics/recent-receipts",
            get(handlers::get_recent_receipts),
        )
        // Receipts
        .route(
            "/receipts",
            get(handlers::list_receipts).post(handlers::create_receipt),
        )
        .route("/receipts/upload", post(handlers::upload_receipt))
        .route(
            "/receipts/:id",
            get(handlers::get_receipt)
                .put(handlers::update_receipt)
                .delete(handlers::delete_receipt),
        )
        // Audit log
        .route("/audit", get(handlers::list_audit_log));

    // Build CORS layer
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
            .expose_headers([HeaderName::from_static(SKIPPED_RECEIPTS_HEADER)])
    };

    // CSP: restrict scripts to same-origin, allow inline styles, allow blob: for receipt previews
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'"
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    // Serve the web client if a directory is provided
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(db, host, port, static_dir, ServerConfig::default()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if config.allowed_origins.is_empty() {
        info!("CORS: same-origin only");
    }

    match db.count_receipts() {
        Ok(count) => info!("Receipt store ready ({} receipts)", count),
        Err(e) => warn!("Failed to count receipts: {}", e),
    }

    let app = create_router(db, static_dir, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn with_status(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    pub fn internal(msg: &str) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn conflict(msg: &str) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    pub fn unprocessable(msg: &str) -> Self {
        Self::with_status(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        use snapcart_core::Error as CoreError;

        let err = err.into();

        // Client-caused core errors keep their message and get a 4xx status
        if let Some(core) = err.downcast_ref::<CoreError>() {
            match core {
                CoreError::NotFound(msg) => return Self::not_found(msg),
                CoreError::InvalidData(msg) => return Self::bad_request(msg),
                CoreError::Duplicate(msg) => return Self::conflict(msg),
                CoreError::Extraction(msg) => return Self::unprocessable(msg),
                _ => {}
            }
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
