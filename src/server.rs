//! Knowledge base HTTP API.
//!
//! Exposes ingestion, search, and AI-augmented completion as a JSON HTTP
//! API. Every request is tenant-scoped through the `X-Tenant-Id` header;
//! requests without it fall to the `"default"` tenant.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/documents` | Upload and parse a document |
//! | `GET`    | `/documents/{id}` | Fetch a stored document |
//! | `PATCH`  | `/documents/{id}` | Edit document metadata |
//! | `DELETE` | `/documents/{id}` | Remove a document |
//! | `POST`   | `/search` | Ranked tenant-scoped search |
//! | `POST`   | `/complete` | Knowledge-augmented AI completion |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "payload_too_large", "message": "upload of 12000000 bytes exceeds limit 10485760" } }
//! ```
//!
//! Error codes: `invalid_request` (400), `unsupported_format` (400),
//! `parse_failure` (422), `empty_content` (422),
//! `payload_too_large` (413), `not_found` (404),
//! `generation_unavailable` (503), `store_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support
//! browser-based clients.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::augment::PromptAugmenter;
use crate::cache::{CacheKey, ResultCache};
use crate::config::Config;
use crate::error::EngineError;
use crate::ingest::{DocumentUpload, IngestReceipt, Ingestor, MetadataPatch};
use crate::models::{Document, DocumentType, SearchFilters, SearchResult, SourceRef, Usage};
use crate::provider::create_provider;
use crate::search::{SearchEngine, FETCH_CEILING};
use crate::store::memory::InMemoryStore;
use crate::store::KnowledgeStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn KnowledgeStore>,
    ingestor: Arc<Ingestor>,
    engine: Arc<SearchEngine>,
    cache: Arc<ResultCache>,
    augmenter: Arc<PromptAugmenter>,
}

/// Starts the HTTP server with an in-memory knowledge store.
///
/// Binds to `[server].bind` and runs until the process terminates.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_store(config, Arc::new(InMemoryStore::new())).await
}

/// Starts the HTTP server against a caller-provided store, e.g. a
/// persistent adapter implementing [`KnowledgeStore`].
pub async fn run_server_with_store(
    config: &Config,
    store: Arc<dyn KnowledgeStore>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let primary = create_provider(&config.provider.primary, &config.provider)?;
    let fallback = match &config.provider.fallback {
        Some(name) => Some(create_provider(name, &config.provider)?),
        None => None,
    };

    let engine = Arc::new(SearchEngine::new(
        store.clone(),
        config.search.clone(),
        config.snippets.clone(),
    ));
    let cache = Arc::new(ResultCache::new(Duration::from_secs(config.cache.ttl_secs)));
    let ingestor = Arc::new(Ingestor::new(store.clone(), config.parser.clone()));
    let augmenter = Arc::new(PromptAugmenter::new(
        engine.clone(),
        cache.clone(),
        config.augment.clone(),
        config.provider.clone(),
        primary,
        fallback,
    ));

    // Periodic sweep so idle entries do not pin memory between lookups.
    let sweep_cache = cache.clone();
    let sweep_interval = Duration::from_secs(config.cache.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_cache.purge_expired();
        }
    });

    let state = AppState {
        store,
        ingestor,
        engine,
        cache,
        augmenter,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    info!(addr = %bind_addr, "knowledge engine listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(handle_upload))
        .route(
            "/documents/{id}",
            get(handle_get_document)
                .patch(handle_patch_document)
                .delete(handle_delete_document),
        )
        .route("/search", post(handle_search))
        .route("/complete", post(handle_complete))
        .route("/health", get(handle_health))
        .with_state(state)
}

fn tenant_from(headers: &HeaderMap) -> String {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("default")
        .to_string()
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::UnsupportedFormat(_) | EngineError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::ParseFailure(_) | EngineError::EmptyContent => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::StoreUnavailable(_) | EngineError::GenerationUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        AppError {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /documents ============

/// Handler for `POST /documents`: validates, parses, and stores an
/// upload. Returns `201` with the stored document and any extraction
/// warning.
async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(upload): Json<DocumentUpload>,
) -> Result<(StatusCode, Json<IngestReceipt>), AppError> {
    let tenant = tenant_from(&headers);
    let receipt = state.ingestor.ingest(&tenant, upload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// ============ GET / PATCH / DELETE /documents/{id} ============

async fn handle_get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    let tenant = tenant_from(&headers);
    let doc = state
        .store
        .get_document(&tenant, &id)
        .await
        .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?
        .ok_or(EngineError::NotFound(id))?;
    Ok(Json(doc))
}

async fn handle_patch_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<MetadataPatch>,
) -> Result<Json<Document>, AppError> {
    let tenant = tenant_from(&headers);
    let doc = state.ingestor.update_metadata(&tenant, &id, patch).await?;
    Ok(Json(doc))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let tenant = tenant_from(&headers);
    let removed = state
        .store
        .delete_document(&tenant, &id)
        .await
        .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
    if !removed {
        return Err(EngineError::NotFound(id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============ POST /search ============

/// Search request with filters as flat top-level fields. `file_type`
/// is also accepted as `doc_type`.
#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default, alias = "doc_type")]
    file_type: Option<DocumentType>,
    #[serde(default)]
    limit: Option<usize>,
    /// Defaults to true; large result pages can skip snippet payloads.
    #[serde(default)]
    include_snippets: Option<bool>,
}

impl SearchRequest {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            category: self.category.clone(),
            tags: self.tags.clone(),
            doc_type: self.file_type,
        }
    }
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<ApiSearchResult>,
    count: usize,
    degraded: bool,
}

/// Wire form of a ranked hit, with the tier spelled out as a reason
/// string.
#[derive(Serialize)]
struct ApiSearchResult {
    document_id: String,
    name: String,
    score_tier: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    snippets: Vec<String>,
}

impl ApiSearchResult {
    fn from_result(r: &SearchResult, include_snippets: bool) -> Self {
        Self {
            document_id: r.document_id.clone(),
            name: r.name.clone(),
            score_tier: r.tier.reason(),
            snippets: if include_snippets {
                r.snippets.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Handler for `POST /search`.
///
/// Outcomes are cached per (tenant, normalized query, filters). Cached
/// entries always hold the full ranked page with snippets; the
/// requested limit and snippet flag are applied on the way out, so the
/// same query hits the same entry regardless of pagination.
async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let tenant = tenant_from(&headers);
    let limit = req
        .limit
        .unwrap_or_else(|| state.engine.default_limit())
        .clamp(1, FETCH_CEILING);
    let include_snippets = req.include_snippets.unwrap_or(true);

    let filters = req.filters();
    let key = CacheKey::new(&tenant, &req.query, &filters);
    let outcome = state
        .cache
        .get_or_compute(key, || {
            state
                .engine
                .search(&tenant, &req.query, &filters, FETCH_CEILING, true)
        })
        .await;

    let results: Vec<ApiSearchResult> = outcome
        .results
        .iter()
        .take(limit)
        .map(|r| ApiSearchResult::from_result(r, include_snippets))
        .collect();

    Ok(Json(SearchResponse {
        count: results.len(),
        results,
        degraded: outcome.degraded,
    }))
}

// ============ POST /complete ============

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct CompleteRequest {
    message: String,
    #[serde(default)]
    max_results: Option<usize>,
    /// Defaults to true; clients can opt out of retrieval entirely.
    #[serde(default = "default_true")]
    use_knowledge_base: bool,
}

#[derive(Serialize)]
struct CompleteResponse {
    content: String,
    knowledge_used: bool,
    /// Documents whose snippets were included in the prompt context.
    knowledge_sources: Vec<SourceRef>,
    usage: Usage,
}

/// Handler for `POST /complete`: retrieval-augmented generation.
async fn handle_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, AppError> {
    let tenant = tenant_from(&headers);
    let message = req.message.trim();
    if message.is_empty() {
        return Err(EngineError::InvalidRequest("message must not be empty".to_string()).into());
    }

    let (completion, prompt) = state
        .augmenter
        .complete(&tenant, message, req.max_results, req.use_knowledge_base)
        .await?;

    Ok(Json(CompleteResponse {
        content: completion.content,
        knowledge_used: prompt.has_context(),
        knowledge_sources: prompt.sources,
        usage: completion.usage,
    }))
}
