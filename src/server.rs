//! HTTP adapter over the label engine.
//!
//! # Routes
//!
//! ## Public
//! - `GET /health` - liveness plus the store's degraded-load warning
//! - `GET /l/:label` - resolve one label for the request language (HTML)
//! - `GET /:prefix/l/:label` - same, with a language path prefix (`/nl/l/...`)
//! - `POST /resolve` - evaluate a batch of lookup / set-language directives
//!
//! ## Admin (`X-Api-Key`)
//! - `GET /labels`, `POST /labels` - tabular export and full replacement
//! - `GET /labels.csv`, `POST /labels.csv` - the same as CSV
//! - `PUT /labels/:label/:lang` - set one translation
//! - `GET /labels/items` - paged side-by-side translator view
//! - `GET /metrics` - lookup counters

use crate::bulk::{BulkEditor, BulkError, Flash, TranslatableItem};
use crate::config::LabelsConfig;
use crate::labels::{resolve_language, Label, LanguageCode, LanguageHints, MetricsReport};
use crate::resolver::{LabelResolver, Markup, RequestContext, ResolveDirective};
use crate::security::{is_admin_key, API_KEY_HEADER};
use crate::store::{AnyBackend, LabelStore, StoreError};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DEFAULT_PAGE_SIZE: usize = 25;

/// Application state shared across handlers
pub struct AppState {
    pub resolver: LabelResolver<AnyBackend>,
    pub bulk: BulkEditor<AnyBackend>,
    /// Admin key; admin routes answer 403 when unset
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<LabelStore<AnyBackend>>,
        labels: LabelsConfig,
        api_key: Option<String>,
    ) -> Self {
        Self {
            resolver: LabelResolver::new(Arc::clone(&store), labels),
            bulk: BulkEditor::new(store),
            api_key,
        }
    }

    fn is_admin(&self, headers: &HeaderMap) -> bool {
        let presented = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        is_admin_key(self.api_key.as_deref(), presented)
    }

    fn require_admin(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if self.api_key.is_none() {
            return Err(ApiError::AdminDisabled);
        }
        if !self.is_admin(headers) {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/l/:label", get(resolve_label))
        .route("/:prefix/l/:label", get(resolve_prefixed_label))
        .route("/resolve", post(resolve_batch))
        .route("/labels", get(export_labels).post(import_labels))
        .route("/labels.csv", get(export_csv).post(import_csv))
        .route("/labels/items", get(translatable_items))
        .route("/labels/:label/:lang", put(set_translation))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==================== Errors ====================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("The admin API is disabled")]
    AdminDisabled,

    #[error("A valid API key is required")]
    Unauthorized,

    #[error("'{0}' is not a configured language")]
    UnknownLanguage(String),

    #[error("The label is empty")]
    EmptyLabel,

    #[error(transparent)]
    Bulk(#[from] BulkError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::AdminDisabled => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UnknownLanguage(_) | ApiError::EmptyLabel => StatusCode::BAD_REQUEST,
            ApiError::Bulk(BulkError::Store(e)) | ApiError::Store(e) => store_status(e),
            ApiError::Bulk(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::EncodingTooSmall { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }
        let body = json!({ "status": "error", "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// ==================== Request Context ====================

#[derive(Debug, Default, Deserialize)]
struct LangQuery {
    lang: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let query = Query::<LangQuery>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();

        let hints = LanguageHints {
            explicit: query.lang.as_deref(),
            host: header_str(&parts.headers, header::HOST),
            path: Some(parts.uri.path()),
            locale: header_str(&parts.headers, header::ACCEPT_LANGUAGE),
        };

        let config = state.resolver.config();
        let language = resolve_language(&hints, &config.default_language, &config.languages);

        Ok(RequestContext::new(language).privileged(state.is_admin(&parts.headers)))
    }
}

// ==================== Public Handlers ====================

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let loaded = state.resolver.store().load().await;
    Json(json!({
        "status": "ok",
        "labels": loaded.table.len(),
        "warning": loaded.warning.map(|e| e.to_string()),
    }))
}

async fn resolve_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path(label): Path<String>,
) -> Html<String> {
    Html(state.resolver.resolve(&label, None, &ctx).await.into_string())
}

async fn resolve_prefixed_label(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Path((_prefix, label)): Path<(String, String)>,
) -> Html<String> {
    Html(state.resolver.resolve(&label, None, &ctx).await.into_string())
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    directives: Vec<ResolveDirective>,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    language: LanguageCode,
    results: Vec<Markup>,
}

async fn resolve_batch(
    State(state): State<Arc<AppState>>,
    mut ctx: RequestContext,
    Json(request): Json<ResolveRequest>,
) -> Json<ResolveResponse> {
    let results = state.resolver.resolve_all(&request.directives, &mut ctx).await;
    Json(ResolveResponse {
        language: ctx.language.current().clone(),
        results,
    })
}

// ==================== Admin Handlers ====================

#[derive(Debug, Serialize)]
struct ExportResponse {
    columns: Vec<String>,
    data: Vec<Vec<String>>,
    warning: Option<String>,
}

async fn export_labels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ExportResponse>, ApiError> {
    state.require_admin(&headers)?;

    let warning = state.resolver.store().load().await.warning;
    let export = state.bulk.export_table().await;

    Ok(Json(ExportResponse {
        columns: export.columns,
        data: export.rows.iter().map(|row| row.cells()).collect(),
        warning: warning.map(|e| e.to_string()),
    }))
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    columns: Vec<String>,
    /// Grid rows; empty cells may arrive as `null`
    labels: Vec<Vec<Option<String>>>,
}

async fn import_labels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ImportRequest>,
) -> Result<Json<Flash>, ApiError> {
    state.require_admin(&headers)?;

    let rows: Vec<Vec<String>> = request
        .labels
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect();

    let result = state.bulk.import_replacement(&request.columns, &rows).await;
    let flash = Flash::from_result(&result);
    result?;

    Ok(Json(flash))
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.require_admin(&headers)?;

    let csv = state.bulk.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"labels.csv\""),
        ],
        csv,
    )
        .into_response())
}

async fn import_csv(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Flash>, ApiError> {
    state.require_admin(&headers)?;

    let result = state.bulk.import_csv(&body).await;
    let flash = Flash::from_result(&result);
    result?;

    Ok(Json(flash))
}

#[derive(Debug, Deserialize)]
struct TranslationBody {
    translation: String,
}

async fn set_translation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((label, lang)): Path<(String, String)>,
    Json(body): Json<TranslationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.require_admin(&headers)?;

    let language = configured_language(&state, &lang)?;
    let label = Label::clean(&label);
    if label.is_empty() {
        return Err(ApiError::EmptyLabel);
    }

    state
        .resolver
        .store()
        .set_translation(&label, &language, &body.translation)
        .await?;

    info!("Updated '{}' [{}]", label, language);
    Ok(Json(json!({
        "status": "success",
        "message": format!("Saved the {} translation of '{}'.", language, label),
    })))
}

#[derive(Debug, Deserialize)]
struct ItemsQuery {
    source: Option<String>,
    dest: String,
    #[serde(default)]
    untranslated_only: bool,
    #[serde(default)]
    page: usize,
    page_size: Option<usize>,
}

async fn translatable_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<TranslatableItem>>, ApiError> {
    state.require_admin(&headers)?;

    let source = match &query.source {
        Some(code) => configured_language(&state, code)?,
        None => state.resolver.config().default_language.clone(),
    };
    let dest = configured_language(&state, &query.dest)?;

    let items = state
        .bulk
        .translatable_items(
            &source,
            &dest,
            query.untranslated_only,
            query.page,
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await;

    Ok(Json(items))
}

async fn metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MetricsReport>, ApiError> {
    state.require_admin(&headers)?;
    Ok(Json(state.resolver.metrics().report()))
}

/// A language code from a request that must be one of the configured ones.
fn configured_language(state: &AppState, code: &str) -> Result<LanguageCode, ApiError> {
    LanguageCode::parse_lenient(code)
        .filter(|code| state.resolver.config().languages.contains(code))
        .ok_or_else(|| ApiError::UnknownLanguage(code.to_string()))
}
