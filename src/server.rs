//! HTTP API.
//!
//! Thin axum layer over [`DocumentService`] and [`ChatService`]. This is the
//! only place error values are turned into user-facing messages.
//!
//! # Endpoints
//!
//! | Method   | Path                   | Description |
//! |----------|------------------------|-------------|
//! | `GET`    | `/health`              | Health check (returns version) |
//! | `POST`   | `/documents/upload`    | Multipart upload, field `file` |
//! | `GET`    | `/documents`           | List document summaries |
//! | `GET`    | `/documents/{id}`      | One document's metadata |
//! | `GET`    | `/documents/{id}/text` | One document's extracted text |
//! | `DELETE` | `/documents/{id}`      | Delete a document |
//! | `POST`   | `/search`              | Retrieve passages `{query, k?}` |
//! | `POST`   | `/chat`                | Answer a question `{message, history?, document_id?}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: 42" } }
//! ```
//!
//! Error codes: `unsupported_format` (400), `bad_request` (400), `not_found` (404),
//! `payload_too_large` (413), `extraction_failed` (422), `internal` (500),
//! `provider_error` (502), `llm_unavailable` (503).

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::chat::{ChatError, ChatService};
use crate::config::{Config, ServerConfig};
use crate::error::{DocumentError, ProviderError};
use crate::llm::{create_completion_provider, ChatMessage};
use crate::models::{DocumentSummary, Passage, UploadSummary};
use crate::service::DocumentService;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    documents: Arc<DocumentService>,
    /// `None` when no completion provider is configured; `/chat` answers 503.
    chat: Option<Arc<ChatService>>,
}

impl AppState {
    pub fn new(documents: Arc<DocumentService>, chat: Option<Arc<ChatService>>) -> Self {
        Self { documents, chat }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let documents = Arc::new(DocumentService::open(config).await?);
    let chat = match create_completion_provider(&config.llm) {
        Ok(Some(llm)) => Some(Arc::new(ChatService::new(
            documents.clone(),
            llm,
            config.llm.clone(),
        ))),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, "completion provider unavailable, /chat disabled");
            None
        }
    };

    tracing::info!(
        retrieval = ?documents.index().mode(),
        chat = chat.is_some(),
        "services ready"
    );

    let app = router(AppState::new(documents, chat), &config.server);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router with CORS and body-size limits applied.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list))
        .route("/documents/upload", post(handle_upload))
        .route("/documents/{id}", get(handle_get).delete(handle_delete))
        .route("/documents/{id}/text", get(handle_get_text))
        .route("/search", post(handle_search))
        .route("/chat", post(handle_chat))
        .layer(DefaultBodyLimit::max(
            server.max_upload_bytes + MULTIPART_OVERHEAD,
        ))
        .layer(cors_layer(&server.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Error type that converts into a JSON HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        let message = err.to_string();
        match err {
            DocumentError::UnsupportedFormat(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "unsupported_format", message)
            }
            DocumentError::Extraction(_) => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed", message)
            }
            DocumentError::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            DocumentError::InvalidArgument(_) => bad_request(message),
            DocumentError::TooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
            }
            DocumentError::Storage { .. } | DocumentError::Serialization(_) => {
                tracing::error!(error = %message, "storage failure");
                AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "failed to access document storage",
                )
            }
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        tracing::error!(error = %err, "provider failure");
        match err {
            ProviderError::NotConfigured(m) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "llm_unavailable", m)
            }
            other => AppError::new(StatusCode::BAD_GATEWAY, "provider_error", other.to_string()),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Retrieval(e) => e.into(),
            ChatError::Provider(e) => e.into(),
        }
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            err.body_text(),
        )
    } else {
        bad_request(err.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Documents ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadSummary>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        let summary = state.documents.upload(bytes.to_vec(), &filename).await?;
        return Ok(Json(summary));
    }
    Err(bad_request("missing multipart field 'file'"))
}

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<DocumentSummary>,
    total: usize,
}

async fn handle_list(State(state): State<AppState>) -> Result<Json<ListResponse>, AppError> {
    let documents = state.documents.list().await?;
    Ok(Json(ListResponse {
        total: documents.len(),
        documents,
    }))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentSummary>, AppError> {
    Ok(Json(state.documents.get(&id).await?.summary()))
}

#[derive(Serialize)]
struct TextResponse {
    id: String,
    text: String,
}

async fn handle_get_text(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TextResponse>, AppError> {
    let text = state.documents.get_text(&id).await?;
    Ok(Json(TextResponse { id, text }))
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: String,
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.documents.delete(&id).await?;
    Ok(Json(DeleteResponse { deleted: id }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    passages: Vec<Passage>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let k = req.k.unwrap_or_else(|| state.documents.default_top_k());
    let passages = state.documents.retrieve_passages(&req.query, k).await?;
    Ok(Json(SearchResponse { passages }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
    /// Answer from this document's text instead of retrieval.
    #[serde(default)]
    document_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let chat = state.chat.as_ref().ok_or_else(|| {
        AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "llm_unavailable",
            "no completion provider is configured",
        )
    })?;
    let answer = chat
        .ask(&req.message, &req.history, req.document_id.as_deref())
        .await?;
    Ok(Json(ChatResponse {
        response: answer.answer,
        sources: answer.sources,
    }))
}
