//! JSON HTTP front end.
//!
//! Exposes the same operations as the CLI. Each browser tab or client first
//! creates a session and then addresses it by id; the held results live in
//! server memory only.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/papers/{kind}` | List stored entries (`qp` or `ms`) |
//! | `PUT`  | `/papers/{kind}?year=&session=&paper=&variant=` | Upload a PDF body |
//! | `GET`  | `/papers/{kind}/{name}` | Download a stored PDF |
//! | `POST` | `/sessions` | Create a session |
//! | `DELETE` | `/sessions/{id}` | Drop a session and its held results |
//! | `POST` | `/sessions/{id}/search` | Single-year search |
//! | `POST` | `/sessions/{id}/batch` | 4-year batch search |
//! | `GET`  | `/sessions/{id}/marking-schemes` | Marking schemes for held results |
//! | `GET`  | `/sessions/{id}/export` | Download held results as `.docx` (`204` when nothing is held) |
//!
//! Sessions not touched for `[server].session_idle_secs` are evicted by a
//! background sweep and whenever a new session is created. Searches, PDF
//! reads and document assembly run on the blocking pool.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "variant '21' is not valid for paper 1: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::crossref::{cross_reference, pdf_data_uri, CrossReference};
use crate::export::export_session;
use crate::extract::{PageExtractor, PdfPageExtractor, MIME_DOCX, MIME_PDF};
use crate::models::{DocKind, ExamYear, Paper, Session, Variant};
use crate::naming::{ArchiveName, EntryKey};
use crate::search::{
    preview, BatchQuery, ReadFailure, SearchQuery, Searcher, BATCH_PREVIEW_CHARS,
    SEARCH_PREVIEW_CHARS,
};
use crate::session::SessionState;
use crate::store::ArchiveStore;

/// Upper bound on the interval between idle-session sweeps.
const MAX_SWEEP_INTERVAL_SECS: u64 = 60;

struct SessionEntry {
    state: SessionState,
    last_used: Instant,
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<ArchiveStore>,
    extractor: Arc<dyn PageExtractor>,
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
}

/// Starts the HTTP server with the `pdf-extract` backed extractor.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    run_server_with_extractor(config, Arc::new(PdfPageExtractor)).await
}

/// Starts the HTTP server with a caller-supplied page extractor.
///
/// Binds to `[server].bind`, creates the archive directories, and serves
/// until the process is terminated.
pub async fn run_server_with_extractor(
    config: &Config,
    extractor: Arc<dyn PageExtractor>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store = ArchiveStore::from_config(&config.archive);
    store.ensure_dirs()?;

    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(store),
        extractor,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let sweeper = state.clone();
    let sweep_every = Duration::from_secs(
        config
            .server
            .session_idle_secs
            .clamp(1, MAX_SWEEP_INTERVAL_SECS),
    );
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(sweep_every);
        loop {
            tick.tick().await;
            sweeper.prune_idle();
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/papers/{kind}", get(handle_list).put(handle_upload))
        .route("/papers/{kind}/{name}", get(handle_download))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", delete(handle_delete_session))
        .route("/sessions/{id}/search", post(handle_search))
        .route("/sessions/{id}/batch", post(handle_batch))
        .route("/sessions/{id}/marking-schemes", get(handle_marking_schemes))
        .route("/sessions/{id}/export", get(handle_export))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %bind_addr, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
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
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::warn!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

fn parse_kind(kind: &str) -> Result<DocKind, AppError> {
    kind.parse().map_err(bad_request)
}

fn parse_variant(paper: u8, variant: &str) -> Result<Variant, AppError> {
    let paper = Paper::try_from(paper).map_err(bad_request)?;
    paper.require_variant(variant).map_err(bad_request)
}

fn parse_year(year: u16) -> Result<ExamYear, AppError> {
    ExamYear::try_from(year).map_err(bad_request)
}

impl AppState {
    fn searcher(&self) -> Searcher<'_> {
        Searcher::new(
            &self.config.archive.subject_code,
            &self.store,
            self.extractor.as_ref(),
        )
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, HashMap<Uuid, SessionEntry>>, AppError> {
        self.sessions
            .lock()
            .map_err(|_| internal(anyhow::anyhow!("session store poisoned")))
    }

    /// Runs `f` against the session's state and marks it used, or 404s.
    fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T, AppError> {
        let mut sessions = self.lock_sessions()?;
        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| not_found(format!("session not found: {}", id)))?;
        entry.last_used = Instant::now();
        Ok(f(&mut entry.state))
    }

    fn require_session(&self, id: Uuid) -> Result<(), AppError> {
        self.with_session(id, |_| ())
    }

    /// Drops sessions idle for longer than `[server].session_idle_secs`.
    fn prune_idle(&self) -> usize {
        let idle = Duration::from_secs(self.config.server.session_idle_secs);
        let Ok(mut sessions) = self.sessions.lock() else {
            return 0;
        };
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_used.elapsed() <= idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Runs `f` on the blocking pool; PDF decoding and file reads go here.
    async fn blocking<T>(
        &self,
        f: impl FnOnce(&AppState) -> T + Send + 'static,
    ) -> Result<T, AppError>
    where
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(&state))
            .await
            .map_err(|e| internal(anyhow::anyhow!("worker task failed: {}", e)))
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

// ============ /papers ============

#[derive(Serialize)]
struct ListedEntry {
    file_name: String,
    /// Decoded fields, absent for names outside the convention.
    name: Option<ArchiveName>,
}

#[derive(Serialize)]
struct ListResponse {
    kind: DocKind,
    entries: Vec<ListedEntry>,
}

async fn handle_list(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<ListResponse>, AppError> {
    let kind = parse_kind(&kind)?;
    let names = state.store.list(kind).map_err(internal)?;
    let entries = names
        .into_iter()
        .map(|file_name| ListedEntry {
            name: ArchiveName::parse(&file_name),
            file_name,
        })
        .collect();
    Ok(Json(ListResponse { kind, entries }))
}

#[derive(Deserialize)]
struct UploadParams {
    year: u16,
    session: String,
    paper: u8,
    variant: String,
}

#[derive(Serialize)]
struct UploadResponse {
    file_name: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    let key = EntryKey {
        session: params.session.parse::<Session>().map_err(bad_request)?,
        year: parse_year(params.year)?,
        variant: parse_variant(params.paper, &params.variant)?,
        kind: parse_kind(&kind)?,
    };
    let file_name = state
        .blocking(move |state| {
            state
                .store
                .upload(&state.config.archive.subject_code, &key, &body)
        })
        .await?
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(UploadResponse { file_name }))
}

async fn handle_download(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let kind = parse_kind(&kind)?;
    if !state.store.exists(kind, &name) {
        return Err(not_found(format!("{} is not in the archive", name)));
    }
    let bytes = state
        .blocking(move |state| state.store.read(kind, &name))
        .await?
        .map_err(internal)?;
    Ok(([(header::CONTENT_TYPE, MIME_PDF.to_string())], bytes).into_response())
}

// ============ /sessions ============

#[derive(Serialize)]
struct SessionCreated {
    id: Uuid,
}

async fn handle_create_session(State(state): State<AppState>) -> Result<Json<SessionCreated>, AppError> {
    state.prune_idle();
    let id = Uuid::new_v4();
    state.lock_sessions()?.insert(
        id,
        SessionEntry {
            state: SessionState::default(),
            last_used: Instant::now(),
        },
    );
    tracing::debug!(session = %id, "session created");
    Ok(Json(SessionCreated { id }))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    match state.lock_sessions()?.remove(&id) {
        Some(_) => {
            tracing::debug!(session = %id, "session deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(not_found(format!("session not found: {}", id))),
    }
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    topic: Option<String>,
    year: u16,
    paper: u8,
    variant: String,
}

#[derive(Serialize)]
struct ResultSummary {
    source_file: String,
    pages: Vec<u32>,
    preview: String,
}

#[derive(Serialize)]
struct SearchResponse {
    found: bool,
    message: String,
    results: Vec<ResultSummary>,
    failures: Vec<ReadFailure>,
}

async fn handle_search(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = SearchQuery {
        topic: req.topic,
        year: parse_year(req.year)?,
        variant: parse_variant(req.paper, &req.variant)?,
    };
    state.require_session(id)?;
    let report = {
        let query = query.clone();
        state
            .blocking(move |state| state.searcher().search_year(&query))
            .await?
    };
    state.with_session(id, |session| session.record_search(&query, &report))?;

    let message = if report.is_empty() {
        format!(
            "No questions found for Variant {} in {}.",
            query.variant, query.year
        )
    } else {
        format!("Found {} matching paper(s).", report.results.len())
    };
    let results = report
        .results
        .iter()
        .map(|r| ResultSummary {
            source_file: r.source_file.clone(),
            pages: r.pages.iter().map(|p| p.page_number).collect(),
            preview: preview(&r.render(), SEARCH_PREVIEW_CHARS),
        })
        .collect();
    Ok(Json(SearchResponse {
        found: !report.is_empty(),
        message,
        results,
        failures: report.failures,
    }))
}

#[derive(Deserialize)]
struct BatchRequest {
    #[serde(default)]
    topic: Option<String>,
    start_year: u16,
    paper: u8,
    variant: String,
}

#[derive(Serialize)]
struct SectionSummary {
    year: ExamYear,
    session: Session,
    source_file: String,
}

#[derive(Serialize)]
struct BatchResponse {
    found: bool,
    message: String,
    sections: Vec<SectionSummary>,
    preview: String,
    failures: Vec<ReadFailure>,
    /// Where to fetch the compiled document, when anything was found.
    download: Option<String>,
}

async fn handle_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    let query = BatchQuery::new(
        req.topic,
        parse_year(req.start_year)?,
        parse_variant(req.paper, &req.variant)?,
    )
    .map_err(|e| bad_request(e.to_string()))?;
    state.require_session(id)?;
    let report = {
        let query = query.clone();
        state
            .blocking(move |state| state.searcher().search_batch(&query))
            .await?
    };
    state.with_session(id, |session| session.record_batch(&report))?;

    let found = !report.is_empty();
    let message = if found {
        format!(
            "Successfully compiled questions for {}-{}",
            query.start_year,
            query.end_year()
        )
    } else {
        format!(
            "No matching questions found in the {}-{} window.",
            query.start_year,
            query.end_year()
        )
    };
    let preview_text = if found {
        preview(&report.aggregate_text(), BATCH_PREVIEW_CHARS)
    } else {
        String::new()
    };
    Ok(Json(BatchResponse {
        found,
        message,
        sections: report
            .sections
            .iter()
            .map(|s| SectionSummary {
                year: s.year,
                session: s.session,
                source_file: s.result.source_file.clone(),
            })
            .collect(),
        preview: preview_text,
        failures: report.failures,
        download: found.then(|| format!("/sessions/{}/export", id)),
    }))
}

#[derive(Serialize)]
struct ShownScheme {
    question_paper: String,
    marking_scheme: String,
    data_uri: String,
}

#[derive(Serialize)]
struct MarkingSchemeResponse {
    found: Vec<ShownScheme>,
    missing: Vec<String>,
    message: Option<String>,
}

async fn handle_marking_schemes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkingSchemeResponse>, AppError> {
    let held = state.with_session(id, |session| session.clone())?;
    let response = state
        .blocking(move |state| marking_scheme_response(&held, &state.store))
        .await??;
    Ok(Json(response))
}

/// Cross-references `held` and inlines every marking scheme found.
fn marking_scheme_response(
    held: &SessionState,
    store: &ArchiveStore,
) -> Result<MarkingSchemeResponse, AppError> {
    let response = match cross_reference(held, store) {
        CrossReference::NothingToShow => MarkingSchemeResponse {
            found: vec![],
            missing: vec![],
            message: Some("Nothing to show: run a search first.".to_string()),
        },
        CrossReference::Unresolvable => MarkingSchemeResponse {
            found: vec![],
            missing: vec![],
            message: Some("No marking scheme files found matching your search.".to_string()),
        },
        CrossReference::Resolved { found, missing } => {
            let mut shown = Vec::with_capacity(found.len());
            for hit in found {
                let bytes = store
                    .read(DocKind::MarkingScheme, &hit.marking_scheme)
                    .map_err(internal)?;
                shown.push(ShownScheme {
                    question_paper: hit.question_paper,
                    marking_scheme: hit.marking_scheme,
                    data_uri: pdf_data_uri(&bytes),
                });
            }
            let message = shown
                .is_empty()
                .then(|| "No marking scheme files found matching your search.".to_string());
            MarkingSchemeResponse {
                found: shown,
                missing,
                message,
            }
        }
    };
    Ok(response)
}

async fn handle_export(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let held = state.with_session(id, |session| session.clone())?;
    let doc = state
        .blocking(move |state| export_session(&held, &state.config.archive))
        .await?
        .map_err(internal)?;
    let Some(doc) = doc else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    Ok((
        [
            (header::CONTENT_TYPE, MIME_DOCX.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", doc.file_name),
            ),
        ],
        doc.bytes,
    )
        .into_response())
}
