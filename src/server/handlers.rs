//! HTTP request handlers.

use crate::error::{AppError, Result};
use crate::library::ImageType;
use crate::server::AppState;
use crate::services::search::SearchEntry;
use crate::tasks::HIGHEST_PRIORITY;
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};

/// Build a binary response.
fn build_response(content_type: &str, body: Vec<u8>) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Internal error"))
                .unwrap_or_default()
        })
}

/// Acknowledgement of a queued task.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    task: &'static str,
    pending: usize,
}

fn queued(state: &AppState, task: &'static str) -> (StatusCode, Json<QueuedResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            task,
            pending: state.queue.len(),
        }),
    )
}

/// Queue a scan of a library.
pub async fn scan_library(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<QueuedResponse>)> {
    let library = state.get_library(&id)?;
    state
        .services
        .emitter
        .scan_library(&library.id, HIGHEST_PRIORITY);
    Ok(queued(&state, "ScanLibrary"))
}

/// Queue purging the trash of a library.
pub async fn empty_trash(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<QueuedResponse>)> {
    let library = state.get_library(&id)?;
    state
        .services
        .emitter
        .empty_trash(&library.id, HIGHEST_PRIORITY);
    Ok(queued(&state, "EmptyTrash"))
}

/// Queue a search index rebuild.
pub async fn rebuild_index(State(state): State<AppState>) -> (StatusCode, Json<QueuedResponse>) {
    state.services.emitter.rebuild_index(HIGHEST_PRIORITY);
    queued(&state, "RebuildIndex")
}

/// Page query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Target format (`jpeg` or `png`).
    pub convert: Option<String>,
    /// Maximum dimension of a resized page.
    pub resize: Option<u32>,
}

/// Page content, optionally converted or resized.
pub async fn book_page(
    State(state): State<AppState>,
    Path((id, number)): Path<(String, u32)>,
    Query(query): Query<PageQuery>,
) -> Result<Response<Body>> {
    let convert_to = query
        .convert
        .as_deref()
        .map(str::parse::<ImageType>)
        .transpose()
        .map_err(AppError::InvalidArgument)?;

    let page = state
        .blocking(move |state| {
            let book = state.get_book(&id)?;
            state
                .services
                .pages
                .get_book_page(&book, number, convert_to, query.resize)
        })
        .await?;

    Ok(build_response(&page.media_type, page.content))
}

/// Selected thumbnail of a book.
pub async fn book_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let (data, media_type) = state
        .blocking(move |state| {
            let book = state.get_book(&id)?;
            state
                .services
                .books
                .get_thumbnail_bytes(&book)?
                .ok_or_else(|| AppError::NotFound(format!("Thumbnail for book {}", book.id)))
        })
        .await?;

    Ok(build_response(&media_type, data))
}

/// Delete a book file from disk, then purge the book.
pub async fn delete_book_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .blocking(move |state| {
            let book = state.get_book(&id)?;
            state.services.books.delete_book_files(&book)?;
            state.services.books.delete_one(&book)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Query terms.
    #[serde(default)]
    pub q: String,
}

/// Title search.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SearchEntry>> {
    Json(state.services.search.search(&params.q))
}
