//! HTTP request handlers for the web adapter.

use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
    },
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::domain::alerts::{AlertReport, process_alerts};
use crate::domain::catalog::{self, DeletedIndex, HealthReport, IndexStocks};
use crate::domain::constituents::{BatchReport, IndexUpload, MatchPolicy, load_batch};
use crate::domain::index::Index;
use crate::domain::overlap::{OverlapAnalysis, analyze_overlap};
use crate::domain::reconcile::{ReconcileReport, parse_master_config, reconcile_config};

use super::{AppState, WebError};

type ApiResult<T> = Result<Json<T>, WebError>;

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthReport> {
    Ok(Json(catalog::health(&*state.store)?))
}

pub async fn list_indices(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Index>> {
    Ok(Json(catalog::list_indices(&*state.store)?))
}

pub async fn index_stocks(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<IndexStocks> {
    let Path(id) = id?;
    Ok(Json(catalog::index_stocks(&*state.store, id)?))
}

pub async fn delete_index(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<DeletedIndex> {
    let Path(id) = id?;
    Ok(Json(catalog::delete_index(&*state.store, id)?))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_stock_indices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Index>> {
    Ok(Json(catalog::search_indices(&*state.store, &query.q)?))
}

#[derive(Debug, Deserialize)]
pub struct CommonStocksRequest {
    pub index_ids: Vec<i64>,
}

pub async fn common_stocks(
    State(state): State<Arc<AppState>>,
    request: Result<Json<CommonStocksRequest>, JsonRejection>,
) -> ApiResult<OverlapAnalysis> {
    let Json(request) = request?;
    Ok(Json(analyze_overlap(&*state.store, &request.index_ids)?))
}

pub async fn upload_master_config(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ReconcileReport> {
    let form = read_upload_form(multipart).await?;
    let file = form.single_file()?;
    let rows = parse_master_config(&file.bytes, &file.filename)?;
    let report = reconcile_config(&*state.store, &rows)?;
    info!(
        filename = %file.filename,
        processed = report.processed,
        created = report.created,
        "master configuration loaded"
    );
    Ok(Json(report))
}

/// Constituent files for existing indices only.
pub async fn upload_index(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<BatchReport> {
    let form = read_upload_form(multipart).await?;
    run_batch(&state, form, MatchPolicy::Strict)
}

/// Initial load: files no index claims create one.
pub async fn bulk_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<BatchReport> {
    let mut form = read_upload_form(multipart).await?;
    form.index_id = None;
    run_batch(&state, form, MatchPolicy::AutoCreate)
}

pub async fn process_tradingview_alerts(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<AlertReport> {
    let form = read_upload_form(multipart).await?;
    let file = form.single_file()?;
    let report = process_alerts(
        &*state.store,
        &file.bytes,
        &file.filename,
        state.settings.alerts.signal_match,
    )?;
    Ok(Json(report))
}

pub async fn not_found() -> WebError {
    WebError::not_found("Not found")
}

fn run_batch(state: &AppState, form: UploadForm, policy: MatchPolicy) -> ApiResult<BatchReport> {
    if form.files.is_empty() {
        return Err(WebError::bad_request("no files uploaded"));
    }
    let uploads: Vec<IndexUpload> = form
        .files
        .into_iter()
        .map(|file| IndexUpload {
            filename: file.filename,
            bytes: file.bytes,
            index_id: form.index_id,
            category: form.category.clone(),
        })
        .collect();
    Ok(Json(load_batch(
        &*state.store,
        &uploads,
        policy,
        &state.settings.upload,
    )))
}

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct UploadForm {
    files: Vec<UploadedFile>,
    index_id: Option<i64>,
    category: Option<String>,
}

impl UploadForm {
    fn single_file(self) -> Result<UploadedFile, WebError> {
        self.files
            .into_iter()
            .next()
            .ok_or_else(|| WebError::bad_request("no file uploaded"))
    }
}

fn multipart_error(err: MultipartError) -> WebError {
    WebError::new(err.status(), err.body_text())
}

async fn read_text(field: Field<'_>) -> Result<String, WebError> {
    field.text().await.map_err(multipart_error)
}

/// Any part carrying a filename is a file; `index_id` and `category` are
/// read from plain text parts. Unknown text parts are ignored.
async fn read_upload_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, WebError> {
    let mut multipart = multipart?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if let Some(filename) = field.file_name().map(str::to_string) {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            form.files.push(UploadedFile {
                filename,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "index_id" => {
                let raw = read_text(field).await?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let id = raw.parse().map_err(|_| {
                        WebError::bad_request(format!("index_id must be an integer, got '{}'", raw))
                    })?;
                    form.index_id = Some(id);
                }
            }
            "category" => form.category = Some(read_text(field).await?),
            _ => {}
        }
    }

    Ok(form)
}
