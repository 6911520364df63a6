//! HTTP surface (spec.md §6), grounded in the teacher's `main.rs` route
//! construction: flat `Router::new().route(...)` tables merged together
//! and layered with CORS + request logging.

use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::batch::{self, BatchRow};
use crate::error::AppError;
use crate::middleware::logging::request_logging;
use crate::orchestrator::modes::Mode;
use crate::orchestrator::{self, AnalyzeRequest};
use crate::state::AppState;

use super::models::{
    AnalyzeRequestBody, ErrorBody, ResetCacheRequestBody, ResetCacheResponse, SelftestResponse,
};

const SELFTEST_TICKER: &str = "AAPL";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/selftest", get(selftest))
        .route("/api/analyze", post(analyze))
        .route("/api/reset-cache", post(reset_cache))
        .route("/api/batch", post(run_batch))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_logging))
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// spec.md §9: the self-test runs the same in-process orchestrator path
/// as `/api/analyze`, against a fixed ticker in metrics-only mode so it
/// never depends on LLM credentials being configured.
async fn selftest(State(state): State<AppState>) -> Response {
    let today = chrono::Utc::now().date_naive();
    let request = AnalyzeRequest {
        ticker: SELFTEST_TICKER.to_string(),
        baseline_date: today,
        model: state.config.llm_model.clone(),
        mode: Mode::MetricsOnly,
    };
    match orchestrator::analyze(&state, request).await {
        Ok(bundle) => Json(SelftestResponse {
            ok: true,
            ticker: bundle.input.ticker,
            rating: bundle.analysis.as_ref().and_then(|a| a.rating()).map(str::to_string),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn analyze(State(state): State<AppState>, Json(body): Json<AnalyzeRequestBody>) -> Response {
    let mode = match Mode::parse(body.mode.as_deref()) {
        Ok(mode) => mode,
        Err(err) => return err.into_response(),
    };
    let model = body
        .model
        .or(body.analysis_model)
        .unwrap_or_else(|| state.config.llm_model.clone());

    let request = AnalyzeRequest { ticker: body.ticker, baseline_date: body.date, model, mode };
    match orchestrator::analyze(&state, request).await {
        Ok(bundle) => Json(bundle).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn reset_cache(State(state): State<AppState>, Json(body): Json<ResetCacheRequestBody>) -> Response {
    let model = body.model.unwrap_or_else(|| state.config.llm_model.clone());
    let store_cleared = match state.results_store.clear_variants(&body.ticker, body.date, &model) {
        Ok(count) => count,
        Err(err) => return AppError::Storage(err).into_response(),
    };
    let date_prefix = body.date.map(|d| d.to_string());
    let kv_cleared = match state.kv_cache.clear_for_ticker(&body.ticker, date_prefix.as_deref()) {
        Ok(count) => count,
        Err(err) => return AppError::Storage(err).into_response(),
    };
    Json(ResetCacheResponse { ok: true, cleared_cache_files: store_cleared + kv_cleared }).into_response()
}

/// spec.md §4.10, §6: multipart `file` field holding CSV or XLSX rows.
/// `mode`/`model` come from the query string and apply to every row
/// unless a row specifies its own model.
async fn run_batch(State(state): State<AppState>, Query(query): Query<crate::api::models::BatchQuery>, mut multipart: Multipart) -> Response {
    let mode = match Mode::parse(query.mode.as_deref()) {
        Ok(mode) => mode,
        Err(err) => return err.into_response(),
    };

    let mut rows: Option<Vec<BatchRow>> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return validation_response(&format!("malformed multipart body: {err}")),
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => return validation_response(&format!("failed to read upload: {err}")),
        };

        let parsed = if filename.to_ascii_lowercase().ends_with(".xlsx") {
            batch::parse_xlsx(bytes.to_vec())
        } else {
            batch::parse_csv(&bytes)
        };
        match parsed {
            Ok(parsed_rows) => rows = Some(parsed_rows),
            Err(err) => return validation_response(&format!("could not parse batch upload: {err}")),
        }
        break;
    }

    let Some(rows) = rows else {
        return validation_response("missing multipart field `file`");
    };
    if rows.is_empty() {
        return validation_response("batch upload contained no valid rows");
    }

    let results = batch::run(&state, rows, mode, query.model).await;
    let csv = match batch::to_csv(&results) {
        Ok(csv) => csv,
        Err(err) => {
            warn!(%err, "failed to serialize batch result csv");
            return AppError::Storage(err).into_response();
        }
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        csv,
    )
        .into_response()
}

fn validation_response(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.to_string() })).into_response()
}
