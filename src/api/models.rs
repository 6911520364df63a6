//! Request/response DTOs for the HTTP surface (spec.md §6).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequestBody {
    pub ticker: String,
    pub date: NaiveDate,
    pub model: Option<String>,
    pub analysis_model: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetCacheRequestBody {
    pub ticker: String,
    pub date: Option<NaiveDate>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetCacheResponse {
    pub ok: bool,
    pub cleared_cache_files: usize,
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub mode: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SelftestResponse {
    pub ok: bool,
    pub ticker: String,
    pub rating: Option<String>,
}
