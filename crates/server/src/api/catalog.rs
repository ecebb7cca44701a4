//! Catalog API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use detergent_core::{CatalogStats, PoolStatus, QueryError, TimelineBucket, Torrent, TorrentDetail};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_timeline_limit")]
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    25
}

fn default_days() -> u32 {
    7
}

fn default_timeline_limit() -> u32 {
    10
}

#[derive(Debug, Serialize)]
pub struct TorrentListResponse {
    pub torrents: Vec<Torrent>,
    pub total: usize,
}

impl From<Vec<Torrent>> for TorrentListResponse {
    fn from(torrents: Vec<Torrent>) -> Self {
        Self {
            total: torrents.len(),
            torrents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub days: Vec<TimelineBucket>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub catalog: CatalogStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolver: Option<PoolStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_pending: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_entries: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: QueryError) -> ApiError {
    let status = match e {
        QueryError::InvalidArgument(_) | QueryError::InvalidHash(_) => StatusCode::BAD_REQUEST,
        QueryError::NotFound(_) => StatusCode::NOT_FOUND,
        QueryError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let catalog = state.query().stats().map_err(error_response)?;

    Ok(Json(StatsResponse {
        catalog,
        resolver: state.pool_status(),
        queue_pending: state.queue_pending(),
        cache_entries: state.cache_entries(),
    }))
}

/// GET /api/v1/popular
///
/// Most announced torrents first.
pub async fn popular(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<TorrentListResponse>, ApiError> {
    state
        .query()
        .popular(params.limit)
        .map(|torrents| Json(torrents.into()))
        .map_err(error_response)
}

/// GET /api/v1/timeline
///
/// One bucket per UTC day, today first.
pub async fn timeline(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimelineParams>,
) -> Result<Json<TimelineResponse>, ApiError> {
    state
        .query()
        .timeline(params.days, params.limit)
        .map(|days| Json(TimelineResponse { days }))
        .map_err(error_response)
}

/// GET /api/v1/search
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<TorrentListResponse>, ApiError> {
    state
        .query()
        .search(&params.q, params.limit)
        .map(|torrents| Json(torrents.into()))
        .map_err(error_response)
}

/// GET /api/v1/torrents/{hash}
///
/// Accepts a hex info-hash or a magnet URI.
pub async fn get_torrent(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<TorrentDetail>, ApiError> {
    state
        .query()
        .torrent(&hash)
        .map(Json)
        .map_err(error_response)
}
