//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<RunHandle>`.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::{Metrics, RunHandle};
use crate::strategy::host::LogLine;
use crate::types::{RunStatus, SpinRecord};

/// Shared state accessible by all route handlers.
pub type AppState = Arc<RunHandle>;

/// Largest page `/api/spins` will return.
pub const MAX_PAGE: usize = 1_000;
const DEFAULT_PAGE: usize = 100;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub run_id: Option<Uuid>,
    pub strategy: Option<String>,
    pub status: RunStatus,
    pub spins: u64,
    pub bankroll: Decimal,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpinsResponse {
    pub total: u64,
    pub offset: usize,
    pub records: Vec<SpinRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SpinsQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn get_status(State(handle): State<AppState>) -> Json<StatusResponse> {
    let header = handle.header();
    Json(StatusResponse {
        run_id: header.run_id,
        strategy: header.strategy,
        status: header.status,
        spins: header.spins,
        bankroll: header.bankroll,
        started_at: header.started_at,
        finished_at: header.finished_at,
    })
}

pub async fn get_spins(
    State(handle): State<AppState>,
    Query(query): Query<SpinsQuery>,
) -> Json<SpinsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    Json(SpinsResponse {
        total: handle.progress().spins,
        offset: query.offset,
        records: handle.spins(query.offset, limit),
    })
}

pub async fn get_metrics(State(handle): State<AppState>) -> Json<Metrics> {
    Json(handle.metrics())
}

pub async fn get_strategy_log(State(handle): State<AppState>) -> Json<Vec<LogLine>> {
    Json(handle.strategy_log())
}
