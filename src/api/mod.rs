//! Thin query surface over the Stats Engine / Supervisor, matching
//! `GET /`, `GET /{id}`, `GET /response-time/{id}`. HTML
//! rendering and static assets are explicitly out of scope; every route
//! returns JSON.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;

use crate::stats::StatsEngine;
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Arc<Supervisor>,
    pub stats: Arc<StatsEngine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_system_stats))
        .route("/:id", get(get_target_stats))
        .route("/response-time/:id", get(get_response_time))
        .with_state(state)
}

async fn get_system_stats(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.supervisor.snapshot().await;
    match state.stats.stats(&snapshot).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to compute system stats");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to compute stats").into_response()
        }
    }
}

async fn get_target_stats(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let targets = state.supervisor.targets().await;
    let Some(target) = targets.iter().find(|t| t.id == id) else {
        return (StatusCode::NOT_FOUND, "unknown target").into_response();
    };
    let status = state.supervisor.status_of(&id).await.unwrap_or_default();
    match state.stats.stats_by_id(target, status, false).await {
        Ok(s) => Json(s).into_response(),
        Err(crate::error::StatsError::HostNotFound(_)) => {
            (StatusCode::NOT_FOUND, "unknown target").into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, target_id = %id, "failed to compute target stats");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to compute stats").into_response()
        }
    }
}

async fn get_response_time(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.stats.response_time(&id).await {
        Ok((days, ms)) => Json(serde_json::json!({ "days": days, "response_ms": ms })).into_response(),
        Err(crate::error::StatsError::HostNotFound(_)) => {
            (StatusCode::NOT_FOUND, "unknown target").into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, target_id = %id, "failed to compute response-time series");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to compute response time").into_response()
        }
    }
}
