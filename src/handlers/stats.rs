//! Operational statistics endpoint
//!
//! GET /stats aggregates cache hit rates, classifier learning state,
//! explicit feedback quality, and session occupancy into one JSON document
//! for operators.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::classifier::ClassifierStats;
use crate::error::AppResult;
use crate::feedback::FeedbackStats;
use crate::handlers::AppState;

/// Session occupancy snapshot
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub queued_messages: usize,
}

/// Everything an operator wants in one place
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub classifier: ClassifierStats,
    pub feedback: FeedbackStats,
    pub sessions: SessionStats,
    /// Users with live implicit-feedback context
    pub implicit_contexts: usize,
}

/// GET /stats handler
pub async fn handler(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let response = StatsResponse {
        cache: state.cache().stats().await,
        classifier: state.classifier().stats(),
        feedback: state.feedback().stats(),
        sessions: SessionStats {
            active_sessions: state.sessions().active_sessions(),
            queued_messages: state.sessions().queued_messages(),
        },
        implicit_contexts: state.implicit().active_contexts(),
    };
    Ok(Json(response))
}
