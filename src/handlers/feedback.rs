//! Feedback endpoint handler
//!
//! Handles POST /feedback: applies an explicit rating to the sender's most
//! recent response. Ratings arriving after the pending window are rejected
//! rather than misattributed.

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppResult;
use crate::feedback::Rating;
use crate::handlers::AppState;

/// Explicit rating submission
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    user_id: String,
    rating: Rating,
}

impl FeedbackRequest {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn rating(&self) -> Rating {
        self.rating
    }
}

impl<'de> Deserialize<'de> for FeedbackRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawFeedbackRequest {
            user_id: String,
            rating: Rating,
        }

        let raw = RawFeedbackRequest::deserialize(deserializer)?;

        if raw.user_id.trim().is_empty() {
            return Err(serde::de::Error::custom("user_id cannot be empty"));
        }

        Ok(FeedbackRequest {
            user_id: raw.user_id,
            rating: raw.rating,
        })
    }
}

/// Whether the rating was applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub accepted: bool,
}

/// POST /feedback handler
pub async fn handler(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<impl IntoResponse> {
    let ack = state
        .feedback()
        .submit_feedback(request.user_id(), request.rating())
        .await;

    if ack.accepted {
        state.metrics().record_feedback(request.rating());
        if ack.recurring {
            state.metrics().record_recurring_failure();
        }
    } else {
        tracing::debug!(
            user_id = request.user_id(),
            "Feedback rejected, no pending response"
        );
    }

    Ok(Json(FeedbackResponse {
        accepted: ack.accepted,
    }))
}
