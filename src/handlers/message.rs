//! Message endpoint handler
//!
//! Handles POST /message: the single entry point for user messages. The
//! request is enqueued on the sender's session and the handler waits for the
//! pipeline to produce the response, so ordering per user is preserved even
//! across concurrent HTTP requests.

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;

/// Maximum allowed message length in characters
const MAX_MESSAGE_LENGTH: usize = 10_000;
/// Maximum allowed user id length in characters
const MAX_USER_ID_LENGTH: usize = 128;

/// Incoming user message
///
/// Validation is enforced during deserialization - invalid instances cannot
/// exist.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    user_id: String,
    message: String,
}

impl MessageRequest {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl<'de> Deserialize<'de> for MessageRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawMessageRequest {
            user_id: String,
            message: String,
        }

        let raw = RawMessageRequest::deserialize(deserializer)?;

        if raw.user_id.trim().is_empty() {
            return Err(serde::de::Error::custom("user_id cannot be empty"));
        }
        let user_id_chars = raw.user_id.chars().count();
        if user_id_chars > MAX_USER_ID_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "user_id exceeds maximum length of {} characters (got {})",
                MAX_USER_ID_LENGTH, user_id_chars
            )));
        }

        if raw.message.trim().is_empty() {
            return Err(serde::de::Error::custom(
                "message cannot be empty or contain only whitespace",
            ));
        }
        let message_chars = raw.message.chars().count();
        if message_chars > MAX_MESSAGE_LENGTH {
            return Err(serde::de::Error::custom(format!(
                "message exceeds maximum length of {} characters (got {})",
                MAX_MESSAGE_LENGTH, message_chars
            )));
        }

        Ok(MessageRequest {
            user_id: raw.user_id,
            message: raw.message,
        })
    }
}

/// Response to a processed message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub response: String,
}

/// POST /message handler
///
/// Latency is dominated by the session queue: messages from the same user
/// are processed one at a time, so a burst from one user serializes while
/// other users are unaffected.
pub async fn handler(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> AppResult<impl IntoResponse> {
    tracing::debug!(
        user_id = request.user_id(),
        message_length = request.message().chars().count(),
        "Received message"
    );

    let receiver = state.sessions().submit(request.user_id(), request.message());
    let response = receiver.await.map_err(|_| {
        AppError::Internal("message pipeline dropped the response channel".to_string())
    })?;

    Ok(Json(MessageResponse { response }))
}
