//! Explicit feedback collection
//!
//! Every served response becomes a pending entry eligible for one explicit
//! rating; at most one pending entry exists per user, and an unrated entry
//! silently expires. Rated entries join a bounded history that is mined for
//! recurring dissatisfaction patterns by text similarity and aggregated into
//! per-route quality statistics.

pub mod implicit;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::classifier::RouteId;
use crate::config::FeedbackConfig;
use crate::text::jaccard;

/// Snapshot key for the rated-feedback history
pub const FEEDBACK_HISTORY_KEY: &str = "feedback:history";

/// Similarity floor for two messages to count as "the same complaint"
const SIMILARITY_THRESHOLD: f64 = 0.5;
/// How many similar bad ratings on one route flag a recurring failure
const RECURRING_THRESHOLD: usize = 3;

/// Explicit user rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Good,
    Bad,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Bad => "bad",
        }
    }
}

/// A served response awaiting its rating
///
/// The uuid is the identity token for the delayed expiry task: a superseding
/// entry for the same user changes the id, which voids the older timer.
#[derive(Debug, Clone)]
struct PendingFeedback {
    id: Uuid,
    user_message: String,
    bot_response: String,
    route: RouteId,
    response_time_ms: u64,
}

/// A rated response in the bounded history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub user_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub route: RouteId,
    pub rating: Rating,
    pub timestamp_ms: u64,
    pub response_time_ms: u64,
}

/// Outcome of submitting a rating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackAck {
    /// False when no pending entry existed (expired or never registered)
    pub accepted: bool,
    /// True when this bad rating matched a recurring-failure pattern
    pub recurring: bool,
}

/// Per-route slice of feedback statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RouteFeedbackStats {
    pub total: usize,
    pub good: usize,
    pub bad: usize,
    pub satisfaction_rate: f64,
}

/// Aggregate feedback statistics
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackStats {
    pub total: usize,
    pub good: usize,
    pub bad: usize,
    pub satisfaction_rate: f64,
    pub avg_response_time_ms: f64,
    pub by_route: HashMap<&'static str, RouteFeedbackStats>,
}

/// Collects explicit ratings against served responses
pub struct FeedbackCollector {
    config: FeedbackConfig,
    pending: Mutex<HashMap<String, PendingFeedback>>,
    history: Mutex<VecDeque<FeedbackRecord>>,
    snapshots: Arc<ResponseCache>,
}

impl FeedbackCollector {
    pub fn new(config: FeedbackConfig, snapshots: Arc<ResponseCache>) -> Self {
        Self {
            config,
            pending: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            snapshots,
        }
    }

    /// Reload rated history from its snapshot; absence is a cold start
    pub async fn load_snapshot(&self) {
        let Some(records) = self
            .snapshots
            .get_json::<Vec<FeedbackRecord>>(FEEDBACK_HISTORY_KEY)
            .await
        else {
            return;
        };
        let count = records.len();
        let mut history = lock(&self.history);
        *history = records.into_iter().collect();
        while history.len() > self.config.history_capacity {
            history.pop_front();
        }
        drop(history);
        tracing::info!(count, "Loaded feedback history from snapshot");
    }

    /// Register a served response as pending feedback
    ///
    /// Overwrites any prior pending entry for the user - only the most
    /// recent response is eligible for rating - and schedules automatic
    /// expiry after the pending TTL.
    pub fn register_response(
        self: &Arc<Self>,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        route: RouteId,
        response_time_ms: u64,
    ) {
        let id = Uuid::new_v4();
        let entry = PendingFeedback {
            id,
            user_message: user_message.to_string(),
            bot_response: bot_response.to_string(),
            route,
            response_time_ms,
        };

        lock(&self.pending).insert(user_id.to_string(), entry);

        let collector = Arc::clone(self);
        let user = user_id.to_string();
        let ttl = self.config.pending_ttl();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            collector.expire_pending(&user, id);
        });
    }

    /// Remove a pending entry if it is still the one the timer was armed for
    fn expire_pending(&self, user_id: &str, id: Uuid) {
        let mut pending = lock(&self.pending);
        if pending.get(user_id).is_some_and(|e| e.id == id) {
            pending.remove(user_id);
            tracing::debug!(user_id, "Pending feedback expired unrated");
        }
    }

    /// Apply an explicit rating to the user's pending entry
    ///
    /// Fails (accepted = false) when no pending entry exists. On success the
    /// entry moves into the bounded history and the history is persisted; a
    /// bad rating additionally runs recurring-pattern analysis.
    pub async fn submit_feedback(&self, user_id: &str, rating: Rating) -> FeedbackAck {
        let Some(entry) = lock(&self.pending).remove(user_id) else {
            return FeedbackAck {
                accepted: false,
                recurring: false,
            };
        };

        let record = FeedbackRecord {
            user_id: user_id.to_string(),
            user_message: entry.user_message,
            bot_response: entry.bot_response,
            route: entry.route,
            rating,
            timestamp_ms: now_ms(),
            response_time_ms: entry.response_time_ms,
        };

        let recurring = {
            let mut history = lock(&self.history);
            // Mine before appending so the new record does not match itself
            let recurring = rating == Rating::Bad && {
                let similar = history
                    .iter()
                    .filter(|f| f.rating == Rating::Bad)
                    .filter(|f| f.route == record.route)
                    .filter(|f| {
                        jaccard(&f.user_message, &record.user_message) > SIMILARITY_THRESHOLD
                    })
                    .count();
                similar >= RECURRING_THRESHOLD
            };

            history.push_back(record.clone());
            while history.len() > self.config.history_capacity {
                history.pop_front();
            }
            recurring
        };

        if rating == Rating::Bad {
            tracing::warn!(
                user_id,
                route = record.route.as_str(),
                message = %record.user_message,
                response_time_ms = record.response_time_ms,
                recurring,
                "Negative feedback received"
            );
        }
        if recurring {
            tracing::warn!(
                route = record.route.as_str(),
                "Recurring dissatisfaction pattern detected, operator attention needed"
            );
        }

        self.save_snapshot().await;

        FeedbackAck {
            accepted: true,
            recurring,
        }
    }

    /// Whether the user currently has a rateable pending entry
    pub fn has_pending(&self, user_id: &str) -> bool {
        lock(&self.pending).contains_key(user_id)
    }

    /// Aggregate statistics over the rated history
    pub fn stats(&self) -> FeedbackStats {
        let history = lock(&self.history);

        let total = history.len();
        let good = history.iter().filter(|f| f.rating == Rating::Good).count();
        let bad = total - good;

        let mut by_route: HashMap<&'static str, RouteFeedbackStats> = HashMap::new();
        for record in history.iter() {
            let entry = by_route.entry(record.route.as_str()).or_default();
            entry.total += 1;
            match record.rating {
                Rating::Good => entry.good += 1,
                Rating::Bad => entry.bad += 1,
            }
        }
        for entry in by_route.values_mut() {
            let rated = entry.good + entry.bad;
            entry.satisfaction_rate = if rated > 0 {
                entry.good as f64 / rated as f64
            } else {
                0.0
            };
        }

        let avg_response_time_ms = if total > 0 {
            history.iter().map(|f| f.response_time_ms as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };

        FeedbackStats {
            total,
            good,
            bad,
            satisfaction_rate: if total > 0 {
                good as f64 / total as f64
            } else {
                0.0
            },
            avg_response_time_ms,
            by_route,
        }
    }

    /// Most recent bad-rated records, newest first
    pub fn worst_responses(&self, limit: usize) -> Vec<FeedbackRecord> {
        let history = lock(&self.history);
        let mut worst: Vec<FeedbackRecord> = history
            .iter()
            .filter(|f| f.rating == Rating::Bad)
            .cloned()
            .collect();
        worst.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        worst.truncate(limit);
        worst
    }

    async fn save_snapshot(&self) {
        let records: Vec<FeedbackRecord> = {
            let history = lock(&self.history);
            history.iter().cloned().collect()
        };
        self.snapshots.set_json(FEEDBACK_HISTORY_KEY, &records).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
