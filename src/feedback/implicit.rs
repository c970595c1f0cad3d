//! Implicit satisfaction signals
//!
//! Infers satisfaction from what the user does next instead of asking for a
//! rating. Each served response is remembered as short-lived conversation
//! context; the user's following message is matched against indicator
//! phrases and two behavioral heuristics. Contexts go stale quickly - a
//! reply half an hour later says nothing about the earlier answer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::time::{Duration, Instant};

use crate::classifier::RouteId;
use crate::config::ImplicitConfig;
use crate::text::shared_long_words;

/// Phrases that read as satisfaction when found in a follow-up message
const SATISFACTION_PHRASES: &[&str] = &[
    "gracias",
    "perfecto",
    "genial",
    "excelente",
    "ok",
    "dale",
    "entendido",
    "claro",
    "muchas gracias",
    "graciass",
];

/// Phrases that read as dissatisfaction
const DISSATISFACTION_PHRASES: &[&str] = &[
    "no entiendo",
    "no entendí",
    "no me sirve",
    "otra forma",
    "más claro",
    "mas claro",
    "no es eso",
    "eso ya lo sé",
    "eso ya lo se",
    "me confunde",
];

/// Rephrasing heuristic: this many shared long words with the bot's last
/// response means the user is asking the same thing again
const REPHRASE_SHARED_WORDS: usize = 3;
const REPHRASE_MIN_WORD_LEN: usize = 4;

/// Short-acknowledgement heuristic thresholds
const LONG_RESPONSE_CHARS: usize = 200;
const SHORT_ACK_CHARS: usize = 20;

/// Inferred reaction to the previous response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Satisfied,
    Dissatisfied,
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::Dissatisfied => "dissatisfied",
            Self::Neutral => "neutral",
        }
    }
}

/// What the bot last said to a user, and when
#[derive(Debug, Clone)]
struct ConversationContext {
    last_response: String,
    route: RouteId,
    responded_at: Instant,
}

/// Derives satisfaction signals from follow-up messages
pub struct ImplicitFeedbackDetector {
    config: ImplicitConfig,
    contexts: Mutex<HashMap<String, ConversationContext>>,
}

impl ImplicitFeedbackDetector {
    pub fn new(config: ImplicitConfig) -> Self {
        Self {
            config,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Remember the response just served as the user's conversation context
    pub fn register_bot_response(&self, user_id: &str, response: &str, route: RouteId) {
        let context = ConversationContext {
            last_response: response.to_string(),
            route,
            responded_at: Instant::now(),
        };
        lock(&self.contexts).insert(user_id.to_string(), context);
    }

    /// Classify an incoming message as a reaction to the previous response
    ///
    /// Neutral when there is no context or the context has gone stale.
    /// Explicit indicator phrases win over the behavioral heuristics;
    /// satisfaction phrases are checked before dissatisfaction ones, so a
    /// mixed message like "gracias pero no me sirve" reads as thanks.
    pub fn analyze_user_response(&self, user_id: &str, message: &str) -> Signal {
        let context = {
            let contexts = lock(&self.contexts);
            match contexts.get(user_id) {
                Some(c) => c.clone(),
                None => return Signal::Neutral,
            }
        };

        if context.responded_at.elapsed() > self.config.staleness() {
            return Signal::Neutral;
        }

        let lowered = message.to_lowercase();

        if SATISFACTION_PHRASES.iter().any(|p| lowered.contains(p)) {
            return Signal::Satisfied;
        }
        if DISSATISFACTION_PHRASES.iter().any(|p| lowered.contains(p)) {
            tracing::debug!(
                user_id,
                route = context.route.as_str(),
                "Dissatisfaction phrase in follow-up"
            );
            return Signal::Dissatisfied;
        }

        // Repeating the answer's own vocabulary back usually means the
        // answer missed and the user is rephrasing
        let shared = shared_long_words(message, &context.last_response, REPHRASE_MIN_WORD_LEN);
        if shared >= REPHRASE_SHARED_WORDS {
            tracing::debug!(
                user_id,
                route = context.route.as_str(),
                shared,
                "Follow-up rephrases the previous answer"
            );
            return Signal::Dissatisfied;
        }

        // A terse reply after a long answer reads as quiet acceptance
        if context.last_response.chars().count() > LONG_RESPONSE_CHARS
            && message.chars().count() < SHORT_ACK_CHARS
        {
            return Signal::Satisfied;
        }

        Signal::Neutral
    }

    /// Drop contexts idle beyond the cleanup horizon; returns how many
    pub fn cleanup(&self) -> usize {
        let idle = self.config.idle_cleanup();
        let mut contexts = lock(&self.contexts);
        let before = contexts.len();
        contexts.retain(|_, c| c.responded_at.elapsed() <= idle);
        let removed = before - contexts.len();
        if removed > 0 {
            tracing::debug!(removed, "Removed idle conversation contexts");
        }
        removed
    }

    pub fn active_contexts(&self) -> usize {
        lock(&self.contexts).len()
    }

    /// Periodic task running [`cleanup`](Self::cleanup) forever
    pub fn spawn_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let detector = Arc::clone(self);
        let interval = self.config.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                detector.cleanup();
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
