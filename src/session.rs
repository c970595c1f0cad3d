//! Per-user message serialization and the end-to-end pipeline
//!
//! Messages from one user are processed strictly in arrival order: each user
//! has a queue and at most one drain task at a time. Different users never
//! wait on each other. The pipeline behind the queue runs the full path for
//! a single message - implicit-feedback analysis, cache lookup, keyword
//! classification, optional arbitration, generator dispatch, and bookkeeping
//! of the served response.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::agents::{Arbiter, GeneratorSet};
use crate::cache::ResponseCache;
use crate::classifier::{Classifier, Method, RouteId};
use crate::config::Config;
use crate::feedback::implicit::{ImplicitFeedbackDetector, Signal};
use crate::feedback::FeedbackCollector;
use crate::metrics::{LookupResult, Metrics};

/// Served when a generator fails or times out; never cached
const FALLBACK_RESPONSE: &str =
    "Disculpá, estoy teniendo un problema técnico. ¿Podés intentar de nuevo en unos minutos?";

/// Served for an effectively empty message
const EMPTY_MESSAGE_RESPONSE: &str = "¿En qué puedo ayudarte?";

/// Processes one message end to end. Seam for tests that exercise queue
/// ordering without the real pipeline.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, user_id: &str, message: &str) -> String;
}

struct QueuedMessage {
    message: String,
    reply: oneshot::Sender<String>,
}

#[derive(Default)]
struct UserSession {
    queue: VecDeque<QueuedMessage>,
    draining: bool,
}

/// Serializes message processing per user
pub struct SessionManager {
    processor: Arc<dyn MessageProcessor>,
    sessions: Mutex<HashMap<String, UserSession>>,
}

impl SessionManager {
    pub fn new(processor: Arc<dyn MessageProcessor>) -> Self {
        Self {
            processor,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue a message and return the channel its response will arrive on
    ///
    /// Starts a drain task for the user unless one is already running; the
    /// running drainer picks up whatever is queued, so no message is left
    /// behind.
    pub fn submit(self: &Arc<Self>, user_id: &str, message: &str) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let queued = QueuedMessage {
            message: message.to_string(),
            reply: tx,
        };

        let spawn_drain = {
            let mut sessions = lock(&self.sessions);
            let session = sessions.entry(user_id.to_string()).or_default();
            session.queue.push_back(queued);
            if session.draining {
                false
            } else {
                session.draining = true;
                true
            }
        };

        if spawn_drain {
            let manager = Arc::clone(self);
            let user = user_id.to_string();
            tokio::spawn(async move {
                manager.drain(&user).await;
            });
        }

        rx
    }

    /// Process the user's queue to exhaustion, then retire the session
    async fn drain(&self, user_id: &str) {
        loop {
            let next = {
                let mut sessions = lock(&self.sessions);
                let Some(session) = sessions.get_mut(user_id) else {
                    debug_assert!(false, "drain running without a session");
                    tracing::warn!(user_id, "Drain task found no session, stopping");
                    return;
                };
                match session.queue.pop_front() {
                    Some(item) => Some(item),
                    None => {
                        // Queue exhausted; retire the session so the next
                        // message starts a fresh drainer
                        sessions.remove(user_id);
                        None
                    }
                }
            };

            let Some(QueuedMessage { message, reply }) = next else {
                return;
            };

            let response = self.processor.process(user_id, &message).await;
            // The submitter may have hung up; that only affects them
            let _ = reply.send(response);
        }
    }

    /// Users with a live session right now
    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Messages queued across all users, not counting ones being processed
    pub fn queued_messages(&self) -> usize {
        lock(&self.sessions).values().map(|s| s.queue.len()).sum()
    }
}

/// The full processing path for one message
pub struct MessagePipeline {
    config: Config,
    cache: Arc<ResponseCache>,
    classifier: Arc<Classifier>,
    arbiter: Arc<dyn Arbiter>,
    generators: Arc<GeneratorSet>,
    feedback: Arc<FeedbackCollector>,
    implicit: Arc<ImplicitFeedbackDetector>,
    metrics: Arc<Metrics>,
}

impl MessagePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        cache: Arc<ResponseCache>,
        classifier: Arc<Classifier>,
        arbiter: Arc<dyn Arbiter>,
        generators: Arc<GeneratorSet>,
        feedback: Arc<FeedbackCollector>,
        implicit: Arc<ImplicitFeedbackDetector>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            cache,
            classifier,
            arbiter,
            generators,
            feedback,
            implicit,
            metrics,
        }
    }

    async fn handle(&self, user_id: &str, message: &str) -> String {
        if message.trim().is_empty() {
            return EMPTY_MESSAGE_RESPONSE.to_string();
        }

        // React to the previous exchange before this message changes context
        let signal = self.implicit.analyze_user_response(user_id, message);
        self.metrics.record_implicit_signal(signal);
        if signal == Signal::Dissatisfied {
            tracing::warn!(user_id, "Implicit dissatisfaction with previous response");
        }

        if let Some(cached) = self.cache.get_response(user_id, message).await {
            self.metrics.record_cache_lookup(LookupResult::Hit);
            tracing::debug!(user_id, "Serving cached response");
            // No dispatch happened, so re-derive a route for attribution;
            // classification is pure and cheap
            let route = self.classifier.classify(message).route;
            self.register_served(user_id, message, &cached, route, 0);
            return cached;
        }
        self.metrics.record_cache_lookup(LookupResult::Miss);

        let mut classification = self.classifier.classify(message);
        if self.classifier.should_escalate(message, &classification) {
            self.metrics.record_escalation();
            match self.arbiter.decide(message).await {
                Ok(arbitrated) => {
                    self.classifier
                        .learn_from_arbitration(message, arbitrated, classification.route)
                        .await;
                    classification.route = arbitrated;
                    classification.method = Method::Arbitrated;
                }
                Err(e) => {
                    // Arbitration is advisory; the local result stands
                    tracing::warn!(
                        user_id,
                        route = classification.route.as_str(),
                        error = %e,
                        "Arbitration failed, keeping local route"
                    );
                }
            }
        }
        self.metrics
            .record_classification(classification.route, classification.method);
        tracing::info!(
            user_id,
            route = classification.route.as_str(),
            confidence = classification.confidence.as_str(),
            method = classification.method.as_str(),
            "Message classified"
        );

        let started = Instant::now();
        let response = self.dispatch(user_id, message, classification.route).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match response {
            Some(text) => {
                self.cache.set_response(user_id, message, &text).await;
                self.register_served(user_id, message, &text, classification.route, elapsed_ms);
                text
            }
            None => {
                // The fallback is not the answer to this message, so it is
                // neither cached nor registered for feedback
                self.metrics.record_dispatch_failure(classification.route);
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    async fn dispatch(&self, user_id: &str, message: &str, route: RouteId) -> Option<String> {
        let generator = self.generators.for_route(route);
        let timeout = self.config.server.request_timeout();
        match tokio::time::timeout(timeout, generator.respond(user_id, message)).await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                tracing::error!(user_id, route = route.as_str(), error = %e, "Dispatch failed");
                None
            }
            Err(_) => {
                tracing::error!(
                    user_id,
                    route = route.as_str(),
                    timeout_seconds = self.config.server.request_timeout_seconds,
                    "Dispatch timed out"
                );
                None
            }
        }
    }

    /// Book-keeping for a response the user actually received, attributed
    /// to the route that produced it
    fn register_served(
        &self,
        user_id: &str,
        message: &str,
        response: &str,
        route: RouteId,
        elapsed_ms: u64,
    ) {
        self.feedback
            .register_response(user_id, message, response, route, elapsed_ms);
        self.implicit.register_bot_response(user_id, response, route);
    }
}

#[async_trait]
impl MessageProcessor for MessagePipeline {
    async fn process(&self, user_id: &str, message: &str) -> String {
        self.handle(user_id, message).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records processing order and simulates slow work
    struct SlowProcessor {
        delay: Duration,
        log: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowProcessor {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                log: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn log(&self) -> Vec<String> {
            lock(&self.log).clone()
        }
    }

    #[async_trait]
    impl MessageProcessor for SlowProcessor {
        async fn process(&self, user_id: &str, message: &str) -> String {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            lock(&self.log).push(format!("{}:{}", user_id, message));
            format!("re: {}", message)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_user_processed_in_order() {
        let processor = SlowProcessor::new(Duration::from_millis(100));
        let manager = Arc::new(SessionManager::new(processor.clone()));

        let r1 = manager.submit("user-1", "m1");
        let r2 = manager.submit("user-1", "m2");
        let r3 = manager.submit("user-1", "m3");

        assert_eq!(r1.await.expect("reply"), "re: m1");
        assert_eq!(r2.await.expect("reply"), "re: m2");
        assert_eq!(r3.await.expect("reply"), "re: m3");
        assert_eq!(processor.log(), vec!["user-1:m1", "user-1:m2", "user-1:m3"]);
        // Never two messages of the same (sole) user at once
        assert_eq!(processor.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_do_not_block_each_other() {
        let processor = SlowProcessor::new(Duration::from_secs(5));
        let manager = Arc::new(SessionManager::new(processor.clone()));

        let _slow = manager.submit("user-a", "slow");
        let rb = manager.submit("user-b", "quick");

        // user-b completes within one processing delay even though user-a
        // is still busy; concurrency reached 2
        let response = tokio::time::timeout(Duration::from_secs(6), rb)
            .await
            .expect("user-b not starved")
            .expect("reply");
        assert_eq!(response, "re: quick");
        assert_eq!(processor.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_retires_after_drain() {
        let processor = SlowProcessor::new(Duration::from_millis(10));
        let manager = Arc::new(SessionManager::new(processor));

        let r1 = manager.submit("user-1", "m1");
        assert_eq!(manager.active_sessions(), 1);
        r1.await.expect("response delivered");

        // Drainer removes the session once the queue is empty
        tokio::task::yield_now().await;
        assert_eq!(manager.active_sessions(), 0);
        assert_eq!(manager.queued_messages(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_queued_mid_drain_are_picked_up() {
        let processor = SlowProcessor::new(Duration::from_millis(50));
        let manager = Arc::new(SessionManager::new(processor.clone()));

        let r1 = manager.submit("user-1", "m1");
        tokio::time::advance(Duration::from_millis(10)).await;
        // Arrives while the drainer is mid-message; no new task spawns but
        // the existing one must still process it
        let r2 = manager.submit("user-1", "m2");

        assert_eq!(r1.await.expect("reply"), "re: m1");
        assert_eq!(r2.await.expect("reply"), "re: m2");
        assert_eq!(processor.log(), vec!["user-1:m1", "user-1:m2"]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_stall_queue() {
        let processor = SlowProcessor::new(Duration::from_millis(1));
        let manager = Arc::new(SessionManager::new(processor.clone()));

        drop(manager.submit("user-1", "m1"));
        let r2 = manager.submit("user-1", "m2");
        assert_eq!(r2.await.expect("reply"), "re: m2");
    }
}
