//! Shared fixtures for integration tests
//!
//! Mocks cover the two external seams (generators and the arbiter) so tests
//! are hermetic; everything else is the real wiring.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use tower::ServiceExt;

use chatroute::agents::{Arbiter, Generator, GeneratorSet};
use chatroute::cache::ResponseCache;
use chatroute::classifier::{Classifier, RouteId};
use chatroute::config::Config;
use chatroute::error::{AppError, AppResult};
use chatroute::feedback::implicit::ImplicitFeedbackDetector;
use chatroute::feedback::FeedbackCollector;
use chatroute::handlers::{self, AppState};
use chatroute::metrics::Metrics;

/// Generator that counts invocations and answers with a route-tagged echo
pub struct CountingGenerator {
    label: &'static str,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
    fail: bool,
}

impl CountingGenerator {
    pub fn new(label: &'static str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                label,
                calls: calls.clone(),
                delay: None,
                fail: false,
            },
            calls,
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn respond(&self, _user_id: &str, message: &str) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AppError::Dispatch {
                route: self.label.to_string(),
                reason: "mock generator failure".to_string(),
            });
        }
        Ok(format!("[{}] {}", self.label, message))
    }
}

/// Arbiter with a fixed verdict and a call counter
pub struct StaticArbiter {
    route: RouteId,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl StaticArbiter {
    pub fn new(route: RouteId) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                route,
                calls: calls.clone(),
                fail: false,
            },
            calls,
        )
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl Arbiter for StaticArbiter {
    async fn decide(&self, _message: &str) -> AppResult<RouteId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Arbitration("mock arbiter offline".to_string()));
        }
        Ok(self.route)
    }
}

/// Configuration with placeholder collaborator URLs (never contacted; all
/// external calls go through the mocks)
pub fn test_config() -> Config {
    Config::template()
}

/// Assemble real state around mock generators and arbiter
pub fn build_state(
    config: Config,
    generators: GeneratorSet,
    arbiter: Arc<dyn Arbiter>,
) -> AppState {
    let cache = Arc::new(ResponseCache::from_config(&config.cache).expect("memory cache"));
    let classifier = Arc::new(Classifier::new(config.classifier.clone(), cache.clone()));
    let feedback = Arc::new(FeedbackCollector::new(
        config.feedback.clone(),
        cache.clone(),
    ));
    let implicit = Arc::new(ImplicitFeedbackDetector::new(config.implicit.clone()));
    let metrics = Arc::new(Metrics::new().expect("metrics"));

    AppState::assemble(
        config,
        cache,
        classifier,
        feedback,
        implicit,
        metrics,
        Arc::new(generators),
        arbiter,
    )
    .expect("state assembles")
}

/// State with simple echo generators and a knowledge-voting arbiter
pub fn default_state() -> AppState {
    let (conversation, _) = CountingGenerator::new("conversation");
    let (knowledge, _) = CountingGenerator::new("knowledge");
    let (market_data, _) = CountingGenerator::new("market_data");
    let (arbiter, _) = StaticArbiter::new(RouteId::Knowledge);
    build_state(
        test_config(),
        GeneratorSet::new(
            Box::new(conversation),
            Box::new(knowledge),
            Box::new(market_data),
        ),
        Arc::new(arbiter),
    )
}

/// The production route table over the given state
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/message", post(handlers::message::handler))
        .route("/feedback", post(handlers::feedback::handler))
        .route("/stats", get(handlers::stats::handler))
        .route("/metrics", get(handlers::metrics::handler))
        .route("/health", get(handlers::health::handler))
        .with_state(state)
}

/// POST a JSON body and return (status, parsed body)
pub async fn post_json(
    app: &Router,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("app responds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

/// GET a path and return (status, raw body)
pub async fn get_text(app: &Router, path: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("app responds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// Convenience: send one user message, expect 200, return the response text
pub async fn send_message(app: &Router, user_id: &str, message: &str) -> String {
    let (status, body) = post_json(
        app,
        "/message",
        serde_json::json!({ "user_id": user_id, "message": message }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected status, body: {}", body);
    body["response"]
        .as_str()
        .expect("response field present")
        .to_string()
}
