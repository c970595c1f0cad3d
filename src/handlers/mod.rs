//! HTTP request handlers for the chatroute API

use std::sync::Arc;

use crate::agents::{Arbiter, GeneratorSet};
use crate::cache::ResponseCache;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::AppResult;
use crate::feedback::implicit::ImplicitFeedbackDetector;
use crate::feedback::FeedbackCollector;
use crate::metrics::Metrics;
use crate::session::{MessagePipeline, SessionManager};

pub mod feedback;
pub mod health;
pub mod message;
pub mod metrics;
pub mod stats;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    cache: Arc<ResponseCache>,
    classifier: Arc<Classifier>,
    feedback: Arc<FeedbackCollector>,
    implicit: Arc<ImplicitFeedbackDetector>,
    metrics: Arc<Metrics>,
    sessions: Arc<SessionManager>,
}

impl AppState {
    /// Wire up every component from configuration
    ///
    /// Uses HTTP collaborators for generation and arbitration. Snapshots for
    /// the classifier and feedback history are NOT loaded here; call
    /// [`load_snapshots`](Self::load_snapshots) once at startup.
    pub fn new(config: Config) -> AppResult<Self> {
        let cache = Arc::new(ResponseCache::from_config(&config.cache)?);
        let classifier = Arc::new(Classifier::new(config.classifier.clone(), cache.clone()));
        let feedback = Arc::new(FeedbackCollector::new(
            config.feedback.clone(),
            cache.clone(),
        ));
        let implicit = Arc::new(ImplicitFeedbackDetector::new(config.implicit.clone()));
        let metrics = Arc::new(Metrics::new()?);

        let (generators, arbiter) =
            GeneratorSet::from_config(&config.agents, config.server.request_timeout())?;
        let arbiter: Arc<dyn Arbiter> = Arc::new(arbiter);

        Self::assemble(
            config, cache, classifier, feedback, implicit, metrics,
            Arc::new(generators), arbiter,
        )
    }

    /// Assembly seam: integration tests inject mock generators and arbiters
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        config: Config,
        cache: Arc<ResponseCache>,
        classifier: Arc<Classifier>,
        feedback: Arc<FeedbackCollector>,
        implicit: Arc<ImplicitFeedbackDetector>,
        metrics: Arc<Metrics>,
        generators: Arc<GeneratorSet>,
        arbiter: Arc<dyn Arbiter>,
    ) -> AppResult<Self> {
        let pipeline = Arc::new(MessagePipeline::new(
            config.clone(),
            cache.clone(),
            classifier.clone(),
            arbiter,
            generators,
            feedback.clone(),
            implicit.clone(),
            metrics.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(pipeline));

        Ok(Self {
            config: Arc::new(config),
            cache,
            classifier,
            feedback,
            implicit,
            metrics,
            sessions,
        })
    }

    /// Restore learned keywords and feedback history from their snapshots
    pub async fn load_snapshots(&self) {
        futures::future::join(self.classifier.load_snapshot(), self.feedback.load_snapshot())
            .await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn feedback(&self) -> &FeedbackCollector {
        &self.feedback
    }

    pub fn implicit(&self) -> &Arc<ImplicitFeedbackDetector> {
        &self.implicit
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }
}
