//! Prometheus metrics collection for chatroute
//!
//! Tracks classification outcomes, escalations to arbitration, cache lookup
//! results, dispatch failures, and feedback signals. Exposed via the
//! `/metrics` endpoint in Prometheus text format.
//!
//! Label values come from closed enums (`RouteId`, `Method`, ...) so
//! cardinality is bounded at compile time.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::classifier::{Method, RouteId};
use crate::error::{AppError, AppResult};
use crate::feedback::implicit::Signal;
use crate::feedback::Rating;

/// Cache lookup outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Hit,
    Miss,
}

impl LookupResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// Metrics registry and instruments
pub struct Metrics {
    registry: Registry,
    classifications: IntCounterVec,
    escalations: IntCounter,
    cache_lookups: IntCounterVec,
    dispatch_failures: IntCounterVec,
    feedback_ratings: IntCounterVec,
    implicit_signals: IntCounterVec,
    recurring_failures: IntCounter,
}

impl Metrics {
    /// Create a new metrics registry with all instruments registered
    pub fn new() -> AppResult<Self> {
        let registry = Registry::new();

        let classifications = IntCounterVec::new(
            Opts::new(
                "chatroute_classifications_total",
                "Messages classified, by resolved route and method",
            ),
            &["route", "method"],
        )
        .map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?;

        let escalations = IntCounter::new(
            "chatroute_escalations_total",
            "Low-confidence classifications escalated to arbitration",
        )
        .map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new(
                "chatroute_cache_lookups_total",
                "Response cache lookups, by result",
            ),
            &["result"],
        )
        .map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?;

        let dispatch_failures = IntCounterVec::new(
            Opts::new(
                "chatroute_dispatch_failures_total",
                "Generator dispatch failures (errors and timeouts), by route",
            ),
            &["route"],
        )
        .map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?;

        let feedback_ratings = IntCounterVec::new(
            Opts::new(
                "chatroute_feedback_ratings_total",
                "Explicit feedback ratings accepted, by rating",
            ),
            &["rating"],
        )
        .map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?;

        let implicit_signals = IntCounterVec::new(
            Opts::new(
                "chatroute_implicit_signals_total",
                "Implicit feedback signals inferred from follow-up messages",
            ),
            &["signal"],
        )
        .map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?;

        let recurring_failures = IntCounter::new(
            "chatroute_recurring_failures_total",
            "Recurring-dissatisfaction patterns detected in feedback history",
        )
        .map_err(|e| AppError::Internal(format!("metrics init: {}", e)))?;

        for collector in [
            Box::new(classifications.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(escalations.clone()),
            Box::new(cache_lookups.clone()),
            Box::new(dispatch_failures.clone()),
            Box::new(feedback_ratings.clone()),
            Box::new(implicit_signals.clone()),
            Box::new(recurring_failures.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| AppError::Internal(format!("metrics register: {}", e)))?;
        }

        Ok(Self {
            registry,
            classifications,
            escalations,
            cache_lookups,
            dispatch_failures,
            feedback_ratings,
            implicit_signals,
            recurring_failures,
        })
    }

    pub fn record_classification(&self, route: RouteId, method: Method) {
        self.classifications
            .with_label_values(&[route.as_str(), method.as_str()])
            .inc();
    }

    pub fn record_escalation(&self) {
        self.escalations.inc();
    }

    pub fn record_cache_lookup(&self, result: LookupResult) {
        self.cache_lookups
            .with_label_values(&[result.as_str()])
            .inc();
    }

    pub fn record_dispatch_failure(&self, route: RouteId) {
        self.dispatch_failures
            .with_label_values(&[route.as_str()])
            .inc();
    }

    pub fn record_feedback(&self, rating: Rating) {
        self.feedback_ratings
            .with_label_values(&[rating.as_str()])
            .inc();
    }

    pub fn record_implicit_signal(&self, signal: Signal) {
        self.implicit_signals
            .with_label_values(&[signal.as_str()])
            .inc();
    }

    pub fn record_recurring_failure(&self) {
        self.recurring_failures.inc();
    }

    /// Encode all metrics in Prometheus text exposition format
    pub fn encode(&self) -> AppResult<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::Internal(format!("metrics encode: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(format!("metrics utf8: {}", e)))
    }
}
