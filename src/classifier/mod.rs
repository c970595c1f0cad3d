//! Local text classifier with online learning
//!
//! Assigns each incoming message to a route by summing base-keyword matches
//! (+1 each) and learned-keyword weights, then tiers confidence from the
//! winning score and the keyword density. Low-confidence cases escalate to
//! an external arbitration call; disagreements between the local and
//! arbitrated decision feed back into the weighted pattern table.
//!
//! Classification never fails: malformed input scores zero everywhere and
//! falls back to the default route at low confidence.

pub mod keywords;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::ResponseCache;
use crate::config::ClassifierConfig;
use crate::text::{normalize, words};

/// Snapshot key for the learned-keyword table
pub const LEARNED_KEYWORDS_KEY: &str = "classifier:learned_keywords";

/// Minimum candidate word length for learned-keyword extraction
const MIN_KEYWORD_LEN: usize = 3;
/// Minimum bigram length for learned-keyword extraction
const MIN_BIGRAM_LEN: usize = 6;

/// Destination generator categories
///
/// Closed enumeration: listing-title help is answered by the knowledge
/// generator, so it has no variant of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteId {
    Conversation,
    Knowledge,
    MarketData,
}

impl RouteId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Knowledge => "knowledge",
            Self::MarketData => "market_data",
        }
    }

    /// All routes, scoring order: the default route first so ties favor it
    pub fn all() -> [RouteId; 3] {
        [Self::Conversation, Self::Knowledge, Self::MarketData]
    }

    /// The route assumed when nothing else matches
    pub fn default_route() -> Self {
        Self::Conversation
    }
}

/// Confidence tier of a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// How the final route was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Local keyword scoring only
    Local,
    /// External arbitration overrode or confirmed the local result
    Arbitrated,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Arbitrated => "arbitrated",
        }
    }
}

/// Result of classifying one message. Ephemeral; not persisted beyond logging.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub route: RouteId,
    pub confidence: Confidence,
    pub matched_keywords: Vec<String>,
    pub method: Method,
}

/// A dynamically learned keyword→route association
///
/// The keyword is the identity key: it maps to at most one route at a time.
/// Weight grows on reinforcement, shrinks on conflicting evidence, and the
/// pattern is deleted once weight reaches zero or below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPattern {
    pub keyword: String,
    pub route: RouteId,
    pub weight: f64,
    pub occurrences: u32,
    pub last_seen_ms: u64,
}

/// Aggregate classifier statistics for the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierStats {
    pub base_keywords: usize,
    pub learned_keywords: usize,
    pub learned_by_route: HashMap<&'static str, usize>,
    pub top_learned: Vec<KeywordPattern>,
}

/// The classifier: static base tables plus a mutable learned table
pub struct Classifier {
    config: ClassifierConfig,
    learned: Mutex<HashMap<String, KeywordPattern>>,
    snapshots: Arc<ResponseCache>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig, snapshots: Arc<ResponseCache>) -> Self {
        Self {
            config,
            learned: Mutex::new(HashMap::new()),
            snapshots,
        }
    }

    /// Reload the learned-keyword table from its snapshot
    ///
    /// A missing snapshot is a cold start, not an error.
    pub async fn load_snapshot(&self) {
        let Some(patterns) = self
            .snapshots
            .get_json::<Vec<KeywordPattern>>(LEARNED_KEYWORDS_KEY)
            .await
        else {
            tracing::info!("No learned-keyword snapshot, starting cold");
            return;
        };
        let count = patterns.len();
        let mut learned = self.lock_learned();
        *learned = patterns
            .into_iter()
            .map(|p| (p.keyword.clone(), p))
            .collect();
        drop(learned);
        tracing::info!(count, "Loaded learned keywords from snapshot");
    }

    /// Classify a message into a route with a confidence tier
    pub fn classify(&self, message: &str) -> Classification {
        let normalized = normalize(message);

        // Trivial short-circuit: slash-commands, very short messages, and
        // bare greetings are conversational without scoring
        if self.is_trivial(message, &normalized) {
            return Classification {
                route: RouteId::default_route(),
                confidence: Confidence::High,
                matched_keywords: Vec::new(),
                method: Method::Local,
            };
        }

        let (route, score, matched) = self.score(&normalized);
        let word_count = words(&normalized).len();
        let confidence = Self::confidence(score, matched.len(), word_count);

        Classification {
            route,
            confidence,
            matched_keywords: matched,
            method: Method::Local,
        }
    }

    /// Whether a local classification should be settled by arbitration
    ///
    /// High confidence never escalates. Short messages never escalate (they
    /// are conversational by default). Long low-confidence messages and
    /// medium-confidence messages past the medium cutoff do.
    pub fn should_escalate(&self, message: &str, classification: &Classification) -> bool {
        if classification.confidence == Confidence::High {
            return false;
        }

        let len = message.chars().count();
        if len < self.config.no_escalation_under_chars {
            return false;
        }
        if len > self.config.escalate_low_over_chars
            && classification.confidence == Confidence::Low
        {
            return true;
        }
        if classification.confidence == Confidence::Medium
            && len > self.config.escalate_medium_over_chars
        {
            return true;
        }

        false
    }

    /// Adjust the learned table from an arbitration outcome
    ///
    /// No-op when the arbitrated and local routes agree. Otherwise each
    /// extracted candidate keyword is created for the arbitrated route at
    /// the learning-rate weight, reinforced if it already maps there, or
    /// weakened (and deleted at weight ≤ 0) if it maps elsewhere - a keyword
    /// never owns two conflicting routes at once. The full table is
    /// persisted after every learning event.
    pub async fn learn_from_arbitration(
        &self,
        message: &str,
        arbitrated: RouteId,
        local: RouteId,
    ) {
        if arbitrated == local {
            return;
        }

        let preview: String = message.chars().take(50).collect();
        tracing::info!(
            message = %preview,
            arbitrated = arbitrated.as_str(),
            local = local.as_str(),
            "Learning from arbitration disagreement"
        );

        let candidates = self.extract_candidates(message);
        let now = now_ms();

        {
            let mut learned = self.lock_learned();
            for candidate in candidates {
                if Self::is_base_keyword(&candidate) {
                    continue;
                }

                match learned.get_mut(&candidate) {
                    Some(pattern) if pattern.route == arbitrated => {
                        pattern.weight += self.config.learning_rate;
                        pattern.occurrences += 1;
                        pattern.last_seen_ms = now;
                    }
                    Some(pattern) => {
                        // Conflicting evidence: the keyword currently maps to
                        // a different route
                        pattern.weight -= self.config.learning_rate;
                        pattern.last_seen_ms = now;
                        if pattern.weight <= 0.0 {
                            learned.remove(&candidate);
                        }
                    }
                    None => {
                        learned.insert(
                            candidate.clone(),
                            KeywordPattern {
                                keyword: candidate,
                                route: arbitrated,
                                weight: self.config.learning_rate,
                                occurrences: 1,
                                last_seen_ms: now,
                            },
                        );
                    }
                }
            }
        }

        self.save_snapshot().await;
    }

    /// Current learned/base table statistics
    pub fn stats(&self) -> ClassifierStats {
        let learned = self.lock_learned();

        let mut learned_by_route: HashMap<&'static str, usize> =
            RouteId::all().iter().map(|r| (r.as_str(), 0)).collect();
        for pattern in learned.values() {
            *learned_by_route.entry(pattern.route.as_str()).or_insert(0) += 1;
        }

        let mut top_learned: Vec<KeywordPattern> = learned.values().cloned().collect();
        top_learned.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top_learned.truncate(10);

        ClassifierStats {
            base_keywords: Self::base_keyword_count(),
            learned_keywords: learned.len(),
            learned_by_route,
            top_learned,
        }
    }

    /// Learned weight currently assigned to a keyword for a route, if any.
    /// Test seam; scoring goes through `classify`.
    pub fn learned_weight(&self, keyword: &str, route: RouteId) -> Option<f64> {
        let learned = self.lock_learned();
        learned
            .get(keyword)
            .filter(|p| p.route == route)
            .map(|p| p.weight)
    }

    fn is_trivial(&self, raw: &str, normalized: &str) -> bool {
        if raw.trim_start().starts_with('/') {
            return true;
        }
        if normalized.chars().count() < self.config.trivial_max_chars {
            return true;
        }
        keywords::GREETINGS.contains(&normalized)
    }

    /// Sum base (+1 each) and learned (weighted) keyword matches per route,
    /// returning the winner, its score, and its matched keywords. Ties keep
    /// the earlier route in scoring order, so the default route wins overall
    /// ties and no route beats another without a strictly higher score.
    fn score(&self, normalized: &str) -> (RouteId, f64, Vec<String>) {
        let mut scores: HashMap<RouteId, (f64, Vec<String>)> = RouteId::all()
            .iter()
            .map(|r| (*r, (0.0, Vec::new())))
            .collect();

        for (route, table) in Self::base_tables() {
            let entry = scores.get_mut(&route).expect("route pre-seeded");
            for keyword in table {
                if normalized.contains(keyword) {
                    entry.0 += 1.0;
                    entry.1.push((*keyword).to_string());
                }
            }
        }

        {
            let learned = self.lock_learned();
            for (keyword, pattern) in learned.iter() {
                if normalized.contains(keyword.as_str()) {
                    let entry = scores.get_mut(&pattern.route).expect("route pre-seeded");
                    entry.0 += pattern.weight;
                    entry.1.push(keyword.clone());
                }
            }
        }

        let mut best = RouteId::default_route();
        let mut best_score = scores[&best].0;
        for route in RouteId::all() {
            let score = scores[&route].0;
            if score > best_score {
                best = route;
                best_score = score;
            }
        }

        let matched = scores.remove(&best).map(|(_, kws)| kws).unwrap_or_default();
        (best, best_score, matched)
    }

    fn confidence(score: f64, matched: usize, word_count: usize) -> Confidence {
        let ratio = matched as f64 / word_count.max(1) as f64;
        if score >= 3.0 && ratio > 0.3 {
            Confidence::High
        } else if score >= 2.0 && ratio > 0.15 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    /// Candidate keywords for learning: normalized words of length ≥ 3 that
    /// are not stopwords, plus adjacent-word bigrams of length ≥ 6
    fn extract_candidates(&self, message: &str) -> Vec<String> {
        let normalized = normalize(message);
        let tokens = words(&normalized);

        let mut candidates: Vec<String> = tokens
            .iter()
            .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
            .filter(|w| !keywords::STOPWORDS.contains(w))
            .map(|w| w.to_string())
            .collect();

        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            if bigram.chars().count() >= MIN_BIGRAM_LEN {
                candidates.push(bigram);
            }
        }

        candidates
    }

    fn base_tables() -> [(RouteId, &'static [&'static str]); 3] {
        [
            (RouteId::Conversation, keywords::CONVERSATION_KEYWORDS),
            (RouteId::Knowledge, keywords::KNOWLEDGE_KEYWORDS),
            (RouteId::MarketData, keywords::MARKET_DATA_KEYWORDS),
        ]
    }

    fn is_base_keyword(keyword: &str) -> bool {
        Self::base_tables()
            .iter()
            .any(|(_, table)| table.contains(&keyword))
    }

    fn base_keyword_count() -> usize {
        Self::base_tables().iter().map(|(_, t)| t.len()).sum()
    }

    async fn save_snapshot(&self) {
        let patterns: Vec<KeywordPattern> = {
            let learned = self.lock_learned();
            learned.values().cloned().collect()
        };
        let count = patterns.len();
        self.snapshots.set_json(LEARNED_KEYWORDS_KEY, &patterns).await;
        tracing::debug!(count, "Persisted learned keywords");
    }

    fn lock_learned(&self) -> MutexGuard<'_, HashMap<String, KeywordPattern>> {
        // Poisoning only happens if a holder panicked; the table is still
        // structurally sound, so keep serving
        match self.learned.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, ResponseCache};
    use std::time::Duration;

    fn classifier() -> Classifier {
        let snapshots = Arc::new(ResponseCache::new(
            Box::new(MemoryStore::new()),
            Duration::from_secs(300),
        ));
        Classifier::new(ClassifierConfig::default(), snapshots)
    }

    #[test]
    fn test_market_data_message_classifies_high() {
        let c = classifier();
        let result = c.classify("Cuánto vale un depto en Palermo?");
        assert_eq!(result.route, RouteId::MarketData);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.method, Method::Local);
        assert!(result.matched_keywords.contains(&"cuanto vale".to_string()));
        assert!(result.matched_keywords.contains(&"depto".to_string()));
        assert!(result.matched_keywords.contains(&"palermo".to_string()));
        assert!(!c.should_escalate("Cuánto vale un depto en Palermo?", &result));
    }

    #[test]
    fn test_bare_greeting_is_trivial_conversation() {
        let c = classifier();
        let result = c.classify("Hola");
        assert_eq!(result.route, RouteId::Conversation);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.matched_keywords.is_empty());
    }

    #[test]
    fn test_slash_command_is_trivial() {
        let c = classifier();
        let result = c.classify("/reset al estado inicial por favor");
        assert_eq!(result.route, RouteId::Conversation);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_very_short_message_is_trivial() {
        let c = classifier();
        let result = c.classify("ok");
        assert_eq!(result.route, RouteId::Conversation);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_empty_message_falls_back_to_conversation() {
        let c = classifier();
        let result = c.classify("");
        assert_eq!(result.route, RouteId::Conversation);
    }

    #[test]
    fn test_zero_match_long_message_is_low_confidence() {
        let c = classifier();
        let message = "x".repeat(150);
        let result = c.classify(&message);
        assert_eq!(result.route, RouteId::Conversation);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(c.should_escalate(&message, &result));
    }

    #[test]
    fn test_short_zero_match_does_not_escalate() {
        let c = classifier();
        // Long enough to dodge the trivial short-circuit, short enough to
        // stay under the escalation floor
        let message = "qwzxyqwzxy";
        let result = c.classify(message);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(!c.should_escalate(message, &result));
    }

    #[test]
    fn test_high_confidence_never_escalates() {
        let c = classifier();
        let message =
            "Cuánto vale un depto en Palermo? Me interesa el precio del m2 y la tendencia";
        let result = c.classify(message);
        if result.confidence == Confidence::High {
            assert!(!c.should_escalate(message, &result));
        }
    }

    #[test]
    fn test_medium_confidence_long_message_escalates() {
        let c = classifier();
        let classification = Classification {
            route: RouteId::Knowledge,
            confidence: Confidence::Medium,
            matched_keywords: vec!["comision".to_string()],
            method: Method::Local,
        };
        let long = "a".repeat(60);
        let short = "a".repeat(40);
        assert!(c.should_escalate(&long, &classification));
        assert!(!c.should_escalate(&short, &classification));
    }

    #[test]
    fn test_tie_favors_conversation() {
        let c = classifier();
        // "gracias" (conversation) vs "precio" (market_data): one point each
        let result = c.classify("gracias precio");
        assert_eq!(result.route, RouteId::Conversation);
    }

    #[tokio::test]
    async fn test_learning_noop_when_routes_agree() {
        let c = classifier();
        c.learn_from_arbitration(
            "el credito hipotecario uva",
            RouteId::Knowledge,
            RouteId::Knowledge,
        )
        .await;
        assert_eq!(c.stats().learned_keywords, 0);
    }

    #[tokio::test]
    async fn test_learning_creates_patterns_on_disagreement() {
        let c = classifier();
        c.learn_from_arbitration(
            "informacion sobre credito hipotecario",
            RouteId::Knowledge,
            RouteId::Conversation,
        )
        .await;

        assert_eq!(
            c.learned_weight("credito", RouteId::Knowledge),
            Some(ClassifierConfig::default().learning_rate)
        );
        assert_eq!(
            c.learned_weight("hipotecario", RouteId::Knowledge),
            Some(ClassifierConfig::default().learning_rate)
        );
        // Stopword-free words only
        assert_eq!(c.learned_weight("sobre", RouteId::Knowledge), Some(0.1));
    }

    #[tokio::test]
    async fn test_learning_skips_base_keywords() {
        let c = classifier();
        c.learn_from_arbitration(
            "precio del credito",
            RouteId::MarketData,
            RouteId::Conversation,
        )
        .await;
        // "precio" is a base keyword; only novel words are learned
        assert_eq!(c.learned_weight("precio", RouteId::MarketData), None);
        assert!(c.learned_weight("credito", RouteId::MarketData).is_some());
    }

    #[tokio::test]
    async fn test_learning_reinforces_same_route() {
        let c = classifier();
        for _ in 0..3 {
            c.learn_from_arbitration("credito", RouteId::Knowledge, RouteId::Conversation)
                .await;
        }
        let weight = c
            .learned_weight("credito", RouteId::Knowledge)
            .expect("pattern exists");
        assert!((weight - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_learning_conflict_decays_and_deletes() {
        let c = classifier();
        // Learn "credito" for Knowledge once (weight 0.1)
        c.learn_from_arbitration("credito", RouteId::Knowledge, RouteId::Conversation)
            .await;
        assert!(c.learned_weight("credito", RouteId::Knowledge).is_some());

        // Conflicting evidence assigns it to MarketData; weight drops to 0
        // and the pattern is deleted outright
        c.learn_from_arbitration("credito", RouteId::MarketData, RouteId::Conversation)
            .await;
        assert_eq!(c.learned_weight("credito", RouteId::Knowledge), None);
        assert_eq!(c.learned_weight("credito", RouteId::MarketData), None);
        assert_eq!(c.stats().learned_keywords, 0);
    }

    #[tokio::test]
    async fn test_learned_keyword_influences_scoring() {
        let c = classifier();
        // Push the weight high enough to beat zero base matches
        for _ in 0..25 {
            c.learn_from_arbitration(
                "expensas del consorcio",
                RouteId::MarketData,
                RouteId::Conversation,
            )
            .await;
        }
        let result = c.classify("que pasa con expensas del consorcio este mes");
        assert_eq!(result.route, RouteId::MarketData);
        assert!(result.matched_keywords.iter().any(|k| k == "expensas"));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let snapshots = Arc::new(ResponseCache::new(
            Box::new(MemoryStore::new()),
            Duration::from_secs(300),
        ));
        let c = Classifier::new(ClassifierConfig::default(), snapshots.clone());
        c.learn_from_arbitration("credito hipotecario", RouteId::Knowledge, RouteId::Conversation)
            .await;
        let learned_before = c.stats().learned_keywords;
        assert!(learned_before > 0);

        // A fresh classifier over the same store reloads the table
        let reloaded = Classifier::new(ClassifierConfig::default(), snapshots);
        reloaded.load_snapshot().await;
        assert_eq!(reloaded.stats().learned_keywords, learned_before);
        assert!(
            reloaded
                .learned_weight("hipotecario", RouteId::Knowledge)
                .is_some()
        );
    }

    #[test]
    fn test_stats_shape() {
        let c = classifier();
        let stats = c.stats();
        assert!(stats.base_keywords > 100);
        assert_eq!(stats.learned_keywords, 0);
        assert_eq!(stats.learned_by_route.len(), 3);
        assert!(stats.top_learned.is_empty());
    }
}
