//! External collaborator clients
//!
//! The pipeline talks to two kinds of collaborators over plain
//! request/response HTTP: one generator per route (free text in, free text
//! out) and an arbiter that settles ambiguous classifications. Both sit
//! behind traits so tests inject deterministic fakes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classifier::RouteId;
use crate::config::AgentsConfig;
use crate::error::{AppError, AppResult};

/// A response generator for one route
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a final text response for the user's message
    async fn respond(&self, user_id: &str, message: &str) -> AppResult<String>;
}

/// The arbitration collaborator: decides a route for an ambiguous message
#[async_trait]
pub trait Arbiter: Send + Sync {
    async fn decide(&self, message: &str) -> AppResult<RouteId>;
}

/// Extract a route token from a free-text arbitration answer
///
/// Case-insensitive substring search for each known route name; when several
/// appear, the leftmost wins. Returns `None` when no token is recognized -
/// the caller decides the default explicitly rather than burying it here.
pub fn parse_route_token(text: &str) -> Option<RouteId> {
    let lowered = text.to_lowercase();

    let candidates = [
        (lowered.find("conversation"), RouteId::Conversation),
        (lowered.find("knowledge"), RouteId::Knowledge),
        // Accept both the wire form and prose
        (
            lowered
                .find("market_data")
                .or_else(|| lowered.find("market data")),
            RouteId::MarketData,
        ),
    ];

    candidates
        .into_iter()
        .filter_map(|(pos, route)| pos.map(|p| (p, route)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, route)| route)
}

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    user_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    text: String,
}

/// HTTP-backed generator client
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    route: RouteId,
}

impl HttpGenerator {
    pub fn new(client: reqwest::Client, url: impl Into<String>, route: RouteId) -> Self {
        Self {
            client,
            url: url.into(),
            route,
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn respond(&self, user_id: &str, message: &str) -> AppResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&AgentRequest { user_id, message })
            .send()
            .await
            .map_err(|e| AppError::Dispatch {
                route: self.route.as_str().to_string(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| AppError::Dispatch {
                route: self.route.as_str().to_string(),
                reason: e.to_string(),
            })?;

        let body: AgentResponse = response.json().await.map_err(|e| AppError::Dispatch {
            route: self.route.as_str().to_string(),
            reason: format!("malformed response body: {}", e),
        })?;

        Ok(body.text)
    }
}

/// HTTP-backed arbiter client
pub struct HttpArbiter {
    client: reqwest::Client,
    url: String,
}

impl HttpArbiter {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Arbiter for HttpArbiter {
    async fn decide(&self, message: &str) -> AppResult<RouteId> {
        let response = self
            .client
            .post(&self.url)
            .json(&AgentRequest {
                user_id: "",
                message,
            })
            .send()
            .await
            .map_err(|e| AppError::Arbitration(e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::Arbitration(e.to_string()))?;

        let body: AgentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Arbitration(format!("malformed response body: {}", e)))?;

        match parse_route_token(&body.text) {
            Some(route) => Ok(route),
            None => {
                // Permissive parse found nothing recognizable; the default
                // route is an explicit decision, not a silent fallback
                tracing::warn!(
                    answer = %body.text.chars().take(100).collect::<String>(),
                    "Arbiter answer contained no recognizable route token, defaulting to conversation"
                );
                Ok(RouteId::default_route())
            }
        }
    }
}

/// The three generators keyed by route
pub struct GeneratorSet {
    conversation: Box<dyn Generator>,
    knowledge: Box<dyn Generator>,
    market_data: Box<dyn Generator>,
}

impl GeneratorSet {
    pub fn new(
        conversation: Box<dyn Generator>,
        knowledge: Box<dyn Generator>,
        market_data: Box<dyn Generator>,
    ) -> Self {
        Self {
            conversation,
            knowledge,
            market_data,
        }
    }

    /// Build HTTP generators and arbiter from configuration
    pub fn from_config(config: &AgentsConfig, timeout: Duration) -> AppResult<(Self, HttpArbiter)> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;

        let set = Self::new(
            Box::new(HttpGenerator::new(
                client.clone(),
                &config.conversation_url,
                RouteId::Conversation,
            )),
            Box::new(HttpGenerator::new(
                client.clone(),
                &config.knowledge_url,
                RouteId::Knowledge,
            )),
            Box::new(HttpGenerator::new(
                client.clone(),
                &config.market_data_url,
                RouteId::MarketData,
            )),
        );
        let arbiter = HttpArbiter::new(client, &config.arbiter_url);
        Ok((set, arbiter))
    }

    pub fn for_route(&self, route: RouteId) -> &dyn Generator {
        match route {
            RouteId::Conversation => self.conversation.as_ref(),
            RouteId::Knowledge => self.knowledge.as_ref(),
            RouteId::MarketData => self.market_data.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exact_tokens() {
        assert_eq!(parse_route_token("conversation"), Some(RouteId::Conversation));
        assert_eq!(parse_route_token("knowledge"), Some(RouteId::Knowledge));
        assert_eq!(parse_route_token("market_data"), Some(RouteId::MarketData));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(parse_route_token("KNOWLEDGE"), Some(RouteId::Knowledge));
        assert_eq!(parse_route_token("Market_Data"), Some(RouteId::MarketData));
    }

    #[test]
    fn test_parse_token_embedded_in_prose() {
        assert_eq!(
            parse_route_token("I think this should go to the knowledge agent."),
            Some(RouteId::Knowledge)
        );
        assert_eq!(
            parse_route_token("Route: market data (price question)"),
            Some(RouteId::MarketData)
        );
    }

    #[test]
    fn test_parse_leftmost_token_wins() {
        assert_eq!(
            parse_route_token("knowledge, or maybe conversation"),
            Some(RouteId::Knowledge)
        );
        assert_eq!(
            parse_route_token("conversation beats knowledge here"),
            Some(RouteId::Conversation)
        );
    }

    #[test]
    fn test_parse_unrecognized_is_none() {
        assert_eq!(parse_route_token("no idea, sorry"), None);
        assert_eq!(parse_route_token(""), None);
    }

    #[tokio::test]
    async fn test_http_generator_round_trip() {
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/respond"))
            .and(body_json(serde_json::json!({
                "user_id": "user-1",
                "message": "hola"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "¡Hola!"})),
            )
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(
            reqwest::Client::new(),
            format!("{}/respond", server.uri()),
            RouteId::Conversation,
        );
        let reply = generator.respond("user-1", "hola").await.expect("respond");
        assert_eq!(reply, "¡Hola!");
    }

    #[tokio::test]
    async fn test_http_generator_propagates_server_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let generator =
            HttpGenerator::new(reqwest::Client::new(), server.uri(), RouteId::Knowledge);
        let err = generator.respond("user-1", "hola").await.unwrap_err();
        assert!(matches!(err, AppError::Dispatch { .. }));
    }

    #[tokio::test]
    async fn test_http_arbiter_parses_free_text_answer() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"text": "This looks like a MARKET_DATA question"}),
            ))
            .mount(&server)
            .await;

        let arbiter = HttpArbiter::new(reqwest::Client::new(), server.uri());
        assert_eq!(arbiter.decide("cuanto vale").await.unwrap(), RouteId::MarketData);
    }

    #[tokio::test]
    async fn test_http_arbiter_defaults_on_unrecognized_answer() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "cannot tell"})),
            )
            .mount(&server)
            .await;

        let arbiter = HttpArbiter::new(reqwest::Client::new(), server.uri());
        assert_eq!(
            arbiter.decide("mensaje ambiguo").await.unwrap(),
            RouteId::Conversation
        );
    }
}
