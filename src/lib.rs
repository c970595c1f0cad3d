//! Chatroute - adaptive message router and response cache for multi-agent
//! chat assistants
//!
//! Serializes each user's messages, serves repeated questions from a TTL
//! cache, routes the rest with a learning keyword classifier, and escalates
//! ambiguous messages to an external arbiter whose decisions feed back into
//! the classifier. Explicit ratings and implicit follow-up signals close the
//! quality loop.

pub mod agents;
pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod feedback;
pub mod handlers;
pub mod metrics;
pub mod session;
pub mod telemetry;
pub mod text;
