//! Command-line interface for chatroute
//!
//! Provides argument parsing and subcommand handling for the chatroute binary.

use clap::{Parser, Subcommand};

/// Adaptive message router and response cache for multi-agent chat assistants
#[derive(Parser)]
#[command(name = "chatroute")]
#[command(version)]
#[command(about = "Adaptive message router and response cache for multi-agent chat assistants")]
#[command(
    long_about = "Chatroute serializes each user's messages, serves repeated questions from a \
    TTL cache, routes the rest with a learning keyword classifier, and escalates ambiguous \
    messages to an external arbiter whose decisions it learns from."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Chatroute Configuration
# =======================
#
# This file configures the HTTP server, response cache, keyword classifier,
# feedback collection, and the external collaborator endpoints.

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 3008

# Bound on a single generator dispatch, in seconds
request_timeout_seconds = 30

[cache]
# "memory" (default) or "file"
backend = "memory"

# How long a cached response stays servable, in seconds
ttl_seconds = 300

# Directory for the file backend (ignored for memory)
dir = "cache"

# How often the background sweeper reclaims expired entries, in seconds
sweep_interval_seconds = 60

[classifier]
# Weight applied when creating or adjusting a learned keyword (0.0, 1.0]
learning_rate = 0.1

# Messages at most this many characters after normalization skip
# classification entirely
trivial_max_chars = 5

# Escalation cutoffs, in characters of the raw message
no_escalation_under_chars = 20
escalate_low_over_chars = 100
escalate_medium_over_chars = 50

[feedback]
# How long a served response stays eligible for an explicit rating, in seconds
pending_ttl_seconds = 300

# Bounded history size; oldest rated entries are evicted past this
history_capacity = 1000

[implicit]
# Contexts older than this are never attributed to a new message, in seconds
staleness_seconds = 300

# Contexts idle beyond this are removed by the periodic sweep, in seconds
idle_cleanup_seconds = 600
cleanup_interval_seconds = 60

# External collaborators: one arbiter plus one generator per route.
# Plain request/response HTTP services - free text in, free text out.
[agents]
arbiter_url = "http://localhost:4000/arbiter"
conversation_url = "http://localhost:4000/conversation"
knowledge_url = "http://localhost:4000/knowledge"
market_data_url = "http://localhost:4000/market-data"

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
