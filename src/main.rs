//! Chatroute HTTP server
//!
//! Starts an Axum web server that queues, classifies, and answers user
//! messages through external collaborator agents.

use axum::{
    routing::{get, post},
    Router,
};
use chatroute::{
    cli::{Cli, Command},
    config::Config,
    handlers, telemetry,
};
use clap::Parser;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = chatroute::cli::generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Wrote configuration template to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let config = Config::from_file(&cli.config)?;
    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting chatroute server on {}:{}",
        config.server.host,
        config.server.port
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let sweep_interval = config.cache.sweep_interval();

    let state = handlers::AppState::new(config)?;
    state.load_snapshots().await;

    // Background maintenance: expired cache entries and idle conversation
    // contexts
    state.cache().spawn_sweeper(sweep_interval);
    state.implicit().spawn_cleanup();

    let app = Router::new()
        .route("/message", post(handlers::message::handler))
        .route("/feedback", post(handlers::feedback::handler))
        .route("/stats", get(handlers::stats::handler))
        .route("/metrics", get(handlers::metrics::handler))
        .route("/health", get(handlers::health::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from((
        host.parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        port,
    ));

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
