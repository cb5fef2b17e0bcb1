//! Assessment dev server - scripted stand-in for the assessment backend.
//!
//! Serves a sample quality model, accepts start calls, and plays back a
//! deterministic progress script and growing result snapshots over SSE.

mod routes;
mod script;
mod sse;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "assessor-devserver")]
#[command(about = "Scripted assessment backend for local development")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Milliseconds between scripted stream events
    #[arg(long, default_value = "500")]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("assessor_devserver=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let state = AppState::new(Duration::from_millis(args.tick_ms));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, tick_ms = args.tick_ms, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
