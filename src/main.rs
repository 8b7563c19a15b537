//! IELTS Speaking Practice Backend
//!
//! - Axum HTTP + WebSocket API driving practice sessions for Parts 1/2/3
//! - Ollama integration for rubric assessment and question rephrasing
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                 : u16 (default 3000)
//!   OLLAMA_BASE_URL      : default "http://localhost:11434"
//!   OLLAMA_MODEL         : default "llama3"
//!   OLLAMA_DISABLED      : "1"/"true" disables assessment entirely
//!   PRACTICE_CONFIG_PATH : path to TOML config (prompts, durations, topic files)
//!   LOG_LEVEL            : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT           : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use speaking_backend::routes::build_router;
use speaking_backend::state::AppState;
use speaking_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (topic lists, prompts, Ollama client).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "speaking_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
