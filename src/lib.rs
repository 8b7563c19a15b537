//! IELTS speaking practice backend: session phase engine, topic bank,
//! transcript/meter bookkeeping, Ollama assessment client, and the axum
//! HTTP + WebSocket surface.

pub mod telemetry;
pub mod util;
pub mod domain;
pub mod config;
pub mod topics;
pub mod recognizer;
pub mod meter;
pub mod session;
pub mod state;
pub mod protocol;
pub mod logic;
pub mod ollama;
pub mod routes;
