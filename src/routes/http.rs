//! HTTP endpoint handlers. Thin wrappers that forward to core logic; each is
//! instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::domain::Part;
use crate::logic::{random_topic, run_assessment, run_rephrase};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state), fields(part = %q.part.clone().unwrap_or_else(|| "part1".into())))]
pub async fn http_get_topic(
  State(state): State<Arc<AppState>>,
  Query(q): Query<TopicQuery>,
) -> impl IntoResponse {
  let raw = q.part.unwrap_or_else(|| "part1".into());
  let Some(part) = Part::parse(&raw) else {
    return (
      StatusCode::BAD_REQUEST,
      Json(ErrorOut { message: format!("Unknown part: {}", raw) }),
    )
      .into_response();
  };
  let mut rng = rand::thread_rng();
  match random_topic(&state, part, &mut rng) {
    Some(t) => {
      info!(target: "topics", part = part.as_str(), topic = %t.name, "HTTP topic served");
      Json(TopicOut { topic: t.name, items: t.items }).into_response()
    }
    None => (
      StatusCode::NOT_FOUND,
      Json(ErrorOut { message: "No topics available for this part.".into() }),
    )
      .into_response(),
  }
}

#[instrument(level = "info", skip(state, body), fields(part = %body.part, transcript_len = body.transcript.len()))]
pub async fn http_post_assess(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AssessIn>,
) -> impl IntoResponse {
  let Some(part) = Part::parse(&body.part) else {
    return (
      StatusCode::BAD_REQUEST,
      Json(ErrorOut { message: format!("Unknown part: {}", body.part) }),
    )
      .into_response();
  };
  match run_assessment(&state, part, &body.question, &body.transcript).await {
    Ok(assessment) => {
      info!(target: "speaking_backend", part = part.as_str(), "HTTP assessment served");
      Json(AssessOut { assessment }).into_response()
    }
    Err(message) => (StatusCode::BAD_GATEWAY, Json(ErrorOut { message })).into_response(),
  }
}

#[instrument(level = "info", skip(state, body), fields(question_len = body.question.len()))]
pub async fn http_post_rephrase(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RephraseIn>,
) -> impl IntoResponse {
  match run_rephrase(&state, &body.question).await {
    Ok(question) => Json(RephraseOut { question }).into_response(),
    Err(message) => (StatusCode::BAD_GATEWAY, Json(ErrorOut { message })).into_response(),
  }
}
