//! WebSocket upgrade + session loop. One practice session per connection:
//! client messages become engine events, engine effects become server
//! messages, and a one-second interval drives countdown ticks.
//!
//! Assessment and rephrase requests are awaited inline, so everything on a
//! connection is serialized; a second request can never overlap the first.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::logic::{run_assessment, run_rephrase};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::recognizer::Capabilities;
use crate::session::{Effect, Event, Session};
use crate::state::AppState;
use crate::domain::Part;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "speaking_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  let conn_id = Uuid::new_v4().to_string();
  info!(target: "speaking_backend", %conn_id, "WebSocket connected");

  let mut session: Option<Session> = None;
  let mut rng = StdRng::from_entropy();
  let mut ticker = tokio::time::interval(Duration::from_secs(1));
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        if let Some(s) = session.as_mut().filter(|s| s.in_countdown()) {
          let fx = s.handle(Event::Tick, &mut rng);
          if apply_effects(&mut socket, &state, s, fx, &mut rng).await.is_err() {
            break;
          }
        }
      }
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let parsed = serde_json::from_str::<ClientWsMessage>(&txt);
            let ok = match parsed {
              Ok(m) => {
                debug!(target: "speaking_backend", %conn_id, "WS received: {:?}", &m);
                handle_client_msg(m, &mut socket, &state, &mut session, &conn_id, &mut rng).await
              }
              Err(e) => send(
                &mut socket,
                &ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
              )
              .await,
            };
            if ok.is_err() {
              break;
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
    }
  }
  info!(target: "speaking_backend", %conn_id, "WebSocket disconnected");
}

async fn handle_client_msg(
  msg: ClientWsMessage,
  socket: &mut WebSocket,
  state: &AppState,
  session: &mut Option<Session>,
  conn_id: &str,
  rng: &mut StdRng,
) -> Result<(), axum::Error> {
  // Session bootstrap and ping don't need an existing session.
  match msg {
    ClientWsMessage::Ping => return send(socket, &ServerWsMessage::Pong).await,
    ClientWsMessage::Start { part } => {
      let Some(part) = Part::parse(&part) else {
        return send(socket, &ServerWsMessage::Error { message: format!("Unknown part: {}", part) }).await;
      };
      info!(target: "session", %conn_id, part = part.as_str(), "Session started");
      let mut s = state.new_session(part);
      send(socket, &ServerWsMessage::Session { id: conn_id.to_string(), part: part.as_str().into() }).await?;
      let fx = s.start_effects(rng);
      apply_effects(socket, state, &mut s, fx, rng).await?;
      *session = Some(s);
      return Ok(());
    }
    _ => {}
  }

  let Some(s) = session.as_mut() else {
    debug!(target: "session", %conn_id, "Message before session start; ignored");
    return Ok(());
  };

  // Meter frames bypass the phase engine.
  if let ClientWsMessage::MeterFrame { samples } = &msg {
    if let Some(level) = s.meter_frame(samples) {
      return send(socket, &ServerWsMessage::MicLevel { level }).await;
    }
    return Ok(());
  }

  let event = match msg {
    ClientWsMessage::Capabilities { speech_recognition, microphone } => {
      Event::Capabilities(Capabilities { speech_recognition, microphone })
    }
    ClientWsMessage::NextQuestion => Event::Next,
    ClientWsMessage::NewTopic => Event::NewTopic,
    ClientWsMessage::PlaybackFinished => Event::PlaybackFinished,
    ClientWsMessage::StartAnswer => Event::Start,
    ClientWsMessage::StopAnswer => Event::Stop,
    ClientWsMessage::RecognizerResult { text, is_final } => Event::RecognizerResult { text, is_final },
    ClientWsMessage::RecognizerEnded => Event::RecognizerEnded,
    ClientWsMessage::RecognizerError { code } => Event::RecognizerError { code },
    ClientWsMessage::Ping | ClientWsMessage::Start { .. } | ClientWsMessage::MeterFrame { .. } => {
      unreachable!("handled above")
    }
  };

  let fx = s.handle(event, rng);
  apply_effects(socket, state, s, fx, rng).await
}

/// Run a batch of effects: plain effects become server messages; assessment
/// and rephrase requests are awaited and their outcome fed back into the
/// engine, whose follow-up effects join the queue.
async fn apply_effects(
  socket: &mut WebSocket,
  state: &AppState,
  session: &mut Session,
  fx: Vec<Effect>,
  rng: &mut StdRng,
) -> Result<(), axum::Error> {
  let mut queue: VecDeque<Effect> = fx.into();
  while let Some(effect) = queue.pop_front() {
    match effect {
      Effect::Assess { question, transcript } => {
        let outcome = match run_assessment(state, session.part(), &question, &transcript).await {
          Ok(text) => Event::AssessmentReady { text },
          Err(message) => Event::AssessmentFailed { message },
        };
        queue.extend(session.handle(outcome, rng));
      }
      Effect::Rephrase { question } => {
        let outcome = match run_rephrase(state, &question).await {
          Ok(text) => Event::RephraseReady { text },
          Err(message) => Event::RephraseFailed { message },
        };
        queue.extend(session.handle(outcome, rng));
      }
      other => send(socket, &effect_to_msg(other)).await?,
    }
  }
  Ok(())
}

fn effect_to_msg(e: Effect) -> ServerWsMessage {
  match e {
    Effect::Speak { text } => ServerWsMessage::Speak { text },
    Effect::ShowQuestion { topic, number, total, text } => {
      ServerWsMessage::Question { topic, number, total, text }
    }
    Effect::ShowTopicCard { topic, prompts } => ServerWsMessage::TopicCard { topic, prompts },
    Effect::NextLabel { text } => ServerWsMessage::NextLabel { text },
    Effect::Status { text } => ServerWsMessage::Status { text },
    Effect::Controls { next, start, stop, new_topic } => {
      ServerWsMessage::Controls { next, start, stop, new_topic }
    }
    Effect::Timer { remaining } => ServerWsMessage::Timer { remaining },
    Effect::ClearTranscript => ServerWsMessage::ClearTranscript,
    Effect::Transcript { text } => ServerWsMessage::Transcript { text },
    Effect::StartCapture { continuous } => ServerWsMessage::StartCapture { continuous },
    Effect::StopCapture => ServerWsMessage::StopCapture,
    Effect::RestartCapture => ServerWsMessage::RestartCapture,
    Effect::StartMeter => ServerWsMessage::ShowMeter,
    Effect::StopMeter => ServerWsMessage::HideMeter,
    Effect::ShowAssessment { text } => ServerWsMessage::Assessment { text },
    Effect::ReportError { message } => ServerWsMessage::Error { message },
    Effect::Complete => ServerWsMessage::Complete,
    Effect::Assess { .. } | Effect::Rephrase { .. } => {
      unreachable!("request effects handled by apply_effects")
    }
  }
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await.map_err(|e| {
    error!(target: "speaking_backend", error = %e, "WS send error");
    e
  })
}
