//! Core behaviors shared by the HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Building the rubric prompt for each part
//!   - Running assessment and rephrase requests against Ollama
//!   - Drawing a random topic for the stateless HTTP helper

use rand::Rng;
use tracing::{debug, error, instrument};

use crate::config::Prompts;
use crate::domain::{Part, Topic};
use crate::state::AppState;
use crate::util::{fill_template, trunc_for_log};

/// Assemble the full assessment prompt: the part's rubric followed by the
/// question/transcript section. Part 2 has no question to embed; its long
/// turn is assessed from the transcript alone.
pub fn build_assess_prompt(prompts: &Prompts, part: Part, question: &str, transcript: &str) -> String {
  match part {
    Part::Part1 => format!(
      "{}\n\n{}",
      prompts.part1_rubric,
      fill_template(&prompts.assess_user_template, &[("question", question), ("transcript", transcript)]),
    ),
    Part::Part2 => format!(
      "{}\n\n{}",
      prompts.part2_rubric,
      fill_template(&prompts.part2_user_template, &[("transcript", transcript)]),
    ),
    Part::Part3 => format!(
      "{}\n\n{}",
      prompts.part3_rubric,
      fill_template(&prompts.assess_user_template, &[("question", question), ("transcript", transcript)]),
    ),
  }
}

pub fn build_rephrase_prompt(prompts: &Prompts, question: &str) -> String {
  fill_template(&prompts.rephrase_template, &[("question", question)])
}

/// One blocking assessment request. Failures map to the single user-facing
/// message the UI shows; no retry.
#[instrument(level = "info", skip(state, question, transcript),
             fields(part = part.as_str(), transcript_len = transcript.len()))]
pub async fn run_assessment(
  state: &AppState,
  part: Part,
  question: &str,
  transcript: &str,
) -> Result<String, String> {
  let Some(oa) = &state.ollama else {
    return Err("Assessment is unavailable: the Ollama integration is disabled.".into());
  };
  let prompt = build_assess_prompt(&state.prompts, part, question, transcript);
  // Part 2 posts the long-turn prompt to the completion endpoint; the
  // question parts use chat.
  let result = match part {
    Part::Part2 => oa.generate(&prompt).await,
    _ => oa.chat(&prompt).await,
  };
  match result {
    Ok(text) => {
      debug!(target: "speaking_backend", part = part.as_str(),
             reply = %trunc_for_log(&text, 120), "Assessment received");
      Ok(text)
    }
    Err(e) => {
      error!(target: "speaking_backend", part = part.as_str(), error = %e, "Assessment request failed");
      Err(format!(
        "Error connecting to Ollama. Please ensure your Ollama server is running locally and the model '{}' is installed. ({})",
        oa.model, e
      ))
    }
  }
}

/// Rephrase a question in simpler words, bypassing scoring.
#[instrument(level = "info", skip(state, question), fields(question_len = question.len()))]
pub async fn run_rephrase(state: &AppState, question: &str) -> Result<String, String> {
  let Some(oa) = &state.ollama else {
    return Err("Rephrasing is unavailable: the Ollama integration is disabled.".into());
  };
  let prompt = build_rephrase_prompt(&state.prompts, question);
  oa.chat(&prompt).await.map_err(|e| {
    error!(target: "speaking_backend", error = %e, "Rephrase request failed");
    format!("Error connecting to Ollama for rephrasing. ({})", e)
  })
}

/// Stateless random draw over a part's master topic list (HTTP helper; the
/// per-session unused tracking lives in the session's own bank).
pub fn random_topic(state: &AppState, part: Part, rng: &mut impl Rng) -> Option<Topic> {
  let topics = state.topics_for(part).topics.as_ref()?;
  if topics.is_empty() {
    return None;
  }
  let idx = rng.gen_range(0..topics.len());
  Some(topics[idx].clone())
}
