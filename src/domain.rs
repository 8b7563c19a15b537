//! Domain models used by the backend: exam parts, topics, and per-part
//! controller configuration.

use serde::{Deserialize, Serialize};

/// Which IELTS speaking part a session practices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
  /// Single free-answer questions, read aloud one by one.
  Part1,
  /// Timed long-turn monologue from a cue card (prep / ready / speaking).
  Part2,
  /// Discussion questions with a rephrase escape hatch.
  Part3,
}

impl Part {
  pub fn parse(s: &str) -> Option<Part> {
    match s {
      "part1" | "1" => Some(Part::Part1),
      "part2" | "2" => Some(Part::Part2),
      "part3" | "3" => Some(Part::Part3),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Part::Part1 => "part1",
      Part::Part2 => "part2",
      Part::Part3 => "part3",
    }
  }
}

/// What happens when the unused-topic pool runs dry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExhaustionPolicy {
  /// Session is over; report completion and disable further input (Part 1).
  Terminate,
  /// Refill the pool from the master list and reshuffle (Parts 2/3).
  Reshuffle,
}

/// One practice topic. `items` holds the questions (Parts 1/3) or the cue
/// card prompts (Part 2). Immutable once loaded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
  pub name: String,
  pub items: Vec<String>,
}

/// Controller configuration describing how one part behaves. The phase
/// engine is a single parametrized type; everything part-specific lives here.
#[derive(Clone, Debug)]
pub struct PartConfig {
  pub part: Part,
  /// Countdown lengths in seconds; only used when `timed` is set.
  pub prep_secs: u32,
  pub ready_secs: u32,
  pub speaking_secs: u32,
  /// Part 2: prep/ready/speaking countdowns instead of question playback.
  pub timed: bool,
  /// Part 2: continuous capture with auto-restart on premature recognizer end.
  pub continuous_capture: bool,
  /// Part 3: scan transcripts for rephrase-trigger phrases before assessing.
  pub rephrase_detection: bool,
  pub exhaustion: ExhaustionPolicy,
}

/// Countdown durations, overridable from the TOML config.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Durations {
  #[serde(default = "default_prep")]
  pub prep_secs: u32,
  #[serde(default = "default_ready")]
  pub ready_secs: u32,
  #[serde(default = "default_speaking")]
  pub speaking_secs: u32,
}

fn default_prep() -> u32 { 60 }
fn default_ready() -> u32 { 10 }
fn default_speaking() -> u32 { 120 }

impl Default for Durations {
  fn default() -> Self {
    Self { prep_secs: 60, ready_secs: 10, speaking_secs: 120 }
  }
}

impl PartConfig {
  pub fn for_part(part: Part, d: Durations) -> Self {
    match part {
      Part::Part1 => Self {
        part,
        prep_secs: 0,
        ready_secs: 0,
        speaking_secs: 0,
        timed: false,
        continuous_capture: false,
        rephrase_detection: false,
        exhaustion: ExhaustionPolicy::Terminate,
      },
      Part::Part2 => Self {
        part,
        prep_secs: d.prep_secs,
        ready_secs: d.ready_secs,
        speaking_secs: d.speaking_secs,
        timed: true,
        continuous_capture: true,
        rephrase_detection: false,
        exhaustion: ExhaustionPolicy::Reshuffle,
      },
      Part::Part3 => Self {
        part,
        prep_secs: 0,
        ready_secs: 0,
        speaking_secs: 0,
        timed: false,
        continuous_capture: true,
        rephrase_detection: true,
        exhaustion: ExhaustionPolicy::Reshuffle,
      },
    }
  }
}
