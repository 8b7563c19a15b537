//! Speech-input bookkeeping: the transcript buffer fed by recognizer result
//! events, and the capability report that gates a session.
//!
//! The browser owns the actual recognizer; the backend only sees its
//! callbacks relayed over the WebSocket. Interim results replace the pending
//! segment, final results append, matching the split the recognizer's
//! result event exposes.

use serde::Deserialize;

/// Accumulated text for one recording attempt.
#[derive(Clone, Debug, Default)]
pub struct TranscriptBuffer {
  finals: String,
  interim: String,
}

impl TranscriptBuffer {
  pub fn push(&mut self, text: &str, is_final: bool) {
    if is_final {
      self.finals.push_str(text);
      self.interim.clear();
    } else {
      self.interim = text.to_string();
    }
  }

  /// Finalized plus pending text, for live display.
  pub fn current(&self) -> String {
    let mut out = self.finals.clone();
    out.push_str(&self.interim);
    out
  }

  pub fn is_empty(&self) -> bool {
    self.current().trim().is_empty()
  }

  /// Drain the buffer for assessment. The attempt owns its transcript; once
  /// taken, nothing is left behind for the next attempt.
  pub fn take(&mut self) -> String {
    let out = self.current().trim().to_string();
    self.finals.clear();
    self.interim.clear();
    out
  }

  pub fn clear(&mut self) {
    self.finals.clear();
    self.interim.clear();
  }
}

/// What the client's platform can actually do. Reported once after connect;
/// a missing capability degrades the session to a disabled state.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Capabilities {
  pub speech_recognition: bool,
  pub microphone: bool,
}

impl Capabilities {
  /// A user-facing explanation when the session cannot run, or None.
  pub fn degraded_reason(&self) -> Option<&'static str> {
    if !self.speech_recognition {
      Some("Speech Recognition is not supported by your browser. Please use Chrome or Edge.")
    } else if !self.microphone {
      Some("Microphone access denied. Please allow access in your browser settings to continue.")
    } else {
      None
    }
  }
}
