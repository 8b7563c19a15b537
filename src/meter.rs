//! Microphone level meter.
//!
//! The client streams raw analyser frames (byte frequency bins) at animation
//! frame cadence; we keep a short rolling average and map it to the 0–100
//! scale the volume bar displays: min(100, avg / 128 * 100).

use std::collections::VecDeque;

use tracing::warn;

const WINDOW_FRAMES: usize = 8;

#[derive(Debug, Default)]
pub struct LevelMeter {
  active: bool,
  window: VecDeque<f32>,
  warned_inactive: bool,
}

impl LevelMeter {
  /// Idempotent: starting an active meter just keeps it running.
  pub fn start(&mut self) {
    if !self.active {
      self.active = true;
      self.window.clear();
      self.warned_inactive = false;
    }
  }

  /// Idempotent and safe with no stream: stopping an inactive meter is a no-op.
  pub fn stop(&mut self) {
    self.active = false;
    self.window.clear();
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Fold one analyser frame into the rolling average. Returns the 0–100
  /// display level, or None when the meter is not running (frame dropped,
  /// warned once).
  pub fn ingest(&mut self, frame: &[u8]) -> Option<u8> {
    if !self.active {
      if !self.warned_inactive {
        warn!(target: "session", "Meter frame received while meter inactive; dropping");
        self.warned_inactive = true;
      }
      return None;
    }
    let avg = if frame.is_empty() {
      0.0
    } else {
      frame.iter().map(|&b| b as f32).sum::<f32>() / frame.len() as f32
    };
    if self.window.len() == WINDOW_FRAMES {
      self.window.pop_front();
    }
    self.window.push_back(avg);
    let rolling = self.window.iter().sum::<f32>() / self.window.len() as f32;
    Some((rolling / 128.0 * 100.0).min(100.0) as u8)
  }
}
