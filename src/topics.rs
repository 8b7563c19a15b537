//! Topic sources: parsing the two topic-file shapes, the per-session
//! `TopicBank`, and built-in seed topics.
//!
//! File shapes accepted (consumed read-only at startup):
//!   (a) an object mapping category name -> [ { topic, cues } ]   (cue cards)
//!   (b) { "topics": [ { topic, questions | prompts } ] }
//!
//! A malformed shape is a fatal load error for that part's page; the caller
//! records the error and serves the part with disabled controls.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::{ExhaustionPolicy, Part, Topic};

#[derive(Deserialize)]
struct TopicsDoc {
  topics: Vec<TopicEntry>,
}

#[derive(Deserialize)]
struct TopicEntry {
  topic: String,
  #[serde(default)]
  questions: Vec<String>,
  #[serde(default)]
  prompts: Vec<String>,
}

#[derive(Deserialize)]
struct CueEntry {
  topic: String,
  cues: Vec<String>,
}

/// Parse a topic document, trying shape (b) first, then shape (a).
pub fn parse_topic_file(raw: &str) -> Result<Vec<Topic>, String> {
  if let Ok(doc) = serde_json::from_str::<TopicsDoc>(raw) {
    let mut out = Vec::with_capacity(doc.topics.len());
    for entry in doc.topics {
      let items = if !entry.questions.is_empty() { entry.questions } else { entry.prompts };
      if items.is_empty() {
        return Err(format!("topic '{}' has neither questions nor prompts", entry.topic));
      }
      out.push(Topic { name: entry.topic, items });
    }
    if out.is_empty() {
      return Err("'topics' array is empty".into());
    }
    return Ok(out);
  }

  // Shape (a): category map. BTreeMap keeps category order stable.
  match serde_json::from_str::<BTreeMap<String, Vec<CueEntry>>>(raw) {
    Ok(categories) => {
      let mut out = Vec::new();
      for (category, entries) in categories {
        info!(target: "topics", %category, count = entries.len(), "Flattening topic category");
        for e in entries {
          out.push(Topic { name: e.topic, items: e.cues });
        }
      }
      if out.is_empty() {
        Err("no topics found in any category".into())
      } else {
        Ok(out)
      }
    }
    Err(e) => Err(format!("not a recognized topic file shape: {}", e)),
  }
}

/// The unused-topic pool for one session. Draws are uniform over the unused
/// set; the exhaustion policy decides what an empty pool means.
#[derive(Clone, Debug)]
pub struct TopicBank {
  master: Vec<Topic>,
  available: Vec<Topic>,
  policy: ExhaustionPolicy,
}

/// Result of a successful draw. `reshuffled` is set when the pool was
/// refilled from the master list for this draw.
pub struct Drawn {
  pub topic: Topic,
  pub reshuffled: bool,
}

impl TopicBank {
  pub fn new(topics: Vec<Topic>, policy: ExhaustionPolicy) -> Self {
    Self { master: topics.clone(), available: topics, policy }
  }

  pub fn remaining(&self) -> usize {
    self.available.len()
  }

  /// Draw a random unused topic. Returns None only under the Terminate
  /// policy once every topic has been offered.
  pub fn draw(&mut self, rng: &mut impl Rng) -> Option<Drawn> {
    let mut reshuffled = false;
    if self.available.is_empty() {
      match self.policy {
        ExhaustionPolicy::Terminate => return None,
        ExhaustionPolicy::Reshuffle => {
          if self.master.is_empty() {
            return None;
          }
          warn!(target: "topics", count = self.master.len(), "Topic pool exhausted; reshuffling");
          self.available = self.master.clone();
          reshuffled = true;
        }
      }
    }
    let idx = rng.gen_range(0..self.available.len());
    let topic = self.available.swap_remove(idx);
    Some(Drawn { topic, reshuffled })
  }
}

/// Minimal built-in topics so every part works with no files on disk.
pub fn seed_topics(part: Part) -> Vec<Topic> {
  match part {
    Part::Part1 => vec![
      Topic {
        name: "Travel".into(),
        items: vec![
          "Do you like to travel?".into(),
          "What is the best place you have visited?".into(),
        ],
      },
      Topic {
        name: "Work and Study".into(),
        items: vec![
          "Do you work or are you a student?".into(),
          "What do you enjoy most about your work or studies?".into(),
        ],
      },
    ],
    Part::Part2 => vec![
      Topic {
        name: "Describe a place you like to visit.".into(),
        items: vec![
          "where it is".into(),
          "how often you go there".into(),
          "what you do there".into(),
          "and explain why you like it".into(),
        ],
      },
      Topic {
        name: "Describe a skill you would like to learn.".into(),
        items: vec![
          "what the skill is".into(),
          "how you would learn it".into(),
          "how long it would take".into(),
          "and explain why you want to learn it".into(),
        ],
      },
    ],
    Part::Part3 => vec![
      Topic {
        name: "Tourism".into(),
        items: vec![
          "How has tourism changed in your country over the last few decades?".into(),
          "Do you think tourism benefits local communities?".into(),
        ],
      },
      Topic {
        name: "Education".into(),
        items: vec![
          "Why do some people choose to study abroad?".into(),
          "Should education be free for everyone?".into(),
        ],
      },
    ],
  }
}
