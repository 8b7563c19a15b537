//! Application state: loaded topic lists, prompts, durations, and the
//! optional Ollama client.
//!
//! Topic lists are immutable after load; per-session unused tracking lives
//! in each session's own `TopicBank`, so no locks are needed here.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::config::{load_practice_config_from_env, Prompts};
use crate::domain::{Durations, Part, PartConfig, Topic};
use crate::ollama::Ollama;
use crate::session::Session;
use crate::topics::{parse_topic_file, seed_topics, TopicBank};

/// One part's topic source. `error` is set when a configured file failed to
/// load; fatal for that part's page, the others keep working.
#[derive(Clone)]
pub struct PartTopics {
    pub topics: Option<Arc<Vec<Topic>>>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    part1: PartTopics,
    part2: PartTopics,
    part3: PartTopics,
    pub prompts: Prompts,
    pub durations: Durations,
    pub ollama: Option<Ollama>,
}

impl AppState {
    /// Build state from env: load config, read topic files (seed fallback),
    /// init the Ollama client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_practice_config_from_env().unwrap_or_default();

        let part1 = load_part(Part::Part1, cfg.topics.part1.as_deref());
        let part2 = load_part(Part::Part2, cfg.topics.part2.as_deref());
        let part3 = load_part(Part::Part3, cfg.topics.part3.as_deref());

        let ollama = Ollama::from_env();
        if let Some(oa) = &ollama {
            info!(target: "speaking_backend", base_url = %oa.base_url, model = %oa.model, "Ollama enabled.");
        } else {
            info!(target: "speaking_backend", "Ollama disabled; assessments will be unavailable.");
        }

        Self {
            part1,
            part2,
            part3,
            prompts: cfg.prompts,
            durations: cfg.durations,
            ollama,
        }
    }

    pub fn topics_for(&self, part: Part) -> &PartTopics {
        match part {
            Part::Part1 => &self.part1,
            Part::Part2 => &self.part2,
            Part::Part3 => &self.part3,
        }
    }

    pub fn part_config(&self, part: Part) -> PartConfig {
        PartConfig::for_part(part, self.durations)
    }

    /// Build a fresh session for one WebSocket connection. A part whose
    /// topic file failed to load gets a permanently disabled session that
    /// explains itself.
    pub fn new_session(&self, part: Part) -> Session {
        let cfg = self.part_config(part);
        let src = self.topics_for(part);
        match (&src.topics, &src.error) {
            (Some(topics), _) => {
                let bank = TopicBank::new(topics.as_ref().clone(), cfg.exhaustion);
                Session::new(cfg, bank)
            }
            (None, Some(msg)) => Session::unavailable(cfg, msg.clone()),
            (None, None) => Session::unavailable(cfg, "No topics available.".into()),
        }
    }
}

fn load_part(part: Part, path: Option<&str>) -> PartTopics {
    match path {
        None => {
            let topics = seed_topics(part);
            info!(target: "topics", part = part.as_str(), count = topics.len(), source = "seed",
                  "Startup topic inventory");
            PartTopics { topics: Some(Arc::new(topics)), error: None }
        }
        Some(p) => match std::fs::read_to_string(p).map_err(|e| e.to_string()).and_then(|raw| parse_topic_file(&raw)) {
            Ok(topics) => {
                info!(target: "topics", part = part.as_str(), count = topics.len(), path = p,
                      source = "file", "Startup topic inventory");
                PartTopics { topics: Some(Arc::new(topics)), error: None }
            }
            Err(e) => {
                error!(target: "topics", part = part.as_str(), path = p, error = %e,
                       "Failed to load topic file; part disabled");
                PartTopics {
                    topics: None,
                    error: Some(format!(
                        "Failed to load speaking topics. Please ensure {} is a valid JSON file with the correct format.",
                        p
                    )),
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;

    fn bare_state() -> AppState {
        AppState {
            part1: load_part(Part::Part1, None),
            part2: load_part(Part::Part2, None),
            part3: load_part(Part::Part3, None),
            prompts: Prompts::default(),
            durations: Durations::default(),
            ollama: None,
        }
    }

    #[test]
    fn seed_fallback_gives_every_part_topics() {
        let state = bare_state();
        for part in [Part::Part1, Part::Part2, Part::Part3] {
            let src = state.topics_for(part);
            assert!(src.error.is_none());
            assert!(!src.topics.as_ref().unwrap().is_empty());
        }
    }

    #[test]
    fn missing_file_disables_the_part_only() {
        let broken = load_part(Part::Part1, Some("/nonexistent/speaking1.json"));
        assert!(broken.topics.is_none());
        assert!(broken.error.as_ref().unwrap().contains("Failed to load"));
    }

    #[test]
    fn sessions_come_up_idle() {
        let state = bare_state();
        let s = state.new_session(Part::Part2);
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.part(), Part::Part2);
    }
}
