//! The practice session phase engine.
//!
//! One parametrized controller covers all three parts; per-part behavior
//! (countdowns, continuous capture, rephrase detection, exhaustion policy)
//! comes from `PartConfig`. The engine is a pure dispatcher: events in,
//! effects out. All I/O (speaking, capturing, assessment requests, timers)
//! happens in the WebSocket loop that interprets the effects.
//!
//! Only one attempt is ever in flight: `Start` is only honored in states
//! where no assessment is outstanding, and controls are re-emitted at every
//! transition so the client can never click into a reentrant action.
//!
//! Stop/end race: stop intent is the `Finalizing` phase rather than a flag.
//! The first `RecognizerEnded` seen there finalizes the attempt; later end
//! events land in `Assessing`/`Idle` and are ignored.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::domain::{Part, PartConfig, Topic};
use crate::meter::LevelMeter;
use crate::recognizer::{Capabilities, TranscriptBuffer};
use crate::topics::TopicBank;

/// Phrases that route a Part 3 transcript to the rephrase path instead of
/// assessment. Matched case-insensitively as substrings.
const REPHRASE_TRIGGERS: &[&str] = &[
  "i don't understand",
  "can you repeat that",
  "could you rephrase",
  "repeat the question",
  "say that again",
  "what was the question",
];

pub fn wants_rephrase(transcript: &str) -> bool {
  let t = transcript.to_lowercase();
  REPHRASE_TRIGGERS.iter().any(|k| t.contains(k))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
  Idle,
  QuestionPlaying,
  AwaitingStart,
  Preparation,
  Ready,
  Listening,
  Finalizing,
  Assessing,
  Rephrasing,
  Complete,
}

/// Everything that can happen to a session.
#[derive(Clone, Debug)]
pub enum Event {
  Capabilities(Capabilities),
  Next,
  Start,
  Stop,
  NewTopic,
  PlaybackFinished,
  RecognizerResult { text: String, is_final: bool },
  RecognizerEnded,
  RecognizerError { code: String },
  Tick,
  AssessmentReady { text: String },
  AssessmentFailed { message: String },
  RephraseReady { text: String },
  RephraseFailed { message: String },
}

/// Instructions for the outside world, in emission order.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
  Speak { text: String },
  ShowQuestion { topic: String, number: usize, total: usize, text: String },
  ShowTopicCard { topic: String, prompts: Vec<String> },
  NextLabel { text: String },
  Status { text: String },
  Controls { next: bool, start: bool, stop: bool, new_topic: bool },
  Timer { remaining: u32 },
  ClearTranscript,
  Transcript { text: String },
  StartCapture { continuous: bool },
  StopCapture,
  RestartCapture,
  StartMeter,
  StopMeter,
  Assess { question: String, transcript: String },
  Rephrase { question: String },
  ShowAssessment { text: String },
  ReportError { message: String },
  Complete,
}

pub struct Session {
  cfg: PartConfig,
  bank: TopicBank,
  phase: Phase,
  remaining: u32,
  current_topic: Option<Topic>,
  question_index: usize,
  /// The stored question text used for assessment and rephrasing, not
  /// whatever the display currently shows.
  question_text: String,
  transcript: TranscriptBuffer,
  meter: LevelMeter,
  degraded: Option<String>,
  fatal: Option<String>,
}

impl Session {
  pub fn new(cfg: PartConfig, bank: TopicBank) -> Self {
    Self {
      cfg,
      bank,
      phase: Phase::Idle,
      remaining: 0,
      current_topic: None,
      question_index: 0,
      question_text: String::new(),
      transcript: TranscriptBuffer::default(),
      meter: LevelMeter::default(),
      degraded: None,
      fatal: None,
    }
  }

  /// A session for a part whose topic file failed to load: permanently
  /// disabled, explains itself, never crashes.
  pub fn unavailable(cfg: PartConfig, message: String) -> Self {
    let mut s = Self::new(cfg, TopicBank::new(vec![], crate::domain::ExhaustionPolicy::Terminate));
    s.fatal = Some(message);
    s
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  pub fn part(&self) -> Part {
    self.cfg.part
  }

  pub fn question_index(&self) -> usize {
    self.question_index
  }

  pub fn question_text(&self) -> &str {
    &self.question_text
  }

  pub fn remaining(&self) -> u32 {
    self.remaining
  }

  /// True while a countdown phase wants one-second ticks.
  pub fn in_countdown(&self) -> bool {
    self.cfg.timed
      && self.remaining > 0
      && matches!(self.phase, Phase::Preparation | Phase::Ready | Phase::Listening)
  }

  /// Level meter passthrough for analyser frames (not a phase event).
  pub fn meter_frame(&mut self, frame: &[u8]) -> Option<u8> {
    self.meter.ingest(frame)
  }

  /// Initial effects when the session is created.
  pub fn start_effects(&mut self, rng: &mut impl Rng) -> Vec<Effect> {
    if let Some(msg) = self.fatal.clone() {
      return vec![
        Effect::Status { text: msg },
        Effect::Controls { next: false, start: false, stop: false, new_topic: false },
      ];
    }
    match self.cfg.part {
      Part::Part2 => {
        // Cue card is shown up front; Start begins the timed run.
        let mut fx = self.show_new_topic_card(rng);
        fx.push(Effect::Status { text: "Ready to begin.".into() });
        fx.push(self.idle_controls());
        fx
      }
      _ => vec![
        Effect::Status { text: "Questions loaded successfully. Ready to begin.".into() },
        self.idle_controls(),
      ],
    }
  }

  pub fn handle(&mut self, ev: Event, rng: &mut impl Rng) -> Vec<Effect> {
    if self.fatal.is_some() {
      debug!(target: "session", ?ev, "Event ignored: session unavailable");
      return vec![];
    }
    match ev {
      Event::Capabilities(caps) => self.on_capabilities(caps),
      Event::Next => self.on_next(rng),
      Event::Start => self.on_start(rng),
      Event::Stop => self.on_stop(),
      Event::NewTopic => self.on_new_topic(rng),
      Event::PlaybackFinished => self.on_playback_finished(),
      Event::RecognizerResult { text, is_final } => self.on_recognizer_result(&text, is_final),
      Event::RecognizerEnded => self.on_recognizer_ended(),
      Event::RecognizerError { code } => self.on_recognizer_error(&code),
      Event::Tick => self.on_tick(),
      Event::AssessmentReady { text } => self.on_assessment_ready(text),
      Event::AssessmentFailed { message } => self.on_assessment_failed(message),
      Event::RephraseReady { text } => self.on_rephrase_ready(text),
      Event::RephraseFailed { message } => self.on_rephrase_failed(message),
    }
  }

  // --- Event handlers ---

  fn on_capabilities(&mut self, caps: Capabilities) -> Vec<Effect> {
    if let Some(reason) = caps.degraded_reason() {
      warn!(target: "session", part = self.cfg.part.as_str(), reason, "Session degraded");
      self.degraded = Some(reason.to_string());
      return vec![
        Effect::Status { text: reason.into() },
        Effect::Controls { next: false, start: false, stop: false, new_topic: false },
      ];
    }
    self.degraded = None;
    if self.phase == Phase::Idle {
      let status = match self.cfg.part {
        Part::Part2 => "Microphone access granted. Ready to begin.",
        _ => "Ready to begin.",
      };
      return vec![Effect::Status { text: status.into() }, self.idle_controls()];
    }
    vec![]
  }

  fn on_next(&mut self, rng: &mut impl Rng) -> Vec<Effect> {
    if self.cfg.part == Part::Part2 || self.degraded.is_some() {
      return vec![];
    }
    if !matches!(self.phase, Phase::Idle | Phase::AwaitingStart) {
      debug!(target: "session", phase = ?self.phase, "Next ignored in this phase");
      return vec![];
    }

    let mut fx = Vec::new();

    // Topic exhausted (or first question): draw a new one.
    let need_topic = self
      .current_topic
      .as_ref()
      .map(|t| self.question_index >= t.items.len())
      .unwrap_or(true);
    if need_topic {
      match self.bank.draw(rng) {
        Some(drawn) => {
          info!(target: "session", part = self.cfg.part.as_str(), topic = %drawn.topic.name,
                reshuffled = drawn.reshuffled, "New topic selected");
          self.current_topic = Some(drawn.topic);
          self.question_index = 0;
          fx.push(Effect::NextLabel { text: "Next Question".into() });
        }
        None => {
          // Terminate policy, pool dry: the session is over.
          info!(target: "session", part = self.cfg.part.as_str(), "All topics covered; session complete");
          self.phase = Phase::Complete;
          return vec![
            Effect::Status {
              text: "All topics have been covered. Please refresh the page to start again.".into(),
            },
            Effect::Controls { next: false, start: false, stop: false, new_topic: false },
            Effect::Complete,
          ];
        }
      }
    }

    let topic = self.current_topic.as_ref().expect("topic drawn above");
    let question = topic.items[self.question_index].clone();
    self.question_text = question.clone();
    self.question_index += 1;
    self.phase = Phase::QuestionPlaying;

    fx.push(Effect::ShowQuestion {
      topic: topic.name.clone(),
      number: self.question_index,
      total: topic.items.len(),
      text: question.clone(),
    });
    fx.push(Effect::ClearTranscript);
    fx.push(Effect::Status { text: "Please wait for the question to finish...".into() });
    fx.push(Effect::Controls { next: false, start: false, stop: false, new_topic: false });
    fx.push(Effect::Speak { text: question });
    fx
  }

  fn on_playback_finished(&mut self) -> Vec<Effect> {
    if self.phase != Phase::QuestionPlaying {
      debug!(target: "session", phase = ?self.phase, "PlaybackFinished ignored");
      return vec![];
    }
    self.phase = Phase::AwaitingStart;
    vec![
      Effect::Status { text: "Ready to record. Press 'Start Answer' when you are ready.".into() },
      Effect::Controls { next: false, start: true, stop: false, new_topic: false },
    ]
  }

  fn on_start(&mut self, rng: &mut impl Rng) -> Vec<Effect> {
    if self.degraded.is_some() {
      return vec![];
    }
    match (self.cfg.part, self.phase) {
      (Part::Part2, Phase::Idle) => self.start_preparation(rng),
      (Part::Part1 | Part::Part3, Phase::AwaitingStart) => {
        self.phase = Phase::Listening;
        self.transcript.clear();
        self.meter.start();
        vec![
          Effect::ClearTranscript,
          Effect::StartCapture { continuous: self.cfg.continuous_capture },
          Effect::StartMeter,
          Effect::Status { text: "Listening... Press 'Stop Listening' when you're done.".into() },
          Effect::Controls { next: false, start: false, stop: true, new_topic: false },
        ]
      }
      _ => {
        debug!(target: "session", phase = ?self.phase, "Start ignored in this phase");
        vec![]
      }
    }
  }

  fn start_preparation(&mut self, rng: &mut impl Rng) -> Vec<Effect> {
    let mut fx = self.show_new_topic_card(rng);
    self.transcript.clear();
    self.phase = Phase::Preparation;
    self.remaining = self.cfg.prep_secs;
    fx.push(Effect::ClearTranscript);
    fx.push(Effect::Timer { remaining: self.remaining });
    fx.push(Effect::Status {
      text: "Preparation time. Take one minute to prepare your answer.".into(),
    });
    fx.push(Effect::Controls { next: false, start: false, stop: false, new_topic: false });
    fx
  }

  fn show_new_topic_card(&mut self, rng: &mut impl Rng) -> Vec<Effect> {
    match self.bank.draw(rng) {
      Some(drawn) => {
        info!(target: "session", part = self.cfg.part.as_str(), topic = %drawn.topic.name,
              reshuffled = drawn.reshuffled, "New topic selected");
        let mut fx = Vec::new();
        if drawn.reshuffled {
          fx.push(Effect::Status { text: "All topics used. Starting over!".into() });
        }
        self.question_text = drawn.topic.name.clone();
        fx.push(Effect::ShowTopicCard {
          topic: drawn.topic.name.clone(),
          prompts: drawn.topic.items.clone(),
        });
        self.current_topic = Some(drawn.topic);
        fx
      }
      None => vec![Effect::Status { text: "No topics available.".into() }],
    }
  }

  fn on_new_topic(&mut self, rng: &mut impl Rng) -> Vec<Effect> {
    // Only meaningful for the cue-card part, and only between runs.
    if self.cfg.part != Part::Part2 || self.phase != Phase::Idle || self.degraded.is_some() {
      return vec![];
    }
    self.show_new_topic_card(rng)
  }

  fn on_tick(&mut self) -> Vec<Effect> {
    if !self.in_countdown() {
      return vec![];
    }
    self.remaining -= 1;
    let mut fx = vec![Effect::Timer { remaining: self.remaining }];
    if self.remaining > 0 {
      return fx;
    }
    match self.phase {
      Phase::Preparation => {
        self.phase = Phase::Ready;
        self.remaining = self.cfg.ready_secs;
        fx.push(Effect::Timer { remaining: self.remaining });
        fx.push(Effect::Status { text: "Get ready to speak... Recording will start in...".into() });
      }
      Phase::Ready => {
        self.phase = Phase::Listening;
        self.remaining = self.cfg.speaking_secs;
        self.meter.start();
        fx.push(Effect::Timer { remaining: self.remaining });
        fx.push(Effect::StartCapture { continuous: true });
        fx.push(Effect::StartMeter);
        fx.push(Effect::Status { text: "Speaking time. Please start speaking now.".into() });
      }
      Phase::Listening => {
        info!(target: "session", "Speaking time is up; stopping capture");
        fx.extend(self.request_stop());
      }
      _ => {}
    }
    fx
  }

  fn on_stop(&mut self) -> Vec<Effect> {
    match self.phase {
      Phase::Listening => {
        let mut fx = self.request_stop();
        if !self.cfg.timed {
          fx.push(Effect::Status { text: "Processing your answer...".into() });
          fx.push(Effect::Controls { next: false, start: false, stop: false, new_topic: false });
        }
        fx
      }
      _ => {
        debug!(target: "session", phase = ?self.phase, "Stop ignored in this phase");
        vec![]
      }
    }
  }

  /// Request capture shutdown. The attempt finalizes when the recognizer's
  /// end event arrives in `Finalizing`.
  fn request_stop(&mut self) -> Vec<Effect> {
    self.phase = Phase::Finalizing;
    self.meter.stop();
    let mut fx = vec![Effect::StopCapture, Effect::StopMeter];
    if self.cfg.timed {
      fx.push(Effect::Status { text: "Recording finished. Getting assessment...".into() });
    }
    fx
  }

  fn on_recognizer_result(&mut self, text: &str, is_final: bool) -> Vec<Effect> {
    if !matches!(self.phase, Phase::Listening | Phase::Finalizing) {
      debug!(target: "session", phase = ?self.phase, "Recognizer result outside capture; ignored");
      return vec![];
    }
    self.transcript.push(text, is_final);
    vec![Effect::Transcript { text: self.transcript.current() }]
  }

  fn on_recognizer_ended(&mut self) -> Vec<Effect> {
    match self.phase {
      // Premature end while a timed run is still speaking: restart capture.
      Phase::Listening if self.cfg.timed => {
        info!(target: "session", "Recognizer stopped prematurely; restarting");
        vec![Effect::RestartCapture]
      }
      // Untimed parts treat a spontaneous end like a stop.
      Phase::Listening => {
        self.meter.stop();
        let mut fx = vec![Effect::StopMeter];
        fx.extend(self.finalize_attempt());
        fx
      }
      Phase::Finalizing => self.finalize_attempt(),
      _ => {
        // Double-fire after a manual stop already finalized: ignore.
        debug!(target: "session", phase = ?self.phase, "Recognizer end event ignored");
        vec![]
      }
    }
  }

  fn finalize_attempt(&mut self) -> Vec<Effect> {
    let transcript = self.transcript.take();
    if transcript.is_empty() {
      info!(target: "session", part = self.cfg.part.as_str(), "No speech detected; skipping assessment");
      self.phase = Phase::Idle;
      let status = match self.cfg.part {
        Part::Part2 => "No speech detected. Ready for a new practice session.",
        _ => "No speech detected. Press 'Next Question' to continue.",
      };
      return vec![Effect::Status { text: status.into() }, self.idle_controls()];
    }

    if self.cfg.rephrase_detection && wants_rephrase(&transcript) {
      info!(target: "session", "Rephrase trigger detected; bypassing assessment");
      self.phase = Phase::Rephrasing;
      return vec![
        Effect::Status { text: "Rewording the question for you...".into() },
        Effect::Rephrase { question: self.question_text.clone() },
      ];
    }

    self.phase = Phase::Assessing;
    vec![
      Effect::Status { text: "Getting your assessment...".into() },
      Effect::Assess { question: self.question_text.clone(), transcript },
    ]
  }

  fn on_assessment_ready(&mut self, text: String) -> Vec<Effect> {
    if self.phase != Phase::Assessing {
      debug!(target: "session", phase = ?self.phase, "Assessment result ignored");
      return vec![];
    }
    self.phase = Phase::Idle;
    let mut fx = vec![Effect::ShowAssessment { text }];
    fx.extend(self.post_attempt_effects(None));
    fx
  }

  fn on_assessment_failed(&mut self, message: String) -> Vec<Effect> {
    if self.phase != Phase::Assessing {
      debug!(target: "session", phase = ?self.phase, "Assessment failure ignored");
      return vec![];
    }
    self.phase = Phase::Idle;
    let mut fx = vec![Effect::ReportError { message }];
    fx.extend(self.post_attempt_effects(Some("Failed to get assessment.")));
    fx
  }

  /// Controls and status once an attempt has fully resolved. The question
  /// index is never touched here: a failed assessment retries the same slot.
  fn post_attempt_effects(&mut self, error_note: Option<&str>) -> Vec<Effect> {
    let mut fx = Vec::new();
    match self.cfg.part {
      Part::Part2 => {
        fx.push(Effect::Status {
          text: error_note.map(|e| e.to_string()).unwrap_or_else(|| "Ready to begin.".into()),
        });
      }
      _ => {
        let topic_done = self
          .current_topic
          .as_ref()
          .map(|t| self.question_index >= t.items.len())
          .unwrap_or(false);
        if self.cfg.part == Part::Part3 && topic_done {
          fx.push(Effect::NextLabel { text: "Start New Topic".into() });
          fx.push(Effect::Status {
            text: "You've completed this topic! Press 'Start New Topic' for the next one.".into(),
          });
        } else {
          let text = match error_note {
            Some(e) => format!("{} Press 'Next Question' to continue.", e),
            None => "Assessment complete. Press 'Next Question' for the next one.".into(),
          };
          fx.push(Effect::Status { text });
        }
      }
    }
    fx.push(self.idle_controls());
    fx
  }

  fn on_rephrase_ready(&mut self, text: String) -> Vec<Effect> {
    if self.phase != Phase::Rephrasing {
      debug!(target: "session", phase = ?self.phase, "Rephrase result ignored");
      return vec![];
    }
    // The rephrased text replaces the stored question and is spoken again;
    // the question slot is not consumed.
    self.question_text = text.clone();
    self.phase = Phase::QuestionPlaying;
    let (topic, total) = self
      .current_topic
      .as_ref()
      .map(|t| (t.name.clone(), t.items.len()))
      .unwrap_or_default();
    vec![
      Effect::ShowQuestion { topic, number: self.question_index, total, text: text.clone() },
      Effect::ClearTranscript,
      Effect::Status { text: "Here is the question rephrased. Please try again.".into() },
      Effect::Speak { text },
    ]
  }

  fn on_rephrase_failed(&mut self, message: String) -> Vec<Effect> {
    if self.phase != Phase::Rephrasing {
      return vec![];
    }
    self.phase = Phase::Idle;
    vec![
      Effect::ReportError { message },
      Effect::Status { text: "Failed to rephrase. Press 'Next Question' to continue.".into() },
      self.idle_controls(),
    ]
  }

  fn on_recognizer_error(&mut self, code: &str) -> Vec<Effect> {
    warn!(target: "session", %code, "Speech recognition error");
    self.meter.stop();
    self.transcript.clear();
    self.phase = Phase::Idle;
    let mut fx = vec![
      Effect::StopCapture,
      Effect::StopMeter,
      Effect::ReportError { message: format!("Speech recognition error: {}", code) },
    ];
    if self.cfg.timed {
      self.remaining = 0;
      fx.push(Effect::Timer { remaining: 0 });
    }
    fx.push(Effect::Status {
      text: format!("Error: {}. Please ensure microphone access is granted.", code),
    });
    fx.push(self.idle_controls());
    fx
  }

  fn idle_controls(&self) -> Effect {
    match self.cfg.part {
      Part::Part2 => Effect::Controls { next: false, start: true, stop: false, new_topic: true },
      _ => Effect::Controls { next: true, start: false, stop: false, new_topic: false },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Durations, ExhaustionPolicy, PartConfig};
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn rng() -> StdRng {
    StdRng::seed_from_u64(99)
  }

  fn caps_ok() -> Capabilities {
    Capabilities { speech_recognition: true, microphone: true }
  }

  fn topic(name: &str, items: &[&str]) -> Topic {
    Topic { name: name.into(), items: items.iter().map(|s| s.to_string()).collect() }
  }

  fn part1_session(topics: Vec<Topic>) -> Session {
    let cfg = PartConfig::for_part(Part::Part1, Durations::default());
    Session::new(cfg, TopicBank::new(topics, ExhaustionPolicy::Terminate))
  }

  fn part3_session(topics: Vec<Topic>) -> Session {
    let cfg = PartConfig::for_part(Part::Part3, Durations::default());
    Session::new(cfg, TopicBank::new(topics, ExhaustionPolicy::Reshuffle))
  }

  fn part2_session(topics: Vec<Topic>) -> Session {
    let cfg = PartConfig::for_part(Part::Part2, Durations::default());
    Session::new(cfg, TopicBank::new(topics, ExhaustionPolicy::Reshuffle))
  }

  fn has_assess(fx: &[Effect]) -> Option<(String, String)> {
    fx.iter().find_map(|e| match e {
      Effect::Assess { question, transcript } => Some((question.clone(), transcript.clone())),
      _ => None,
    })
  }

  fn controls(fx: &[Effect]) -> Option<(bool, bool, bool, bool)> {
    fx.iter().rev().find_map(|e| match e {
      Effect::Controls { next, start, stop, new_topic } => Some((*next, *start, *stop, *new_topic)),
      _ => None,
    })
  }

  /// Drive a part 1/3 session to the point where Start is enabled.
  fn play_question(s: &mut Session, rng: &mut StdRng) {
    let fx = s.handle(Event::Next, rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::Speak { .. })));
    assert_eq!(s.phase(), Phase::QuestionPlaying);
    let fx = s.handle(Event::PlaybackFinished, rng);
    assert_eq!(s.phase(), Phase::AwaitingStart);
    assert_eq!(controls(&fx), Some((false, true, false, false)));
  }

  #[test]
  fn single_topic_scenario_issues_one_assessment() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("Travel", &["Do you like to travel?"])]);
    s.start_effects(&mut rng);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);

    play_question(&mut s, &mut rng);
    assert_eq!(s.question_text(), "Do you like to travel?");

    let fx = s.handle(Event::Start, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::StartCapture { continuous: false })));
    assert!(fx.iter().any(|e| matches!(e, Effect::StartMeter)));
    assert_eq!(s.phase(), Phase::Listening);

    s.handle(Event::RecognizerResult { text: "Yes I do".into(), is_final: true }, &mut rng);
    let fx = s.handle(Event::Stop, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::StopCapture)));
    assert_eq!(s.phase(), Phase::Finalizing);

    let fx = s.handle(Event::RecognizerEnded, &mut rng);
    let (question, transcript) = has_assess(&fx).expect("exactly one assessment dispatched");
    assert_eq!(question, "Do you like to travel?");
    assert_eq!(transcript, "Yes I do");
    assert_eq!(s.phase(), Phase::Assessing);

    // A second end event (the double-fire race) changes nothing.
    let fx = s.handle(Event::RecognizerEnded, &mut rng);
    assert!(fx.is_empty());

    let fx = s.handle(Event::AssessmentReady { text: "Overall Band Score: 7.0".into() }, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::ShowAssessment { .. })));
    assert_eq!(controls(&fx), Some((true, false, false, false)));
    assert_eq!(s.phase(), Phase::Idle);
  }

  #[test]
  fn empty_transcript_never_assesses() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("Travel", &["Q1?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    play_question(&mut s, &mut rng);
    s.handle(Event::Start, &mut rng);
    s.handle(Event::Stop, &mut rng);
    let fx = s.handle(Event::RecognizerEnded, &mut rng);
    assert!(has_assess(&fx).is_none());
    assert!(fx.iter().any(|e| matches!(e, Effect::Status { text } if text.contains("No speech"))));
    assert_eq!(controls(&fx), Some((true, false, false, false)));
    assert_eq!(s.phase(), Phase::Idle);
  }

  #[test]
  fn start_is_rejected_until_playback_finishes_and_while_assessing() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("T", &["Q1?", "Q2?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);

    // Not before a question was played.
    assert!(s.handle(Event::Start, &mut rng).is_empty());

    s.handle(Event::Next, &mut rng);
    // Not while the question is being read.
    assert!(s.handle(Event::Start, &mut rng).is_empty());

    s.handle(Event::PlaybackFinished, &mut rng);
    s.handle(Event::Start, &mut rng);
    s.handle(Event::RecognizerResult { text: "answer".into(), is_final: true }, &mut rng);
    s.handle(Event::Stop, &mut rng);
    s.handle(Event::RecognizerEnded, &mut rng);
    assert_eq!(s.phase(), Phase::Assessing);

    // Invariant: no new recording while assessment is outstanding.
    assert!(s.handle(Event::Start, &mut rng).is_empty());
    assert!(s.handle(Event::Next, &mut rng).is_empty());
  }

  #[test]
  fn part1_terminates_when_all_topics_are_used() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("Only", &["Q1?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    play_question(&mut s, &mut rng);

    // Skip the attempt: recognizer ends with no speech, back to Idle.
    s.handle(Event::Start, &mut rng);
    s.handle(Event::Stop, &mut rng);
    s.handle(Event::RecognizerEnded, &mut rng);

    let fx = s.handle(Event::Next, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::Complete)));
    assert_eq!(controls(&fx), Some((false, false, false, false)));
    assert_eq!(s.phase(), Phase::Complete);
    // Terminal: further input is dead.
    assert!(s.handle(Event::Next, &mut rng).is_empty());
  }

  #[test]
  fn assessment_failure_reenables_next_and_keeps_the_index() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("T", &["Q1?", "Q2?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    play_question(&mut s, &mut rng);
    s.handle(Event::Start, &mut rng);
    s.handle(Event::RecognizerResult { text: "my answer".into(), is_final: true }, &mut rng);
    s.handle(Event::Stop, &mut rng);
    s.handle(Event::RecognizerEnded, &mut rng);
    let idx = s.question_index();

    let fx = s.handle(Event::AssessmentFailed { message: "Ollama HTTP 500: boom".into() }, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::ReportError { .. })));
    assert_eq!(controls(&fx), Some((true, false, false, false)));
    assert_eq!(s.question_index(), idx);
    assert_eq!(s.phase(), Phase::Idle);
  }

  #[test]
  fn part3_rephrase_path_bypasses_assessment_and_keeps_the_slot() {
    let mut rng = rng();
    let mut s = part3_session(vec![topic("Tourism", &["Why do people travel?", "Q2?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    play_question(&mut s, &mut rng);
    let idx = s.question_index();

    s.handle(Event::Start, &mut rng);
    s.handle(
      Event::RecognizerResult { text: "Sorry, can you REPEAT that please".into(), is_final: true },
      &mut rng,
    );
    s.handle(Event::Stop, &mut rng);
    let fx = s.handle(Event::RecognizerEnded, &mut rng);
    assert!(has_assess(&fx).is_none());
    let rephrase_q = fx.iter().find_map(|e| match e {
      Effect::Rephrase { question } => Some(question.clone()),
      _ => None,
    });
    assert_eq!(rephrase_q.as_deref(), Some("Why do people travel?"));
    assert_eq!(s.phase(), Phase::Rephrasing);

    let fx = s.handle(
      Event::RephraseReady { text: "What makes people want to travel?".into() },
      &mut rng,
    );
    assert!(fx.iter().any(
      |e| matches!(e, Effect::Speak { text } if text == "What makes people want to travel?")
    ));
    assert_eq!(s.phase(), Phase::QuestionPlaying);
    assert_eq!(s.question_index(), idx, "question slot not consumed");
    assert_eq!(s.question_text(), "What makes people want to travel?");

    // The replayed question loops back to AwaitingStart.
    let fx = s.handle(Event::PlaybackFinished, &mut rng);
    assert_eq!(controls(&fx), Some((false, true, false, false)));
  }

  #[test]
  fn part3_labels_the_last_question_of_a_topic() {
    let mut rng = rng();
    let mut s = part3_session(vec![topic("T", &["Only question?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    play_question(&mut s, &mut rng);
    s.handle(Event::Start, &mut rng);
    s.handle(Event::RecognizerResult { text: "Because.".into(), is_final: true }, &mut rng);
    s.handle(Event::Stop, &mut rng);
    s.handle(Event::RecognizerEnded, &mut rng);
    let fx = s.handle(Event::AssessmentReady { text: "ok".into() }, &mut rng);
    assert!(fx.iter().any(
      |e| matches!(e, Effect::NextLabel { text } if text == "Start New Topic")
    ));
  }

  #[test]
  fn part2_countdowns_advance_deterministically() {
    let mut rng = rng();
    let mut s = part2_session(vec![topic("Describe a place", &["where it is"])]);
    s.start_effects(&mut rng);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);

    let fx = s.handle(Event::Start, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::ShowTopicCard { .. })));
    assert_eq!(s.phase(), Phase::Preparation);
    assert_eq!(s.remaining(), 60);

    // Exactly 60 ticks reach zero and advance to Ready exactly once.
    for _ in 0..59 {
      s.handle(Event::Tick, &mut rng);
      assert_eq!(s.phase(), Phase::Preparation);
    }
    let fx = s.handle(Event::Tick, &mut rng);
    assert_eq!(s.phase(), Phase::Ready);
    assert_eq!(s.remaining(), 10);
    assert!(fx.iter().any(|e| matches!(e, Effect::Timer { remaining: 0 })));

    for _ in 0..9 {
      s.handle(Event::Tick, &mut rng);
    }
    let fx = s.handle(Event::Tick, &mut rng);
    assert_eq!(s.phase(), Phase::Listening);
    assert_eq!(s.remaining(), 120);
    assert!(fx.iter().any(|e| matches!(e, Effect::StartCapture { continuous: true })));

    // Speaking window runs out: capture stop requested, then the end event
    // finalizes into assessment.
    s.handle(Event::RecognizerResult { text: "I would describe...".into(), is_final: true }, &mut rng);
    for _ in 0..119 {
      s.handle(Event::Tick, &mut rng);
    }
    let fx = s.handle(Event::Tick, &mut rng);
    assert_eq!(s.phase(), Phase::Finalizing);
    assert!(fx.iter().any(|e| matches!(e, Effect::StopCapture)));

    let fx = s.handle(Event::RecognizerEnded, &mut rng);
    assert!(has_assess(&fx).is_some());
    // Ticks no longer do anything.
    assert!(s.handle(Event::Tick, &mut rng).is_empty());

    let fx = s.handle(Event::AssessmentReady { text: "Band 6.5".into() }, &mut rng);
    assert_eq!(controls(&fx), Some((false, true, false, true)));
    assert_eq!(s.phase(), Phase::Idle);
  }

  #[test]
  fn part2_premature_recognizer_end_restarts_capture() {
    let mut rng = rng();
    let mut s = part2_session(vec![topic("T", &["cue"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    s.handle(Event::Start, &mut rng);
    for _ in 0..70 {
      s.handle(Event::Tick, &mut rng);
    }
    assert_eq!(s.phase(), Phase::Listening);

    let fx = s.handle(Event::RecognizerEnded, &mut rng);
    assert_eq!(fx, vec![Effect::RestartCapture]);
    assert_eq!(s.phase(), Phase::Listening);

    // After a manual stop the end event finalizes instead of restarting,
    // and any duplicate end event is dropped.
    s.handle(Event::RecognizerResult { text: "some speech".into(), is_final: true }, &mut rng);
    s.handle(Event::Stop, &mut rng);
    assert_eq!(s.phase(), Phase::Finalizing);
    let fx = s.handle(Event::RecognizerEnded, &mut rng);
    assert!(has_assess(&fx).is_some());
    assert!(s.handle(Event::RecognizerEnded, &mut rng).is_empty());
  }

  #[test]
  fn part2_new_topic_only_when_idle() {
    let mut rng = rng();
    let mut s = part2_session(vec![topic("A", &["a"]), topic("B", &["b"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    let fx = s.handle(Event::NewTopic, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::ShowTopicCard { .. })));

    s.handle(Event::Start, &mut rng);
    assert_eq!(s.phase(), Phase::Preparation);
    assert!(s.handle(Event::NewTopic, &mut rng).is_empty());
  }

  #[test]
  fn degraded_capabilities_disable_everything() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("T", &["Q?"])]);
    let fx = s.handle(
      Event::Capabilities(Capabilities { speech_recognition: false, microphone: true }),
      &mut rng,
    );
    assert_eq!(controls(&fx), Some((false, false, false, false)));
    assert!(s.handle(Event::Next, &mut rng).is_empty());
    assert!(s.handle(Event::Start, &mut rng).is_empty());
  }

  #[test]
  fn unavailable_session_reports_and_ignores_events() {
    let cfg = PartConfig::for_part(Part::Part1, Durations::default());
    let mut s = Session::unavailable(cfg, "Failed to load speaking topics.".into());
    let mut rng = rng();
    let fx = s.start_effects(&mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::Status { text } if text.contains("Failed"))));
    assert_eq!(controls(&fx), Some((false, false, false, false)));
    assert!(s.handle(Event::Next, &mut rng).is_empty());
  }

  #[test]
  fn recognizer_error_surfaces_and_recovers() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("T", &["Q?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    play_question(&mut s, &mut rng);
    s.handle(Event::Start, &mut rng);

    let fx = s.handle(Event::RecognizerError { code: "not-allowed".into() }, &mut rng);
    assert!(fx.iter().any(
      |e| matches!(e, Effect::ReportError { message } if message.contains("not-allowed"))
    ));
    assert_eq!(controls(&fx), Some((true, false, false, false)));
    assert_eq!(s.phase(), Phase::Idle);
  }

  #[test]
  fn rephrase_trigger_matching_is_case_insensitive() {
    assert!(wants_rephrase("Could you REPHRASE the question"));
    assert!(wants_rephrase("sorry, what was the question?"));
    assert!(!wants_rephrase("I understand the question perfectly"));
  }

  #[test]
  fn meter_frames_only_count_while_listening() {
    let mut rng = rng();
    let mut s = part1_session(vec![topic("T", &["Q?"])]);
    s.handle(Event::Capabilities(caps_ok()), &mut rng);
    assert_eq!(s.meter_frame(&[50u8; 16]), None);

    play_question(&mut s, &mut rng);
    s.handle(Event::Start, &mut rng);
    assert!(s.meter_frame(&[50u8; 16]).is_some());

    s.handle(Event::Stop, &mut rng);
    assert_eq!(s.meter_frame(&[50u8; 16]), None);
  }
}
