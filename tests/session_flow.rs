//! End-to-end flows through the public API: a full multi-question practice
//! run, topic reshuffling across runs, and the assessment error paths.

use rand::rngs::StdRng;
use rand::SeedableRng;

use speaking_backend::domain::{Durations, ExhaustionPolicy, Part, PartConfig, Topic};
use speaking_backend::logic::{run_assessment, run_rephrase};
use speaking_backend::recognizer::Capabilities;
use speaking_backend::session::{Effect, Event, Phase, Session};
use speaking_backend::state::AppState;
use speaking_backend::topics::TopicBank;

fn topic(name: &str, items: &[&str]) -> Topic {
  Topic { name: name.into(), items: items.iter().map(|s| s.to_string()).collect() }
}

fn caps_ok() -> Capabilities {
  Capabilities { speech_recognition: true, microphone: true }
}

/// Play the current question and answer it with `answer`, through playback,
/// capture, stop, and the recognizer end event. Returns the final effects.
fn answer_question(s: &mut Session, rng: &mut StdRng, answer: &str) -> Vec<Effect> {
  s.handle(Event::Next, rng);
  s.handle(Event::PlaybackFinished, rng);
  s.handle(Event::Start, rng);
  s.handle(Event::RecognizerResult { text: answer.into(), is_final: true }, rng);
  s.handle(Event::Stop, rng);
  s.handle(Event::RecognizerEnded, rng)
}

#[test]
fn full_part1_run_walks_every_question_then_completes() {
  let mut rng = StdRng::seed_from_u64(7);
  let cfg = PartConfig::for_part(Part::Part1, Durations::default());
  let bank = TopicBank::new(
    vec![topic("Hometown", &["Where is your hometown?", "What do you like about it?"])],
    ExhaustionPolicy::Terminate,
  );
  let mut s = Session::new(cfg, bank);
  s.start_effects(&mut rng);
  s.handle(Event::Capabilities(caps_ok()), &mut rng);

  for answer in ["It is a small coastal town.", "I like the harbour."] {
    let fx = answer_question(&mut s, &mut rng, answer);
    let dispatched = fx.iter().find_map(|e| match e {
      Effect::Assess { question, transcript } => Some((question.clone(), transcript.clone())),
      _ => None,
    });
    let (_, transcript) = dispatched.expect("assessment dispatched for a non-empty answer");
    assert_eq!(transcript, answer);
    let fx = s.handle(Event::AssessmentReady { text: "Overall Band Score: 6.5".into() }, &mut rng);
    assert!(fx.iter().any(|e| matches!(e, Effect::ShowAssessment { .. })));
  }

  // Only topic used up under the terminate policy: the next press ends it.
  let fx = s.handle(Event::Next, &mut rng);
  assert!(fx.iter().any(|e| matches!(e, Effect::Complete)));
  assert_eq!(s.phase(), Phase::Complete);
}

#[test]
fn part3_reshuffles_instead_of_completing() {
  let mut rng = StdRng::seed_from_u64(11);
  let cfg = PartConfig::for_part(Part::Part3, Durations::default());
  let bank = TopicBank::new(vec![topic("Tourism", &["Why do people travel?"])], ExhaustionPolicy::Reshuffle);
  let mut s = Session::new(cfg, bank);
  s.handle(Event::Capabilities(caps_ok()), &mut rng);

  answer_question(&mut s, &mut rng, "For many reasons.");
  let fx = s.handle(Event::AssessmentReady { text: "ok".into() }, &mut rng);
  assert!(fx.iter().any(|e| matches!(e, Effect::NextLabel { text } if text == "Start New Topic")));

  // The pool was exhausted, but the reshuffle policy refills it.
  let fx = s.handle(Event::Next, &mut rng);
  assert!(!fx.iter().any(|e| matches!(e, Effect::Complete)));
  assert!(fx.iter().any(|e| matches!(e, Effect::Speak { .. })));
  assert_eq!(s.phase(), Phase::QuestionPlaying);
}

#[test]
fn part2_full_timed_run_from_cue_card_to_assessment() {
  let mut rng = StdRng::seed_from_u64(3);
  let cfg = PartConfig::for_part(Part::Part2, Durations::default());
  let bank = TopicBank::new(
    vec![topic("Describe a book you enjoyed", &["what it was about", "why you enjoyed it"])],
    ExhaustionPolicy::Reshuffle,
  );
  let mut s = Session::new(cfg, bank);
  let fx = s.start_effects(&mut rng);
  assert!(fx.iter().any(|e| matches!(e, Effect::ShowTopicCard { .. })));
  s.handle(Event::Capabilities(caps_ok()), &mut rng);

  s.handle(Event::Start, &mut rng);
  // Preparation (60) then ready (10) then the speaking window opens.
  for _ in 0..70 {
    s.handle(Event::Tick, &mut rng);
  }
  assert_eq!(s.phase(), Phase::Listening);
  s.handle(Event::RecognizerResult { text: "The book I want to describe is...".into(), is_final: true }, &mut rng);

  // Early manual stop, then the recognizer confirms.
  s.handle(Event::Stop, &mut rng);
  let fx = s.handle(Event::RecognizerEnded, &mut rng);
  assert!(fx.iter().any(|e| matches!(e, Effect::Assess { .. })));

  let fx = s.handle(Event::AssessmentReady { text: "Band 7".into() }, &mut rng);
  assert!(fx.iter().any(|e| matches!(e, Effect::ShowAssessment { text } if text == "Band 7")));
  assert_eq!(s.phase(), Phase::Idle);
}

#[tokio::test]
async fn assessment_errors_map_to_user_facing_messages() {
  // Disabled integration refuses up front.
  std::env::set_var("OLLAMA_DISABLED", "1");
  let state = AppState::new();
  let err = run_assessment(&state, Part::Part1, "Q?", "an answer").await.unwrap_err();
  assert!(err.contains("unavailable"));
  let err = run_rephrase(&state, "Q?").await.unwrap_err();
  assert!(err.contains("unavailable"));

  // An unreachable server maps to the connection-help message.
  std::env::remove_var("OLLAMA_DISABLED");
  std::env::set_var("OLLAMA_BASE_URL", "http://127.0.0.1:9");
  let state = AppState::new();
  let err = run_assessment(&state, Part::Part3, "Q?", "an answer").await.unwrap_err();
  assert!(err.contains("Error connecting to Ollama"));
  std::env::remove_var("OLLAMA_BASE_URL");
}
