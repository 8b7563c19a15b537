//! Loading practice configuration (prompts, countdown durations, topic file
//! paths) from TOML.
//!
//! See `PracticeConfig` and `Prompts` for the expected schema. Everything has
//! compiled-in defaults; the TOML file only overrides.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Durations;

/// The shared IELTS speaking band descriptors, one condensed block per
/// criterion. Embedded into every assessment prompt.
const BAND_DESCRIPTORS: &str = r#"**Assessment Criteria:**
**Fluency and Coherence:**
Band 9: Speaks fluently with only rare repetition or self-correction; any hesitation is content-related. Speaks coherently with fully appropriate cohesive features. Develops topics fully and appropriately.
Band 8: Speaks fluently with only occasional repetition or self-correction; hesitation is usually content-related. Develops topics coherently and appropriately.
Band 7: Speaks at length without noticeable effort or loss of coherence. May demonstrate language-related hesitation at times. Uses a range of connectives with some flexibility.
Band 6: Willing to speak at length, though may lose coherence at times due to occasional repetition or hesitation. Uses a range of connectives but not always appropriately.
Band 5: Usually maintains flow of speech but uses repetition, self correction and/or slow speech to keep going. May over-use certain connectives.
Band 4: Cannot respond without noticeable pauses and may speak slowly, with frequent repetition and self-correction.
Band 3: Speaks with long pauses. Has limited ability to link simple sentences. Gives only simple responses.
Band 2: Pauses lengthily before most words. Little communication possible.
Band 1: No communication possible. No rateable language.

**Lexical Resource:**
Band 9: Uses vocabulary with full flexibility and precision in all topics. Uses idiomatic language naturally and accurately.
Band 8: Uses a wide vocabulary readily and flexibly. Uses less common and idiomatic vocabulary skilfully, with occasional inaccuracies. Uses paraphrase effectively.
Band 7: Uses vocabulary flexibly to discuss a variety of topics. Uses some less common and idiomatic vocabulary. Uses paraphrase effectively.
Band 6: Has a wide enough vocabulary to discuss topics at length and make meaning clear in spite of inappropriacies. Generally paraphrases successfully.
Band 5: Manages to talk about familiar and unfamiliar topics but uses vocabulary with limited flexibility. Attempts to use paraphrase but with mixed success.
Band 4: Is able to talk about familiar topics but can only convey basic meaning on unfamiliar topics and makes frequent errors in word choice. Rarely attempts paraphrase.
Band 3: Uses simple vocabulary to convey personal information. Has insufficient vocabulary for less familiar topics.
Band 2: Only produces isolated words or memorised utterances.
Band 1: No communication possible. No rateable language.

**Grammatical Range and Accuracy:**
Band 9: Uses a full range of structures naturally and appropriately. Produces consistently accurate structures apart from 'slips'.
Band 8: Uses a wide range of structures flexibly. Produces a majority of error-free sentences with only very occasional inappropriacies or basic/non-systematic errors.
Band 7: Uses a range of complex structures with some flexibility. Frequently produces error-free sentences, though some grammatical mistakes persist.
Band 6: Uses a mix of simple and complex structures, but with limited flexibility. May make frequent mistakes with complex structures.
Band 5: Produces basic sentence forms with reasonable accuracy. Uses a limited range of more complex structures, but these usually contain errors.
Band 4: Produces basic sentence forms and some correct simple sentences but subordinate structures are rare. Errors are frequent.
Band 3: Attempts basic sentence forms but with limited success, or relies on memorised utterances. Makes numerous errors.
Band 2: Cannot produce basic sentence forms.
Band 1: No communication possible. No rateable language.

**Pronunciation:**
Band 9: Uses a full range of pronunciation features with precision and subtlety. Sustains flexible use of features throughout. Is effortless to understand.
Band 8: Uses a wide range of pronunciation features. Sustains flexible use of features, with only occasional lapses. Is easy to understand throughout; L1 accent has minimal effect on intelligibility.
Band 7: Shows all the positive features of Band 6 and some, but not all, of the positive features of Band 8.
Band 6: Uses a range of pronunciation features with mixed control. Can generally be understood throughout.
Band 5: Shows all features of band 4 and some, but not all the positive features of band 6.
Band 4: Uses a limited range of pronunciation features. Mispronunciations are frequent and cause some difficulty for the listener.
Band 3: Shows some of the features of band 2 and some, but not all, of the positive features of band 4.
Band 2: Speech is often unintelligible.
Band 1: No communication possible. No rateable language."#;

const OUTPUT_FORMAT: &str = r#"Your assessment must be formatted as follows, providing a score for each criterion and an overall band score. You must also provide specific, actionable advice for improvement based on the transcript.

**Assessment:**
**Fluency and Coherence:** [Band Score]
**Lexical Resource:** [Band Score]
**Grammatical Range and Accuracy:** [Band Score]
**Pronunciation:** [Band Score]
**Overall Band Score:** [Overall Score]

**Advice:**
[Detailed, specific advice on how to improve]"#;

const PART3_CRITERIA: &str = r#"**Part 3 Assessment Criteria:**
In Part 3, the user's answer should be a general discussion of the topic, avoiding personal examples.
When assessing the user's response, please evaluate the following:
- **Generalization:** Does the user discuss the topic in a general manner, rather than focusing on personal or family experiences?
- **Linking & Phrases:** Does the user use a range of linking words and phrases (e.g., "to begin with," "on the other hand," "in my country most people believe that...") to connect ideas and manage their speech? Are they avoiding overused or meaningless fillers like "um" and "like"?
- **Extension:** Is the answer well-extended, showing depth and detail?
- **Grammatical Range:** Does the user demonstrate a wide range of grammatical structures to express complex ideas?"#;

/// Top-level practice configuration accepted in TOML.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct PracticeConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub durations: Durations,
  #[serde(default)]
  pub topics: TopicFiles,
}

/// Optional per-part topic JSON files. A part without a configured file
/// falls back to the built-in seed topics.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct TopicFiles {
  #[serde(default)] pub part1: Option<String>,
  #[serde(default)] pub part2: Option<String>,
  #[serde(default)] pub part3: Option<String>,
}

/// Prompts used for assessment and rephrasing. Defaults carry the full IELTS
/// band descriptors; override in TOML to tune tone or criteria.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  /// Examiner guide for Part 1 answers (question + transcript).
  pub part1_rubric: String,
  /// Examiner guide for Part 2 long turns (transcript only).
  pub part2_rubric: String,
  /// Examiner guide for Part 3 discussion answers.
  pub part3_rubric: String,
  /// Appended to part1/part3 rubrics: carries {question} and {transcript}.
  pub assess_user_template: String,
  /// Appended to the part2 rubric: carries {transcript}.
  pub part2_user_template: String,
  /// Rephrase request: carries {question}.
  pub rephrase_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    let part1_rubric = format!(
      "You are an expert IELTS Speaking examiner. Your task is to provide a detailed assessment of a user's spoken answer based on the following criteria.\n\n{}\n\n**Evaluation Guidelines:**\n1. **Directness and Reason:** Check if the user's transcript directly answers the question and provides a reason to support their answer. State whether it does or not.\n2. **IELTS Assessment:** After checking for directness and reason, provide a detailed assessment of the transcript.\n\n{}",
      BAND_DESCRIPTORS, OUTPUT_FORMAT
    );
    let part2_rubric = format!(
      "You are an expert IELTS examiner. You are to assess a piece of spoken text based on the official IELTS speaking band descriptors. You should also check if the speaker has fully addressed the topic and answered the prompts correctly. If they did not, this should be reflected in the Fluency and Coherence score. At the very beginning of the response, provide a single, overall band score (e.g., \"Overall Band Score: 7.5\") followed by a new line. Then, provide specific, actionable feedback on how to improve in each of the four areas.\n\n{}",
      BAND_DESCRIPTORS
    );
    let part3_rubric = format!(
      "You are an expert IELTS Speaking examiner. Your task is to provide a detailed assessment of a user's spoken answer based on the following criteria.\n\n{}\n\n{}\n\n{}",
      PART3_CRITERIA, BAND_DESCRIPTORS, OUTPUT_FORMAT
    );
    Self {
      part1_rubric,
      part2_rubric,
      part3_rubric,
      assess_user_template: "Now, please assess the following transcript based on the user's answer to the question: \"{question}\"\n\nUser's transcript: \"{transcript}\"".into(),
      part2_user_template: "Based on the criteria above, please provide feedback on the following text: \"{transcript}\"".into(),
      rephrase_template: "Rephrase the following IELTS speaking question in a simpler way, without changing the core meaning. Do not add any new information. Just provide the rephrased question as a single sentence.\nOriginal question: \"{question}\"".into(),
    }
  }
}

/// Attempt to load `PracticeConfig` from PRACTICE_CONFIG_PATH. On any
/// parsing/IO error, returns None and the defaults apply.
pub fn load_practice_config_from_env() -> Option<PracticeConfig> {
  let path = std::env::var("PRACTICE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PracticeConfig>(&s) {
      Ok(cfg) => {
        info!(target: "speaking_backend", %path, "Loaded practice config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "speaking_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "speaking_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_prompts_carry_the_band_descriptors() {
    let p = Prompts::default();
    for rubric in [&p.part1_rubric, &p.part2_rubric, &p.part3_rubric] {
      assert!(rubric.contains("Fluency and Coherence"));
      assert!(rubric.contains("Band 9"));
    }
    assert!(p.part3_rubric.contains("Generalization"));
    assert!(p.assess_user_template.contains("{question}"));
    assert!(p.assess_user_template.contains("{transcript}"));
  }

  #[test]
  fn toml_overrides_merge_with_defaults() {
    let cfg: PracticeConfig = toml::from_str(
      r#"
        [durations]
        prep_secs = 5

        [topics]
        part2 = "./topics/topics.json"
      "#,
    )
    .expect("parse config");
    assert_eq!(cfg.durations.prep_secs, 5);
    assert_eq!(cfg.durations.speaking_secs, 120);
    assert_eq!(cfg.topics.part2.as_deref(), Some("./topics/topics.json"));
    assert!(cfg.topics.part1.is_none());
  }
}
