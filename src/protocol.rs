//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

/// Messages the client can send over WebSocket. The speech events mirror the
/// browser recognizer/synthesizer callbacks relayed by the page.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Open a practice session for one part ("part1" | "part2" | "part3").
    Start {
        part: String,
    },
    /// Platform capability report; gates the whole session.
    Capabilities {
        #[serde(rename = "speechRecognition")]
        speech_recognition: bool,
        microphone: bool,
    },
    NextQuestion,
    NewTopic,
    /// Speech synthesis finished reading the question.
    PlaybackFinished,
    StartAnswer,
    StopAnswer,
    RecognizerResult {
        text: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    RecognizerEnded,
    RecognizerError {
        code: String,
    },
    /// Raw analyser frame (byte frequency bins) for the level meter.
    MeterFrame {
        samples: Vec<u8>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        id: String,
        part: String,
    },
    Question {
        topic: String,
        number: usize,
        total: usize,
        text: String,
    },
    TopicCard {
        topic: String,
        prompts: Vec<String>,
    },
    NextLabel {
        text: String,
    },
    Speak {
        text: String,
    },
    Status {
        text: String,
    },
    Controls {
        next: bool,
        start: bool,
        stop: bool,
        #[serde(rename = "newTopic")]
        new_topic: bool,
    },
    Timer {
        remaining: u32,
    },
    ClearTranscript,
    Transcript {
        text: String,
    },
    StartCapture {
        continuous: bool,
    },
    StopCapture,
    RestartCapture,
    ShowMeter,
    HideMeter,
    MicLevel {
        level: u8,
    },
    Assessment {
        text: String,
    },
    Complete,
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct TopicQuery {
    pub part: Option<String>,
}

#[derive(Serialize)]
pub struct TopicOut {
    pub topic: String,
    pub items: Vec<String>,
}

#[derive(Deserialize)]
pub struct AssessIn {
    pub part: String,
    #[serde(default)]
    pub question: String,
    pub transcript: String,
}
#[derive(Serialize)]
pub struct AssessOut {
    pub assessment: String,
}

#[derive(Deserialize)]
pub struct RephraseIn {
    pub question: String,
}
#[derive(Serialize)]
pub struct RephraseOut {
    pub question: String,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let m: ClientWsMessage =
            serde_json::from_str(r#"{"type":"start","part":"part2"}"#).expect("parse");
        assert!(matches!(m, ClientWsMessage::Start { part } if part == "part2"));

        let m: ClientWsMessage = serde_json::from_str(
            r#"{"type":"recognizer_result","text":"Yes I do","isFinal":true}"#,
        )
        .expect("parse");
        assert!(matches!(m, ClientWsMessage::RecognizerResult { is_final: true, .. }));

        let m: ClientWsMessage = serde_json::from_str(
            r#"{"type":"capabilities","speechRecognition":true,"microphone":false}"#,
        )
        .expect("parse");
        assert!(matches!(m, ClientWsMessage::Capabilities { microphone: false, .. }));
    }

    #[test]
    fn server_messages_serialize_with_type_tag() {
        let v = serde_json::to_value(ServerWsMessage::Timer { remaining: 59 }).expect("json");
        assert_eq!(v["type"], "timer");
        assert_eq!(v["remaining"], 59);

        let v = serde_json::to_value(ServerWsMessage::Controls {
            next: true,
            start: false,
            stop: false,
            new_topic: false,
        })
        .expect("json");
        assert_eq!(v["type"], "controls");
        assert_eq!(v["newTopic"], false);
    }
}
