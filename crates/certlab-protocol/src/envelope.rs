//! Envelope types and the JSON codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Per-type payload of an envelope.
///
/// The tag set is closed: anything outside it fails to decode. The
/// `terminal-*` aliases accept frames from executors still speaking the
/// older tag names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Payload {
    /// Session handshake, sent first on every (re)connect.
    #[serde(rename_all = "camelCase")]
    Init { keep_alive: bool },

    /// A discrete line command (e.g. "kubectl get nodes").
    #[serde(alias = "terminal-input", rename_all = "camelCase")]
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keep_session: Option<bool>,
    },

    /// A raw keystroke or byte sequence for a PTY-backed executor.
    Key { key: String },

    /// Terminal dimensions changed.
    Resize { cols: u16, rows: u16 },

    /// Heartbeat probe.
    Ping,

    /// Command output from the executor.
    #[serde(alias = "terminal-output")]
    Output { data: String },

    /// Command error output from the executor.
    #[serde(alias = "terminal-error")]
    Error { data: String },

    /// Informational message from the executor (banners, notices).
    System { data: String },

    /// Heartbeat acknowledgement.
    Pong,

    /// The executor finished running a command.
    #[serde(rename_all = "camelCase")]
    CommandComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    /// The executor resumed a previously known session.
    SessionRestored,
}

impl Payload {
    /// The wire tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::Command { .. } => "command",
            Payload::Key { .. } => "key",
            Payload::Resize { .. } => "resize",
            Payload::Ping => "ping",
            Payload::Output { .. } => "output",
            Payload::Error { .. } => "error",
            Payload::System { .. } => "system",
            Payload::Pong => "pong",
            Payload::CommandComplete { .. } => "command-complete",
            Payload::SessionRestored => "session-restored",
        }
    }
}

/// One discrete message unit exchanged over the transport.
///
/// Outbound envelopes always carry the id of the session that sent them and
/// a timestamp. Inbound envelopes may omit both, so they decode leniently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    fn outbound(session_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Some(Utc::now()),
            payload,
        }
    }

    /// Session handshake envelope.
    pub fn init(session_id: impl Into<String>, keep_alive: bool) -> Self {
        Self::outbound(session_id, Payload::Init { keep_alive })
    }

    /// Line-command envelope. `keep_session` asks the executor to keep the
    /// remote shell alive between commands.
    pub fn command(session_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self::outbound(
            session_id,
            Payload::Command {
                command: command.into(),
                keep_session: Some(true),
            },
        )
    }

    /// Raw key-input envelope.
    pub fn key(session_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::outbound(session_id, Payload::Key { key: key.into() })
    }

    /// Resize envelope.
    pub fn resize(session_id: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self::outbound(session_id, Payload::Resize { cols, rows })
    }

    /// Heartbeat envelope.
    pub fn ping(session_id: impl Into<String>) -> Self {
        Self::outbound(session_id, Payload::Ping)
    }

    /// Whether this is a heartbeat acknowledgement.
    pub fn is_pong(&self) -> bool {
        matches!(self.payload, Payload::Pong)
    }

    /// Serialize to one JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        if self.session_id.is_empty() {
            return Err(ProtocolError::EmptySessionId);
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one JSON text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn round_trip(envelope: Envelope) {
        let frame = envelope.encode().unwrap();
        let decoded = Envelope::decode(&frame).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_round_trip_outbound_types() {
        round_trip(Envelope::init("s1", true));
        round_trip(Envelope::command("s1", "kubectl get nodes"));
        round_trip(Envelope::key("s1", "\u{7f}"));
        round_trip(Envelope::resize("s1", 120, 40));
        round_trip(Envelope::ping("s1"));
    }

    #[test]
    fn test_round_trip_inbound_types() {
        for payload in [
            Payload::Output {
                data: "NAME   STATUS".to_string(),
            },
            Payload::Error {
                data: "error: unknown flag".to_string(),
            },
            Payload::System {
                data: "session expires in 5m".to_string(),
            },
            Payload::Pong,
            Payload::CommandComplete { exit_code: Some(0) },
            Payload::SessionRestored,
        ] {
            round_trip(Envelope {
                session_id: "s1".to_string(),
                timestamp: Some(Utc::now()),
                payload,
            });
        }
    }

    #[test]
    fn test_wire_shape() {
        let frame = Envelope::command("s1", "kubectl get pods").encode().unwrap();
        let json: Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(json["type"], "command");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["command"], "kubectl get pods");
        assert_eq!(json["keepSession"], true);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_kebab_case_tags() {
        let envelope = Envelope {
            session_id: "s1".to_string(),
            timestamp: None,
            payload: Payload::CommandComplete { exit_code: Some(1) },
        };
        let frame = envelope.encode().unwrap();
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "command-complete");
        assert_eq!(json["exitCode"], 1);
    }

    #[test]
    fn test_legacy_aliases_accepted() {
        let input: Envelope =
            Envelope::decode(r#"{"type":"terminal-input","sessionId":"s1","command":"ls"}"#)
                .unwrap();
        assert!(matches!(input.payload, Payload::Command { .. }));

        let output: Envelope =
            Envelope::decode(r#"{"type":"terminal-output","sessionId":"s1","data":"ok"}"#).unwrap();
        assert!(matches!(output.payload, Payload::Output { .. }));

        let error: Envelope =
            Envelope::decode(r#"{"type":"terminal-error","sessionId":"s1","data":"no"}"#).unwrap();
        assert!(matches!(error.payload, Payload::Error { .. }));
    }

    #[test]
    fn test_decode_is_lenient_about_optional_fields() {
        // Inbound frames may omit sessionId and timestamp entirely.
        let envelope = Envelope::decode(r#"{"type":"pong"}"#).unwrap();
        assert!(envelope.is_pong());
        assert!(envelope.session_id.is_empty());
        assert!(envelope.timestamp.is_none());

        // Unknown extra fields from the executor are ignored.
        let envelope =
            Envelope::decode(r#"{"type":"output","data":"hi","node":"master01"}"#).unwrap();
        assert!(matches!(envelope.payload, Payload::Output { .. }));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(Envelope::decode(r#"{"type":"shutdown","sessionId":"s1"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_frame() {
        assert!(Envelope::decode("not json at all").is_err());
        assert!(Envelope::decode(r#"{"sessionId":"s1"}"#).is_err());
    }

    #[test]
    fn test_encode_requires_session_id() {
        let envelope = Envelope {
            session_id: String::new(),
            timestamp: None,
            payload: Payload::Ping,
        };
        assert!(matches!(
            envelope.encode(),
            Err(ProtocolError::EmptySessionId)
        ));
    }
}
