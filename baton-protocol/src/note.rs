use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Peer identity, displayed as `name@host`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId {
    pub name: String,
    pub host: String,
}

impl PeerId {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.host)
    }
}

impl FromStr for PeerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((name, host)) if !name.is_empty() && !host.is_empty() => {
                Ok(PeerId::new(name, host))
            }
            _ => Err(ProtocolError::MalformedNote(format!(
                "invalid peer id: {s}"
            ))),
        }
    }
}

/// Peer roles. Inspectors attach to the broker's management interface
/// instead of generating load, but are counted like any other peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
    Inspector,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
            Role::Inspector => f.write_str("inspector"),
        }
    }
}

/// Duration of one test round: wall-clock bounded or message-count bounded.
///
/// Serialized as a single-key map (`{"seconds": 30}`, `count: 100000`), the
/// one shape that reads the same in the JSON wire format and in YAML
/// profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DurationRepr", into = "DurationRepr")]
pub enum TestDuration {
    Seconds(u64),
    Count(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DurationRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
}

impl From<TestDuration> for DurationRepr {
    fn from(value: TestDuration) -> Self {
        match value {
            TestDuration::Seconds(secs) => DurationRepr {
                seconds: Some(secs),
                count: None,
            },
            TestDuration::Count(count) => DurationRepr {
                seconds: None,
                count: Some(count),
            },
        }
    }
}

impl TryFrom<DurationRepr> for TestDuration {
    type Error = String;

    fn try_from(repr: DurationRepr) -> Result<Self, Self::Error> {
        match (repr.seconds, repr.count) {
            (Some(secs), None) => Ok(TestDuration::Seconds(secs)),
            (None, Some(count)) => Ok(TestDuration::Count(count)),
            _ => Err("duration takes exactly one of `seconds` or `count`".into()),
        }
    }
}

/// Parameters pushed to the peers with a `Set` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "option", rename_all = "kebab-case")]
pub enum SetOption {
    BrokerUrl { url: String },
    MessageSize { size: u64 },
    Rate { rate: u64 },
    ParallelCount { count: u32 },
    Duration { value: TestDuration },
    FailConditionLatency { millis: u64 },
    LogLevel { level: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GetOption {
    DataServerAddress,
}

/// Where a transferred log file came from on the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogLocation {
    Any,
    LastSuccess,
    LastFailed,
}

/// Snapshot of a peer's counters, sent as the reply to a stats request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerStats {
    pub role: Role,
    pub child_count: u32,
    pub message_count: u64,
    pub rate: f64,
    pub latency_ms: f64,
    pub timestamp: u64,
}

/// Every kind of note on the wire, closed so dispatch is an exhaustive
/// match and adding a kind is a compile-time-checked change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NoteKind {
    // Requests, broadcast by the coordinator.
    PingRequest { sec: u64, usec: u64 },
    StatsRequest,
    StartRequest { inspector: Option<String> },
    StopRequest,
    SetRequest { option: SetOption },
    GetRequest { option: GetOption },
    HaltRequest,

    // Responses, published by a peer on the control or logs topic.
    OkResponse,
    InternalErrorResponse { message: String },
    PingResponse { elapsed_ms: i64 },
    StatsResponse { stats: PeerStats },
    GetResponse { option: GetOption, value: String },
    LogResponse {
        location: LogLocation,
        file_name: String,
        file_hash: String,
        content: Vec<u8>,
    },

    // Asynchronous notifications, published retained.
    TestSuccessful { message: String },
    TestFailed { message: String },
    AbnormalDisconnect { message: String },
}

impl NoteKind {
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            NoteKind::PingRequest { .. }
                | NoteKind::StatsRequest
                | NoteKind::StartRequest { .. }
                | NoteKind::StopRequest
                | NoteKind::SetRequest { .. }
                | NoteKind::GetRequest { .. }
                | NoteKind::HaltRequest
        )
    }

    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            NoteKind::TestSuccessful { .. }
                | NoteKind::TestFailed { .. }
                | NoteKind::AbnormalDisconnect { .. }
        )
    }

    pub fn is_response(&self) -> bool {
        !self.is_request() && !self.is_notification()
    }

    /// Stable label used for duplicate detection and logging.
    pub fn label(&self) -> &'static str {
        match self {
            NoteKind::PingRequest { .. } => "ping-request",
            NoteKind::StatsRequest => "stats-request",
            NoteKind::StartRequest { .. } => "start-request",
            NoteKind::StopRequest => "stop-request",
            NoteKind::SetRequest { .. } => "set-request",
            NoteKind::GetRequest { .. } => "get-request",
            NoteKind::HaltRequest => "halt-request",
            NoteKind::OkResponse => "ok-response",
            NoteKind::InternalErrorResponse { .. } => "internal-error-response",
            NoteKind::PingResponse { .. } => "ping-response",
            NoteKind::StatsResponse { .. } => "stats-response",
            NoteKind::GetResponse { .. } => "get-response",
            NoteKind::LogResponse { .. } => "log-response",
            NoteKind::TestSuccessful { .. } => "test-successful",
            NoteKind::TestFailed { .. } => "test-failed",
            NoteKind::AbnormalDisconnect { .. } => "abnormal-disconnect",
        }
    }
}

/// The unit of communication. Built, serialized, parsed - never mutated
/// after send.
///
/// `id` carries the peer's session uuid on responses and notifications so
/// the coordinator can tell peer sessions apart; broadcast requests carry
/// no id and no sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(flatten)]
    pub kind: NoteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<PeerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

impl Note {
    /// A broadcast request: no sender, no correlation id.
    pub fn request(kind: NoteKind) -> Self {
        Note {
            kind,
            sender: None,
            id: None,
        }
    }

    /// A response or notification stamped with the peer's identity and
    /// session id.
    pub fn from_peer(kind: NoteKind, sender: PeerId, id: Uuid) -> Self {
        Note {
            kind,
            sender: Some(sender),
            id: Some(id),
        }
    }
}

pub fn encode(note: &Note) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(note).map_err(|e| ProtocolError::MalformedNote(e.to_string()))
}

/// Parses a note, rejecting unknown kind tags and responses or
/// notifications that do not carry a sender identity.
pub fn decode(payload: &[u8]) -> Result<Note, ProtocolError> {
    let note: Note =
        serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedNote(e.to_string()))?;

    if (note.kind.is_response() || note.kind.is_notification()) && note.sender.is_none() {
        return Err(ProtocolError::MalformedNote(format!(
            "{} without a sender",
            note.kind.label()
        )));
    }

    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerId {
        PeerId::new("sender-0", "perf01")
    }

    #[test]
    fn request_roundtrip() {
        let note = Note::request(NoteKind::PingRequest {
            sec: 1000,
            usec: 500_000,
        });
        let decoded = decode(&encode(&note).unwrap()).unwrap();
        assert_eq!(decoded, note);
        assert!(decoded.kind.is_request());
        assert!(decoded.sender.is_none());
    }

    #[test]
    fn notification_roundtrip_keeps_sender() {
        let note = Note::from_peer(
            NoteKind::TestFailed {
                message: "latency above ceiling".into(),
            },
            peer(),
            Uuid::new_v4(),
        );
        let decoded = decode(&encode(&note).unwrap()).unwrap();
        assert_eq!(decoded.sender.as_ref().unwrap().to_string(), "sender-0@perf01");
        assert!(decoded.kind.is_notification());
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let err = decode(br#"{"kind":"warp-request"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedNote(_)));
    }

    #[test]
    fn decode_rejects_senderless_response() {
        let err = decode(br#"{"kind":"ok-response"}"#).unwrap_err();
        assert!(err.to_string().contains("without a sender"));
    }

    #[test]
    fn decode_rejects_senderless_notification() {
        let err = decode(br#"{"kind":"test-successful","message":"done"}"#).unwrap_err();
        assert!(err.to_string().contains("without a sender"));
    }

    #[test]
    fn peer_id_parses_name_at_host() {
        let id: PeerId = "receiver-1@perf02".parse().unwrap();
        assert_eq!(id, PeerId::new("receiver-1", "perf02"));
        assert!("no-host".parse::<PeerId>().is_err());
        assert!("@host".parse::<PeerId>().is_err());
    }

    #[test]
    fn duration_parses_from_a_single_key_map() {
        let duration: TestDuration = serde_json::from_str(r#"{"seconds": 60}"#).unwrap();
        assert_eq!(duration, TestDuration::Seconds(60));
        assert_eq!(
            serde_json::to_string(&TestDuration::Count(100_000)).unwrap(),
            r#"{"count":100000}"#
        );
    }

    #[test]
    fn duration_rejects_an_ambiguous_map() {
        assert!(serde_json::from_str::<TestDuration>(r#"{"seconds": 60, "count": 5}"#).is_err());
        assert!(serde_json::from_str::<TestDuration>(r#"{}"#).is_err());
    }

    #[test]
    fn set_option_roundtrip() {
        let note = Note::request(NoteKind::SetRequest {
            option: SetOption::Duration {
                value: TestDuration::Count(10_000),
            },
        });
        assert_eq!(decode(&encode(&note).unwrap()).unwrap(), note);
    }
}
