/*!
Scripted peer fleet for coordinator and executor tests

A ScenarioBus implements the publish side of the channel: every broadcast
the coordinator sends is answered by the scripted peers, whose replies land
directly in the coordinator's inbound buffer - the same path the MQTT
listener task feeds in production.

Peers are wired explicitly, builder style; there is no fixture magic.
*/

use async_trait::async_trait;
use baton_protocol::{
    Note, NoteChannel, NoteKind, PeerId, PeerStats, Role, Topic, TransportError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::note_stub::PublishedNote;

/// The coordinator-side inbound buffer: single-producer (listener or this
/// bus), single-consumer (collect).
pub type NoteBuffer = Arc<Mutex<VecDeque<Note>>>;

pub fn new_buffer() -> NoteBuffer {
    Arc::new(Mutex::new(VecDeque::new()))
}

/// What a scripted peer reports at the end of a given round.
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    Success,
    Fail(String),
    /// No terminal notification at all - exercises deadline handling.
    Silent,
}

pub struct ScriptedPeer {
    pub id: PeerId,
    pub role: Role,
    pub data_server: String,
    session: Uuid,
    outcomes: Vec<RoundOutcome>,
}

impl ScriptedPeer {
    pub fn new(name: &str, host: &str, role: Role) -> Self {
        Self {
            id: PeerId::new(name, host),
            role,
            data_server: format!("http://{host}:8000"),
            session: Uuid::new_v4(),
            outcomes: Vec::new(),
        }
    }

    /// Per-round outcomes, first round first. Rounds past the end of the
    /// list succeed.
    pub fn with_outcomes(mut self, outcomes: Vec<RoundOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }

    fn outcome_for(&self, round: usize) -> RoundOutcome {
        self.outcomes
            .get(round)
            .cloned()
            .unwrap_or(RoundOutcome::Success)
    }

    fn reply(&self, kind: NoteKind) -> Note {
        Note::from_peer(kind, self.id.clone(), self.session)
    }

    fn stats(&self) -> PeerStats {
        PeerStats {
            role: self.role,
            child_count: 1,
            message_count: 0,
            rate: 0.0,
            latency_ms: 0.0,
            timestamp: 0,
        }
    }
}

pub struct ScenarioBus {
    peers: Vec<ScriptedPeer>,
    buffer: NoteBuffer,
    published: Mutex<Vec<PublishedNote>>,
    rounds_started: AtomicUsize,
}

impl ScenarioBus {
    pub fn new(peers: Vec<ScriptedPeer>, buffer: NoteBuffer) -> Arc<Self> {
        let _ = env_logger::try_init();
        Arc::new(Self {
            peers,
            buffer,
            published: Mutex::new(Vec::new()),
            rounds_started: AtomicUsize::new(0),
        })
    }

    pub fn buffer(&self) -> NoteBuffer {
        self.buffer.clone()
    }

    /// Injects a note into the coordinator's buffer, outside any script.
    pub fn push_note(&self, note: Note) {
        self.buffer.lock().push_back(note);
    }

    pub fn rounds_started(&self) -> usize {
        self.rounds_started.load(Ordering::SeqCst)
    }

    /// Broadcasts the coordinator published, in order.
    pub fn requests_sent(&self) -> Vec<Note> {
        self.published.lock().iter().map(|p| p.note.clone()).collect()
    }

    pub fn count_requests(&self, label: &str) -> usize {
        self.published
            .lock()
            .iter()
            .filter(|p| p.note.kind.label() == label)
            .count()
    }

    fn answer(&self, note: &Note) {
        let mut replies = Vec::new();

        match &note.kind {
            NoteKind::StatsRequest => {
                for peer in &self.peers {
                    replies.push(peer.reply(NoteKind::StatsResponse { stats: peer.stats() }));
                }
            }
            NoteKind::PingRequest { .. } => {
                for peer in &self.peers {
                    replies.push(peer.reply(NoteKind::PingResponse { elapsed_ms: 5 }));
                }
            }
            NoteKind::SetRequest { .. } | NoteKind::StopRequest | NoteKind::HaltRequest => {
                for peer in &self.peers {
                    replies.push(peer.reply(NoteKind::OkResponse));
                }
            }
            NoteKind::GetRequest { option } => {
                for peer in &self.peers {
                    replies.push(peer.reply(NoteKind::GetResponse {
                        option: *option,
                        value: peer.data_server.clone(),
                    }));
                }
            }
            NoteKind::StartRequest { inspector } => {
                let round = self.rounds_started.fetch_add(1, Ordering::SeqCst);
                for peer in &self.peers {
                    if peer.role == Role::Inspector {
                        if let Some(name) = inspector {
                            if name != &peer.id.name {
                                continue;
                            }
                        }
                    }
                    replies.push(peer.reply(NoteKind::OkResponse));
                    match peer.outcome_for(round) {
                        RoundOutcome::Success => replies.push(peer.reply(NoteKind::TestSuccessful {
                            message: "test completed successfully".into(),
                        })),
                        RoundOutcome::Fail(message) => {
                            replies.push(peer.reply(NoteKind::TestFailed { message }))
                        }
                        RoundOutcome::Silent => {}
                    }
                }
            }
            _ => {}
        }

        let mut buffer = self.buffer.lock();
        for reply in replies {
            buffer.push_back(reply);
        }
    }
}

#[async_trait]
impl NoteChannel for ScenarioBus {
    async fn publish(&self, topic: Topic, note: &Note, retain: bool) -> Result<(), TransportError> {
        log::info!("[scenario] broadcast {} on {}", note.kind.label(), topic);
        self.published.lock().push(PublishedNote {
            topic,
            note: note.clone(),
            retain,
        });

        if note.kind.is_request() {
            self.answer(note);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stats_broadcast_gets_one_reply_per_peer() {
        let buffer = new_buffer();
        let bus = ScenarioBus::new(
            vec![
                ScriptedPeer::new("sender-0", "perf01", Role::Sender),
                ScriptedPeer::new("receiver-0", "perf02", Role::Receiver),
            ],
            buffer.clone(),
        );

        bus.publish(Topic::Control, &Note::request(NoteKind::StatsRequest), false)
            .await
            .unwrap();

        assert_eq!(buffer.lock().len(), 2);
        assert_eq!(bus.count_requests("stats-request"), 1);
    }

    #[tokio::test]
    async fn scripted_failure_lands_in_the_buffer() {
        let buffer = new_buffer();
        let bus = ScenarioBus::new(
            vec![ScriptedPeer::new("sender-0", "perf01", Role::Sender)
                .with_outcomes(vec![RoundOutcome::Fail("too slow".into())])],
            buffer.clone(),
        );

        bus.publish(
            Topic::Control,
            &Note::request(NoteKind::StartRequest { inspector: None }),
            false,
        )
        .await
        .unwrap();

        let notes: Vec<Note> = buffer.lock().drain(..).collect();
        assert!(notes
            .iter()
            .any(|n| matches!(&n.kind, NoteKind::TestFailed { message } if message == "too slow")));
        assert_eq!(bus.rounds_started(), 1);
    }

    #[tokio::test]
    async fn scoped_start_skips_other_inspectors() {
        let buffer = new_buffer();
        let bus = ScenarioBus::new(
            vec![
                ScriptedPeer::new("artemis-inspector", "perf03", Role::Inspector),
                ScriptedPeer::new("interconnect-inspector", "perf04", Role::Inspector),
            ],
            buffer.clone(),
        );

        bus.publish(
            Topic::Control,
            &Note::request(NoteKind::StartRequest {
                inspector: Some("artemis-inspector".into()),
            }),
            false,
        )
        .await
        .unwrap();

        let notes: Vec<Note> = buffer.lock().drain(..).collect();
        assert!(notes
            .iter()
            .all(|n| n.sender.as_ref().unwrap().name == "artemis-inspector"));
    }
}
