use crate::state::NoteBuffer;
use baton_protocol::{
    epoch_micros, GetOption, Note, NoteChannel, NoteKind, PeerId, Role, SetOption, Topic,
    TransportError,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Outcome of one deadline-bounded reply-gathering cycle.
///
/// `distinct_peers` counts unique senders; duplicate `(sender, kind)`
/// pairs never increase it.
#[derive(Debug)]
pub struct CollectionResult {
    pub notes: Vec<Note>,
    pub distinct_peers: usize,
    pub complete: bool,
}

/// The peer set observed answering a discovery broadcast.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPeers {
    pub peers: Vec<(PeerId, Role)>,
}

impl ResolvedPeers {
    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.peers.iter().filter(|(_, r)| *r == role).count()
    }
}

/// Controller-side client: broadcasts requests on the shared topics and
/// pulls the inbound buffer the listener task fills.
///
/// The coordinator never knows the fleet size ahead of time - the topics
/// are role-wide, not peer-addressed - so "done" is inferred either from
/// silence ([`collect`](Coordinator::collect)) or from an independently
/// resolved expected count ([`collect_until`](Coordinator::collect_until)).
pub struct Coordinator {
    channel: Arc<dyn NoteChannel>,
    buffer: NoteBuffer,
    poll_interval: Duration,
    max_empty_polls: u32,
}

impl Coordinator {
    pub fn new(channel: Arc<dyn NoteChannel>, buffer: NoteBuffer) -> Self {
        Self {
            channel,
            buffer,
            poll_interval: Duration::from_millis(1000),
            max_empty_polls: 5,
        }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_empty_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_empty_polls = max_empty_polls;
        self
    }

    async fn broadcast(&self, kind: NoteKind) -> Result<(), TransportError> {
        debug!("broadcasting {}", kind.label());
        self.channel
            .publish(Topic::Control, &Note::request(kind), false)
            .await
    }

    pub async fn ping_request(&self) -> Result<(), TransportError> {
        let (sec, usec) = epoch_micros();
        self.broadcast(NoteKind::PingRequest { sec, usec }).await
    }

    pub async fn stats_request(&self) -> Result<(), TransportError> {
        self.broadcast(NoteKind::StatsRequest).await
    }

    pub async fn set(&self, option: SetOption) -> Result<(), TransportError> {
        self.broadcast(NoteKind::SetRequest { option }).await
    }

    pub async fn get(&self, option: GetOption) -> Result<(), TransportError> {
        self.broadcast(NoteKind::GetRequest { option }).await
    }

    pub async fn start_all(&self, inspector: Option<String>) -> Result<(), TransportError> {
        self.broadcast(NoteKind::StartRequest { inspector }).await
    }

    pub async fn stop_all(&self) -> Result<(), TransportError> {
        self.broadcast(NoteKind::StopRequest).await
    }

    pub async fn halt(&self) -> Result<(), TransportError> {
        self.broadcast(NoteKind::HaltRequest).await
    }

    fn drain(&self) -> Vec<Note> {
        self.buffer.lock().drain(..).collect()
    }

    /// Best-effort, at-least-once collection: drains the inbound stream
    /// every poll interval and returns once an empty-poll streak signals
    /// quiescence.
    pub async fn collect(&self) -> Vec<Note> {
        self.collect_inner(None).await
    }

    /// `collect` with a hard cap: a stream that never goes quiet (steady
    /// stats chatter, say) still returns what was drained once `cap`
    /// elapses.
    pub async fn collect_bounded(&self, cap: Duration) -> Vec<Note> {
        self.collect_inner(Some(Instant::now() + cap)).await
    }

    async fn collect_inner(&self, cap: Option<Instant>) -> Vec<Note> {
        let mut collected = Vec::new();
        let mut empty_streak = 0u32;

        loop {
            let drained = self.drain();
            if drained.is_empty() {
                empty_streak += 1;
                if empty_streak >= self.max_empty_polls {
                    return collected;
                }
            } else {
                empty_streak = 0;
                collected.extend(drained);
            }
            if cap.is_some_and(|limit| Instant::now() >= limit) {
                return collected;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Deadline-bounded collection with a minimum-count target: keeps
    /// draining until `expected_peers` distinct senders replied or the
    /// deadline elapses.
    pub async fn collect_until(
        &self,
        deadline: Duration,
        expected_peers: usize,
    ) -> CollectionResult {
        let limit = Instant::now() + deadline;
        let mut notes = Vec::new();
        let mut seen: HashSet<(PeerId, &'static str)> = HashSet::new();
        let mut senders: HashSet<PeerId> = HashSet::new();

        loop {
            for note in self.drain() {
                if let Some(sender) = &note.sender {
                    if seen.insert((sender.clone(), note.kind.label())) {
                        senders.insert(sender.clone());
                        notes.push(note);
                    }
                } else {
                    notes.push(note);
                }
            }

            if senders.len() >= expected_peers {
                return CollectionResult {
                    notes,
                    distinct_peers: senders.len(),
                    complete: true,
                };
            }
            if Instant::now() >= limit {
                return CollectionResult {
                    notes,
                    distinct_peers: senders.len(),
                    complete: false,
                };
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Asks every peer for its advertised data-server address and maps the
    /// replies by peer identity. Peers that stay silent are simply absent
    /// from the map; the caller decides whether that matters.
    pub async fn resolve_data_servers(&self) -> Result<HashMap<PeerId, String>, TransportError> {
        self.get(GetOption::DataServerAddress).await?;

        let mut servers = HashMap::new();
        for note in self.collect().await {
            if let (
                NoteKind::GetResponse {
                    option: GetOption::DataServerAddress,
                    value,
                },
                Some(sender),
            ) = (&note.kind, &note.sender)
            {
                servers.insert(sender.clone(), value.clone());
            }
        }
        Ok(servers)
    }

    /// Discovery: broadcasts a stats request and counts the distinct peers
    /// per role among the replies. Retries the whole broadcast up to
    /// `retries` times before giving up on a role with no peers.
    pub async fn resolve_peers(
        &self,
        required_roles: &[Role],
        retries: u32,
    ) -> Result<ResolvedPeers, TransportError> {
        for attempt in 1..=retries.max(1) {
            self.stats_request().await?;

            let replies = self.collect().await;
            let mut resolved = ResolvedPeers::default();
            let mut seen: HashSet<PeerId> = HashSet::new();

            for note in &replies {
                if let (NoteKind::StatsResponse { stats }, Some(sender)) =
                    (&note.kind, &note.sender)
                {
                    if required_roles.contains(&stats.role) && seen.insert(sender.clone()) {
                        resolved.peers.push((sender.clone(), stats.role));
                    }
                }
            }

            if required_roles.iter().all(|r| resolved.count_role(*r) > 0) {
                info!(
                    "resolved {} peers for roles {:?}",
                    resolved.count(),
                    required_roles
                );
                return Ok(resolved);
            }

            debug!(
                "peer resolution attempt {attempt}/{retries} found {} peers",
                resolved.count()
            );
        }

        Ok(ResolvedPeers::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::new_state;
    use baton_protocol::PeerStats;
    use devkit::StubChannel;
    use std::collections::VecDeque;
    use uuid::Uuid;

    fn coordinator(stub: Arc<StubChannel>) -> (Coordinator, NoteBuffer) {
        let buffer = new_state(VecDeque::new());
        let coordinator = Coordinator::new(stub, buffer.clone())
            .with_polling(Duration::from_millis(2), 2);
        (coordinator, buffer)
    }

    fn reply_from(name: &str, kind: NoteKind) -> Note {
        Note::from_peer(kind, PeerId::new(name, "perf01"), Uuid::new_v4())
    }

    fn stats_reply(name: &str, role: Role) -> Note {
        reply_from(
            name,
            NoteKind::StatsResponse {
                stats: PeerStats {
                    role,
                    child_count: 1,
                    message_count: 0,
                    rate: 0.0,
                    latency_ms: 0.0,
                    timestamp: 0,
                },
            },
        )
    }

    #[tokio::test]
    async fn collect_returns_on_quiescence() {
        let (coordinator, buffer) = coordinator(Arc::new(StubChannel::new()));
        buffer.lock().push_back(reply_from("sender-0", NoteKind::OkResponse));

        let notes = coordinator.collect().await;
        assert_eq!(notes.len(), 1);

        // Nothing buffered: quiescence with no notes.
        assert!(coordinator.collect().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_collect_returns_under_steady_chatter() {
        let (coordinator, buffer) = coordinator(Arc::new(StubChannel::new()));
        let feeder = buffer.clone();
        tokio::spawn(async move {
            loop {
                feeder.lock().push_back(reply_from("sender-0", NoteKind::OkResponse));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        // Notes arrive faster than the poll interval, so quiescence is
        // never reached; only the cap ends the drain.
        let notes = coordinator.collect_bounded(Duration::from_millis(20)).await;
        assert!(!notes.is_empty());
    }

    #[tokio::test]
    async fn collect_until_is_duplicate_tolerant() {
        let (coordinator, buffer) = coordinator(Arc::new(StubChannel::new()));
        let note = reply_from("sender-0", NoteKind::OkResponse);
        buffer.lock().push_back(note.clone());
        buffer.lock().push_back(note);

        let result = coordinator
            .collect_until(Duration::from_millis(20), 2)
            .await;
        assert_eq!(result.distinct_peers, 1);
        assert_eq!(result.notes.len(), 1);
        assert!(!result.complete);
    }

    #[tokio::test]
    async fn collect_until_completes_at_the_target_count() {
        let (coordinator, buffer) = coordinator(Arc::new(StubChannel::new()));
        buffer.lock().push_back(reply_from("sender-0", NoteKind::OkResponse));
        buffer.lock().push_back(reply_from("receiver-0", NoteKind::OkResponse));

        let result = coordinator
            .collect_until(Duration::from_secs(5), 2)
            .await;
        assert!(result.complete);
        assert_eq!(result.distinct_peers, 2);
    }

    #[tokio::test]
    async fn resolve_peers_counts_roles_from_stats_replies() {
        let (coordinator, buffer) = coordinator(Arc::new(StubChannel::new()));
        buffer.lock().push_back(stats_reply("sender-0", Role::Sender));
        buffer.lock().push_back(stats_reply("sender-0", Role::Sender));
        buffer.lock().push_back(stats_reply("receiver-0", Role::Receiver));

        let resolved = coordinator
            .resolve_peers(&[Role::Sender, Role::Receiver], 1)
            .await
            .unwrap();
        assert_eq!(resolved.count(), 2);
        assert_eq!(resolved.count_role(Role::Sender), 1);
    }

    #[tokio::test]
    async fn resolve_data_servers_maps_replies_by_peer() {
        let stub = Arc::new(StubChannel::new());
        let (coordinator, buffer) = coordinator(stub.clone());
        buffer.lock().push_back(reply_from(
            "sender-0",
            NoteKind::GetResponse {
                option: GetOption::DataServerAddress,
                value: "http://perf01:8000".into(),
            },
        ));
        buffer.lock().push_back(reply_from("receiver-0", NoteKind::OkResponse));

        let servers = coordinator.resolve_data_servers().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(
            servers[&PeerId::new("sender-0", "perf01")],
            "http://perf01:8000"
        );
        assert_eq!(stub.published_on(Topic::Control).len(), 1);
    }

    #[tokio::test]
    async fn resolve_peers_returns_empty_after_the_retry_budget() {
        let (coordinator, _buffer) = coordinator(Arc::new(StubChannel::new()));
        let resolved = coordinator.resolve_peers(&[Role::Sender], 2).await.unwrap();
        assert_eq!(resolved.count(), 0);
    }
}
