use baton_protocol::{Note, NoteKind, PeerId};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Terminal state of one round.
///
/// Failure is sticky: once a peer reports a failed test, later successes
/// from other peers never revert the verdict within the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Incomplete,
    Successful,
    Failed(String),
}

/// Throughput samples recorded off stats replies. Built and owned
/// explicitly by whoever needs one; there is no process-wide collector.
#[derive(Debug, Default)]
pub struct RateAggregate {
    samples: Vec<f64>,
}

impl RateAggregate {
    pub fn record(&mut self, rate: f64) {
        self.samples.push(rate);
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Control-plane round-trip samples recorded off ping replies.
#[derive(Debug, Default)]
pub struct LatencyAggregate {
    samples: Vec<i64>,
}

impl LatencyAggregate {
    pub fn record(&mut self, elapsed_ms: i64) {
        self.samples.push(elapsed_ms);
    }

    pub fn max(&self) -> Option<i64> {
        self.samples.iter().copied().max()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Folding accumulator over the notes of one round.
///
/// Terminal notifications are deduplicated per `(sender, kind)` so
/// at-least-once delivery never inflates the completion count. The round
/// is complete when success + failure notifications cover the resolved
/// peer count.
#[derive(Debug)]
pub struct TestProcessor {
    expected_peers: usize,
    successes: usize,
    failures: usize,
    abnormal_disconnects: usize,
    first_failure: Option<String>,
    seen: HashSet<(PeerId, &'static str)>,
    flush_wait: Duration,
    flush_wait_step: Duration,
    rates: RateAggregate,
    latencies: LatencyAggregate,
}

impl TestProcessor {
    pub fn new(expected_peers: usize) -> Self {
        Self {
            expected_peers,
            successes: 0,
            failures: 0,
            abnormal_disconnects: 0,
            first_failure: None,
            seen: HashSet::new(),
            flush_wait: Duration::ZERO,
            flush_wait_step: Duration::from_secs(10),
            rates: RateAggregate::default(),
            latencies: LatencyAggregate::default(),
        }
    }

    pub fn set_expected_peers(&mut self, expected: usize) {
        self.expected_peers = expected;
    }

    pub fn process(&mut self, note: &Note) {
        let Some(sender) = &note.sender else {
            return;
        };

        match &note.kind {
            NoteKind::StatsResponse { stats } => {
                self.rates.record(stats.rate);
            }
            NoteKind::PingResponse { elapsed_ms } => {
                self.latencies.record(*elapsed_ms);
            }
            NoteKind::TestFailed { message } => {
                if self.seen.insert((sender.clone(), note.kind.label())) {
                    warn!("peer {sender} failed: {message}");
                    self.failures += 1;
                    if self.first_failure.is_none() {
                        self.first_failure = Some(message.clone());
                    }
                }
            }
            NoteKind::TestSuccessful { .. } => {
                if self.seen.insert((sender.clone(), note.kind.label())) {
                    debug!("peer {sender} completed successfully");
                    self.successes += 1;
                }
            }
            NoteKind::AbnormalDisconnect { message } => {
                if self.seen.insert((sender.clone(), note.kind.label())) {
                    // Counted but never fails the round on its own: a peer
                    // may disconnect after legitimately finishing. A crash
                    // mid-round surfaces as a missing terminal
                    // notification at the deadline.
                    warn!("peer {sender} disconnected abnormally: {message}");
                    self.abnormal_disconnects += 1;
                }
            }
            _ => {}
        }
    }

    pub fn is_completed(&self) -> bool {
        self.expected_peers > 0 && self.successes + self.failures >= self.expected_peers
    }

    pub fn is_successful(&self) -> bool {
        self.is_completed() && self.failures == 0
    }

    pub fn verdict(&self) -> Verdict {
        if let Some(message) = &self.first_failure {
            Verdict::Failed(message.clone())
        } else if self.is_completed() {
            Verdict::Successful
        } else {
            Verdict::Incomplete
        }
    }

    pub fn first_failure(&self) -> Option<&str> {
        self.first_failure.as_deref()
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn abnormal_disconnects(&self) -> usize {
        self.abnormal_disconnects
    }

    pub fn rates(&self) -> &RateAggregate {
        &self.rates
    }

    pub fn latencies(&self) -> &LatencyAggregate {
        &self.latencies
    }

    /// Extra drain allowance for the current round, added to the round
    /// deadline so heavier rounds get more time to flush in-flight
    /// messages before evaluation.
    pub fn flush_wait(&self) -> Duration {
        self.flush_wait
    }

    pub fn increase_flush_wait(&mut self) {
        self.flush_wait += self.flush_wait_step;
    }

    /// Clears the per-round notification state. Run-wide aggregates are
    /// kept; the whole-run verdict is the conjunction of all rounds.
    pub fn reset_notifications(&mut self) {
        self.successes = 0;
        self.failures = 0;
        self.abnormal_disconnects = 0;
        self.first_failure = None;
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_protocol::{PeerStats, Role};
    use uuid::Uuid;

    fn notification(name: &str, kind: NoteKind) -> Note {
        Note::from_peer(kind, PeerId::new(name, "perf01"), Uuid::new_v4())
    }

    fn success(name: &str) -> Note {
        notification(
            name,
            NoteKind::TestSuccessful {
                message: "ok".into(),
            },
        )
    }

    fn failure(name: &str, message: &str) -> Note {
        notification(
            name,
            NoteKind::TestFailed {
                message: message.into(),
            },
        )
    }

    #[test]
    fn successful_iff_all_peers_succeed() {
        let mut processor = TestProcessor::new(2);
        processor.process(&success("sender-0"));
        assert!(!processor.is_completed());

        processor.process(&success("receiver-0"));
        assert!(processor.is_completed());
        assert!(processor.is_successful());
        assert_eq!(processor.verdict(), Verdict::Successful);
    }

    #[test]
    fn failure_is_sticky_and_first_message_wins() {
        let mut processor = TestProcessor::new(3);
        processor.process(&failure("sender-0", "latency over limit"));
        processor.process(&failure("sender-1", "broker unreachable"));
        processor.process(&success("receiver-0"));

        assert!(processor.is_completed());
        assert!(!processor.is_successful());
        assert_eq!(
            processor.verdict(),
            Verdict::Failed("latency over limit".into())
        );
    }

    #[test]
    fn duplicate_notifications_do_not_double_count() {
        let mut processor = TestProcessor::new(2);
        let note = success("sender-0");
        processor.process(&note);
        processor.process(&note);

        assert_eq!(processor.successes(), 1);
        assert!(!processor.is_completed());
    }

    #[test]
    fn abnormal_disconnect_counts_but_does_not_fail() {
        let mut processor = TestProcessor::new(1);
        processor.process(&notification(
            "receiver-0",
            NoteKind::AbnormalDisconnect {
                message: "connection lost".into(),
            },
        ));
        processor.process(&success("sender-0"));

        assert_eq!(processor.abnormal_disconnects(), 1);
        assert!(processor.is_successful());
    }

    #[test]
    fn reset_is_idempotent_over_replay() {
        let notes = vec![success("sender-0"), failure("receiver-0", "boom")];

        let mut processor = TestProcessor::new(2);
        for note in &notes {
            processor.process(note);
        }
        let first = processor.verdict();

        processor.reset_notifications();
        assert_eq!(processor.verdict(), Verdict::Incomplete);
        for note in &notes {
            processor.process(note);
        }
        assert_eq!(processor.verdict(), first);
    }

    #[test]
    fn stats_and_ping_feed_the_aggregates() {
        let mut processor = TestProcessor::new(1);
        processor.process(&notification(
            "sender-0",
            NoteKind::StatsResponse {
                stats: PeerStats {
                    role: Role::Sender,
                    child_count: 1,
                    message_count: 100,
                    rate: 200.0,
                    latency_ms: 1.5,
                    timestamp: 0,
                },
            },
        ));
        processor.process(&notification("sender-0", NoteKind::PingResponse { elapsed_ms: 7 }));

        assert_eq!(processor.rates().mean(), 200.0);
        assert_eq!(processor.latencies().max(), Some(7));
    }

    #[test]
    fn zero_expected_peers_never_completes() {
        let processor = TestProcessor::new(0);
        assert!(!processor.is_completed());
    }

    #[test]
    fn flush_wait_grows_per_round() {
        let mut processor = TestProcessor::new(1);
        assert_eq!(processor.flush_wait(), Duration::ZERO);
        processor.increase_flush_wait();
        processor.increase_flush_wait();
        assert_eq!(processor.flush_wait(), Duration::from_secs(20));
    }
}
