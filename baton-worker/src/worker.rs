use crate::client::WorkerClient;
use crate::params::TestParameters;
use crate::workload::Workload;
use baton_protocol::{now_micros, Note, NoteKind, PeerStats, Role, SetOption};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct RunningTest {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One peer's request-handling state machine.
///
/// Every broadcast on the control topic reaches every peer, so the worker
/// filters first: only request kinds are acted on, and start requests
/// scoped to a named inspector are ignored by inspectors with a different
/// name. Everything else on the shared topic is some other peer's reply.
pub struct Worker {
    client: WorkerClient,
    role: Role,
    params: TestParameters,
    workload: Arc<dyn Workload>,
    counter: Arc<AtomicU64>,
    data_server: String,
    running: Option<RunningTest>,
}

impl Worker {
    pub fn new(
        client: WorkerClient,
        role: Role,
        workload: Arc<dyn Workload>,
        data_server: impl Into<String>,
    ) -> Self {
        Self {
            client,
            role,
            params: TestParameters::default(),
            workload,
            counter: Arc::new(AtomicU64::new(0)),
            data_server: data_server.into(),
            running: None,
        }
    }

    pub fn params(&self) -> &TestParameters {
        &self.params
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Handles one inbound note. Returns `false` once a halt request asks
    /// this worker to shut down.
    pub async fn handle_note(&mut self, note: &Note) -> bool {
        if !note.kind.is_request() {
            // Another peer's reply echoed on the shared topic.
            return true;
        }

        match &note.kind {
            NoteKind::PingRequest { sec, usec } => {
                self.client.ping_response(*sec, *usec).await;
            }
            NoteKind::StatsRequest => {
                self.client.stats_response(self.snapshot()).await;
            }
            NoteKind::SetRequest { option } => self.handle_set(option).await,
            NoteKind::StartRequest { inspector } => self.handle_start(inspector.as_deref()).await,
            NoteKind::StopRequest => {
                self.stop_workload();
                self.client.reply_ok().await;
            }
            NoteKind::GetRequest { option } => {
                let value = self.data_server.clone();
                self.client.get_response(*option, value).await;
            }
            NoteKind::HaltRequest => {
                info!("halt requested, shutting down {}", self.client.peer());
                self.stop_workload();
                self.client.reply_ok().await;
                return false;
            }
            _ => unreachable!("non-request kinds are filtered above"),
        }

        true
    }

    async fn handle_set(&mut self, option: &SetOption) {
        let valid = match option {
            SetOption::MessageSize { size } => *size > 0,
            SetOption::ParallelCount { count } => *count > 0,
            _ => true,
        };

        if !valid {
            self.client
                .reply_internal_error(format!("rejected set request: {option:?}"))
                .await;
            return;
        }

        debug!("applying {:?}", option);
        self.params.apply(option);
        self.client.reply_ok().await;
    }

    async fn handle_start(&mut self, inspector: Option<&str>) {
        if self.role == Role::Inspector {
            if let Some(name) = inspector {
                if name != self.client.peer().name {
                    debug!("start request scoped to inspector {}, ignoring", name);
                    return;
                }
            }
        }

        if self.is_running() {
            self.client
                .reply_internal_error("test already in progress")
                .await;
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let workload = self.workload.clone();
        let params = self.params.clone();
        let counter = self.counter.clone();
        let client = self.client.clone();

        counter.store(0, Ordering::Relaxed);
        let task = tokio::spawn(async move {
            match workload.run(params, counter, stop_rx).await {
                Ok(report) => {
                    client
                        .notify_success(format!(
                            "test completed successfully: {} messages in {:?}",
                            report.messages, report.elapsed
                        ))
                        .await;
                }
                Err(e) => {
                    warn!("workload failed: {e:#}");
                    client.notify_failure(format!("test failed: {e:#}")).await;
                }
            }
        });

        self.running = Some(RunningTest { stop_tx, task });
        self.client.reply_ok().await;
    }

    fn stop_workload(&mut self) {
        if let Some(running) = self.running.take() {
            // The workload observes the signal and finishes on its own;
            // its completion notification still goes out.
            let _ = running.stop_tx.send(true);
        }
    }

    fn snapshot(&self) -> PeerStats {
        PeerStats {
            role: self.role,
            child_count: self.params.parallel_count,
            message_count: self.counter.load(Ordering::Relaxed),
            rate: if self.is_running() {
                self.params.rate as f64
            } else {
                0.0
            },
            latency_ms: 0.0,
            timestamp: now_micros() / 1_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_protocol::{PeerId, TestDuration, Topic};
    use devkit::StubChannel;
    use std::time::Duration;

    fn worker_on(stub: &Arc<StubChannel>, role: Role, name: &str) -> Worker {
        let client = WorkerClient::new(stub.clone(), PeerId::new(name, "perf01"));
        Worker::new(client, role, Arc::new(crate::TimedWorkload), "http://perf01:8000")
    }

    fn request(kind: NoteKind) -> Note {
        Note::request(kind)
    }

    #[tokio::test]
    async fn non_request_notes_are_ignored() {
        let stub = Arc::new(StubChannel::new());
        let mut worker = worker_on(&stub, Role::Sender, "sender-0");

        let echo = Note::from_peer(
            NoteKind::OkResponse,
            PeerId::new("receiver-0", "perf02"),
            uuid::Uuid::new_v4(),
        );
        assert!(worker.handle_note(&echo).await);
        assert!(stub.published().is_empty());
    }

    #[tokio::test]
    async fn set_then_stats_reflect_parameters() {
        let stub = Arc::new(StubChannel::new());
        let mut worker = worker_on(&stub, Role::Receiver, "receiver-0");

        worker
            .handle_note(&request(NoteKind::SetRequest {
                option: SetOption::ParallelCount { count: 4 },
            }))
            .await;
        worker.handle_note(&request(NoteKind::StatsRequest)).await;

        let notes = stub.published_on(Topic::Control);
        assert!(matches!(notes[0].kind, NoteKind::OkResponse));
        match &notes[1].kind {
            NoteKind::StatsResponse { stats } => {
                assert_eq!(stats.role, Role::Receiver);
                assert_eq!(stats.child_count, 4);
            }
            other => panic!("unexpected kind: {}", other.label()),
        }
    }

    #[tokio::test]
    async fn invalid_set_gets_an_internal_error() {
        let stub = Arc::new(StubChannel::new());
        let mut worker = worker_on(&stub, Role::Sender, "sender-0");

        worker
            .handle_note(&request(NoteKind::SetRequest {
                option: SetOption::MessageSize { size: 0 },
            }))
            .await;

        let notes = stub.published_on(Topic::Control);
        assert!(matches!(notes[0].kind, NoteKind::InternalErrorResponse { .. }));
    }

    #[tokio::test]
    async fn start_runs_the_workload_to_a_success_notification() {
        let stub = Arc::new(StubChannel::new());
        let mut worker = worker_on(&stub, Role::Sender, "sender-0");

        worker
            .handle_note(&request(NoteKind::SetRequest {
                option: SetOption::Duration {
                    value: TestDuration::Count(3),
                },
            }))
            .await;
        worker
            .handle_note(&request(NoteKind::SetRequest {
                option: SetOption::Rate { rate: 1000 },
            }))
            .await;
        worker
            .handle_note(&request(NoteKind::StartRequest { inspector: None }))
            .await;

        // Wait for the workload task to finish and notify.
        for _ in 0..100 {
            if !stub.published_on(Topic::Notification).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let notifications = stub.published_on(Topic::Notification);
        assert_eq!(notifications.len(), 1);
        assert!(matches!(notifications[0].kind, NoteKind::TestSuccessful { .. }));
    }

    #[tokio::test]
    async fn inspector_ignores_start_scoped_to_another_inspector() {
        let stub = Arc::new(StubChannel::new());
        let mut worker = worker_on(&stub, Role::Inspector, "artemis-inspector");

        worker
            .handle_note(&request(NoteKind::StartRequest {
                inspector: Some("interconnect-inspector".into()),
            }))
            .await;
        assert!(stub.published().is_empty());
        assert!(!worker.is_running());

        worker
            .handle_note(&request(NoteKind::StartRequest {
                inspector: Some("artemis-inspector".into()),
            }))
            .await;
        assert!(worker.is_running());
    }

    #[tokio::test]
    async fn halt_stops_the_loop() {
        let stub = Arc::new(StubChannel::new());
        let mut worker = worker_on(&stub, Role::Sender, "sender-0");

        assert!(!worker.handle_note(&request(NoteKind::HaltRequest)).await);
        let notes = stub.published_on(Topic::Control);
        assert!(matches!(notes[0].kind, NoteKind::OkResponse));
    }
}
