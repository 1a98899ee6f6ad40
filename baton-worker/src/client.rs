use baton_protocol::{
    elapsed_millis, now_micros, GetOption, LogLocation, Note, NoteChannel, NoteKind, PeerId,
    PeerStats, Topic,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace, warn};
use uuid::Uuid;

/// Default delay before publishing a log response, so a large fleet
/// transferring logs at once does not saturate the broker.
pub const DEFAULT_LOG_THROTTLE: Duration = Duration::from_millis(500);

/// Peer-side publisher.
///
/// Every note is stamped with this peer's `name@host` identity and session
/// id. Publish failures are logged and swallowed: a lost reply is recovered
/// by the coordinator's timeout-driven rebroadcast, not by the peer
/// retrying.
#[derive(Clone)]
pub struct WorkerClient {
    channel: Arc<dyn NoteChannel>,
    peer: PeerId,
    session: Uuid,
    log_throttle: Duration,
}

impl WorkerClient {
    pub fn new(channel: Arc<dyn NoteChannel>, peer: PeerId) -> Self {
        Self {
            channel,
            peer,
            session: Uuid::new_v4(),
            log_throttle: DEFAULT_LOG_THROTTLE,
        }
    }

    pub fn with_log_throttle(mut self, delay: Duration) -> Self {
        self.log_throttle = delay;
        self
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    async fn publish(&self, topic: Topic, kind: NoteKind, retain: bool) {
        let note = Note::from_peer(kind, self.peer.clone(), self.session);
        if let Err(e) = self.channel.publish(topic, &note, retain).await {
            error!("unable to publish {} from {}: {}", note.kind.label(), self.peer, e);
        }
    }

    pub async fn reply_ok(&self) {
        trace!("sending the ok response from {}", self.peer);
        self.publish(Topic::Control, NoteKind::OkResponse, false).await;
    }

    pub async fn reply_internal_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("sending the internal error response from {}: {}", self.peer, message);
        self.publish(Topic::Control, NoteKind::InternalErrorResponse { message }, false)
            .await;
    }

    /// Replies to a ping request stamped with `(sec, usec)` epoch parts.
    ///
    /// The one-way control-plane latency is measured against this peer's
    /// own clock; the only assumption is a shared epoch.
    pub async fn ping_response(&self, sec: u64, usec: u64) {
        let elapsed_ms = elapsed_millis(sec, usec, now_micros());
        trace!("ping from {}.{:06} elapsed {} ms", sec, usec, elapsed_ms);
        self.publish(Topic::Control, NoteKind::PingResponse { elapsed_ms }, false)
            .await;
    }

    pub async fn stats_response(&self, stats: PeerStats) {
        self.publish(Topic::Control, NoteKind::StatsResponse { stats }, false)
            .await;
    }

    pub async fn get_response(&self, option: GetOption, value: impl Into<String>) {
        self.publish(
            Topic::Control,
            NoteKind::GetResponse {
                option,
                value: value.into(),
            },
            false,
        )
        .await;
    }

    /// Notifications are published retained so a coordinator that
    /// subscribes late still observes the last one.
    pub async fn notify_success(&self, message: impl Into<String>) {
        trace!("sending the test success notification from {}", self.peer);
        self.publish(
            Topic::Notification,
            NoteKind::TestSuccessful {
                message: message.into(),
            },
            true,
        )
        .await;
    }

    pub async fn notify_failure(&self, message: impl Into<String>) {
        trace!("sending the test failure notification from {}", self.peer);
        self.publish(
            Topic::Notification,
            NoteKind::TestFailed {
                message: message.into(),
            },
            true,
        )
        .await;
    }

    /// Transfers one log file, waiting out the throttle delay first.
    pub async fn log_response(
        &self,
        location: LogLocation,
        file_name: impl Into<String>,
        file_hash: impl Into<String>,
        content: Vec<u8>,
    ) {
        tokio::time::sleep(self.log_throttle).await;
        self.publish(
            Topic::Logs,
            NoteKind::LogResponse {
                location,
                file_name: file_name.into(),
                file_hash: file_hash.into(),
                content,
            },
            false,
        )
        .await;
    }
}
