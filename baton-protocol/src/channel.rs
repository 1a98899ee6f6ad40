use crate::error::TransportError;
use crate::note::Note;
use crate::topics::Topic;
use async_trait::async_trait;

/// Publish side of the control channel.
///
/// Both the coordinator and the peer client publish through this seam, so
/// tests can swap the MQTT-backed implementation for devkit's in-memory
/// stub. There is no receive side here: inbound notes arrive through each
/// process's own listener task.
#[async_trait]
pub trait NoteChannel: Send + Sync {
    async fn publish(&self, topic: Topic, note: &Note, retain: bool) -> Result<(), TransportError>;
}
