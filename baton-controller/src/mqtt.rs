use crate::config::MqttConf;
use crate::state::NoteBuffer;
use async_trait::async_trait;
use baton_protocol::{decode, encode, Note, NoteChannel, Topic, TransportError};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, warn};

pub struct MqttChannel {
    client: AsyncClient,
}

#[async_trait]
impl NoteChannel for MqttChannel {
    async fn publish(&self, topic: Topic, note: &Note, retain: bool) -> Result<(), TransportError> {
        let payload = encode(note).map_err(|e| TransportError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        self.client
            .publish(topic.path(), QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

pub fn create_channel(conf: &MqttConf) -> (Arc<MqttChannel>, AsyncClient, EventLoop) {
    let mut options = MqttOptions::new("baton-controller", &conf.host, conf.port);
    options.set_keep_alive(Duration::from_secs(15));
    options.set_max_packet_size(10 * 1024 * 1024, 10 * 1024 * 1024);

    let (client, eventloop) = AsyncClient::new(options, 10);
    (
        Arc::new(MqttChannel {
            client: client.clone(),
        }),
        client,
        eventloop,
    )
}

/// Runs the inbound listener: subscribes to the control and notification
/// topics and appends every decoded response/notification to the shared
/// buffer. Request kinds are the coordinator's own broadcasts echoed back
/// on the shared topic and are skipped; malformed notes are dropped with a
/// warning.
pub fn spawn_note_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    buffer: NoteBuffer,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for topic in [Topic::Control, Topic::Notification, Topic::Logs] {
            if let Err(e) = client.subscribe(topic.path(), QoS::AtLeastOnce).await {
                error!("subscribe to {topic} failed: {e}");
                return;
            }
        }

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    match decode(&publish.payload) {
                        Ok(note) if note.kind.is_request() => {}
                        Ok(note) => buffer.lock().push_back(note),
                        Err(e) => warn!("dropping malformed note on {}: {e}", publish.topic),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {e}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}
