//! Baton worker - load-test peer for the Baton orchestrator
//!
//! Connects to the control broker, subscribes to the shared control topic,
//! and answers the coordinator's broadcasts: ping/stats queries, parameter
//! pushes, start/stop of the local workload, halt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use baton_protocol::{decode, encode, Note, NoteChannel, PeerId, Topic, TransportError};
use baton_worker::{TimedWorkload, Worker, WorkerClient};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

struct MqttChannel {
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

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = baton_worker::config::load_config().await?;
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let peer = PeerId::new(config.peer_name(), host);

    info!("starting baton worker {} as {}", peer, config.role);

    let mut options = MqttOptions::new(
        format!("baton-worker-{}", peer.name),
        &config.mqtt.host,
        config.mqtt.port,
    );
    options.set_keep_alive(Duration::from_secs(15));
    options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client
        .subscribe(Topic::Control.path(), QoS::AtLeastOnce)
        .await
        .context("failed to subscribe to the control topic")?;

    let channel = Arc::new(MqttChannel { client });
    let worker_client = WorkerClient::new(channel, peer)
        .with_log_throttle(Duration::from_millis(config.log_throttle_ms));
    let mut worker = Worker::new(
        worker_client,
        config.role,
        Arc::new(TimedWorkload),
        config.data_server.clone(),
    );

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                if Topic::from_path(&publish.topic) != Some(Topic::Control) {
                    continue;
                }
                match decode(&publish.payload) {
                    Ok(note) => {
                        if !worker.handle_note(&note).await {
                            break;
                        }
                    }
                    Err(e) => warn!("dropping malformed note: {e}"),
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection error: {e}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    info!("worker halted");
    Ok(())
}
