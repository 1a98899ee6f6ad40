//! Baton controller - drives incremental load tests over the MQTT control
//! channel: resolves peers, escalates the rate step by step and decides the
//! run from peer notifications.

use anyhow::Context;
use baton_controller::{
    create_channel, load_config, new_state, spawn_note_listener, Coordinator, ExecutorError,
    HttpDownloader, IncrementalTestExecutor, NoteBuffer,
};
use std::collections::VecDeque;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let config = load_config().await?;
    info!(
        "connecting to mqtt://{}:{}",
        config.mqtt.host, config.mqtt.port
    );

    let (channel, client, eventloop) = create_channel(&config.mqtt);
    let buffer: NoteBuffer = new_state(VecDeque::new());
    spawn_note_listener(client, eventloop, buffer.clone());

    let coordinator = Coordinator::new(channel, buffer).with_polling(
        Duration::from_millis(config.poll_interval_ms),
        config.max_empty_polls,
    );

    let mut executor = IncrementalTestExecutor::new(coordinator, config.profile.clone())
        .with_cool_down(Duration::from_secs(config.cool_down_secs));
    if let Some(reports) = &config.reports {
        let downloader = HttpDownloader::new(&reports.base_dir);
        executor = executor.with_reports(Arc::new(downloader));
    }

    match executor.run().await {
        Ok(()) => {
            info!("test completed successfully");
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ ExecutorError::Transport(_)) => {
            Err(e).context("control channel failure during test run")
        }
        Err(e) => {
            error!("test failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
