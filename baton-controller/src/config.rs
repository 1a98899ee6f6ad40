use crate::profile::IncrementalProfile;
use anyhow::Context;
use baton_protocol::TestDuration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControllerConfig {
    pub mqtt: MqttConf,
    #[serde(default = "default_cool_down")]
    pub cool_down_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_empty_polls")]
    pub max_empty_polls: u32,
    #[serde(default)]
    pub reports: Option<ReportsConf>,
    pub profile: IncrementalProfile,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReportsConf {
    pub base_dir: String,
}

fn default_cool_down() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_empty_polls() -> u32 {
    5
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf {
                host: "localhost".into(),
                port: 1883,
            },
            cool_down_secs: default_cool_down(),
            poll_interval_ms: default_poll_interval(),
            max_empty_polls: default_max_empty_polls(),
            reports: None,
            profile: IncrementalProfile {
                broker_url: "mqtt://localhost:1883".into(),
                initial_rate: 100,
                rate_increment: 100,
                message_size: 256,
                parallel_count: 1,
                duration: TestDuration::Seconds(30),
                step: 1,
                ceiling: 5,
                management_interface: None,
                inspector_name: None,
                test_execution_number: Default::default(),
            },
        }
    }
}

/// Loads the controller config from `BATON_CONTROLLER_CONFIG` (default
/// `controller.yaml`). A missing file falls back to defaults; a file that
/// does not parse is an error, never a silently substituted default.
pub async fn load_config() -> anyhow::Result<ControllerConfig> {
    let path = std::env::var("BATON_CONTROLLER_CONFIG").unwrap_or_else(|_| "controller.yaml".into());
    if !Path::new(&path).exists() {
        warn!("no {path}, using default config");
        return Ok(ControllerConfig::default());
    }

    let txt = fs::read_to_string(&path)
        .await
        .with_context(|| format!("unable to read config {path}"))?;
    serde_yaml::from_str(&txt).with_context(|| format!("invalid config {path}"))
}
