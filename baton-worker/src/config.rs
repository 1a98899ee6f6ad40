use anyhow::Context;
use baton_protocol::Role;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerConfig {
    pub mqtt: MqttConf,
    pub role: Role,
    /// Peer name; defaults to `<role>-<pid>` when absent.
    pub name: Option<String>,
    /// Address handed out for `get data-server-address` requests.
    pub data_server: String,
    pub log_throttle_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf {
                host: "localhost".into(),
                port: 1883,
            },
            role: Role::Sender,
            name: None,
            data_server: "http://localhost:8000".into(),
            log_throttle_ms: 500,
        }
    }
}

impl WorkerConfig {
    pub fn peer_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.role, std::process::id()))
    }
}

/// Loads the worker config from `BATON_WORKER_CONFIG` (default
/// `worker.yaml`). A missing file falls back to defaults; a file that does
/// not parse is an error, never a silently substituted default.
pub async fn load_config() -> anyhow::Result<WorkerConfig> {
    let path = std::env::var("BATON_WORKER_CONFIG").unwrap_or_else(|_| "worker.yaml".into());
    if !Path::new(&path).exists() {
        warn!("no {path}, using default config");
        return Ok(WorkerConfig::default());
    }

    let txt = fs::read_to_string(&path)
        .await
        .with_context(|| format!("unable to read config {path}"))?;
    serde_yaml::from_str(&txt).with_context(|| format!("invalid config {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_from_yaml() {
        let cfg: WorkerConfig = serde_yaml::from_str(
            r#"
mqtt:
  host: broker.lab
  port: 1884
role: receiver
name: receiver-east
data_server: http://perf02:8000
log_throttle_ms: 250
"#,
        )
        .unwrap();

        assert_eq!(cfg.mqtt.host, "broker.lab");
        assert_eq!(cfg.role, Role::Receiver);
        assert_eq!(cfg.peer_name(), "receiver-east");
    }

    #[test]
    fn default_peer_name_includes_the_role() {
        let cfg = WorkerConfig::default();
        assert!(cfg.peer_name().starts_with("sender-"));
    }
}
