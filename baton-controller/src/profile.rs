use crate::coordinator::Coordinator;
use baton_protocol::{SetOption, TestDuration, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Margin added to a round's estimated completion time to cover broker
/// propagation and peer startup.
const COMPLETION_MARGIN: Duration = Duration::from_secs(10);

fn estimated_completion(duration: TestDuration, rate: u64) -> Duration {
    match duration {
        TestDuration::Seconds(secs) => Duration::from_secs(secs) + COMPLETION_MARGIN,
        TestDuration::Count(count) => {
            let secs = if rate > 0 { count.div_ceil(rate) } else { count };
            Duration::from_secs(secs) + COMPLETION_MARGIN
        }
    }
}

/// Escalating profile: each step raises the target rate until the ceiling
/// step passes. Owned and mutated only by the executor between rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalProfile {
    pub broker_url: String,
    pub initial_rate: u64,
    pub rate_increment: u64,
    pub message_size: u64,
    pub parallel_count: u32,
    pub duration: TestDuration,
    #[serde(default = "default_step")]
    pub step: u32,
    pub ceiling: u32,
    #[serde(default)]
    pub management_interface: Option<String>,
    #[serde(default)]
    pub inspector_name: Option<String>,
    #[serde(skip)]
    pub test_execution_number: u32,
}

fn default_step() -> u32 {
    1
}

impl IncrementalProfile {
    pub fn current_rate(&self) -> u64 {
        self.initial_rate + self.rate_increment * u64::from(self.step.saturating_sub(1))
    }

    pub fn estimated_completion_time(&self) -> Duration {
        estimated_completion(self.duration, self.current_rate())
    }

    pub fn is_over_ceiling(&self) -> bool {
        self.step > self.ceiling
    }

    /// Pushes this step's parameters to every peer.
    pub async fn apply(&self, coordinator: &Coordinator) -> Result<(), TransportError> {
        info!(
            "applying test step {} of {}: rate {} msg/s",
            self.step,
            self.ceiling,
            self.current_rate()
        );

        coordinator
            .set(SetOption::BrokerUrl {
                url: self.broker_url.clone(),
            })
            .await?;
        coordinator
            .set(SetOption::MessageSize {
                size: self.message_size,
            })
            .await?;
        coordinator
            .set(SetOption::Rate {
                rate: self.current_rate(),
            })
            .await?;
        coordinator
            .set(SetOption::ParallelCount {
                count: self.parallel_count,
            })
            .await?;
        coordinator
            .set(SetOption::Duration {
                value: self.duration,
            })
            .await?;
        Ok(())
    }

    pub fn increment(&mut self) {
        self.step += 1;
        self.test_execution_number += 1;
    }
}

/// One fixed parameter set, no escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinglePointProfile {
    pub broker_url: String,
    pub rate: u64,
    pub message_size: u64,
    pub parallel_count: u32,
    pub duration: TestDuration,
    #[serde(default)]
    pub management_interface: Option<String>,
    #[serde(default)]
    pub inspector_name: Option<String>,
}

impl SinglePointProfile {
    pub fn estimated_completion_time(&self) -> Duration {
        estimated_completion(self.duration, self.rate)
    }

    pub async fn apply(&self, coordinator: &Coordinator) -> Result<(), TransportError> {
        coordinator
            .set(SetOption::BrokerUrl {
                url: self.broker_url.clone(),
            })
            .await?;
        coordinator
            .set(SetOption::MessageSize {
                size: self.message_size,
            })
            .await?;
        coordinator.set(SetOption::Rate { rate: self.rate }).await?;
        coordinator
            .set(SetOption::ParallelCount {
                count: self.parallel_count,
            })
            .await?;
        coordinator
            .set(SetOption::Duration {
                value: self.duration,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> IncrementalProfile {
        IncrementalProfile {
            broker_url: "mqtt://broker:1883".into(),
            initial_rate: 100,
            rate_increment: 50,
            message_size: 256,
            parallel_count: 2,
            duration: TestDuration::Seconds(30),
            step: 1,
            ceiling: 3,
            management_interface: None,
            inspector_name: None,
            test_execution_number: 0,
        }
    }

    #[test]
    fn rate_escalates_with_the_step() {
        let mut p = profile();
        assert_eq!(p.current_rate(), 100);
        p.increment();
        assert_eq!(p.current_rate(), 150);
        assert_eq!(p.test_execution_number, 1);
    }

    #[test]
    fn over_ceiling_after_the_last_step() {
        let mut p = profile();
        for _ in 0..2 {
            p.increment();
        }
        assert!(!p.is_over_ceiling());
        p.increment();
        assert!(p.is_over_ceiling());
    }

    #[test]
    fn count_bounded_estimate_derives_from_the_rate() {
        let mut p = profile();
        p.duration = TestDuration::Count(1000);
        // 1000 messages at 100 msg/s plus the margin.
        assert_eq!(p.estimated_completion_time(), Duration::from_secs(20));
    }

    #[test]
    fn profile_parses_from_yaml() {
        let p: IncrementalProfile = serde_yaml::from_str(
            r#"
broker_url: mqtt://broker:1883
initial_rate: 200
rate_increment: 100
message_size: 1024
parallel_count: 4
duration:
  seconds: 60
ceiling: 5
inspector_name: artemis-inspector
"#,
        )
        .unwrap();
        assert_eq!(p.step, 1);
        assert_eq!(p.ceiling, 5);
        assert_eq!(p.duration, TestDuration::Seconds(60));
        assert_eq!(p.inspector_name.as_deref(), Some("artemis-inspector"));
    }
}
