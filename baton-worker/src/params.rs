use baton_protocol::{SetOption, TestDuration};

/// The pending load parameters for this peer, updated by `Set` requests
/// between rounds and handed to the workload at `Start`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestParameters {
    pub broker_url: String,
    pub message_size: u64,
    pub rate: u64,
    pub parallel_count: u32,
    pub duration: TestDuration,
    pub fail_condition_latency: Option<u64>,
    pub log_level: String,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            broker_url: String::new(),
            message_size: 256,
            rate: 0,
            parallel_count: 1,
            duration: TestDuration::Seconds(30),
            fail_condition_latency: None,
            log_level: "info".to_string(),
        }
    }
}

impl TestParameters {
    pub fn apply(&mut self, option: &SetOption) {
        match option {
            SetOption::BrokerUrl { url } => self.broker_url = url.clone(),
            SetOption::MessageSize { size } => self.message_size = *size,
            SetOption::Rate { rate } => self.rate = *rate,
            SetOption::ParallelCount { count } => self.parallel_count = *count,
            SetOption::Duration { value } => self.duration = *value,
            SetOption::FailConditionLatency { millis } => {
                self.fail_condition_latency = Some(*millis)
            }
            SetOption::LogLevel { level } => self.log_level = level.clone(),
        }
    }
}
