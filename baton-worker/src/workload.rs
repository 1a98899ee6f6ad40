use crate::params::TestParameters;
use anyhow::Result;
use async_trait::async_trait;
use baton_protocol::TestDuration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Outcome of one workload run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadReport {
    pub messages: u64,
    pub elapsed: Duration,
}

/// The local load activity behind a peer.
///
/// Sender and receiver binaries plug real broker I/O in here; the
/// orchestration layer only cares that the run eventually returns, that it
/// honors the stop signal, and that `Err` means the round failed.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    async fn run(
        &self,
        params: TestParameters,
        counter: Arc<AtomicU64>,
        stop: watch::Receiver<bool>,
    ) -> Result<WorkloadReport>;
}

/// Paced placeholder workload: ticks at the parameterized rate for the
/// parameterized duration, counting messages. Useful for wiring tests and
/// as a template for real workloads.
pub struct TimedWorkload;

impl TimedWorkload {
    fn target(params: &TestParameters) -> (Option<u64>, Duration) {
        match params.duration {
            TestDuration::Count(count) => (Some(count), Duration::MAX),
            TestDuration::Seconds(secs) => (None, Duration::from_secs(secs)),
        }
    }
}

#[async_trait]
impl Workload for TimedWorkload {
    async fn run(
        &self,
        params: TestParameters,
        counter: Arc<AtomicU64>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<WorkloadReport> {
        let (count_target, time_target) = Self::target(&params);
        let pace = if params.rate > 0 {
            Duration::from_secs_f64(1.0 / params.rate as f64)
        } else {
            Duration::from_millis(1)
        };

        let started = Instant::now();
        let mut sent = 0u64;
        let mut tick = tokio::time::interval(pace);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    sent += 1;
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }

            if let Some(target) = count_target {
                if sent >= target {
                    break;
                }
            }
            if started.elapsed() >= time_target {
                break;
            }
        }

        Ok(WorkloadReport {
            messages: sent,
            elapsed: started.elapsed(),
        })
    }
}
