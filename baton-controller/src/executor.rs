use crate::coordinator::{Coordinator, ResolvedPeers};
use crate::processor::TestProcessor;
use crate::profile::{IncrementalProfile, SinglePointProfile};
use crate::reports::{ReportsDownloader, TestOutcome};
use baton_protocol::{PeerId, Role, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

/// Pause between escalation rounds, letting broker-side backlog drain.
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(10);

const RESOLUTION_RETRIES: u32 = 3;

/// Terminal failure reasons for a test run.
///
/// Transport-level publish losses are soft (absorbed by deadline-driven
/// collection), but a failed publish of a request surfaces here: without
/// the broadcast the round cannot proceed.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no peers resolved for roles {roles:?}")]
    Resolution { roles: Vec<Role> },
    #[error("test {round} failed: {message}")]
    RoundFailed { round: u32, message: String },
    #[error("test {round} timed out before all peers reported")]
    TimedOut { round: u32 },
    #[error("test run aborted")]
    Aborted,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

type AbortSignal = Option<watch::Receiver<bool>>;

fn check_abort(abort: &AbortSignal) -> Result<(), ExecutorError> {
    match abort {
        Some(rx) if *rx.borrow() => Err(ExecutorError::Aborted),
        _ => Ok(()),
    }
}

fn required_roles(management_interface: &Option<String>) -> Vec<Role> {
    if management_interface.is_some() {
        vec![Role::Sender, Role::Receiver, Role::Inspector]
    } else {
        vec![Role::Sender, Role::Receiver]
    }
}

async fn resolve_or_fail(
    coordinator: &Coordinator,
    roles: Vec<Role>,
) -> Result<ResolvedPeers, ExecutorError> {
    let resolved = coordinator.resolve_peers(&roles, RESOLUTION_RETRIES).await?;
    if roles.iter().any(|role| resolved.count_role(*role) == 0) {
        return Err(ExecutorError::Resolution { roles });
    }
    Ok(resolved)
}

/// Polls collect + process until the processor reports completion or the
/// round budget elapses. Peer silence is not an error here; the caller
/// reads the verdict off the processor.
async fn await_notifications(
    coordinator: &Coordinator,
    processor: &mut TestProcessor,
    budget: Duration,
    abort: &AbortSignal,
) -> Result<(), ExecutorError> {
    let deadline = Instant::now() + budget;

    loop {
        check_abort(abort)?;

        // Cap each drain at the remaining round budget so steady chatter
        // cannot hold one collect open past the deadline.
        let remaining = deadline.saturating_duration_since(Instant::now());
        for note in coordinator.collect_bounded(remaining).await {
            processor.process(&note);
        }

        if processor.is_completed() || Instant::now() >= deadline {
            return Ok(());
        }
    }
}

/// Per-round data-server discovery, performed only when a downloader is
/// wired in: peers can change the address they serve reports from between
/// rounds.
async fn resolve_data_servers(
    coordinator: &Coordinator,
    reports: &Option<Arc<dyn ReportsDownloader>>,
) -> Result<HashMap<PeerId, String>, ExecutorError> {
    if reports.is_none() {
        return Ok(HashMap::new());
    }
    Ok(coordinator.resolve_data_servers().await?)
}

async fn download_reports(
    reports: &Option<Arc<dyn ReportsDownloader>>,
    resolved: &ResolvedPeers,
    data_servers: &HashMap<PeerId, String>,
    outcome: TestOutcome,
) {
    let Some(downloader) = reports else {
        return;
    };

    for (peer, _) in &resolved.peers {
        let Some(data_server) = data_servers.get(peer) else {
            warn!("{peer} never advertised a data server, skipping its reports");
            continue;
        };
        if let Err(e) = downloader.download(peer, data_server, outcome).await {
            warn!("unable to download reports from {peer}: {e:#}");
        }
    }
}

fn round_verdict(processor: &TestProcessor, round: u32) -> Result<(), ExecutorError> {
    if processor.is_successful() {
        return Ok(());
    }
    match processor.first_failure() {
        Some(message) => Err(ExecutorError::RoundFailed {
            round,
            message: message.to_string(),
        }),
        None => Err(ExecutorError::TimedOut { round }),
    }
}

/// Sequences an incremental run: resolve the fleet, push the current
/// step's parameters, start the peers, wait for their terminal
/// notifications, then escalate until the ceiling passes or a round fails.
pub struct IncrementalTestExecutor {
    coordinator: Coordinator,
    profile: IncrementalProfile,
    processor: TestProcessor,
    reports: Option<Arc<dyn ReportsDownloader>>,
    cool_down: Duration,
    abort: AbortSignal,
}

impl IncrementalTestExecutor {
    pub fn new(coordinator: Coordinator, profile: IncrementalProfile) -> Self {
        Self {
            coordinator,
            profile,
            processor: TestProcessor::new(0),
            reports: None,
            cool_down: DEFAULT_COOL_DOWN,
            abort: None,
        }
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportsDownloader>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }

    /// The run aborts at the next state boundary once the watch flips to
    /// true; an abort during cool-down interrupts the sleep.
    pub fn with_abort(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn processor(&self) -> &TestProcessor {
        &self.processor
    }

    pub async fn run(&mut self) -> Result<(), ExecutorError> {
        // Drop whatever a previous run left on the topics.
        self.coordinator.collect().await;

        loop {
            check_abort(&self.abort)?;

            let roles = required_roles(&self.profile.management_interface);
            let resolved = resolve_or_fail(&self.coordinator, roles).await?;
            let data_servers = resolve_data_servers(&self.coordinator, &self.reports).await?;

            let round = self.profile.test_execution_number;
            if let Some(reports) = &self.reports {
                reports.start_test(round);
            }

            self.profile.apply(&self.coordinator).await?;
            self.processor.reset_notifications();
            self.processor.set_expected_peers(resolved.count());

            self.coordinator
                .start_all(self.profile.inspector_name.clone())
                .await?;

            let budget = self.profile.estimated_completion_time() + self.processor.flush_wait();
            await_notifications(&self.coordinator, &mut self.processor, budget, &self.abort)
                .await?;

            let outcome = if self.processor.is_successful() {
                TestOutcome::Success
            } else {
                TestOutcome::Failed
            };
            download_reports(&self.reports, &resolved, &data_servers, outcome).await;

            round_verdict(&self.processor, round)?;
            info!(
                "test {} passed at {} msg/s with {} peers",
                round,
                self.profile.current_rate(),
                resolved.count()
            );

            self.profile.increment();
            if self.profile.is_over_ceiling() {
                info!("ceiling of {} steps reached, run successful", self.profile.ceiling);
                return Ok(());
            }

            self.processor.increase_flush_wait();
            info!(
                "sleeping for {:?} to let the broker catch up",
                self.cool_down
            );
            self.cool_down_wait().await?;
        }
    }

    async fn cool_down_wait(&mut self) -> Result<(), ExecutorError> {
        let Some(rx) = &mut self.abort else {
            tokio::time::sleep(self.cool_down).await;
            return Ok(());
        };

        let sleep = tokio::time::sleep(self.cool_down);
        tokio::pin!(sleep);
        // A watch wakeup with the value still false is not an abort; keep
        // waiting out the remainder of the cool-down.
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        return Err(ExecutorError::Aborted);
                    }
                }
            }
        }
    }
}

/// One round at a fixed parameter set.
pub struct SingleTestExecutor {
    coordinator: Coordinator,
    profile: SinglePointProfile,
    processor: TestProcessor,
    reports: Option<Arc<dyn ReportsDownloader>>,
    abort: AbortSignal,
}

impl SingleTestExecutor {
    pub fn new(coordinator: Coordinator, profile: SinglePointProfile) -> Self {
        Self {
            coordinator,
            profile,
            processor: TestProcessor::new(0),
            reports: None,
            abort: None,
        }
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportsDownloader>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_abort(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = Some(abort);
        self
    }

    pub fn processor(&self) -> &TestProcessor {
        &self.processor
    }

    pub async fn run(&mut self) -> Result<(), ExecutorError> {
        self.coordinator.collect().await;
        check_abort(&self.abort)?;

        let roles = required_roles(&self.profile.management_interface);
        let resolved = resolve_or_fail(&self.coordinator, roles).await?;
        let data_servers = resolve_data_servers(&self.coordinator, &self.reports).await?;

        if let Some(reports) = &self.reports {
            reports.start_test(0);
        }

        self.profile.apply(&self.coordinator).await?;
        self.processor.reset_notifications();
        self.processor.set_expected_peers(resolved.count());

        self.coordinator
            .start_all(self.profile.inspector_name.clone())
            .await?;

        await_notifications(
            &self.coordinator,
            &mut self.processor,
            self.profile.estimated_completion_time(),
            &self.abort,
        )
        .await?;

        let outcome = if self.processor.is_successful() {
            TestOutcome::Success
        } else {
            TestOutcome::Failed
        };
        download_reports(&self.reports, &resolved, &data_servers, outcome).await;

        round_verdict(&self.processor, 0)
    }
}
