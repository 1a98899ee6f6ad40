use async_trait::async_trait;
use baton_protocol::PeerId;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory/URL segments the peers publish their last run's artifacts
/// under.
pub const LAST_SUCCESSFUL: &str = "lastSuccessful";
pub const LAST_FAILED: &str = "lastFailed";

/// Fixed artifact set an inspector peer serves for its last run.
pub const INSPECTOR_ARTIFACTS: [&str; 4] = [
    "heap.csv.gz",
    "inspector.properties",
    "memory-areas.csv.gz",
    "queues.csv.gz",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Success,
    Failed,
}

impl TestOutcome {
    fn segment(self) -> &'static str {
        match self {
            TestOutcome::Success => LAST_SUCCESSFUL,
            TestOutcome::Failed => LAST_FAILED,
        }
    }

    fn directory(self) -> &'static str {
        match self {
            TestOutcome::Success => "success",
            TestOutcome::Failed => "failed",
        }
    }
}

/// Resolves the artifact URLs a peer serves for its last successful or
/// failed run.
pub struct ReportResolver {
    base_url: String,
}

impl ReportResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn files(&self, segment: &str) -> Vec<String> {
        INSPECTOR_ARTIFACTS
            .iter()
            .map(|name| format!("{}/{}/{}", self.base_url, segment, name))
            .collect()
    }

    pub fn success_files(&self) -> Vec<String> {
        self.files(LAST_SUCCESSFUL)
    }

    pub fn failed_files(&self) -> Vec<String> {
        self.files(LAST_FAILED)
    }
}

/// Lays out downloaded reports on disk, keyed by test execution number and
/// outcome: `<base>/test-<n>/<success|failed>/<peer>/`.
#[derive(Debug)]
pub struct Organizer {
    base_dir: PathBuf,
    current_test: u32,
}

impl Organizer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            current_test: 0,
        }
    }

    pub fn set_current_test(&mut self, test_number: u32) {
        self.current_test = test_number;
    }

    pub fn current_test(&self) -> u32 {
        self.current_test
    }

    pub fn organize(&self, test_number: u32, outcome: TestOutcome) -> PathBuf {
        self.base_dir
            .join(format!("test-{test_number}"))
            .join(outcome.directory())
    }

    pub fn peer_directory(&self, outcome: TestOutcome, peer: &PeerId) -> PathBuf {
        self.organize(self.current_test, outcome)
            .join(peer.to_string())
    }
}

/// Fetches a completed round's per-peer artifacts into the organizer's
/// layout. Called by the executor after each round resolves; failures here
/// are logged and never affect the run's verdict.
#[async_trait]
pub trait ReportsDownloader: Send + Sync {
    /// Points the tracker at the round about to be downloaded.
    fn start_test(&self, test_number: u32);

    /// Pulls one peer's artifacts from `data_server`, the base URL that
    /// peer advertised in its get response for the round.
    async fn download(
        &self,
        peer: &PeerId,
        data_server: &str,
        outcome: TestOutcome,
    ) -> anyhow::Result<Vec<PathBuf>>;
}

/// Default downloader: pulls the resolver's artifact URLs from each peer's
/// data server over HTTP.
pub struct HttpDownloader {
    organizer: Mutex<Organizer>,
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            organizer: Mutex::new(Organizer::new(base_dir)),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, url: &str, target_dir: &Path) -> anyhow::Result<PathBuf> {
        let name = url.rsplit('/').next().unwrap_or("report");
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        tokio::fs::create_dir_all(target_dir).await?;
        let target = target_dir.join(name);
        tokio::fs::write(&target, &body).await?;
        debug!("downloaded {url} to {}", target.display());
        Ok(target)
    }
}

#[async_trait]
impl ReportsDownloader for HttpDownloader {
    fn start_test(&self, test_number: u32) {
        self.organizer.lock().set_current_test(test_number);
    }

    async fn download(
        &self,
        peer: &PeerId,
        data_server: &str,
        outcome: TestOutcome,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let resolver = ReportResolver::new(data_server);
        let urls = match outcome {
            TestOutcome::Success => resolver.success_files(),
            TestOutcome::Failed => resolver.failed_files(),
        };
        let target_dir = self.organizer.lock().peer_directory(outcome, peer);

        let mut downloaded = Vec::new();
        for url in urls {
            match self.fetch(&url, &target_dir).await {
                Ok(path) => downloaded.push(path),
                Err(e) => warn!("unable to download {url}: {e:#}"),
            }
        }
        Ok(downloaded)
    }
}
