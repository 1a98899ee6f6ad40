//! Baton controller - coordinator side of the orchestration protocol
//!
//! The controller broadcasts requests to a dynamically discovered peer
//! fleet, collects correlated replies and notifications under deadlines,
//! and sequences test runs: resolve peers, push profile parameters, start
//! load, wait for completion signals, cool down, escalate.

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod inspector;
pub mod mqtt;
pub mod processor;
pub mod profile;
pub mod reports;
pub mod state;

pub use config::{load_config, ControllerConfig};
pub use coordinator::{CollectionResult, Coordinator, ResolvedPeers};
pub use executor::{ExecutorError, IncrementalTestExecutor, SingleTestExecutor};
pub use mqtt::{create_channel, spawn_note_listener, MqttChannel};
pub use processor::{TestProcessor, Verdict};
pub use profile::{IncrementalProfile, SinglePointProfile};
pub use reports::{HttpDownloader, Organizer, ReportResolver, ReportsDownloader, TestOutcome};
pub use state::{new_state, NoteBuffer, Shared};
