//! Baton worker - peer-side client and request handling
//!
//! A worker subscribes to the shared control topic, filters the broadcasts
//! that apply to it, performs the local action (start/stop/set/ping/stats)
//! and publishes a correlated response or an asynchronous notification.
//! Actual broker I/O lives behind the [`Workload`] trait.

pub mod client;
pub mod config;
pub mod params;
pub mod worker;
pub mod workload;

pub use client::WorkerClient;
pub use config::WorkerConfig;
pub use params::TestParameters;
pub use worker::Worker;
pub use workload::{TimedWorkload, Workload, WorkloadReport};
