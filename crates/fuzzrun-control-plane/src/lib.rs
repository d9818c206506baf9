//! FuzzRun Control Plane Library
//!
//! This crate provides the fuzzing orchestration core: the task store,
//! engine process supervision, telemetry collection, per-task monitoring
//! and live update fan-out, plus the HTTP surface over them.

pub mod collector;
pub mod config;
pub mod engine;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod monitor;
pub mod service;
pub mod store;
pub mod supervisor;

pub use collector::{ArtifactError, Sample, StatsCollector};
pub use config::Config;
pub use hub::{HubError, NotificationHub};
pub use service::{FuzzReport, FuzzService, TaskCrash};
pub use store::{StoreError, TaskStore};
pub use supervisor::{ProcessState, ProcessSupervisor, SupervisorError};
