//! Core domain types for the job queue system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and the patch/revision types the store merges
//! - Envelope for transport deliveries
//! - BackoffPolicy and Clock for retry scheduling
//! - Events and stats for observers

mod backoff;
mod clock;
mod config;
mod envelope;
pub mod error;
mod events;
mod job;
mod stats;

pub use backoff::BackoffPolicy;
pub use clock::{Clock, ManualClock, SystemClock, later};
pub use config::QueueConfig;
pub use envelope::Envelope;
pub use error::{JobError, ValidationError};
pub use events::JobEvent;
pub use job::{
    DEFAULT_MAX_ATTEMPTS, Job, JobFilter, JobId, JobOptions, JobPatch, JobStatus, Page, Revision,
};
pub use stats::JobStats;
