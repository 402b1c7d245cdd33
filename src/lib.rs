//! Queue-driven submission worker
//!
//! Polls a remote queue for pending jobs, resolves each job's tier into an
//! ordered list of work items, and runs them in paced, bounded-concurrency
//! batches against ephemeral execution targets while keeping the remote
//! status record in step with local progress.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
