//! Simulation core
//!
//! - [`error`] - Error types for simulation operations
//! - [`disk`] - Block-level disk model with placement and compaction
//! - [`workload`] - Seeded create/delete/resize event generation
//! - [`controller`] - Criticality state machine and avalanche response
//! - [`metrics`] - Cost model and per-step time series
//! - [`config`] - Run configuration, TOML loading and validation
//! - [`engine`] - The step loop tying the above together

pub mod config;
pub mod controller;
pub mod disk;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod workload;
