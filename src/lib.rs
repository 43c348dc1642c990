//! # soc-disk - Self-Organized Criticality Disk Simulator
//!
//! `soc-disk` models a virtual block disk under a stochastic create/delete/resize
//! workload and watches it drift toward a fragmentation threshold. When the
//! threshold is crossed a criticality controller triggers an avalanche: a
//! bounded burst of compaction that relaxes the disk back below the threshold.
//!
//! - **Deterministic**: every run is fully determined by its seed
//! - **Explicit context**: no global state, independent runs coexist
//! - **Time series output**: per-step fragmentation and modeled latencies,
//!   plus an append-only log of critical events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use soc_disk::{SimConfig, Simulation, Result};
//!
//! # fn main() -> Result<()> {
//! let report = Simulation::new(SimConfig::default())?.run();
//!
//! for sample in &report.samples {
//!     println!("{} {:.1}%", sample.step, sample.fragmentation);
//! }
//! println!("{} critical events", report.events.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Runs
//!
//! ```rust,no_run
//! use soc_disk::{SimulationBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let mut sim = SimulationBuilder::new()
//!     .disk_size_blocks(100)
//!     .size_range(1, 5)
//!     .fragmentation_threshold(0.4)
//!     .random_seed(42)
//!     .build()?;
//!
//! while let Some(sample) = sim.step() {
//!     if sample.is_critical {
//!         println!("avalanche at step {}", sample.step);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{config, controller, disk, engine, error, metrics, workload};

pub use crate::core::{
    config::SimConfig,
    controller::{
        AvalancheResponse, CriticalEvent, CriticalityController, CriticalityState, Evaluation,
        MaintenanceConfig,
    },
    disk::{
        CompactionReport, DiskModel, Extent, FileEntry, FileId, FragmentationMeasure,
        PlacementPolicy,
    },
    engine::{RunSummary, Simulation, SimulationReport},
    error::{Result, SimError},
    metrics::{CostModel, LayoutSnapshot, MetricSample, MetricsRecorder, StepActivity},
    workload::{SizeBounds, WorkloadEvent, WorkloadGenerator},
};

use tracing::info;

/// Builder for customizing a simulation run
///
/// Starts from [`SimConfig::default`]; unset parameters keep their default.
///
/// # Examples
///
/// ```rust,no_run
/// use soc_disk::{PlacementPolicy, SimulationBuilder};
///
/// # fn main() -> soc_disk::Result<()> {
/// let sim = SimulationBuilder::new()
///     .disk_size_blocks(512)
///     .num_steps(1_000)
///     .placement(PlacementPolicy::BestFit)
///     .with_maintenance()
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SimulationBuilder {
    config: SimConfig,
}

impl SimulationBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        SimulationBuilder {
            config: SimConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: SimConfig) -> Self {
        SimulationBuilder { config }
    }

    pub fn disk_size_blocks(mut self, blocks: usize) -> Self {
        self.config.disk_size_blocks = blocks;
        self
    }

    pub fn num_steps(mut self, steps: u64) -> Self {
        self.config.num_steps = steps;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Set the per-round create, delete and resize probabilities
    pub fn probabilities(mut self, create: f64, delete: f64, resize: f64) -> Self {
        self.config.create_probability = create;
        self.config.delete_probability = delete;
        self.config.resize_probability = resize;
        self
    }

    /// Set the inclusive file size range, in blocks
    pub fn size_range(mut self, min: usize, max: usize) -> Self {
        self.config.size_distribution = SizeBounds::new(min, max);
        self
    }

    pub fn fragmentation_threshold(mut self, threshold: f64) -> Self {
        self.config.fragmentation_threshold = threshold;
        self
    }

    /// Shape the avalanche response
    pub fn avalanche(mut self, floor: f64, strength: f64, max_attempts: u32) -> Self {
        self.config.avalanche_floor = floor;
        self.config.avalanche_strength = strength;
        self.config.max_response_attempts = max_attempts;
        self
    }

    pub fn measure(mut self, measure: FragmentationMeasure) -> Self {
        self.config.measure = measure;
        self
    }

    pub fn placement(mut self, placement: PlacementPolicy) -> Self {
        self.config.placement = placement;
        self
    }

    pub fn initial_files(mut self, count: usize) -> Self {
        self.config.initial_files = count;
        self
    }

    pub fn min_live_files(mut self, count: usize) -> Self {
        self.config.min_live_files = count;
        self
    }

    pub fn events_per_step(mut self, rounds: usize) -> Self {
        self.config.events_per_step = rounds;
        self
    }

    /// Enable scheduled maintenance compaction with the default schedule
    pub fn with_maintenance(mut self) -> Self {
        self.config.maintenance = Some(MaintenanceConfig::default());
        self
    }

    pub fn maintenance(mut self, maintenance: Option<MaintenanceConfig>) -> Self {
        self.config.maintenance = maintenance;
        self
    }

    pub fn cost_model(mut self, cost_model: CostModel) -> Self {
        self.config.cost_model = cost_model;
        self
    }

    /// The configuration built so far
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Validate the configuration and set up the run
    pub fn build(self) -> Result<Simulation> {
        info!(
            disk_size_blocks = self.config.disk_size_blocks,
            seed = self.config.random_seed,
            "Building simulation"
        );
        Simulation::new(self.config)
    }
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = SimulationBuilder::default();
        assert_eq!(builder.config(), &SimConfig::default());
    }

    #[test]
    fn test_builder_sets_fields() {
        let sim = SimulationBuilder::new()
            .disk_size_blocks(64)
            .num_steps(10)
            .random_seed(9)
            .size_range(1, 4)
            .fragmentation_threshold(0.5)
            .initial_files(0)
            .build()
            .unwrap();

        assert_eq!(sim.config().disk_size_blocks, 64);
        assert_eq!(sim.config().num_steps, 10);
        assert_eq!(sim.config().random_seed, 9);
        assert_eq!(sim.disk().total_blocks(), 64);
        assert_eq!(sim.disk().file_count(), 0);
    }

    #[test]
    fn test_builder_rejects_invalid() {
        let result = SimulationBuilder::new()
            .probabilities(1.2, 0.0, 0.0)
            .build();
        assert!(matches!(result, Err(SimError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_builder_maintenance() {
        let builder = SimulationBuilder::new().with_maintenance();
        assert_eq!(
            builder.config().maintenance,
            Some(MaintenanceConfig::default())
        );
        let builder = builder.maintenance(None);
        assert!(builder.config().maintenance.is_none());
    }
}
