//! Run configuration
//!
//! Every tunable of a run lives here: disk geometry, workload probabilities,
//! criticality parameters and cost-model coefficients. Configurations can be
//! built in code, deserialized from TOML or taken from [`SimConfig::default`].
//! A configuration is validated before any step runs; an invalid one is fatal.

use crate::controller::MaintenanceConfig;
use crate::disk::{FragmentationMeasure, PlacementPolicy};
use crate::error::{Result, SimError};
use crate::metrics::CostModel;
use crate::workload::SizeBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Complete configuration of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Number of blocks on the virtual disk
    #[validate(range(min = 1))]
    pub disk_size_blocks: usize,

    /// Number of sampled time steps
    pub num_steps: u64,

    /// Seed for the run's ChaCha8 generator
    pub random_seed: u64,

    /// Chance of a create event per round
    #[validate(range(min = 0.0, max = 1.0))]
    pub create_probability: f64,

    /// Chance of a delete event per round
    #[validate(range(min = 0.0, max = 1.0))]
    pub delete_probability: f64,

    /// Chance of a resize event per round
    #[validate(range(min = 0.0, max = 1.0))]
    pub resize_probability: f64,

    /// Inclusive bounds of created and resized file sizes, in blocks
    #[validate(nested)]
    pub size_distribution: SizeBounds,

    /// Fragmentation ratio at which the disk turns critical
    #[validate(range(min = 0.0, max = 1.0))]
    pub fragmentation_threshold: f64,

    /// Compaction fraction added per unit of fragmentation above threshold
    #[validate(range(min = 0.0))]
    pub avalanche_strength: f64,

    /// Compaction fraction of the first response attempt at threshold
    #[validate(range(min = 0.0, max = 1.0))]
    pub avalanche_floor: f64,

    /// Compaction attempts per step before the controller reports a stall
    #[validate(range(min = 1, max = 64))]
    pub max_response_attempts: u32,

    pub measure: FragmentationMeasure,

    pub placement: PlacementPolicy,

    /// Files created before step 0
    pub initial_files: usize,

    /// Deletes are suppressed while fewer files than this exist
    pub min_live_files: usize,

    /// Create/delete/resize rounds per step
    #[validate(range(min = 1))]
    pub events_per_step: usize,

    /// Periodic compaction independent of the criticality controller.
    /// An empty `[maintenance]` table enables it with the default schedule.
    pub maintenance: Option<MaintenanceConfig>,

    #[validate(nested)]
    pub cost_model: CostModel,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            disk_size_blocks: 1000,
            num_steps: 300,
            random_seed: 0,
            create_probability: 0.8,
            delete_probability: 0.2,
            resize_probability: 0.0,
            size_distribution: SizeBounds::new(5, 30),
            fragmentation_threshold: 0.7,
            avalanche_strength: 1.0,
            avalanche_floor: 0.25,
            max_response_attempts: 3,
            measure: FragmentationMeasure::default(),
            placement: PlacementPolicy::default(),
            initial_files: 5,
            min_live_files: 3,
            events_per_step: 1,
            maintenance: None,
            cost_model: CostModel::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a TOML configuration
    ///
    /// Missing keys take their default value; unknown keys are rejected.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(source)?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check every parameter
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the first offending parameter.
    pub fn ensure_valid(&self) -> Result<()> {
        let floats = [
            ("create_probability", self.create_probability),
            ("delete_probability", self.delete_probability),
            ("resize_probability", self.resize_probability),
            ("fragmentation_threshold", self.fragmentation_threshold),
            ("avalanche_strength", self.avalanche_strength),
            ("avalanche_floor", self.avalanche_floor),
        ];
        for (name, value) in floats {
            if !value.is_finite() {
                return Err(SimError::InvalidConfiguration(format!(
                    "{} must be a finite number, got {}",
                    name, value
                )));
            }
        }

        self.validate()?;
        self.size_distribution.ensure_ordered()?;
        self.cost_model.ensure_finite()?;

        if let Some(maintenance) = &self.maintenance {
            maintenance.validate()?;
            if !maintenance.fraction.is_finite() || !maintenance.min_fragmentation.is_finite() {
                return Err(SimError::InvalidConfiguration(
                    "maintenance fractions must be finite".to_string(),
                ));
            }
        }

        Ok(())
    }
}
