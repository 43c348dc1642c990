//! Metrics recorder
//!
//! Turns disk state into the per-step time series handed to plotting
//! collaborators. Latencies are modeled, not measured: each is a base cost
//! scaled by the fragmentation the step's workload ran against, plus a penalty
//! for block moves made by compaction during the step and, for access time, a
//! cost per occupied run. A critical step therefore shows the crossing and the
//! price of the avalanche, while `fragmentation` shows the relaxed disk.

use crate::controller::CriticalEvent;
use crate::disk::DiskModel;
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Coefficients of the latency model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct CostModel {
    #[validate(range(min = 0.0))]
    pub base_time: f64,
    #[validate(range(min = 0.0))]
    pub save_coefficient: f64,
    #[validate(range(min = 0.0))]
    pub load_coefficient: f64,
    #[validate(range(min = 0.0))]
    pub access_coefficient: f64,
    /// Access cost per occupied run on the disk
    #[validate(range(min = 0.0))]
    pub fragment_penalty: f64,
    /// Save, load and access cost per block moved by compaction in the step
    #[validate(range(min = 0.0))]
    pub relocation_cost: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            base_time: 1.0,
            save_coefficient: 1.0,
            load_coefficient: 2.0,
            access_coefficient: 0.5,
            fragment_penalty: 0.02,
            relocation_cost: 0.05,
        }
    }
}

impl CostModel {
    pub fn ensure_finite(&self) -> Result<()> {
        let values = [
            self.base_time,
            self.save_coefficient,
            self.load_coefficient,
            self.access_coefficient,
            self.fragment_penalty,
            self.relocation_cost,
        ];
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(SimError::InvalidConfiguration(
                "cost_model coefficients must be finite".to_string(),
            ))
        }
    }

    /// Save latency for a fragmentation ratio, without compaction penalty
    pub fn save_time(&self, fragmentation: f64) -> f64 {
        self.base_time * (1.0 + self.save_coefficient * fragmentation)
    }

    /// Load latency for a fragmentation ratio, without compaction penalty
    pub fn load_time(&self, fragmentation: f64) -> f64 {
        self.base_time * (1.0 + self.load_coefficient * fragmentation)
    }

    pub fn access_time(&self, fragmentation: f64, occupied_extents: usize) -> f64 {
        self.base_time * (1.0 + self.access_coefficient * fragmentation)
            + self.fragment_penalty * occupied_extents as f64
    }

    pub fn relocation_penalty(&self, blocks_moved: usize) -> f64 {
        self.relocation_cost * blocks_moved as f64
    }
}

/// Fragmentation and occupied-run count of a disk at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSnapshot {
    pub fragmentation: f64,
    pub extent_count: usize,
}

impl LayoutSnapshot {
    pub fn of(disk: &DiskModel) -> Self {
        LayoutSnapshot {
            fragmentation: disk.fragmentation(),
            extent_count: disk.occupied_extent_count(),
        }
    }
}

/// Side effects of a step that the disk state alone does not show
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepActivity {
    /// Layout seen by the controller, before any avalanche response
    pub pre_response: Option<LayoutSnapshot>,
    /// Blocks moved by maintenance and avalanche compaction
    pub blocks_moved: usize,
    /// Events skipped because of out-of-space or unknown-file errors
    pub rejected_events: usize,
    /// The controller hit its attempt cap while still critical
    pub stalled: bool,
}

/// One point of the time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub step: u64,
    /// Fragmentation after the step, in percent
    pub fragmentation: f64,
    /// Fragmentation the controller evaluated, before any response, in percent
    pub pre_response_fragmentation: f64,
    pub save_time: f64,
    pub load_time: f64,
    pub access_time: f64,
    pub is_critical: bool,
    pub stalled: bool,
    pub free_blocks: usize,
    pub file_count: usize,
    pub extent_count: usize,
    pub blocks_moved: usize,
    pub rejected_events: usize,
}

/// Accumulates the append-only time series
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    cost: CostModel,
    samples: Vec<MetricSample>,
}

impl MetricsRecorder {
    pub fn new(cost: CostModel) -> Self {
        MetricsRecorder {
            cost,
            samples: Vec::new(),
        }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Derive the sample for `step` from the current disk and event log
    ///
    /// Latencies use `activity.pre_response` when present and the current
    /// layout otherwise.
    pub fn sample(
        &self,
        disk: &DiskModel,
        events: &[CriticalEvent],
        step: u64,
        activity: &StepActivity,
    ) -> MetricSample {
        let after = LayoutSnapshot::of(disk);
        let during = activity.pre_response.unwrap_or(after);
        let penalty = self.cost.relocation_penalty(activity.blocks_moved);

        let is_critical = events
            .iter()
            .rev()
            .take_while(|event| event.step >= step)
            .any(|event| event.step == step);

        MetricSample {
            step,
            fragmentation: after.fragmentation * 100.0,
            pre_response_fragmentation: during.fragmentation * 100.0,
            save_time: self.cost.save_time(during.fragmentation) + penalty,
            load_time: self.cost.load_time(during.fragmentation) + penalty,
            access_time: self.cost.access_time(during.fragmentation, during.extent_count)
                + penalty,
            is_critical,
            stalled: activity.stalled,
            free_blocks: disk.free_blocks(),
            file_count: disk.file_count(),
            extent_count: after.extent_count,
            blocks_moved: activity.blocks_moved,
            rejected_events: activity.rejected_events,
        }
    }

    pub fn record(&mut self, sample: MetricSample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<MetricSample> {
        self.samples
    }
}
