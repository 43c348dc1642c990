//! Stochastic workload generation
//!
//! Each step the generator rolls create, delete and resize events from the
//! configured probabilities. It holds no mutable state: the caller passes the
//! step, a snapshot of live file ids and its seeded generator, so a run is fully
//! determined by its seed.

use crate::config::SimConfig;
use crate::disk::FileId;
use crate::error::{Result, SimError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;
use validator::Validate;

/// One requested change to the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkloadEvent {
    /// New file of `size` blocks; the id is minted when the event is applied
    Create { size: usize },
    Delete { file: FileId },
    Resize { file: FileId, new_size: usize },
}

/// Inclusive bounds of a uniform size distribution, in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SizeBounds {
    #[validate(range(min = 1))]
    pub min: usize,
    pub max: usize,
}

impl SizeBounds {
    pub fn new(min: usize, max: usize) -> Self {
        SizeBounds { min, max }
    }

    pub fn ensure_ordered(&self) -> Result<()> {
        if self.min > self.max {
            return Err(SimError::InvalidConfiguration(format!(
                "size_distribution: min {} exceeds max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Draw a size uniformly from `[min, max]`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let low = self.min.min(self.max);
        let high = self.min.max(self.max);
        rng.gen_range(low..=high)
    }
}

/// Event source for a run
#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    create_probability: f64,
    delete_probability: f64,
    resize_probability: f64,
    sizes: SizeBounds,
    min_live_files: usize,
    events_per_step: usize,
}

impl WorkloadGenerator {
    pub fn new(config: &SimConfig) -> Self {
        WorkloadGenerator {
            create_probability: config.create_probability,
            delete_probability: config.delete_probability,
            resize_probability: config.resize_probability,
            sizes: config.size_distribution,
            min_live_files: config.min_live_files,
            events_per_step: config.events_per_step,
        }
    }

    pub fn sizes(&self) -> SizeBounds {
        self.sizes
    }

    /// Events for one step, in application order
    ///
    /// Each round yields at most one create, then one delete, then one resize.
    /// Delete and resize victims are drawn from `live_files`; deletes are
    /// skipped while fewer than `min_live_files` files are live. Every roll is
    /// drawn whether or not it can fire, so the stream only depends on the seed
    /// and the snapshot.
    pub fn next_events<R: Rng + ?Sized>(
        &self,
        step: u64,
        live_files: &[FileId],
        rng: &mut R,
    ) -> Vec<WorkloadEvent> {
        let mut events = Vec::new();
        let can_delete = !live_files.is_empty() && live_files.len() >= self.min_live_files;

        for _ in 0..self.events_per_step {
            if rng.gen_bool(self.create_probability) {
                events.push(WorkloadEvent::Create {
                    size: self.sizes.sample(rng),
                });
            }

            if rng.gen_bool(self.delete_probability) && can_delete {
                let file = live_files[rng.gen_range(0..live_files.len())];
                events.push(WorkloadEvent::Delete { file });
            }

            if rng.gen_bool(self.resize_probability) && !live_files.is_empty() {
                let file = live_files[rng.gen_range(0..live_files.len())];
                events.push(WorkloadEvent::Resize {
                    file,
                    new_size: self.sizes.sample(rng),
                });
            }
        }

        trace!(step, events = events.len(), "Generated workload");
        events
    }
}
