//! Criticality controller
//!
//! A two-state machine (subcritical / critical) that watches fragmentation after
//! every step. At or above the threshold it runs an avalanche response: a short,
//! bounded series of compactions whose fraction grows with the excess over the
//! threshold and doubles on each unsuccessful attempt. If the attempt cap is hit
//! while still critical, the step is reported as a stall and the machine stays
//! critical for the next step.

use crate::config::SimConfig;
use crate::disk::{CompactionReport, DiskModel};
use crate::error::SimError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalityState {
    #[default]
    Subcritical,
    Critical,
}

/// What an avalanche response did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvalancheResponse {
    /// Compaction fraction used by each attempt, in order
    pub fractions: Vec<f64>,
    pub files_relocated: usize,
    pub blocks_moved: usize,
    /// Fragmentation once the response finished
    pub post_fragmentation: f64,
    /// Still at or above threshold after the last attempt
    pub stalled: bool,
}

impl AvalancheResponse {
    pub fn attempts(&self) -> usize {
        self.fractions.len()
    }
}

/// Append-only record of a step on which the controller responded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalEvent {
    pub step: u64,
    /// Fragmentation that triggered the response
    pub fragmentation: f64,
    pub response: AvalancheResponse,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub fragmentation_before: f64,
    pub fragmentation_after: f64,
    pub state: CriticalityState,
    pub event: Option<CriticalEvent>,
}

impl Evaluation {
    pub fn stalled(&self) -> bool {
        self.event.as_ref().is_some_and(|e| e.response.stalled)
    }
}

#[derive(Debug, Clone)]
pub struct CriticalityController {
    state: CriticalityState,
    threshold: f64,
    avalanche_strength: f64,
    avalanche_floor: f64,
    max_attempts: u32,
}

impl CriticalityController {
    pub fn new(config: &SimConfig) -> Self {
        CriticalityController {
            state: CriticalityState::Subcritical,
            threshold: config.fragmentation_threshold,
            avalanche_strength: config.avalanche_strength,
            avalanche_floor: config.avalanche_floor,
            max_attempts: config.max_response_attempts.max(1),
        }
    }

    pub fn state(&self) -> CriticalityState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compaction fraction for a response attempt (0-based)
    ///
    /// `(floor + strength * (f - threshold)) * 2^attempt`, capped at 1.
    pub fn avalanche_fraction(&self, fragmentation: f64, attempt: u32) -> f64 {
        let excess = (fragmentation - self.threshold).max(0.0);
        let base = self.avalanche_floor + self.avalanche_strength * excess;
        (base * 2f64.powi(attempt.min(62) as i32)).min(1.0)
    }

    /// Evaluate the disk after a step's events and respond if critical
    pub fn evaluate(&mut self, disk: &mut DiskModel, step: u64) -> Evaluation {
        let before = disk.fragmentation();

        if before < self.threshold {
            if self.state == CriticalityState::Critical {
                info!(step, fragmentation = before, "Relaxed below threshold");
                self.state = CriticalityState::Subcritical;
            }
            return Evaluation {
                fragmentation_before: before,
                fragmentation_after: before,
                state: self.state,
                event: None,
            };
        }

        if self.state == CriticalityState::Subcritical {
            info!(
                step,
                fragmentation = before,
                threshold = self.threshold,
                "Entering critical state"
            );
            self.state = CriticalityState::Critical;
        }

        let response = self.respond(disk, before);

        if response.stalled {
            let stall = SimError::StalledCriticality {
                step,
                fragmentation: response.post_fragmentation,
            };
            warn!(attempts = response.attempts(), "{}", stall);
        } else {
            info!(
                step,
                from = before,
                to = response.post_fragmentation,
                blocks_moved = response.blocks_moved,
                "Avalanche relaxed disk"
            );
            self.state = CriticalityState::Subcritical;
        }

        Evaluation {
            fragmentation_before: before,
            fragmentation_after: response.post_fragmentation,
            state: self.state,
            event: Some(CriticalEvent {
                step,
                fragmentation: before,
                response,
            }),
        }
    }

    fn respond(&self, disk: &mut DiskModel, before: f64) -> AvalancheResponse {
        let mut current = before;
        let mut total = CompactionReport::default();
        let mut fractions = Vec::new();

        for attempt in 0..self.max_attempts {
            let fraction = self.avalanche_fraction(current, attempt);
            let pass = disk.compact(fraction);
            fractions.push(fraction);
            total.merge(pass);
            current = disk.fragmentation();

            debug!(attempt, fraction, fragmentation = current, "Avalanche attempt");

            if current < self.threshold || pass.blocks_moved == 0 {
                break;
            }
        }

        AvalancheResponse {
            fractions,
            files_relocated: total.files_relocated,
            blocks_moved: total.blocks_moved,
            post_fragmentation: current,
            stalled: current >= self.threshold,
        }
    }
}

/// Periodic compaction every `interval` steps, independent of the controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct MaintenanceConfig {
    #[validate(range(min = 1))]
    pub interval: u64,
    /// Compaction fraction of each maintenance pass
    #[validate(range(min = 0.0, max = 1.0))]
    pub fraction: f64,
    /// Passes are skipped unless fragmentation is above this
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_fragmentation: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        MaintenanceConfig {
            interval: 150,
            fraction: 0.75,
            min_fragmentation: 0.6,
        }
    }
}

impl MaintenanceConfig {
    /// Run a pass if `step` is due and the disk is fragmented enough
    pub fn run(&self, disk: &mut DiskModel, step: u64) -> Option<CompactionReport> {
        if step == 0 || step % self.interval.max(1) != 0 {
            return None;
        }
        let fragmentation = disk.fragmentation();
        if fragmentation <= self.min_fragmentation {
            return None;
        }

        let report = disk.compact(self.fraction);
        info!(
            step,
            fragmentation,
            blocks_moved = report.blocks_moved,
            "Scheduled maintenance compaction"
        );
        Some(report)
    }
}
