//! Simulation engine
//!
//! [`Simulation`] is the explicit context of one run: disk, workload source,
//! controller, recorder, critical-event log and the seeded generator. Nothing is
//! global, so independent runs can live side by side in one process.
//!
//! A step runs to completion before the next begins:
//! 1. the workload generator emits events, which are applied to the disk
//!    (out-of-space and unknown-file errors are counted and skipped),
//! 2. scheduled maintenance compaction runs if due,
//! 3. the criticality controller evaluates and may respond,
//! 4. the recorder samples the resulting state, keeping the layout the
//!    controller saw so a critical step shows both the crossing and the drop.

use crate::config::SimConfig;
use crate::controller::{CriticalEvent, CriticalityController, CriticalityState};
use crate::disk::{DiskModel, FileId};
use crate::error::Result;
use crate::metrics::{LayoutSnapshot, MetricSample, MetricsRecorder, StepActivity};
use crate::workload::{WorkloadEvent, WorkloadGenerator};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Result of a completed run, handed to plotting and reporting collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub samples: Vec<MetricSample>,
    pub events: Vec<CriticalEvent>,
    pub summary: RunSummary,
}

impl SimulationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Steps flagged critical, in order
    pub fn critical_steps(&self) -> Vec<u64> {
        self.samples
            .iter()
            .filter(|s| s.is_critical)
            .map(|s| s.step)
            .collect()
    }
}

/// Aggregates over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: u64,
    pub critical_events: usize,
    pub stalled_steps: usize,
    /// Highest fragmentation the controller saw, before any response, in percent
    pub peak_fragmentation: f64,
    /// Mean end-of-step fragmentation, in percent
    pub mean_fragmentation: f64,
    pub rejected_events: usize,
    pub blocks_moved: usize,
    pub final_free_blocks: usize,
    pub final_file_count: usize,
}

impl RunSummary {
    fn from_run(samples: &[MetricSample], events: &[CriticalEvent], disk: &DiskModel) -> Self {
        let peak = samples
            .iter()
            .map(|s| s.pre_response_fragmentation)
            .fold(0.0, f64::max);
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|s| s.fragmentation).sum::<f64>() / samples.len() as f64
        };

        RunSummary {
            steps: samples.len() as u64,
            critical_events: events.len(),
            stalled_steps: samples.iter().filter(|s| s.stalled).count(),
            peak_fragmentation: peak,
            mean_fragmentation: mean,
            rejected_events: samples.iter().map(|s| s.rejected_events).sum(),
            blocks_moved: samples.iter().map(|s| s.blocks_moved).sum(),
            final_free_blocks: disk.free_blocks(),
            final_file_count: disk.file_count(),
        }
    }
}

/// One simulation run
pub struct Simulation {
    config: SimConfig,
    disk: DiskModel,
    workload: WorkloadGenerator,
    controller: CriticalityController,
    recorder: MetricsRecorder,
    events: Vec<CriticalEvent>,
    rng: ChaCha8Rng,
    next_file_id: u64,
    step: u64,
}

impl Simulation {
    /// Validate `config` and set up a run
    ///
    /// The warm-up population (`initial_files`) is allocated here, before
    /// step 0, and is not sampled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` without running anything if the
    /// configuration is out of range.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.ensure_valid()?;

        info!(
            disk_size_blocks = config.disk_size_blocks,
            num_steps = config.num_steps,
            seed = config.random_seed,
            threshold = config.fragmentation_threshold,
            "Starting simulation"
        );

        let mut sim = Simulation {
            disk: DiskModel::with_policies(
                config.disk_size_blocks,
                config.placement,
                config.measure,
            ),
            workload: WorkloadGenerator::new(&config),
            controller: CriticalityController::new(&config),
            recorder: MetricsRecorder::new(config.cost_model),
            events: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(config.random_seed),
            next_file_id: 0,
            step: 0,
            config,
        };

        let sizes = sim.workload.sizes();
        for _ in 0..sim.config.initial_files {
            let size = sizes.sample(&mut sim.rng);
            if let Err(err) = sim.apply(WorkloadEvent::Create { size }) {
                debug!(%err, "Skipped warm-up file");
            }
        }

        Ok(sim)
    }

    /// Run the next step and return its sample, or `None` once all steps ran
    pub fn step(&mut self) -> Option<MetricSample> {
        if self.is_finished() {
            return None;
        }
        let step = self.step;
        let mut activity = StepActivity::default();

        let live = self.disk.file_ids();
        let workload = self.workload.next_events(step, &live, &mut self.rng);
        for event in workload {
            if let Err(err) = self.apply(event) {
                if err.is_recoverable() {
                    debug!(step, %err, "Skipped event");
                } else {
                    warn!(step, %err, "Rejected event");
                }
                activity.rejected_events += 1;
            }
        }

        if let Some(maintenance) = self.config.maintenance {
            if let Some(report) = maintenance.run(&mut self.disk, step) {
                activity.blocks_moved += report.blocks_moved;
            }
        }

        activity.pre_response = Some(LayoutSnapshot::of(&self.disk));
        let evaluation = self.controller.evaluate(&mut self.disk, step);
        if let Some(event) = evaluation.event {
            activity.blocks_moved += event.response.blocks_moved;
            activity.stalled = event.response.stalled;
            self.events.push(event);
        }

        debug_assert!(self.disk.check_invariants().is_ok());

        let sample = self
            .recorder
            .sample(&self.disk, &self.events, step, &activity);
        self.recorder.record(sample);
        self.step += 1;

        Some(sample)
    }

    /// Run every remaining step
    pub fn run_to_end(&mut self) {
        while self.step().is_some() {}
    }

    /// Run every remaining step and hand over the results
    pub fn run(mut self) -> SimulationReport {
        self.run_to_end();
        self.into_report()
    }

    /// Hand over the results collected so far
    pub fn into_report(self) -> SimulationReport {
        let summary = RunSummary::from_run(self.recorder.samples(), &self.events, &self.disk);

        info!(
            steps = summary.steps,
            critical_events = summary.critical_events,
            stalled_steps = summary.stalled_steps,
            peak_fragmentation = summary.peak_fragmentation,
            "Simulation finished"
        );

        SimulationReport {
            config: self.config,
            samples: self.recorder.into_samples(),
            events: self.events,
            summary,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.config.num_steps
    }

    /// Index of the next step to run
    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn disk(&self) -> &DiskModel {
        &self.disk
    }

    pub fn state(&self) -> CriticalityState {
        self.controller.state()
    }

    pub fn events(&self) -> &[CriticalEvent] {
        &self.events
    }

    pub fn samples(&self) -> &[MetricSample] {
        self.recorder.samples()
    }

    fn apply(&mut self, event: WorkloadEvent) -> Result<()> {
        match event {
            WorkloadEvent::Create { size } => {
                let id = FileId(self.next_file_id);
                self.next_file_id += 1;
                self.disk.allocate(id, size).map(|_| ())
            }
            WorkloadEvent::Delete { file } => self.disk.free(file).map(|_| ()),
            WorkloadEvent::Resize { file, new_size } => self.disk.resize(file, new_size),
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("step", &self.step)
            .field("num_steps", &self.config.num_steps)
            .field("state", &self.controller.state())
            .field("free_blocks", &self.disk.free_blocks())
            .field("files", &self.disk.file_count())
            .field("critical_events", &self.events.len())
            .finish()
    }
}
