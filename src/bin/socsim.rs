//! socsim
//!
//! Runs one simulation and prints the report. Logs go to stderr and are
//! filtered with `RUST_LOG`.

use anyhow::{bail, Context};
use clap::Parser;
use soc_disk::{FragmentationMeasure, PlacementPolicy, SimConfig, Simulation, SimulationReport};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "socsim")]
#[command(about = "Self-organized criticality simulation of disk fragmentation")]
struct Args {
    /// TOML configuration file (defaults apply to missing keys)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Random seed
    #[arg(short = 's', long)]
    seed: Option<u64>,

    /// Number of steps
    #[arg(short = 'n', long)]
    steps: Option<u64>,

    /// Disk size in blocks
    #[arg(short = 'b', long)]
    disk_size: Option<usize>,

    /// Fragmentation threshold in [0, 1]
    #[arg(short = 't', long)]
    threshold: Option<f64>,

    /// Fragmentation measure (free-space-dispersion, fragmented-files)
    #[arg(long)]
    measure: Option<String>,

    /// Placement policy (first-fit, best-fit)
    #[arg(long)]
    placement: Option<String>,

    /// Output format (summary, json, csv) [default: summary]
    #[arg(short = 'f', long, default_value = "summary")]
    format: String,
}

fn parse_measure(s: &str) -> Result<FragmentationMeasure, String> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "free-space-dispersion" | "dispersion" => Ok(FragmentationMeasure::FreeSpaceDispersion),
        "fragmented-files" | "files" => Ok(FragmentationMeasure::FragmentedFiles),
        _ => Err(format!(
            "Invalid measure '{}'. Valid options: free-space-dispersion, fragmented-files",
            s
        )),
    }
}

fn parse_placement(s: &str) -> Result<PlacementPolicy, String> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "first-fit" => Ok(PlacementPolicy::FirstFit),
        "best-fit" => Ok(PlacementPolicy::BestFit),
        _ => Err(format!(
            "Invalid placement '{}'. Valid options: first-fit, best-fit",
            s
        )),
    }
}

fn print_summary(report: &SimulationReport) {
    let summary = &report.summary;
    println!("steps:              {}", summary.steps);
    println!("critical events:    {}", summary.critical_events);
    println!("stalled steps:      {}", summary.stalled_steps);
    println!("peak fragmentation: {:.2}%", summary.peak_fragmentation);
    println!("mean fragmentation: {:.2}%", summary.mean_fragmentation);
    println!("blocks moved:       {}", summary.blocks_moved);
    println!("rejected events:    {}", summary.rejected_events);
    println!("final free blocks:  {}", summary.final_free_blocks);
    println!("final file count:   {}", summary.final_file_count);

    let steps = report.critical_steps();
    if !steps.is_empty() {
        let listed: Vec<String> = steps.iter().map(|s| s.to_string()).collect();
        println!("critical at steps:  {}", listed.join(", "));
    }
}

fn print_csv(report: &SimulationReport) {
    println!("step,fragmentation,pre_response_fragmentation,save_time,load_time,access_time,is_critical,stalled,free_blocks,file_count,blocks_moved");
    for s in &report.samples {
        println!(
            "{},{:.4},{:.4},{:.4},{:.4},{:.4},{},{},{},{},{}",
            s.step,
            s.fragmentation,
            s.pre_response_fragmentation,
            s.save_time,
            s.load_time,
            s.access_time,
            s.is_critical,
            s.stalled,
            s.free_blocks,
            s.file_count,
            s.blocks_moved
        );
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => SimConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    if let Some(steps) = args.steps {
        config.num_steps = steps;
    }
    if let Some(blocks) = args.disk_size {
        config.disk_size_blocks = blocks;
    }
    if let Some(threshold) = args.threshold {
        config.fragmentation_threshold = threshold;
    }
    if let Some(measure) = &args.measure {
        config.measure = parse_measure(measure).map_err(anyhow::Error::msg)?;
    }
    if let Some(placement) = &args.placement {
        config.placement = parse_placement(placement).map_err(anyhow::Error::msg)?;
    }

    let format = args.format.to_lowercase();
    if !matches!(format.as_str(), "summary" | "json" | "csv") {
        bail!(
            "Invalid format '{}'. Valid options: summary, json, csv",
            args.format
        );
    }

    info!("Configuration: {:?}", config);
    let report = Simulation::new(config)
        .context("invalid simulation configuration")?
        .run();

    match format.as_str() {
        "json" => println!("{}", report.to_json_pretty()?),
        "csv" => print_csv(&report),
        _ => print_summary(&report),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_measure_aliases() {
        for name in ["free-space-dispersion", "free_space_dispersion", "Dispersion"] {
            assert_eq!(
                parse_measure(name).unwrap(),
                FragmentationMeasure::FreeSpaceDispersion
            );
        }
        for name in ["fragmented-files", "Fragmented_Files", "files"] {
            assert_eq!(
                parse_measure(name).unwrap(),
                FragmentationMeasure::FragmentedFiles
            );
        }
    }

    #[test]
    fn test_parse_placement_aliases() {
        assert_eq!(parse_placement("first-fit").unwrap(), PlacementPolicy::FirstFit);
        assert_eq!(parse_placement("FIRST_FIT").unwrap(), PlacementPolicy::FirstFit);
        assert_eq!(parse_placement("best_fit").unwrap(), PlacementPolicy::BestFit);
        assert_eq!(parse_placement("Best-Fit").unwrap(), PlacementPolicy::BestFit);
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        let err = parse_measure("entropy").unwrap_err();
        assert!(err.contains("Invalid measure 'entropy'"));
        let err = parse_placement("worst-fit").unwrap_err();
        assert!(err.contains("Invalid placement 'worst-fit'"));
        assert!(parse_placement("firstfit").is_err());
    }
}
