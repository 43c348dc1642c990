//! Placement policies for new allocations
//!
//! A policy looks for a single free run that can hold the whole request. When no
//! run is large enough the request is scattered over the largest runs first,
//! which is the mechanism that manufactures fragmentation.

use super::extent::Extent;
use serde::{Deserialize, Serialize};

/// How a contiguous free run is chosen for an allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// Lowest-addressed run that fits
    #[default]
    FirstFit,
    /// Smallest run that fits (ties broken by address)
    BestFit,
}

impl PlacementPolicy {
    /// Choose `count` free blocks out of `free_runs`
    ///
    /// `free_runs` must be sorted by start block and non-overlapping. Returns
    /// `None` when fewer than `count` free blocks exist or `count` is zero.
    pub fn place(&self, free_runs: &[Extent], count: usize) -> Option<Vec<usize>> {
        let total: usize = free_runs.iter().map(|run| run.length).sum();
        if count == 0 || count > total {
            return None;
        }

        if let Some(run) = self.contiguous_fit(free_runs, count) {
            return Some((run.start..run.start + count).collect());
        }

        Some(scatter(free_runs, count))
    }

    fn contiguous_fit(&self, free_runs: &[Extent], count: usize) -> Option<Extent> {
        let mut fits = free_runs.iter().filter(|run| run.length >= count);
        match self {
            PlacementPolicy::FirstFit => fits.next().copied(),
            PlacementPolicy::BestFit => fits.min_by_key(|run| (run.length, run.start)).copied(),
        }
    }
}

/// Spread `count` blocks over the largest runs, fewest pieces first
fn scatter(free_runs: &[Extent], count: usize) -> Vec<usize> {
    let mut by_size: Vec<&Extent> = free_runs.iter().collect();
    by_size.sort_by(|a, b| b.length.cmp(&a.length).then(a.start.cmp(&b.start)));

    let mut blocks = Vec::with_capacity(count);
    for run in by_size {
        let take = (count - blocks.len()).min(run.length);
        blocks.extend(run.start..run.start + take);
        if blocks.len() == count {
            break;
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs() -> Vec<Extent> {
        // Free: 0-1, 5-10, 20-22
        vec![Extent::new(0, 2), Extent::new(5, 6), Extent::new(20, 3)]
    }

    #[test]
    fn test_first_fit_takes_lowest_run() {
        let blocks = PlacementPolicy::FirstFit.place(&runs(), 3).unwrap();
        assert_eq!(blocks, vec![5, 6, 7]);

        let blocks = PlacementPolicy::FirstFit.place(&runs(), 2).unwrap();
        assert_eq!(blocks, vec![0, 1]);
    }

    #[test]
    fn test_best_fit_takes_smallest_run() {
        let blocks = PlacementPolicy::BestFit.place(&runs(), 3).unwrap();
        assert_eq!(blocks, vec![20, 21, 22]);
    }

    #[test]
    fn test_scatter_when_no_run_fits() {
        let blocks = PlacementPolicy::FirstFit.place(&runs(), 8).unwrap();
        // Largest run (6 blocks) first, then the 3-block run
        assert_eq!(blocks, vec![5, 6, 7, 8, 9, 10, 20, 21]);
    }

    #[test]
    fn test_place_rejects_oversized_and_empty() {
        assert!(PlacementPolicy::FirstFit.place(&runs(), 12).is_none());
        assert!(PlacementPolicy::BestFit.place(&runs(), 0).is_none());
        assert!(PlacementPolicy::FirstFit.place(&[], 1).is_none());
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: PlacementPolicy = serde_json::from_str("\"best_fit\"").unwrap();
        assert_eq!(policy, PlacementPolicy::BestFit);
    }
}
