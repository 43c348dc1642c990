//! Contiguous block runs
//!
//! An extent describes a contiguous range of blocks. The disk model uses extents
//! for free-space runs (placement, dispersion) and for describing how a file is
//! laid out.

use serde::{Deserialize, Serialize};

/// A contiguous range of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// Starting block index
    pub start: usize,
    /// Number of contiguous blocks
    pub length: usize,
}

impl Extent {
    pub fn new(start: usize, length: usize) -> Self {
        Extent { start, length }
    }

    /// One past the last block of the extent
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Check if this extent contains a block index
    pub fn contains(&self, block: usize) -> bool {
        block >= self.start && block < self.end()
    }

    /// Block indices covered by this extent, in ascending order
    pub fn blocks(&self) -> std::ops::Range<usize> {
        self.start..self.end()
    }
}

/// Group an ordered block sequence into maximal ascending runs.
///
/// `[4, 5, 6, 9, 10, 2]` becomes `[4+3, 9+2, 2+1]`. The order of the input is
/// kept, so a sequence that jumps backwards starts a new extent.
pub fn runs_of(blocks: &[usize]) -> Vec<Extent> {
    let mut runs: Vec<Extent> = Vec::new();

    for &block in blocks {
        match runs.last_mut() {
            Some(run) if run.end() == block => run.length += 1,
            _ => runs.push(Extent::new(block, 1)),
        }
    }

    runs
}
