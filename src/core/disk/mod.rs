//! Virtual disk model
//!
//! The disk is a fixed array of blocks, each either free or owned by exactly one
//! file. Files keep the ordered list of blocks they occupy, which may be
//! scattered across the disk. Allocation uses a [`PlacementPolicy`]; compaction
//! packs files towards block 0 and is the only relaxation mechanism.

pub mod extent;
pub mod placement;

pub use extent::Extent;
pub use placement::PlacementPolicy;

use crate::error::{Result, SimError};
use extent::runs_of;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;

/// Identifier of a simulated file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// Which dispersion measure `fragmentation()` reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentationMeasure {
    /// Share of free space outside the largest free run
    #[default]
    FreeSpaceDispersion,
    /// Share of files whose blocks are not one ascending run
    FragmentedFiles,
}

/// A file registered on the disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub id: FileId,
    blocks: Vec<usize>,
}

impl FileEntry {
    /// Size in blocks
    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    /// Occupied blocks in logical order
    pub fn blocks(&self) -> &[usize] {
        &self.blocks
    }

    /// Layout of the file as ascending runs, in logical order
    pub fn extents(&self) -> Vec<Extent> {
        runs_of(&self.blocks)
    }

    pub fn is_contiguous(&self) -> bool {
        self.extents().len() <= 1
    }
}

/// Work done by a single `compact` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    /// Files moved into a contiguous run
    pub files_relocated: usize,
    /// Block copies performed, including displaced blocks of other files
    pub blocks_moved: usize,
}

impl CompactionReport {
    pub fn merge(&mut self, other: CompactionReport) {
        self.files_relocated += other.files_relocated;
        self.blocks_moved += other.blocks_moved;
    }
}

/// Block allocation table plus file registry
#[derive(Debug, Clone, PartialEq)]
pub struct DiskModel {
    /// Occupant of each block, `None` when free
    table: Vec<Option<FileId>>,

    /// Registered files, ordered by id so iteration is deterministic
    files: BTreeMap<FileId, FileEntry>,

    /// Number of free blocks
    free_blocks: usize,

    placement: PlacementPolicy,
    measure: FragmentationMeasure,
}

impl DiskModel {
    /// Create an empty disk with first-fit placement and free-space dispersion
    pub fn new(total_blocks: usize) -> Self {
        Self::with_policies(
            total_blocks,
            PlacementPolicy::default(),
            FragmentationMeasure::default(),
        )
    }

    pub fn with_policies(
        total_blocks: usize,
        placement: PlacementPolicy,
        measure: FragmentationMeasure,
    ) -> Self {
        DiskModel {
            table: vec![None; total_blocks],
            files: BTreeMap::new(),
            free_blocks: total_blocks,
            placement,
            measure,
        }
    }

    /// Allocate `size` blocks for a new file
    ///
    /// Uses the placement policy for a contiguous run and scatters the file over
    /// the largest free runs when none is large enough. On error the disk is
    /// left unchanged.
    pub fn allocate(&mut self, id: FileId, size: usize) -> Result<&FileEntry> {
        if size == 0 {
            return Err(SimError::ZeroSizedFile);
        }
        if self.files.contains_key(&id) {
            return Err(SimError::DuplicateFile(id));
        }

        let blocks = self.place(size)?;
        for &block in &blocks {
            self.table[block] = Some(id);
        }
        self.free_blocks -= size;

        debug!(file = %id, size, extents = runs_of(&blocks).len(), "Allocated file");

        let entry = self.files.entry(id).or_insert(FileEntry { id, blocks });
        Ok(entry)
    }

    /// Release every block owned by a file
    pub fn free(&mut self, id: FileId) -> Result<FileEntry> {
        let entry = self.files.remove(&id).ok_or(SimError::UnknownFile(id))?;

        for &block in &entry.blocks {
            self.table[block] = None;
        }
        self.free_blocks += entry.size();

        debug!(file = %id, size = entry.size(), "Freed file");
        Ok(entry)
    }

    /// Grow or shrink a file in place where possible
    ///
    /// Shrinking releases the tail of the block sequence. Growing first tries the
    /// free run right after the last block, then falls back to the placement
    /// policy; new blocks are appended to the sequence.
    pub fn resize(&mut self, id: FileId, new_size: usize) -> Result<()> {
        if new_size == 0 {
            return Err(SimError::ZeroSizedFile);
        }
        let current = self
            .files
            .get(&id)
            .map(FileEntry::size)
            .ok_or(SimError::UnknownFile(id))?;

        if new_size < current {
            let released = match self.files.get_mut(&id) {
                Some(entry) => entry.blocks.split_off(new_size),
                None => return Err(SimError::UnknownFile(id)),
            };
            for &block in &released {
                self.table[block] = None;
            }
            self.free_blocks += released.len();
        } else if new_size > current {
            let extra = new_size - current;
            let blocks = match self.extension_in_place(id, extra) {
                Some(blocks) => blocks,
                None => self.place(extra)?,
            };
            for &block in &blocks {
                self.table[block] = Some(id);
            }
            self.free_blocks -= extra;
            if let Some(entry) = self.files.get_mut(&id) {
                entry.blocks.extend(blocks);
            }
        }

        debug!(file = %id, from = current, to = new_size, "Resized file");
        Ok(())
    }

    /// Pack files towards block 0
    ///
    /// Walks the disk from the start. The file owning the first occupied block at
    /// or after the cursor is moved into `[cursor, cursor + size)` unless it
    /// already occupies that range; blocks of other files found in the range
    /// take the moved file's old slots. At most `ceil(fraction * file_count)` files
    /// are relocated. `fraction` is clamped to `[0, 1]` and a fraction of 1
    /// leaves every file contiguous with all free space in one trailing run.
    pub fn compact(&mut self, fraction: f64) -> CompactionReport {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let budget = (fraction * self.files.len() as f64).ceil() as usize;
        let mut report = CompactionReport::default();

        let mut cursor = 0;
        while report.files_relocated < budget {
            let Some(id) = self.table[cursor..].iter().flatten().next().copied() else {
                break;
            };
            let Some(size) = self.files.get(&id).map(FileEntry::size) else {
                break;
            };

            let target = Extent::new(cursor, size);
            let in_place = self
                .files
                .get(&id)
                .is_some_and(|entry| entry.blocks.iter().all(|&b| target.contains(b)));

            if in_place {
                // Already there, possibly listed out of order
                if let Some(entry) = self.files.get_mut(&id) {
                    entry.blocks = target.blocks().collect();
                }
            } else {
                report.blocks_moved += self.relocate(id, target);
                report.files_relocated += 1;
            }
            cursor = target.end();
        }

        debug!(
            fraction,
            budget,
            files_relocated = report.files_relocated,
            blocks_moved = report.blocks_moved,
            "Compaction pass"
        );
        report
    }

    /// Fragmentation in `[0, 1]` under the configured measure
    pub fn fragmentation(&self) -> f64 {
        match self.measure {
            FragmentationMeasure::FreeSpaceDispersion => self.free_space_dispersion(),
            FragmentationMeasure::FragmentedFiles => self.fragmented_file_ratio(),
        }
    }

    /// `(free - largest_free_run) / free`, zero on a full disk
    pub fn free_space_dispersion(&self) -> f64 {
        if self.free_blocks == 0 {
            return 0.0;
        }
        let largest = self.largest_free_extent().map_or(0, |run| run.length);
        (self.free_blocks - largest) as f64 / self.free_blocks as f64
    }

    /// Share of files laid out in more than one run, zero with no files
    pub fn fragmented_file_ratio(&self) -> f64 {
        if self.files.is_empty() {
            return 0.0;
        }
        let fragmented = self.files.values().filter(|f| !f.is_contiguous()).count();
        fragmented as f64 / self.files.len() as f64
    }

    /// Maximal runs of free blocks, ascending by start
    pub fn free_extents(&self) -> Vec<Extent> {
        let free: Vec<usize> = self
            .table
            .iter()
            .enumerate()
            .filter(|(_, occupant)| occupant.is_none())
            .map(|(block, _)| block)
            .collect();
        runs_of(&free)
    }

    pub fn largest_free_extent(&self) -> Option<Extent> {
        self.free_extents()
            .into_iter()
            .max_by(|a, b| a.length.cmp(&b.length).then(b.start.cmp(&a.start)))
    }

    /// Number of maximal occupied runs, regardless of owner
    pub fn occupied_extent_count(&self) -> usize {
        let mut count = 0;
        let mut prev_occupied = false;
        for occupant in &self.table {
            let occupied = occupant.is_some();
            if occupied && !prev_occupied {
                count += 1;
            }
            prev_occupied = occupied;
        }
        count
    }

    pub fn file(&self, id: FileId) -> Option<&FileEntry> {
        self.files.get(&id)
    }

    /// Registered ids in ascending order
    pub fn file_ids(&self) -> Vec<FileId> {
        self.files.keys().copied().collect()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Occupant of a block
    pub fn occupant(&self, block: usize) -> Result<Option<FileId>> {
        self.table
            .get(block)
            .copied()
            .ok_or(SimError::InvalidBlockId(block))
    }

    pub fn total_blocks(&self) -> usize {
        self.table.len()
    }

    pub fn free_blocks(&self) -> usize {
        self.free_blocks
    }

    pub fn allocated_blocks(&self) -> usize {
        self.table.len() - self.free_blocks
    }

    pub fn placement(&self) -> PlacementPolicy {
        self.placement
    }

    pub fn measure(&self) -> FragmentationMeasure {
        self.measure
    }

    /// Verify the block table and registry agree
    ///
    /// Every file block must be in range, owned by that file in the table and
    /// claimed by no other file; occupied blocks must add up to the file sizes
    /// and the free counter must match the table.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut file_blocks = 0;

        for entry in self.files.values() {
            if entry.blocks.is_empty() {
                return Err(SimError::InvariantViolation(format!(
                    "{} has no blocks",
                    entry.id
                )));
            }
            for &block in &entry.blocks {
                let occupant = self.occupant(block)?;
                if occupant != Some(entry.id) {
                    return Err(SimError::InvariantViolation(format!(
                        "block {} listed by {} but owned by {:?}",
                        block, entry.id, occupant
                    )));
                }
                if !seen.insert(block) {
                    return Err(SimError::InvariantViolation(format!(
                        "block {} listed twice",
                        block
                    )));
                }
            }
            file_blocks += entry.size();
        }

        let occupied = self.table.iter().filter(|o| o.is_some()).count();
        if occupied != file_blocks {
            return Err(SimError::InvariantViolation(format!(
                "{} occupied blocks but files hold {}",
                occupied, file_blocks
            )));
        }
        if occupied + self.free_blocks != self.table.len() {
            return Err(SimError::InvariantViolation(format!(
                "free counter {} disagrees with table ({} occupied of {})",
                self.free_blocks,
                occupied,
                self.table.len()
            )));
        }

        Ok(())
    }

    fn place(&self, count: usize) -> Result<Vec<usize>> {
        let out_of_space = SimError::OutOfSpace {
            requested: count,
            free: self.free_blocks,
        };
        if count > self.free_blocks {
            return Err(out_of_space);
        }
        self.placement
            .place(&self.free_extents(), count)
            .ok_or(out_of_space)
    }

    /// Free blocks directly after the file's last block, if enough of them
    fn extension_in_place(&self, id: FileId, extra: usize) -> Option<Vec<usize>> {
        let next = self.files.get(&id)?.blocks.last()? + 1;
        let end = next.checked_add(extra)?;
        if end > self.table.len() {
            return None;
        }
        if self.table[next..end].iter().all(Option::is_none) {
            Some((next..end).collect())
        } else {
            None
        }
    }

    /// Move a file into `target`, swapping displaced blocks into its old slots.
    /// Returns the number of block moves.
    fn relocate(&mut self, id: FileId, target: Extent) -> usize {
        let Some(entry) = self.files.get(&id) else {
            return 0;
        };

        let mut sources: Vec<usize> = entry
            .blocks
            .iter()
            .copied()
            .filter(|&block| !target.contains(block))
            .collect();
        sources.sort_unstable();

        let destinations: Vec<usize> = target
            .blocks()
            .filter(|&block| self.table[block] != Some(id))
            .collect();

        let mut moved = 0;
        for (dest, src) in destinations.into_iter().zip(sources) {
            let displaced = self.table[dest];
            if let Some(other) = displaced {
                if let Some(slot) = self
                    .files
                    .get_mut(&other)
                    .and_then(|e| e.blocks.iter_mut().find(|b| **b == dest))
                {
                    *slot = src;
                }
                moved += 1;
            }
            self.table[src] = displaced;
            self.table[dest] = Some(id);
            moved += 1;
        }

        if let Some(entry) = self.files.get_mut(&id) {
            entry.blocks = target.blocks().collect();
        }

        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> FileId {
        FileId(n)
    }

    /// Disk with holes: [A A . B B . . C . .]
    fn holey_disk() -> DiskModel {
        let mut disk = DiskModel::new(10);
        disk.allocate(id(1), 2).unwrap(); // 0-1
        disk.allocate(id(9), 1).unwrap(); // 2
        disk.allocate(id(2), 2).unwrap(); // 3-4
        disk.allocate(id(8), 2).unwrap(); // 5-6
        disk.allocate(id(3), 1).unwrap(); // 7
        disk.free(id(9)).unwrap();
        disk.free(id(8)).unwrap();
        disk
    }

    #[test]
    fn test_disk_creation() {
        let disk = DiskModel::new(100);
        assert_eq!(disk.total_blocks(), 100);
        assert_eq!(disk.free_blocks(), 100);
        assert_eq!(disk.file_count(), 0);
        assert_eq!(disk.fragmentation(), 0.0);
        assert_eq!(disk.free_extents(), vec![Extent::new(0, 100)]);
        assert_eq!(disk.placement(), PlacementPolicy::FirstFit);
        assert_eq!(disk.measure(), FragmentationMeasure::FreeSpaceDispersion);
    }

    #[test]
    fn test_allocate_contiguous_first_fit() {
        let mut disk = DiskModel::new(100);
        let blocks = disk.allocate(id(1), 5).unwrap().blocks().to_vec();
        assert_eq!(blocks, vec![0, 1, 2, 3, 4]);
        assert_eq!(disk.free_blocks(), 95);
        assert_eq!(disk.allocated_blocks(), 5);
        assert_eq!(disk.occupant(2).unwrap(), Some(id(1)));
        disk.check_invariants().unwrap();
    }

    #[test]
    fn test_allocate_fills_first_hole() {
        let mut disk = holey_disk();
        // Free runs: 2, 5-6, 8-9
        let blocks = disk.allocate(id(4), 2).unwrap().blocks().to_vec();
        assert_eq!(blocks, vec![5, 6]);
        disk.check_invariants().unwrap();
    }

    #[test]
    fn test_allocate_scatters_when_no_run_fits() {
        let mut disk = holey_disk();
        let entry = disk.allocate(id(4), 4).unwrap();
        assert!(!entry.is_contiguous());
        assert_eq!(entry.size(), 4);
        assert_eq!(disk.free_blocks(), 1);
        disk.check_invariants().unwrap();
    }

    #[test]
    fn test_allocate_out_of_space() {
        let mut disk = DiskModel::new(10);
        disk.allocate(id(1), 8).unwrap();

        let before = disk.clone();
        let result = disk.allocate(id(2), 3);
        assert!(matches!(
            result,
            Err(SimError::OutOfSpace {
                requested: 3,
                free: 2
            })
        ));
        assert_eq!(disk, before);
    }

    #[test]
    fn test_allocate_larger_than_disk() {
        let mut disk = DiskModel::new(10);
        assert!(matches!(
            disk.allocate(id(1), 11),
            Err(SimError::OutOfSpace { .. })
        ));
        assert_eq!(disk.free_blocks(), 10);
    }

    #[test]
    fn test_allocate_rejects_duplicate_and_zero() {
        let mut disk = DiskModel::new(10);
        disk.allocate(id(1), 2).unwrap();
        assert!(matches!(
            disk.allocate(id(1), 2),
            Err(SimError::DuplicateFile(_))
        ));
        assert!(matches!(
            disk.allocate(id(2), 0),
            Err(SimError::ZeroSizedFile)
        ));
        assert_eq!(disk.free_blocks(), 8);
    }

    #[test]
    fn test_free_and_unknown() {
        let mut disk = DiskModel::new(10);
        disk.allocate(id(1), 4).unwrap();

        let freed = disk.free(id(1)).unwrap();
        assert_eq!(freed.size(), 4);
        assert_eq!(disk.free_blocks(), 10);

        let before = disk.clone();
        assert!(matches!(disk.free(id(1)), Err(SimError::UnknownFile(_))));
        assert_eq!(disk, before);
    }

    #[test]
    fn test_resize_shrink_and_grow_in_place() {
        let mut disk = DiskModel::new(20);
        disk.allocate(id(1), 5).unwrap();

        disk.resize(id(1), 2).unwrap();
        assert_eq!(disk.file(id(1)).unwrap().blocks(), &[0, 1]);
        assert_eq!(disk.free_blocks(), 18);

        disk.resize(id(1), 6).unwrap();
        assert_eq!(disk.file(id(1)).unwrap().blocks(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(disk.free_blocks(), 14);
        disk.check_invariants().unwrap();
    }

    #[test]
    fn test_resize_grow_elsewhere_fragments() {
        let mut disk = DiskModel::new(20);
        disk.allocate(id(1), 3).unwrap(); // 0-2
        disk.allocate(id(2), 3).unwrap(); // 3-5

        disk.resize(id(1), 5).unwrap();
        let entry = disk.file(id(1)).unwrap();
        assert_eq!(entry.blocks(), &[0, 1, 2, 6, 7]);
        assert!(!entry.is_contiguous());
        disk.check_invariants().unwrap();
    }

    #[test]
    fn test_resize_errors_leave_disk_unchanged() {
        let mut disk = DiskModel::new(10);
        disk.allocate(id(1), 3).unwrap();
        let before = disk.clone();

        assert!(matches!(
            disk.resize(id(1), 11),
            Err(SimError::OutOfSpace { .. })
        ));
        assert!(matches!(
            disk.resize(id(7), 2),
            Err(SimError::UnknownFile(_))
        ));
        assert!(matches!(disk.resize(id(1), 0), Err(SimError::ZeroSizedFile)));
        assert_eq!(disk, before);
    }

    #[test]
    fn test_full_compaction_packs_everything() {
        let mut disk = holey_disk();
        disk.allocate(id(4), 4).unwrap(); // scattered
        disk.free(id(2)).unwrap();
        assert!(disk.fragmentation() > 0.0);

        let report = disk.compact(1.0);
        assert!(report.files_relocated > 0);
        assert!(report.blocks_moved >= report.files_relocated);

        disk.check_invariants().unwrap();
        assert_eq!(disk.free_space_dispersion(), 0.0);
        assert_eq!(disk.fragmented_file_ratio(), 0.0);
        assert_eq!(disk.occupied_extent_count(), 1);
        assert_eq!(
            disk.free_extents(),
            vec![Extent::new(disk.allocated_blocks(), disk.free_blocks())]
        );
    }

    #[test]
    fn test_compaction_displaces_interleaved_file() {
        let mut disk = DiskModel::new(8);
        disk.allocate(id(1), 1).unwrap(); // 0
        disk.allocate(id(2), 1).unwrap(); // 1
        disk.allocate(id(3), 1).unwrap(); // 2
        disk.free(id(1)).unwrap();
        disk.free(id(3)).unwrap();
        disk.allocate(id(4), 1).unwrap(); // 0
        disk.resize(id(4), 3).unwrap(); // 0, 2, 3
        assert!(!disk.file(id(4)).unwrap().is_contiguous());

        disk.compact(1.0);
        disk.check_invariants().unwrap();
        assert_eq!(disk.file(id(4)).unwrap().blocks(), &[0, 1, 2]);
        assert_eq!(disk.file(id(2)).unwrap().blocks(), &[3]);
    }

    #[test]
    fn test_partial_compaction_is_bounded() {
        let mut disk = DiskModel::new(40);
        for n in 0..10 {
            disk.allocate(id(n), 3).unwrap();
        }
        for n in (0..10).step_by(2) {
            disk.free(id(n)).unwrap();
        }
        // 5 files left, each preceded by a hole
        let report = disk.compact(0.2);
        assert_eq!(report.files_relocated, 1);
        disk.check_invariants().unwrap();

        let report = disk.compact(0.0);
        assert_eq!(report, CompactionReport::default());
    }

    #[test]
    fn test_compaction_of_packed_disk_moves_nothing() {
        let mut disk = DiskModel::new(20);
        disk.allocate(id(1), 4).unwrap();
        disk.allocate(id(2), 4).unwrap();
        let report = disk.compact(1.0);
        assert_eq!(report.blocks_moved, 0);
        assert_eq!(report.files_relocated, 0);
    }

    #[test]
    fn test_fragmentation_is_idempotent() {
        let mut disk = holey_disk();
        disk.allocate(id(4), 4).unwrap();
        let first = disk.fragmentation();
        let second = disk.fragmentation();
        assert_eq!(first, second);
    }

    #[test]
    fn test_free_space_dispersion() {
        let disk = holey_disk();
        // Free runs: 1 (block 2), 2 (5-6), 2 (8-9); largest 2 of 5 free
        assert_eq!(disk.free_blocks(), 5);
        assert!((disk.free_space_dispersion() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_fragmented_files_measure() {
        let mut disk = DiskModel::with_policies(
            10,
            PlacementPolicy::FirstFit,
            FragmentationMeasure::FragmentedFiles,
        );
        assert_eq!(disk.placement(), PlacementPolicy::FirstFit);
        assert_eq!(disk.measure(), FragmentationMeasure::FragmentedFiles);
        disk.allocate(id(1), 2).unwrap();
        disk.allocate(id(2), 2).unwrap();
        disk.free(id(1)).unwrap();
        disk.allocate(id(3), 8).unwrap(); // 0-1 + 4-9
        assert!((disk.fragmentation() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_occupied_extent_count() {
        let disk = holey_disk();
        // Occupied: 0-1, 3-4, 7
        assert_eq!(disk.occupied_extent_count(), 3);
    }

    #[test]
    fn test_occupant_out_of_range() {
        let disk = DiskModel::new(4);
        assert!(matches!(disk.occupant(4), Err(SimError::InvalidBlockId(4))));
    }
}
