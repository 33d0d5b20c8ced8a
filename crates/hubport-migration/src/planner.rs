// Copyright (C) 2025  Hubport Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Chunk planning
//!
//! [`pack`] is a pure next-fit-decreasing pass: every regular file goes to
//! chunk 0, large objects follow largest first and join the most recently
//! opened chunk while it stays within budget. An object larger than the
//! budget gets a chunk of its own and is never split.
//!
//! [`ChunkPlanner`] owns the chunk-count cap. When a pass produces too many
//! chunks it raises the budget to `ceil(total / max_chunks)` and packs
//! again; the packing itself never looks at the cap.
//!
//! Same manifest and budget, same chunks: a run that failed part-way can be
//! re-planned and only the failed indices re-sent.

use crate::error::{MigrationError, MigrationResult};
use crate::model::{Chunk, FileDescriptor, Manifest};
use hubport_config::TransferSettings;
use std::cmp::Reverse;
use tracing::{debug, info};

/// Packs `manifest` into chunks of at most `budget` bytes
pub fn pack(manifest: &Manifest, budget: u64) -> Vec<Chunk> {
    let (small, mut large): (Vec<&FileDescriptor>, Vec<&FileDescriptor>) =
        manifest.files().iter().partition(|f| !f.is_large_object);

    let mut bins: Vec<(Vec<FileDescriptor>, u64)> = Vec::new();
    if !small.is_empty() {
        let total = small.iter().map(|f| f.size).sum();
        bins.push((small.into_iter().cloned().collect(), total));
    }

    // Stable sort keeps listing order among equal sizes
    large.sort_by_key(|f| Reverse(f.size));
    for file in large {
        match bins.last_mut() {
            Some((files, total)) if total.saturating_add(file.size) <= budget => {
                files.push(file.clone());
                *total += file.size;
            }
            _ => bins.push((vec![file.clone()], file.size)),
        }
    }

    bins.into_iter()
        .enumerate()
        .map(|(index, (files, _))| Chunk::new(index, files))
        .collect()
}

/// Smallest budget that keeps `total_bytes` within `max_chunks` chunks of
/// equal size, but never below `budget`
pub fn effective_budget(total_bytes: u64, budget: u64, max_chunks: usize) -> u64 {
    let max_chunks = max_chunks.max(1) as u64;
    budget.max(total_bytes.div_ceil(max_chunks))
}

/// A plan and the budget it was packed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Budget the chunks were packed with
    pub budget: u64,

    /// Chunks in index order
    pub chunks: Vec<Chunk>,
}

impl Plan {
    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether there is nothing to transfer
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Plans manifests under a budget and a chunk-count cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    budget: u64,
    max_chunks: usize,
}

impl ChunkPlanner {
    /// Creates a planner; both limits must be positive
    pub fn new(budget: u64, max_chunks: usize) -> MigrationResult<Self> {
        if budget == 0 {
            return Err(MigrationError::planning("chunk budget must be positive"));
        }
        if max_chunks == 0 {
            return Err(MigrationError::planning("max_chunks must be at least 1"));
        }
        Ok(Self { budget, max_chunks })
    }

    /// Planner for the configured budget and cap
    pub fn from_settings(settings: &TransferSettings) -> MigrationResult<Self> {
        Self::new(settings.chunk_bytes, settings.max_chunks)
    }

    /// Configured budget
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Configured cap
    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Cuts `manifest` into at most `max_chunks` chunks
    pub fn plan(&self, manifest: &Manifest) -> Plan {
        let mut budget = self.budget;
        let mut chunks = pack(manifest, budget);

        if chunks.len() > self.max_chunks {
            budget = effective_budget(manifest.total_bytes(), budget, self.max_chunks);
            debug!(
                planned = chunks.len(),
                max_chunks = self.max_chunks,
                budget,
                "Too many chunks, raising budget"
            );
            chunks = pack(manifest, budget);

            // Next-fit can still overshoot with uneven sizes; a budget of
            // the whole manifest always yields a single chunk
            while chunks.len() > self.max_chunks {
                budget = budget.saturating_mul(2).min(manifest.total_bytes().max(1));
                chunks = pack(manifest, budget);
            }
        }

        info!(
            chunks = chunks.len(),
            budget,
            files = manifest.len(),
            bytes = manifest.total_bytes(),
            "Plan ready"
        );
        Plan { budget, chunks }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KB: u64 = 1000;
    const GB: u64 = 1000 * 1000 * 1000;

    fn manifest(files: Vec<FileDescriptor>) -> Manifest {
        Manifest::new(files).unwrap()
    }

    fn sizes(chunk: &Chunk) -> Vec<u64> {
        chunk.files().iter().map(|f| f.size).collect()
    }

    #[test]
    fn test_oversized_object_gets_own_chunk() {
        let m = manifest(vec![
            FileDescriptor::small("README.md", 2 * KB),
            FileDescriptor::small("config.json", 3 * KB),
            FileDescriptor::small("tokenizer.json", 5 * KB),
            FileDescriptor::large("small.bin", 5 * GB, None),
            FileDescriptor::large("big.bin", 25 * GB, None),
        ]);

        let chunks = pack(&m, 20 * GB);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 3);
        assert_eq!(chunks[0].total_bytes(), 10 * KB);
        assert_eq!(sizes(&chunks[1]), vec![25 * GB]);
        assert_eq!(sizes(&chunks[2]), vec![5 * GB]);
    }

    #[test]
    fn test_next_fit_packs_equal_objects() {
        let m = manifest(vec![
            FileDescriptor::large("a.bin", 8 * GB, None),
            FileDescriptor::large("b.bin", 8 * GB, None),
            FileDescriptor::large("c.bin", 8 * GB, None),
        ]);

        let chunks = pack(&m, 20 * GB);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].total_bytes(), 16 * GB);
        assert_eq!(chunks[1].total_bytes(), 8 * GB);
        assert_eq!(chunks[0].index(), 0);
        assert_eq!(chunks[1].index(), 1);
    }

    #[test]
    fn test_large_objects_may_join_chunk_zero() {
        let m = manifest(vec![
            FileDescriptor::small("README.md", 10),
            FileDescriptor::large("a.bin", 50, None),
        ]);
        let chunks = pack(&m, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 2);
    }

    #[test]
    fn test_empty_seed_chunk_is_dropped() {
        let m = manifest(vec![FileDescriptor::large("a.bin", 50, None)]);
        let chunks = pack(&m, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].files()[0].is_large_object);

        assert!(pack(&manifest(vec![]), 100).is_empty());
    }

    #[test]
    fn test_planner_raises_budget_to_respect_cap() {
        let files = (0..10)
            .map(|i| FileDescriptor::large(format!("shard-{i}.bin"), 10, None))
            .collect();
        let m = manifest(files);

        let plan = ChunkPlanner::new(10, 5).unwrap().plan(&m);
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.budget, 20);
        assert!(plan.chunks.iter().all(|c| c.total_bytes() == 20));
    }

    #[test]
    fn test_planner_keeps_budget_under_cap() {
        let m = manifest(vec![
            FileDescriptor::large("a.bin", 8, None),
            FileDescriptor::large("b.bin", 8, None),
        ]);
        let plan = ChunkPlanner::new(10, 100).unwrap().plan(&m);
        assert_eq!(plan.budget, 10);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_planner_handles_uneven_overshoot() {
        let m = manifest(vec![
            FileDescriptor::large("a.bin", 6, None),
            FileDescriptor::large("b.bin", 5, None),
            FileDescriptor::large("c.bin", 5, None),
        ]);
        // ceil(16 / 2) = 8 still packs as [6] [5] [5]
        let plan = ChunkPlanner::new(1, 2).unwrap().plan(&m);
        assert!(plan.len() <= 2);
        assert_eq!(plan.chunks.iter().map(Chunk::len).sum::<usize>(), 3);
    }

    #[test]
    fn test_planner_rejects_zero_limits() {
        assert!(ChunkPlanner::new(0, 10).is_err());
        assert!(ChunkPlanner::new(10, 0).is_err());
    }

    #[test]
    fn test_effective_budget() {
        assert_eq!(effective_budget(1000, 100, 5), 200);
        assert_eq!(effective_budget(1001, 100, 5), 201);
        assert_eq!(effective_budget(100, 500, 5), 500);
    }
}
