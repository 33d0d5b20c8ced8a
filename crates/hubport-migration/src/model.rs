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

//! Manifests, chunks and chunk outcomes
//!
//! A [`Manifest`] is built once per run and never changes afterwards. The
//! planner cuts it into [`Chunk`]s, each worker turns one [`ChunkJob`] into
//! one [`ChunkResult`].

use crate::error::{MigrationError, MigrationResult};
use hubport_hub::RepoRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

/// One file of a source repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Relative `/`-separated path, unique within its manifest
    pub path: String,

    /// Size in bytes; 0 when unknown
    pub size: u64,

    /// Content lives out-of-band behind an LFS pointer
    pub is_large_object: bool,

    /// SHA-256 the content must have, when the source states one
    pub content_hash: Option<String>,
}

impl FileDescriptor {
    /// A regular file
    pub fn small(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            is_large_object: false,
            content_hash: None,
        }
    }

    /// A large object with its declared size and hash
    pub fn large(path: impl Into<String>, size: u64, content_hash: Option<String>) -> Self {
        Self {
            path: path.into(),
            size,
            is_large_object: true,
            content_hash,
        }
    }
}

/// The file listing of a source repository for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    files: Vec<FileDescriptor>,
    total_bytes: u64,
    large_objects: usize,
}

impl Manifest {
    /// Builds a manifest, rejecting duplicate paths
    pub fn new(files: Vec<FileDescriptor>) -> MigrationResult<Self> {
        let mut seen = HashSet::with_capacity(files.len());
        for file in &files {
            if !seen.insert(file.path.as_str()) {
                return Err(MigrationError::DuplicatePath(file.path.clone()));
            }
        }
        let total_bytes = files.iter().map(|f| f.size).sum();
        let large_objects = files.iter().filter(|f| f.is_large_object).count();
        Ok(Self {
            files,
            total_bytes,
            large_objects,
        })
    }

    /// Entries in listing order
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the manifest has no entries
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all known sizes
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of large objects
    pub fn large_object_count(&self) -> usize {
        self.large_objects
    }

    /// Looks up an entry by path
    pub fn get(&self, path: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// A disjoint, non-empty slice of a manifest assigned to one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    index: usize,
    files: Vec<FileDescriptor>,
    total_bytes: u64,
}

impl Chunk {
    /// Creates chunk `index` holding `files`
    pub fn new(index: usize, files: Vec<FileDescriptor>) -> Self {
        let total_bytes = files.iter().map(|f| f.size).sum();
        Self {
            index,
            files,
            total_bytes,
        }
    }

    /// 0-based position in the plan
    pub fn index(&self) -> usize {
        self.index
    }

    /// Assigned files
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Sum of the assigned sizes
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of assigned files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Always false for chunks produced by the planner
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Every assigned path
    pub fn paths(&self) -> BTreeSet<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Assigned paths that are large objects
    pub fn large_object_paths(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .filter(|f| f.is_large_object)
            .map(|f| f.path.clone())
            .collect()
    }
}

/// One unit of work as handed to a chunk worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkJob {
    /// Repository read from
    pub source: RepoRef,

    /// Repository written to
    pub destination: RepoRef,

    /// Files to transfer
    pub chunk: Chunk,

    /// Size of the plan the chunk belongs to
    pub total_chunks: usize,
}

/// Outcome of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Uploaded
    Success,
    /// Gave up
    Error,
}

/// What one chunk worker run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    /// Chunk index
    pub index: usize,

    /// Outcome
    pub status: ChunkStatus,

    /// Files uploaded
    pub files: usize,

    /// Bytes uploaded
    pub bytes: u64,

    /// Wall time of the run, cleanup included
    pub elapsed: Duration,

    /// Upload attempts made; 0 when an earlier step failed
    pub attempts: u32,

    /// Scrubbed cause of the failure
    pub error: Option<String>,
}

impl ChunkResult {
    /// A successful run
    pub fn success(index: usize, files: usize, bytes: u64, elapsed: Duration, attempts: u32) -> Self {
        Self {
            index,
            status: ChunkStatus::Success,
            files,
            bytes,
            elapsed,
            attempts,
            error: None,
        }
    }

    /// A failed run
    pub fn failure(index: usize, error: String, elapsed: Duration, attempts: u32) -> Self {
        Self {
            index,
            status: ChunkStatus::Error,
            files: 0,
            bytes: 0,
            elapsed,
            attempts,
            error: Some(error),
        }
    }

    /// Whether the chunk was uploaded
    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Success
    }
}
