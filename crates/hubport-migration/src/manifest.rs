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

//! Source inventory
//!
//! The manifest only needs metadata: the tree listing plus, for large
//! objects the listing does not describe, the pointer stub. No payload is
//! downloaded. A pointer that cannot be read or parsed degrades its entry to
//! an unknown size with no hash; only a failed listing aborts the run.

use crate::error::{MigrationError, MigrationResult};
use crate::model::{FileDescriptor, Manifest};
use futures::stream::{self, StreamExt};
use hubport_config::SecretScrubber;
use hubport_hub::{RepoRef, SourceHub, TreeEntry};
use tracing::{debug, info, warn};

/// Pointer stubs fetched concurrently while building a manifest
const POINTER_READS: usize = 8;

/// Inventories a source repository
pub struct ManifestBuilder<'a> {
    source: &'a dyn SourceHub,
    scrubber: &'a SecretScrubber,
}

impl<'a> ManifestBuilder<'a> {
    /// Builds manifests from `source`, scrubbing error text with `scrubber`
    pub fn new(source: &'a dyn SourceHub, scrubber: &'a SecretScrubber) -> Self {
        Self { source, scrubber }
    }

    /// Lists `repo` and resolves every large object's declared size and hash
    ///
    /// # Errors
    ///
    /// [`MigrationError::Enumeration`] when the listing fails and
    /// [`MigrationError::DuplicatePath`] when it names a path twice.
    pub async fn build(&self, repo: &RepoRef) -> MigrationResult<Manifest> {
        let entries = self.source.list_tree(repo).await.map_err(|e| MigrationError::Enumeration {
            repo: repo.to_string(),
            message: self.scrubber.scrub(&e.to_string()),
        })?;
        debug!(repo = %repo, entries = entries.len(), "Listed source tree");

        let files: Vec<FileDescriptor> = stream::iter(entries)
            .map(|entry| self.describe(repo, entry))
            .buffered(POINTER_READS)
            .collect()
            .await;

        let manifest = Manifest::new(files)?;
        info!(
            repo = %repo,
            files = manifest.len(),
            large_objects = manifest.large_object_count(),
            bytes = manifest.total_bytes(),
            "Manifest built"
        );
        Ok(manifest)
    }

    async fn describe(&self, repo: &RepoRef, entry: TreeEntry) -> FileDescriptor {
        if !entry.large_object {
            return FileDescriptor::small(entry.path, entry.size);
        }

        let pointer = match entry.pointer {
            Some(pointer) => Some(pointer),
            None => match self.source.read_pointer(repo, &entry.path).await {
                Ok(Some(pointer)) => Some(pointer),
                Ok(None) => {
                    warn!(path = %entry.path, "Large object has no parseable pointer; size unknown");
                    None
                }
                Err(e) => {
                    warn!(
                        path = %entry.path,
                        error = %self.scrubber.scrub(&e.to_string()),
                        "Could not read pointer; size unknown"
                    );
                    None
                }
            },
        };

        match pointer {
            Some(pointer) => FileDescriptor::large(entry.path, pointer.size, Some(pointer.oid)),
            None => FileDescriptor::large(entry.path, 0, None),
        }
    }
}
