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

//! Hub abstraction layer for hubport
//!
//! This crate provides the asynchronous interface the migration engine uses
//! to talk to a model hub, with two real backends and one for tests:
//! - HuggingFace Hub (`huggingface.co` or a mirror endpoint)
//! - ModelScope (`modelscope.cn`, `modelscope.ai`)
//! - [`MockHub`](mock::MockHub), in memory
//!
//! # Architecture
//!
//! The seam is split by direction. A [`SourceHub`] is read from: it lists a
//! repository tree, reads pointer files and materialises a chosen subset of
//! large objects into a local checkout. A [`DestinationHub`] is written to:
//! it creates repositories, merges folders into them and lists what they
//! hold. Every real backend implements both.
//!
//! ## Core Concepts
//!
//! - **Repositories** are addressed by a [`RepoRef`]: a `namespace/name` id
//!   plus its kind (model, dataset, space)
//! - **Large objects** are Git LFS objects; their pointer stubs carry the
//!   SHA-256 and size of the real content
//! - **Uploads merge**: uploading a folder adds or replaces the files it
//!   contains and leaves every other file of the repository alone
//!
//! # Error Handling
//!
//! All operations return [`HubResult`]. [`HubError::is_transient`] tells
//! callers whether another attempt is worth making.
//!
//! # Examples
//!
//! ```no_run
//! use hubport_hub::mock::MockHub;
//! use hubport_hub::{DestinationHub, Platform, RepoId, RepoKind, RepoRef, Visibility};
//!
//! #[tokio::main]
//! async fn main() -> hubport_hub::HubResult<()> {
//!     let hub = MockHub::new(Platform::ModelScope);
//!     let repo = RepoRef::new(RepoId::parse("alice/demo").unwrap(), RepoKind::Model);
//!
//!     hub.create_repo(&repo, Visibility::Public).await?;
//!     assert!(hub.repo_exists(&repo).await?);
//!
//!     let page = hub.list_files(&repo, 1, 100).await?;
//!     assert!(page.files.iter().any(|f| f.path == "README.md"));
//!     assert!(page.last);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::path::Path;

pub mod error;
pub mod http;
pub mod huggingface;
pub mod lfs;
pub mod mock;
pub mod modelscope;
pub mod staging;
pub mod types;

pub use error::{HubError, HubResult};
pub use huggingface::HuggingFaceHub;
pub use hubport_git::LfsPointer;
pub use modelscope::ModelScopeHub;
pub use types::{
    resolve_direction, ListingPage, ParseError, Platform, RemoteFile, RepoId, RepoKind, RepoRef,
    TreeEntry, Visibility,
};

/// Files a repository gets from its hub on creation.
///
/// Hubs rewrite these freely, so their content says nothing about whether a
/// transfer was faithful.
pub const GENERATED_FILES: [&str; 2] = ["README.md", ".gitattributes"];

/// What an upload pushed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Files committed
    pub files: usize,

    /// Bytes committed
    pub bytes: u64,

    /// Files among them that went through Git LFS
    pub large_objects: usize,
}

/// Read side of a hub
///
/// # Implementing SourceHub
///
/// Implementations must be `Send + Sync + Debug`. Every method may be called
/// concurrently for the same repository from different chunk workers, each
/// with its own local directory.
#[async_trait]
pub trait SourceHub: Send + Sync + Debug {
    /// The hub this backend talks to
    fn platform(&self) -> Platform;

    /// Succeeds when `repo` exists and is readable.
    ///
    /// # Errors
    ///
    /// [`HubError::NotFound`] when the hub has no such repository of that
    /// kind; any other error means the question could not be answered.
    async fn repo_info(&self, repo: &RepoRef) -> HubResult<()>;

    /// Every file of the repository's default revision, without payloads
    async fn list_tree(&self, repo: &RepoRef) -> HubResult<Vec<TreeEntry>>;

    /// Reads the LFS pointer stored at `path`.
    ///
    /// Returns `Ok(None)` when the file exists but is not a valid pointer.
    async fn read_pointer(&self, repo: &RepoRef, path: &str) -> HubResult<Option<LfsPointer>>;

    /// Checks out the repository into `dest` with every large object left as
    /// its pointer stub.
    async fn fetch_structure(&self, repo: &RepoRef, dest: &Path) -> HubResult<()>;

    /// Replaces the pointer stubs at `paths` under `root` with their content.
    ///
    /// Stubs outside `paths` are left untouched. Returns the bytes written.
    async fn fetch_objects(
        &self,
        repo: &RepoRef,
        root: &Path,
        paths: &BTreeSet<String>,
    ) -> HubResult<u64>;
}

/// Write side of a hub
#[async_trait]
pub trait DestinationHub: Send + Sync + Debug {
    /// The hub this backend talks to
    fn platform(&self) -> Platform;

    /// Name of the account the configured token belongs to
    async fn whoami(&self) -> HubResult<String>;

    /// Whether `repo` exists
    async fn repo_exists(&self, repo: &RepoRef) -> HubResult<bool>;

    /// Creates `repo`; an existing repository is not an error
    async fn create_repo(&self, repo: &RepoRef, visibility: Visibility) -> HubResult<()>;

    /// Commits every file under `folder` (except `.git`) to `repo`.
    ///
    /// The commit merges into the repository: files not present in `folder`
    /// stay as they are. Uploading the same folder twice yields the same
    /// repository content.
    async fn upload_folder(
        &self,
        repo: &RepoRef,
        folder: &Path,
        message: &str,
    ) -> HubResult<UploadSummary>;

    /// One page of the repository listing, pages numbered from 1.
    ///
    /// [`ListingPage::last`] follows the hub's own page, so a page can hold
    /// fewer than `page_size` files and still not be the last one.
    async fn list_files(
        &self,
        repo: &RepoRef,
        page: u32,
        page_size: u32,
    ) -> HubResult<ListingPage>;
}

/// Whether `path` is one of the [`GENERATED_FILES`]
pub fn is_generated_file(path: &str) -> bool {
    GENERATED_FILES.contains(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_files() {
        assert!(is_generated_file("README.md"));
        assert!(is_generated_file(".gitattributes"));
        assert!(!is_generated_file("docs/README.md"));
        assert!(!is_generated_file("config.json"));
    }
}
