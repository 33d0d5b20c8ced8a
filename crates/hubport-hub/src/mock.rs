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

//! In-memory mock hub for testing
//!
//! Implements both [`SourceHub`] and [`DestinationHub`] over an
//! `Arc<RwLock<..>>` of repositories. Clones share state, so one handle can
//! seed a repository while another is driven by the engine.
//!
//! Behaviour mirrors the real hubs where tests depend on it:
//!
//! - a checkout holds pointer stubs for large objects and a `.git` directory
//! - creating a repository adds a generated `README.md` and `.gitattributes`
//! - uploads merge into the repository
//! - listings are paged and list a SHA-256 for every file
//!
//! Failures can be queued per operation to exercise retry and error paths.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hubport_hub::mock::{MockFile, MockHub};
//! use hubport_hub::{Platform, RepoId, RepoKind, RepoRef, SourceHub};
//!
//! # async fn example() -> hubport_hub::HubResult<()> {
//! let hub = MockHub::new(Platform::HuggingFace);
//! let repo = RepoRef::new(RepoId::parse("alice/demo").unwrap(), RepoKind::Model);
//! hub.add_repo(&repo, [
//!     ("config.json", MockFile::small(b"{}".to_vec())),
//!     ("model.bin", MockFile::large(vec![0u8; 4096])),
//! ])
//! .await;
//!
//! let tree = hub.list_tree(&repo).await?;
//! assert_eq!(tree.len(), 2);
//! # Ok(())
//! # }
//! ```

use crate::error::{HubError, HubResult};
use crate::staging::stage_folder;
use crate::types::{ListingPage, Platform, RemoteFile, RepoRef, TreeEntry, Visibility};
use crate::{DestinationHub, SourceHub, UploadSummary, GENERATED_FILES};
use async_trait::async_trait;
use bytes::Bytes;
use hubport_git::{resolve_relative, LfsPointer};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A file held by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFile {
    /// Full content
    pub content: Bytes,

    /// Stored behind an LFS pointer
    pub large_object: bool,
}

impl MockFile {
    /// A regular file
    pub fn small(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            large_object: false,
        }
    }

    /// A large object
    pub fn large(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            large_object: true,
        }
    }

    fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.content))
    }

    fn pointer(&self) -> LfsPointer {
        LfsPointer::for_content(&self.content)
    }
}

/// How often each operation ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    /// `upload_folder` attempts, failed ones included
    pub uploads: usize,

    /// `fetch_structure` calls
    pub structure_fetches: usize,

    /// `fetch_objects` calls
    pub object_fetches: usize,

    /// `list_files` calls
    pub listings: usize,
}

#[derive(Default)]
struct MockRepo {
    files: BTreeMap<String, MockFile>,
    visibility: Visibility,
}

#[derive(Default)]
struct MockState {
    repos: HashMap<RepoRef, MockRepo>,
    broken_pointers: HashSet<(RepoRef, String)>,
    upload_failures: VecDeque<HubError>,
    structure_failures: VecDeque<HubError>,
    object_failures: VecDeque<HubError>,
    listing_failures: VecDeque<HubError>,
    info_failures: HashMap<RepoRef, HubError>,
    fetched_paths: Vec<BTreeSet<String>>,
    list_directories: bool,
    calls: MockCalls,
}

/// In-memory hub
#[derive(Clone)]
pub struct MockHub {
    platform: Platform,
    state: Arc<RwLock<MockState>>,
}

impl MockHub {
    /// Creates an empty mock posing as `platform`
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    /// Creates or replaces `repo` with exactly `files`
    pub async fn add_repo<P, I>(&self, repo: &RepoRef, files: I)
    where
        P: Into<String>,
        I: IntoIterator<Item = (P, MockFile)>,
    {
        let files = files.into_iter().map(|(p, f)| (p.into(), f)).collect();
        let mut state = self.state.write().await;
        state.repos.insert(
            repo.clone(),
            MockRepo {
                files,
                visibility: Visibility::Public,
            },
        );
    }

    /// Writes one file into an existing repository
    pub async fn put_file(&self, repo: &RepoRef, path: &str, file: MockFile) {
        let mut state = self.state.write().await;
        let entry = state.repos.entry(repo.clone()).or_default();
        entry.files.insert(path.to_string(), file);
    }

    /// Removes one file from a repository
    pub async fn remove_file(&self, repo: &RepoRef, path: &str) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.repos.get_mut(repo) {
            entry.files.remove(path);
        }
    }

    /// Makes the pointer of `path` unreadable in listings and checkouts
    pub async fn break_pointer(&self, repo: &RepoRef, path: &str) {
        let mut state = self.state.write().await;
        state.broken_pointers.insert((repo.clone(), path.to_string()));
    }

    /// Queues errors returned by the next `upload_folder` calls
    pub async fn fail_uploads(&self, errors: impl IntoIterator<Item = HubError>) {
        self.state.write().await.upload_failures.extend(errors);
    }

    /// Queues an error for the next `fetch_structure` call
    pub async fn fail_next_structure(&self, error: HubError) {
        self.state.write().await.structure_failures.push_back(error);
    }

    /// Queues an error for the next `fetch_objects` call
    pub async fn fail_next_objects(&self, error: HubError) {
        self.state.write().await.object_failures.push_back(error);
    }

    /// Queues an error for the next `list_files` call
    pub async fn fail_next_listing(&self, error: HubError) {
        self.state.write().await.listing_failures.push_back(error);
    }

    /// Makes listings carry a row for every directory.
    ///
    /// Directory rows count towards the page size but are not returned,
    /// as in a recursive ModelScope listing.
    pub async fn list_directories(&self, enabled: bool) {
        self.state.write().await.list_directories = enabled;
    }

    /// Makes the next `repo_info` of `repo` fail with `error`
    pub async fn fail_repo_info(&self, repo: &RepoRef, error: HubError) {
        self.state.write().await.info_failures.insert(repo.clone(), error);
    }

    /// Current content of `repo`
    pub async fn files(&self, repo: &RepoRef) -> Option<BTreeMap<String, Bytes>> {
        let state = self.state.read().await;
        state
            .repos
            .get(repo)
            .map(|r| r.files.iter().map(|(p, f)| (p.clone(), f.content.clone())).collect())
    }

    /// Visibility `repo` was created with
    pub async fn visibility(&self, repo: &RepoRef) -> Option<Visibility> {
        self.state.read().await.repos.get(repo).map(|r| r.visibility)
    }

    /// Call counters
    pub async fn calls(&self) -> MockCalls {
        self.state.read().await.calls
    }

    /// Path sets passed to each `fetch_objects` call, in call order
    pub async fn fetched_paths(&self) -> Vec<BTreeSet<String>> {
        self.state.read().await.fetched_paths.clone()
    }
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new(Platform::HuggingFace)
    }
}

impl fmt::Debug for MockHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHub")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

fn missing(repo: &RepoRef) -> HubError {
    HubError::not_found(format!("{} {}", repo.kind, repo.id))
}

#[async_trait]
impl SourceHub for MockHub {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn repo_info(&self, repo: &RepoRef) -> HubResult<()> {
        let mut state = self.state.write().await;
        if let Some(error) = state.info_failures.remove(repo) {
            return Err(error);
        }
        if state.repos.contains_key(repo) {
            Ok(())
        } else {
            Err(missing(repo))
        }
    }

    async fn list_tree(&self, repo: &RepoRef) -> HubResult<Vec<TreeEntry>> {
        let state = self.state.read().await;
        let entry = state.repos.get(repo).ok_or_else(|| missing(repo))?;
        Ok(entry
            .files
            .iter()
            .map(|(path, file)| {
                let broken = state.broken_pointers.contains(&(repo.clone(), path.clone()));
                if file.large_object {
                    TreeEntry {
                        path: path.clone(),
                        size: if broken { 0 } else { file.content.len() as u64 },
                        large_object: true,
                        pointer: if broken { None } else { Some(file.pointer()) },
                    }
                } else {
                    TreeEntry {
                        path: path.clone(),
                        size: file.content.len() as u64,
                        large_object: false,
                        pointer: None,
                    }
                }
            })
            .collect())
    }

    async fn read_pointer(&self, repo: &RepoRef, path: &str) -> HubResult<Option<LfsPointer>> {
        let state = self.state.read().await;
        let entry = state.repos.get(repo).ok_or_else(|| missing(repo))?;
        let file = entry
            .files
            .get(path)
            .ok_or_else(|| HubError::not_found(path.to_string()))?;
        if !file.large_object || state.broken_pointers.contains(&(repo.clone(), path.to_string())) {
            return Ok(None);
        }
        Ok(Some(file.pointer()))
    }

    async fn fetch_structure(&self, repo: &RepoRef, dest: &Path) -> HubResult<()> {
        let stubs: Vec<(String, Vec<u8>)> = {
            let mut state = self.state.write().await;
            state.calls.structure_fetches += 1;
            if let Some(error) = state.structure_failures.pop_front() {
                return Err(error);
            }
            let entry = state.repos.get(repo).ok_or_else(|| missing(repo))?;
            entry
                .files
                .iter()
                .map(|(path, file)| {
                    let content = if !file.large_object {
                        file.content.to_vec()
                    } else if state.broken_pointers.contains(&(repo.clone(), path.clone())) {
                        b"version https://git-lfs.github.com/spec/v1\noid garbage\n".to_vec()
                    } else {
                        file.pointer().to_string().into_bytes()
                    };
                    (path.clone(), content)
                })
                .collect()
        };

        tokio::fs::create_dir_all(dest.join(".git")).await?;
        tokio::fs::write(dest.join(".git/HEAD"), b"ref: refs/heads/main\n").await?;
        for (path, content) in stubs {
            let target = resolve_relative(dest, &path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await?;
        }
        Ok(())
    }

    async fn fetch_objects(&self, repo: &RepoRef, root: &Path, paths: &BTreeSet<String>) -> HubResult<u64> {
        let objects: Vec<(String, Bytes)> = {
            let mut state = self.state.write().await;
            state.calls.object_fetches += 1;
            state.fetched_paths.push(paths.clone());
            if let Some(error) = state.object_failures.pop_front() {
                return Err(error);
            }
            let entry = state.repos.get(repo).ok_or_else(|| missing(repo))?;
            let mut objects = Vec::with_capacity(paths.len());
            for path in paths {
                let file = entry
                    .files
                    .get(path)
                    .ok_or_else(|| HubError::not_found(path.clone()))?;
                if file.large_object {
                    objects.push((path.clone(), file.content.clone()));
                }
            }
            objects
        };

        let mut written = 0u64;
        for (path, content) in objects {
            let target = resolve_relative(root, &path)?;
            if !tokio::fs::try_exists(&target).await? {
                return Err(HubError::not_found(format!("{} is not in the checkout", path)));
            }
            tokio::fs::write(&target, &content).await?;
            written += content.len() as u64;
        }
        Ok(written)
    }
}

#[async_trait]
impl DestinationHub for MockHub {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn whoami(&self) -> HubResult<String> {
        Ok("mock-user".to_string())
    }

    async fn repo_exists(&self, repo: &RepoRef) -> HubResult<bool> {
        Ok(self.state.read().await.repos.contains_key(repo))
    }

    async fn create_repo(&self, repo: &RepoRef, visibility: Visibility) -> HubResult<()> {
        let mut state = self.state.write().await;
        if state.repos.contains_key(repo) {
            return Ok(());
        }
        let mut files = BTreeMap::new();
        files.insert(
            GENERATED_FILES[0].to_string(),
            MockFile::small(format!("# {}\n", repo.id.name()).into_bytes()),
        );
        files.insert(
            GENERATED_FILES[1].to_string(),
            MockFile::small(b"*.bin filter=lfs diff=lfs merge=lfs -text\n".to_vec()),
        );
        state.repos.insert(repo.clone(), MockRepo { files, visibility });
        Ok(())
    }

    async fn upload_folder(&self, repo: &RepoRef, folder: &Path, _message: &str) -> HubResult<UploadSummary> {
        {
            let mut state = self.state.write().await;
            state.calls.uploads += 1;
            if let Some(error) = state.upload_failures.pop_front() {
                return Err(error);
            }
            if !state.repos.contains_key(repo) {
                return Err(missing(repo));
            }
        }

        let staged = stage_folder(folder).await?;
        let mut incoming = Vec::with_capacity(staged.len());
        let mut summary = UploadSummary::default();
        for file in &staged {
            if file.is_pointer_stub()? {
                return Err(HubError::Integrity(format!(
                    "{} is still an LFS pointer stub",
                    file.relative
                )));
            }
            let content = Bytes::from(tokio::fs::read(&file.absolute).await?);
            let large = content.len() > hubport_git::pointer::MAX_POINTER_SIZE;
            summary.files += 1;
            summary.bytes += file.size;
            if large {
                summary.large_objects += 1;
            }
            incoming.push((file.relative.clone(), MockFile { content, large_object: large }));
        }

        let mut state = self.state.write().await;
        let entry = state.repos.get_mut(repo).ok_or_else(|| missing(repo))?;
        entry.files.extend(incoming);
        Ok(summary)
    }

    async fn list_files(&self, repo: &RepoRef, page: u32, page_size: u32) -> HubResult<ListingPage> {
        let mut state = self.state.write().await;
        state.calls.listings += 1;
        if let Some(error) = state.listing_failures.pop_front() {
            return Err(error);
        }
        if page == 0 || page_size == 0 {
            return Err(HubError::InvalidRequest("pages are numbered from 1".to_string()));
        }
        let entry = state.repos.get(repo).ok_or_else(|| missing(repo))?;

        // None marks a directory row
        let mut rows: Vec<Option<RemoteFile>> = Vec::new();
        let mut directories = BTreeSet::new();
        for (path, file) in &entry.files {
            if state.list_directories {
                for (end, _) in path.match_indices('/') {
                    if directories.insert(&path[..end]) {
                        rows.push(None);
                    }
                }
            }
            rows.push(Some(RemoteFile {
                path: path.clone(),
                size: file.content.len() as u64,
                sha256: Some(file.sha256()),
            }));
        }

        let size = page_size as usize;
        let start = (page as usize - 1).saturating_mul(size);
        let files = rows.iter().skip(start).take(size).flatten().cloned().collect();
        Ok(ListingPage {
            files,
            last: start.saturating_add(size) >= rows.len(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{RepoId, RepoKind};
    use tempfile::tempdir;

    fn repo(name: &str) -> RepoRef {
        RepoRef::new(RepoId::parse(name).unwrap(), RepoKind::Model)
    }

    async fn seeded() -> (MockHub, RepoRef) {
        let hub = MockHub::new(Platform::HuggingFace);
        let r = repo("alice/demo");
        hub.add_repo(
            &r,
            [
                ("config.json", MockFile::small(b"{}".to_vec())),
                ("unet/a.bin", MockFile::large(vec![1u8; 2048])),
                ("unet/b.bin", MockFile::large(vec![2u8; 4096])),
            ],
        )
        .await;
        (hub, r)
    }

    #[tokio::test]
    async fn test_structure_holds_pointer_stubs() {
        let (hub, r) = seeded().await;
        let dir = tempdir().unwrap();
        hub.fetch_structure(&r, dir.path()).await.unwrap();

        let stub = std::fs::read(dir.path().join("unet/a.bin")).unwrap();
        assert!(LfsPointer::is_pointer(&stub));
        assert_eq!(std::fs::read(dir.path().join("config.json")).unwrap(), b"{}");
        assert!(dir.path().join(".git/HEAD").exists());
    }

    #[tokio::test]
    async fn test_fetch_objects_is_selective() {
        let (hub, r) = seeded().await;
        let dir = tempdir().unwrap();
        hub.fetch_structure(&r, dir.path()).await.unwrap();

        let paths: BTreeSet<String> = ["unet/b.bin".to_string()].into_iter().collect();
        let written = hub.fetch_objects(&r, dir.path(), &paths).await.unwrap();
        assert_eq!(written, 4096);

        assert_eq!(std::fs::read(dir.path().join("unet/b.bin")).unwrap(), vec![2u8; 4096]);
        let untouched = std::fs::read(dir.path().join("unet/a.bin")).unwrap();
        assert!(LfsPointer::is_pointer(&untouched));
        assert_eq!(hub.fetched_paths().await, vec![paths]);
    }

    #[tokio::test]
    async fn test_create_repo_adds_generated_files() {
        let hub = MockHub::new(Platform::ModelScope);
        let r = repo("bob/new");
        hub.create_repo(&r, Visibility::Private).await.unwrap();

        let files = hub.files(&r).await.unwrap();
        assert!(files.contains_key("README.md"));
        assert!(files.contains_key(".gitattributes"));
        assert_eq!(hub.visibility(&r).await, Some(Visibility::Private));
    }

    #[tokio::test]
    async fn test_upload_merges() {
        let hub = MockHub::new(Platform::ModelScope);
        let r = repo("bob/new");
        hub.create_repo(&r, Visibility::Public).await.unwrap();

        let first = tempdir().unwrap();
        std::fs::write(first.path().join("a.txt"), b"a").unwrap();
        hub.upload_folder(&r, first.path(), "one").await.unwrap();

        let second = tempdir().unwrap();
        std::fs::write(second.path().join("b.txt"), b"b").unwrap();
        hub.upload_folder(&r, second.path(), "two").await.unwrap();

        let files = hub.files(&r).await.unwrap();
        assert!(files.contains_key("a.txt"));
        assert!(files.contains_key("b.txt"));
        assert_eq!(files.len(), 4);
    }

    #[tokio::test]
    async fn test_queued_upload_failure_leaves_repo_untouched() {
        let hub = MockHub::new(Platform::ModelScope);
        let r = repo("bob/new");
        hub.create_repo(&r, Visibility::Public).await.unwrap();
        hub.fail_uploads([HubError::timeout("upload")]).await;

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        assert!(hub.upload_folder(&r, dir.path(), "x").await.is_err());
        assert_eq!(hub.files(&r).await.unwrap().len(), 2);

        hub.upload_folder(&r, dir.path(), "x").await.unwrap();
        assert_eq!(hub.files(&r).await.unwrap().len(), 3);
        assert_eq!(hub.calls().await.uploads, 2);
    }

    #[tokio::test]
    async fn test_listing_pages() {
        let (hub, r) = seeded().await;
        let first = hub.list_files(&r, 1, 2).await.unwrap();
        let second = hub.list_files(&r, 2, 2).await.unwrap();
        assert_eq!(first.files.len(), 2);
        assert!(!first.last);
        assert_eq!(second.files.len(), 1);
        assert!(second.last);
        assert!(second.files[0].sha256.is_some());

        let beyond = hub.list_files(&r, 3, 2).await.unwrap();
        assert!(beyond.files.is_empty());
        assert!(beyond.last);
    }

    #[tokio::test]
    async fn test_directory_rows_fill_pages() {
        let (hub, r) = seeded().await;
        hub.list_directories(true).await;

        // rows: config.json, unet, unet/a.bin, unet/b.bin
        let first = hub.list_files(&r, 1, 2).await.unwrap();
        let paths: Vec<&str> = first.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["config.json"]);
        assert!(!first.last);

        let second = hub.list_files(&r, 2, 2).await.unwrap();
        assert_eq!(second.files.len(), 2);
        assert!(second.last);
    }

    #[tokio::test]
    async fn test_broken_pointer() {
        let (hub, r) = seeded().await;
        hub.break_pointer(&r, "unet/a.bin").await;
        assert_eq!(hub.read_pointer(&r, "unet/a.bin").await.unwrap(), None);

        let tree = hub.list_tree(&r).await.unwrap();
        let a = tree.iter().find(|e| e.path == "unet/a.bin").unwrap();
        assert!(a.large_object);
        assert!(a.pointer.is_none());
    }
}
