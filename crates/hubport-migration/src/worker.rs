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

//! Chunk worker
//!
//! One run transfers one chunk through four steps, each in a private
//! temporary directory under the configured work root:
//!
//! 1. check out the repository structure with pointer stubs only
//! 2. download the large objects assigned to the chunk
//! 3. delete every file outside the assignment, then empty directories
//! 4. upload what is left, retrying transient failures
//!
//! Failures in steps 1 to 3 end the run at once. The directory is removed
//! whatever the outcome. Running a chunk again uploads the same files with
//! the same content, so the destination converges to the same state.

use crate::model::{ChunkJob, ChunkResult};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use hubport_config::{SecretScrubber, Settings};
use hubport_git::{relative_slash_path, working_files, GIT_DIR};
use hubport_hub::{DestinationHub, HubError, HubResult, SourceHub, UploadSummary};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use walkdir::WalkDir;

/// Runs one unit of work
///
/// The orchestrator only sees this trait, so a chunk may run in-process or
/// anywhere else that can produce a [`ChunkResult`].
#[async_trait]
pub trait ChunkExecutor: Send + Sync {
    /// Transfers `job.chunk`; failures are reported in the result
    async fn execute(&self, job: ChunkJob) -> ChunkResult;
}

/// Limits and locations for chunk workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Parent of every chunk working area
    pub work_root: PathBuf,

    /// Upload retry policy
    pub retry: RetryPolicy,

    /// Deadline for the structure checkout
    pub clone_timeout: Duration,

    /// Deadline for downloading the chunk's large objects
    pub fetch_timeout: Duration,

    /// Deadline for one upload attempt
    pub upload_timeout: Duration,
}

impl WorkerOptions {
    /// Options from the loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            work_root: settings.transfer.work_root(),
            retry: RetryPolicy::from_settings(&settings.retry),
            clone_timeout: settings.timeouts.clone_timeout(),
            fetch_timeout: settings.timeouts.fetch_timeout(),
            upload_timeout: settings.timeouts.upload_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Prepare,
    Structure,
    Materialize,
    Prune,
    Upload,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Prepare => "working area",
            Step::Structure => "structure checkout",
            Step::Materialize => "large object download",
            Step::Prune => "prune",
            Step::Upload => "upload",
        })
    }
}

struct StepFailure {
    step: Step,
    error: HubError,
    attempts: u32,
}

impl StepFailure {
    fn new(step: Step, error: HubError) -> Self {
        Self {
            step,
            error,
            attempts: 0,
        }
    }
}

/// Transfers chunks from a source hub to a destination hub
pub struct ChunkWorker {
    source: Arc<dyn SourceHub>,
    destination: Arc<dyn DestinationHub>,
    options: WorkerOptions,
    scrubber: Arc<SecretScrubber>,
}

impl ChunkWorker {
    /// Creates a worker
    pub fn new(
        source: Arc<dyn SourceHub>,
        destination: Arc<dyn DestinationHub>,
        options: WorkerOptions,
        scrubber: Arc<SecretScrubber>,
    ) -> Self {
        Self {
            source,
            destination,
            options,
            scrubber,
        }
    }

    /// Options in effect
    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    async fn run(&self, job: &ChunkJob, root: &Path) -> Result<(UploadSummary, u32), StepFailure> {
        let index = job.chunk.index();

        with_deadline(
            self.options.clone_timeout,
            "structure checkout",
            self.source.fetch_structure(&job.source, root),
        )
        .await
        .map_err(|e| StepFailure::new(Step::Structure, e))?;
        debug!(chunk_index = index, "Structure checked out");

        let objects = job.chunk.large_object_paths();
        if !objects.is_empty() {
            let bytes = with_deadline(
                self.options.fetch_timeout,
                "large object download",
                self.source.fetch_objects(&job.source, root, &objects),
            )
            .await
            .map_err(|e| StepFailure::new(Step::Materialize, e))?;
            debug!(chunk_index = index, objects = objects.len(), bytes, "Large objects materialized");
        }

        let keep = job.chunk.paths();
        let prune_root = root.to_path_buf();
        let removed = tokio::task::spawn_blocking(move || prune_working_area(&prune_root, &keep))
            .await
            .map_err(|e| StepFailure::new(Step::Prune, HubError::Io(io::Error::other(e.to_string()))))?
            .map_err(|e| StepFailure::new(Step::Prune, e))?;
        debug!(chunk_index = index, removed, "Pruned working area");

        let message = format!(
            "Upload chunk {}/{} from {}",
            index + 1,
            job.total_chunks,
            job.source.id
        );
        let destination = &self.destination;
        let target = &job.destination;
        let message = message.as_str();
        let upload_timeout = self.options.upload_timeout;
        retry(&self.options.retry, HubError::is_transient, move |attempt| {
            debug!(chunk_index = index, attempt, "Uploading");
            with_deadline(
                upload_timeout,
                "upload",
                destination.upload_folder(target, root, message),
            )
        })
        .await
        .map_err(|failure| StepFailure {
            step: Step::Upload,
            error: failure.error,
            attempts: failure.attempts,
        })
    }
}

#[async_trait]
impl ChunkExecutor for ChunkWorker {
    async fn execute(&self, job: ChunkJob) -> ChunkResult {
        let index = job.chunk.index();
        let span = info_span!("chunk", chunk_index = index, total_chunks = job.total_chunks);

        async {
            let started = Instant::now();
            info!(
                files = job.chunk.len(),
                bytes = job.chunk.total_bytes(),
                "Chunk started"
            );

            let area = match create_working_area(&self.options.work_root, index).await {
                Ok(area) => area,
                Err(e) => {
                    let failure = StepFailure::new(Step::Prepare, e);
                    return self.failed(index, &failure, started.elapsed());
                }
            };

            let outcome = self.run(&job, area.path()).await;

            let path = area.path().to_path_buf();
            match tokio::task::spawn_blocking(move || area.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(path = %path.display(), error = %e, "Could not remove working area"),
                Err(e) => warn!(path = %path.display(), error = %e, "Cleanup task failed"),
            }

            match outcome {
                Ok((summary, attempts)) => {
                    info!(
                        files = summary.files,
                        bytes = summary.bytes,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Chunk complete"
                    );
                    ChunkResult::success(index, summary.files, summary.bytes, started.elapsed(), attempts)
                }
                Err(failure) => self.failed(index, &failure, started.elapsed()),
            }
        }
        .instrument(span)
        .await
    }
}

impl ChunkWorker {
    fn failed(&self, index: usize, failure: &StepFailure, elapsed: Duration) -> ChunkResult {
        let message = self
            .scrubber
            .scrub(&format!("{} failed: {}", failure.step, failure.error));
        warn!(
            step = %failure.step,
            transient = failure.error.is_transient(),
            attempts = failure.attempts,
            error = %message,
            "Chunk failed"
        );
        ChunkResult::failure(index, message, elapsed, failure.attempts)
    }
}

async fn create_working_area(work_root: &Path, index: usize) -> HubResult<tempfile::TempDir> {
    tokio::fs::create_dir_all(work_root).await?;
    let root = work_root.to_path_buf();
    let prefix = format!("hubport-chunk-{index}-");
    let area = tokio::task::spawn_blocking(move || {
        tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
    })
    .await
    .map_err(|e| HubError::Io(io::Error::other(e.to_string())))??;
    Ok(area)
}

async fn with_deadline<T, F>(limit: Duration, what: &str, operation: F) -> HubResult<T>
where
    F: Future<Output = HubResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(HubError::timeout(format!(
            "{} exceeded {}s",
            what,
            limit.as_secs()
        ))),
    }
}

/// Removes everything under `root` that is not in `keep`.
///
/// The `.git` directory goes first, then every unassigned file, then every
/// directory left empty. Fails when an assigned path is missing from the
/// tree. Returns the number of files removed.
pub fn prune_working_area(root: &Path, keep: &BTreeSet<String>) -> HubResult<usize> {
    let git_dir = root.join(GIT_DIR);
    if git_dir.exists() {
        std::fs::remove_dir_all(&git_dir)?;
    }

    let mut removed = 0;
    let mut present = BTreeSet::new();
    for file in working_files(root)? {
        if keep.contains(&file.relative) {
            present.insert(file.relative);
        } else {
            std::fs::remove_file(&file.absolute)?;
            removed += 1;
        }
    }

    // Symlinks and other non-regular entries are never uploaded
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| HubError::Io(io::Error::other(e.to_string())))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            if std::fs::read_dir(path)?.next().is_none() {
                std::fs::remove_dir(path)?;
            }
        } else if !entry.file_type().is_file() {
            let relative = relative_slash_path(root, path)?;
            if !keep.contains(&relative) {
                std::fs::remove_file(path)?;
                removed += 1;
            }
        }
    }

    if let Some(missing) = keep.iter().find(|p| !present.contains(*p)) {
        return Err(HubError::not_found(format!(
            "{} is assigned to the chunk but missing from the checkout",
            missing
        )));
    }
    Ok(removed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Chunk, FileDescriptor};
    use hubport_hub::mock::{MockFile, MockHub};
    use hubport_hub::{RepoId, RepoKind, RepoRef, Visibility};
    use tempfile::TempDir;

    fn repo(name: &str) -> RepoRef {
        RepoRef::new(RepoId::parse(&format!("alice/{name}")).unwrap(), RepoKind::Model)
    }

    fn options(work_root: &Path) -> WorkerOptions {
        WorkerOptions {
            work_root: work_root.to_path_buf(),
            retry: RetryPolicy::immediate(3),
            clone_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(30),
        }
    }

    fn worker(source: &MockHub, destination: &MockHub, work_root: &Path, secrets: &[&str]) -> ChunkWorker {
        ChunkWorker::new(
            Arc::new(source.clone()),
            Arc::new(destination.clone()),
            options(work_root),
            Arc::new(SecretScrubber::new(secrets.iter().copied())),
        )
    }

    async fn seeded() -> (MockHub, MockHub) {
        let source = MockHub::new(hubport_hub::Platform::HuggingFace);
        source
            .add_repo(
                &repo("src"),
                [
                    ("config.json", MockFile::small(b"{\"a\":1}".to_vec())),
                    ("weights/a.bin", MockFile::large(vec![1u8; 3000])),
                    ("weights/b.bin", MockFile::large(vec![2u8; 2000])),
                ],
            )
            .await;
        let destination = MockHub::new(hubport_hub::Platform::ModelScope);
        destination.create_repo(&repo("dst"), Visibility::Public).await.unwrap();
        (source, destination)
    }

    fn job(files: Vec<FileDescriptor>, index: usize) -> ChunkJob {
        ChunkJob {
            source: repo("src"),
            destination: repo("dst"),
            chunk: Chunk::new(index, files),
            total_chunks: 2,
        }
    }

    #[tokio::test]
    async fn test_chunk_uploads_only_its_files() {
        let (source, destination) = seeded().await;
        let work = TempDir::new().unwrap();
        let worker = worker(&source, &destination, work.path(), &[]);

        let result = worker
            .execute(job(vec![FileDescriptor::large("weights/a.bin", 3000, None)], 1))
            .await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.files, 1);
        assert_eq!(result.bytes, 3000);
        assert_eq!(result.attempts, 1);

        let files = destination.files(&repo("dst")).await.unwrap();
        assert_eq!(files["weights/a.bin"].len(), 3000);
        assert!(!files.contains_key("weights/b.bin"));
        assert!(!files.contains_key("config.json"));

        let fetched = source.fetched_paths().await;
        assert_eq!(fetched, vec![BTreeSet::from(["weights/a.bin".to_string()])]);
    }

    #[tokio::test]
    async fn test_working_area_is_removed() {
        let (source, destination) = seeded().await;
        let work = TempDir::new().unwrap();
        let worker = worker(&source, &destination, work.path(), &[]);

        source.fail_next_objects(HubError::Connection("reset".into())).await;
        let failed = worker
            .execute(job(vec![FileDescriptor::large("weights/a.bin", 3000, None)], 1))
            .await;
        assert!(!failed.is_success());

        worker.execute(job(vec![FileDescriptor::small("config.json", 7)], 0)).await;
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_transient_upload_is_retried() {
        let (source, destination) = seeded().await;
        let work = TempDir::new().unwrap();
        let worker = worker(&source, &destination, work.path(), &[]);

        destination
            .fail_uploads([
                HubError::Connection("connection reset".into()),
                HubError::from_status(503, "busy"),
            ])
            .await;
        let result = worker.execute(job(vec![FileDescriptor::small("config.json", 7)], 0)).await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(destination.calls().await.uploads, 3);
    }

    #[tokio::test]
    async fn test_terminal_upload_is_not_retried() {
        let (source, destination) = seeded().await;
        let work = TempDir::new().unwrap();
        let worker = worker(&source, &destination, work.path(), &["hf_terminal"]);

        destination
            .fail_uploads([HubError::Unauthorized("token hf_terminal is invalid".into())])
            .await;
        let result = worker.execute(job(vec![FileDescriptor::small("config.json", 7)], 0)).await;

        assert!(!result.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(destination.calls().await.uploads, 1);
        let error = result.error.unwrap();
        assert!(error.contains("upload failed"));
        assert!(error.contains("***"));
        assert!(!error.contains("hf_terminal"));
    }

    #[tokio::test]
    async fn test_structure_failure_is_terminal() {
        let (source, destination) = seeded().await;
        let work = TempDir::new().unwrap();
        let worker = worker(&source, &destination, work.path(), &[]);

        source.fail_next_structure(HubError::timeout("clone")).await;
        let result = worker.execute(job(vec![FileDescriptor::small("config.json", 7)], 0)).await;

        assert!(!result.is_success());
        assert_eq!(result.attempts, 0);
        assert!(result.error.unwrap().starts_with("structure checkout failed"));
        assert_eq!(source.calls().await.structure_fetches, 1);
        assert_eq!(destination.calls().await.uploads, 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (source, destination) = seeded().await;
        let work = TempDir::new().unwrap();
        let worker = worker(&source, &destination, work.path(), &[]);
        let files = vec![
            FileDescriptor::small("config.json", 7),
            FileDescriptor::large("weights/b.bin", 2000, None),
        ];

        destination
            .fail_uploads([HubError::PermissionDenied("no write".into())])
            .await;
        assert!(!worker.execute(job(files.clone(), 0)).await.is_success());

        assert!(worker.execute(job(files.clone(), 0)).await.is_success());
        let first = destination.files(&repo("dst")).await.unwrap();
        assert!(worker.execute(job(files, 0)).await.is_success());
        let second = destination.files(&repo("dst")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn test_prune_keeps_assignment() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::create_dir_all(root.join("weights/shards")).unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("config.json"), b"{}").unwrap();
        std::fs::write(root.join("weights/shards/a.bin"), b"a").unwrap();
        std::fs::write(root.join("weights/b.bin"), b"b").unwrap();
        std::fs::write(root.join("docs/guide.md"), b"g").unwrap();

        let keep = BTreeSet::from(["weights/shards/a.bin".to_string()]);
        let removed = prune_working_area(root, &keep).unwrap();

        assert_eq!(removed, 3);
        assert!(root.join("weights/shards/a.bin").exists());
        assert!(!root.join(".git").exists());
        assert!(!root.join("docs").exists());
        assert!(!root.join("config.json").exists());
        assert!(!root.join("weights/b.bin").exists());
    }

    #[test]
    fn test_prune_reports_missing_assignment() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("present.txt"), b"x").unwrap();
        let keep = BTreeSet::from(["present.txt".to_string(), "gone.bin".to_string()]);
        let err = prune_working_area(dir.path(), &keep).unwrap_err();
        assert!(err.is_not_found());
    }
}
