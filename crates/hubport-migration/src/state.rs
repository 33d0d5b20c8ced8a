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

//! Run state with JSON persistence
//!
//! A run records the budget it planned with and how each chunk ended. Resuming
//! re-plans with that budget, which reproduces the chunk boundaries of an
//! unchanged manifest, and runs only the chunks that did not succeed.

use crate::error::{MigrationError, MigrationResult};
use crate::model::ChunkStatus;
use crate::orchestrator::MigrationReport;
use chrono::{DateTime, Utc};
use hubport_hub::{Platform, RepoRef, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;

/// One side of a migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Hub
    pub platform: Platform,
    /// Repository on that hub
    pub repo: RepoRef,
}

/// Last known state of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkState {
    /// Chunk index
    pub index: usize,
    /// How it ended
    pub status: ChunkStatus,
    /// Scrubbed cause, for failed chunks
    pub error: Option<String>,
}

/// Overall standing of a migration across runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every chunk has been uploaded
    Completed,
    /// Some chunks are still pending
    Partial,
    /// No chunk has been uploaded
    Failed,
}

/// Migration state persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    /// Format version
    pub version: u32,

    /// Where files come from
    pub source: Endpoint,

    /// Where files go
    pub destination: Endpoint,

    /// Visibility the destination was created with
    pub visibility: Visibility,

    /// Budget the plan was packed with
    pub budget: u64,

    /// Chunks in the plan
    pub total_chunks: usize,

    /// Chunks that have run at least once, by index
    pub chunks: Vec<ChunkState>,

    /// Overall standing
    pub status: RunStatus,

    /// First run
    pub started_at: DateTime<Utc>,

    /// Latest run
    pub last_checkpoint: DateTime<Utc>,
}

impl MigrationState {
    /// State after a first run
    pub fn from_report(
        source: Endpoint,
        destination: Endpoint,
        visibility: Visibility,
        report: &MigrationReport,
    ) -> Self {
        let now = Utc::now();
        let mut state = Self {
            version: STATE_VERSION,
            source,
            destination,
            visibility,
            budget: report.budget,
            total_chunks: report.total_chunks,
            chunks: Vec::new(),
            status: RunStatus::Failed,
            started_at: now,
            last_checkpoint: now,
        };
        state.record(report);
        state
    }

    /// Folds the result of a resumed run into the state
    ///
    /// # Errors
    ///
    /// [`MigrationError::State`] when the run planned a different number of
    /// chunks, which means the source changed since the state was written.
    pub fn merge(&mut self, report: &MigrationReport) -> MigrationResult<()> {
        if report.total_chunks != self.total_chunks && report.error.is_none() {
            return Err(MigrationError::state(format!(
                "plan changed: state has {} chunks, this run planned {}",
                self.total_chunks, report.total_chunks
            )));
        }
        self.record(report);
        Ok(())
    }

    fn record(&mut self, report: &MigrationReport) {
        for result in &report.chunks {
            let entry = ChunkState {
                index: result.index,
                status: result.status,
                error: result.error.clone(),
            };
            match self.chunks.binary_search_by_key(&result.index, |c| c.index) {
                Ok(pos) => self.chunks[pos] = entry,
                Err(pos) => self.chunks.insert(pos, entry),
            }
        }

        let succeeded = self
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Success)
            .count();
        self.status = if self.total_chunks > 0 && succeeded == self.total_chunks {
            RunStatus::Completed
        } else if succeeded == 0 {
            if self.total_chunks == 0 && report.error.is_none() {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            }
        } else {
            RunStatus::Partial
        };
        self.last_checkpoint = Utc::now();
    }

    /// Chunk indices that have not succeeded yet
    pub fn pending_chunks(&self) -> BTreeSet<usize> {
        let done: BTreeSet<usize> = self
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Success)
            .map(|c| c.index)
            .collect();
        (0..self.total_chunks).filter(|i| !done.contains(i)).collect()
    }

    /// Whether nothing is left to transfer
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Save state to `path`, creating parent directories
    pub async fn save(&self, path: &Path) -> MigrationResult<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                MigrationError::state(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        fs::write(path, json)
            .await
            .map_err(|e| MigrationError::state(format!("failed to write {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), status = ?self.status, "Saved migration state");
        Ok(())
    }

    /// Load state from `path`
    pub async fn load(path: &Path) -> MigrationResult<Self> {
        let json = fs::read_to_string(path)
            .await
            .map_err(|e| MigrationError::state(format!("failed to read {}: {e}", path.display())))?;

        let state: Self = serde_json::from_str(&json)?;
        if state.version != STATE_VERSION {
            return Err(MigrationError::state(format!(
                "unsupported state version {} in {}",
                state.version,
                path.display()
            )));
        }
        Ok(state)
    }

    /// Check if a state file exists
    pub async fn exists(path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }

    /// Delete the state file if there is one
    pub async fn delete(path: &Path) -> MigrationResult<()> {
        if Self::exists(path).await {
            fs::remove_file(path).await?;
        }
        Ok(())
    }
}

/// State file locations under the work directory
#[derive(Debug, Clone)]
pub struct StateManager {
    base_dir: PathBuf,
}

impl StateManager {
    /// State files live in `<work_root>/state`
    pub fn new(work_root: &Path) -> Self {
        Self {
            base_dir: work_root.join("state"),
        }
    }

    /// Directory holding the state files
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// State file of the migration from `source` to `destination`
    pub fn path_for(&self, source: &Endpoint, destination: &Endpoint) -> PathBuf {
        self.base_dir.join(format!(
            "{}-{}-{}--{}-{}-{}.json",
            source.platform.code(),
            source.repo.kind.as_str(),
            file_safe(&source.repo.id.to_string()),
            destination.platform.code(),
            destination.repo.kind.as_str(),
            file_safe(&destination.repo.id.to_string()),
        ))
    }
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ChunkResult;
    use crate::orchestrator::Outcome;
    use hubport_hub::{RepoId, RepoKind};
    use std::time::Duration;
    use tempfile::tempdir;

    fn endpoint(platform: Platform, id: &str) -> Endpoint {
        Endpoint {
            platform,
            repo: RepoRef::new(RepoId::parse(id).unwrap(), RepoKind::Model),
        }
    }

    fn report(total_chunks: usize, results: Vec<ChunkResult>) -> MigrationReport {
        let failed = results.iter().filter(|r| !r.is_success()).count();
        MigrationReport {
            outcome: if failed == 0 {
                Outcome::Succeeded
            } else if failed == results.len() {
                Outcome::Failed
            } else {
                Outcome::Partial
            },
            phases: Vec::new(),
            manifest_files: 0,
            manifest_bytes: 0,
            budget: 100,
            total_chunks,
            chunks: results,
            failures: Vec::new(),
            verification: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    fn ok(index: usize) -> ChunkResult {
        ChunkResult::success(index, 1, 10, Duration::ZERO, 1)
    }

    fn failed(index: usize) -> ChunkResult {
        ChunkResult::failure(index, "upload failed: timeout".into(), Duration::ZERO, 3)
    }

    fn state(report: &MigrationReport) -> MigrationState {
        MigrationState::from_report(
            endpoint(Platform::HuggingFace, "alice/llm"),
            endpoint(Platform::ModelScope, "bob/llm"),
            Visibility::Public,
            report,
        )
    }

    #[test]
    fn test_partial_run_leaves_failed_chunks_pending() {
        let state = state(&report(4, vec![ok(0), failed(1), ok(2), failed(3)]));

        assert_eq!(state.status, RunStatus::Partial);
        assert_eq!(state.budget, 100);
        assert_eq!(state.pending_chunks(), BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_resume_merge_completes() {
        let mut state = state(&report(3, vec![ok(0), failed(1), failed(2)]));
        state.merge(&report(3, vec![ok(1), ok(2)])).unwrap();

        assert!(state.is_complete());
        assert!(state.pending_chunks().is_empty());
        assert_eq!(state.chunks.len(), 3);
        assert!(state.chunks.iter().all(|c| c.error.is_none()));
    }

    #[test]
    fn test_resume_with_changed_plan_is_rejected() {
        let mut state = state(&report(3, vec![ok(0), failed(1), ok(2)]));
        let err = state.merge(&report(4, vec![ok(1)])).unwrap_err();
        assert!(matches!(err, MigrationError::State(_)));
    }

    #[test]
    fn test_all_failed_is_failed() {
        let state = state(&report(2, vec![failed(0), failed(1)]));
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.pending_chunks(), BTreeSet::from([0, 1]));
    }

    #[tokio::test]
    async fn test_state_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let original = state(&report(2, vec![ok(0), failed(1)]));
        original.save(&path).await.unwrap();
        assert!(MigrationState::exists(&path).await);

        let loaded = MigrationState::load(&path).await.unwrap();
        assert_eq!(loaded, original);

        MigrationState::delete(&path).await.unwrap();
        assert!(!MigrationState::exists(&path).await);
    }

    #[tokio::test]
    async fn test_corrupt_state_is_a_state_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        assert!(matches!(
            MigrationState::load(&path).await,
            Err(MigrationError::State(_))
        ));
    }

    #[test]
    fn test_state_manager_paths() {
        let manager = StateManager::new(Path::new("/tmp/hubport"));
        let path = manager.path_for(
            &endpoint(Platform::HuggingFace, "alice/llm"),
            &endpoint(Platform::ModelScope, "bob/llm"),
        );

        let normalized = path.to_string_lossy().replace('\\', "/");
        assert!(normalized.starts_with("/tmp/hubport/state/"));
        assert!(normalized.ends_with("hf-model-alice_llm--ms-model-bob_llm.json"));
    }
}
