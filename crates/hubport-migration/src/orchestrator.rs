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

//! Migration orchestration
//!
//! One run walks `Planning -> Transferring -> Verifying` and ends
//! `Succeeded`, `Partial` or `Failed`:
//!
//! - a manifest or plan failure ends the run `Failed` before any transfer
//! - every chunk is submitted at once; a semaphore bounds how many run
//! - a failed chunk never stops its siblings and is not retried here
//! - `Failed` when every chunk failed, `Partial` when only some did
//! - verification runs unless the run failed, and its findings are reported
//!   next to the outcome rather than changing it
//!
//! Results are ordered by chunk index regardless of completion order.

use crate::error::MigrationError;
use crate::manifest::ManifestBuilder;
use crate::model::{Chunk, ChunkJob, ChunkResult, Manifest};
use crate::planner::{ChunkPlanner, Plan};
use crate::verify::{VerificationReport, Verifier};
use crate::worker::{ChunkExecutor, ChunkWorker, WorkerOptions};
use futures::stream::{FuturesUnordered, StreamExt};
use hubport_config::{SecretScrubber, Settings};
use hubport_hub::{DestinationHub, RepoRef, SourceHub, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Where a run is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Building the manifest and the plan
    Planning,
    /// Chunks are running
    Transferring,
    /// Comparing the destination with the manifest
    Verifying,
    /// Every chunk succeeded
    Succeeded,
    /// Some chunks failed
    Partial,
    /// Nothing was transferred
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Planning => "PLANNING",
            Phase::Transferring => "TRANSFERRING",
            Phase::Verifying => "VERIFYING",
            Phase::Succeeded => "SUCCEEDED",
            Phase::Partial => "PARTIAL",
            Phase::Failed => "FAILED",
        })
    }
}

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every chunk succeeded
    Succeeded,
    /// At least one chunk succeeded and at least one failed
    Partial,
    /// Every chunk failed, or planning did
    Failed,
}

impl From<Outcome> for Phase {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Succeeded => Phase::Succeeded,
            Outcome::Partial => Phase::Partial,
            Outcome::Failed => Phase::Failed,
        }
    }
}

/// Whether the destination could be checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// The comparison ran; see [`VerificationReport::verified`]
    Verified(VerificationReport),
    /// The destination listing failed; the data may still be fine
    Unverifiable(String),
}

/// How the manifest is cut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Planner chunks, run in parallel
    #[default]
    Chunked,
    /// The whole manifest as one chunk
    SinglePass,
}

/// What to migrate and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    /// Repository read from
    pub source: RepoRef,

    /// Repository written to
    pub destination: RepoRef,

    /// Visibility if the destination has to be created
    pub visibility: Visibility,

    /// Chunked or single pass
    pub mode: TransferMode,

    /// Plan with exactly this budget, as recorded by an earlier run
    pub budget: Option<u64>,

    /// Run only these chunk indices
    pub only_chunks: Option<BTreeSet<usize>>,

    /// Compare the destination with the manifest afterwards
    pub verify: bool,
}

impl MigrationRequest {
    /// A chunked, verified migration of everything into a public repository
    pub fn new(source: RepoRef, destination: RepoRef) -> Self {
        Self {
            source,
            destination,
            visibility: Visibility::Public,
            mode: TransferMode::Chunked,
            budget: None,
            only_chunks: None,
            verify: true,
        }
    }
}

/// A chunk that did not make it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    /// Chunk index
    pub index: usize,
    /// Scrubbed cause
    pub error: String,
}

/// Everything a run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Final state
    pub outcome: Outcome,

    /// Phases in the order they were entered
    pub phases: Vec<Phase>,

    /// Files in the manifest
    pub manifest_files: usize,

    /// Bytes in the manifest
    pub manifest_bytes: u64,

    /// Budget the plan was packed with
    pub budget: u64,

    /// Chunks in the whole plan
    pub total_chunks: usize,

    /// Results of the chunks that ran, by index
    pub chunks: Vec<ChunkResult>,

    /// Failed chunks, by index
    pub failures: Vec<ChunkFailure>,

    /// Verification result, when it ran
    pub verification: Option<VerificationOutcome>,

    /// Why the run failed before transferring
    pub error: Option<String>,

    /// Wall time of the run
    pub elapsed: Duration,
}

impl MigrationReport {
    fn new() -> Self {
        Self {
            outcome: Outcome::Failed,
            phases: vec![Phase::Planning],
            manifest_files: 0,
            manifest_bytes: 0,
            budget: 0,
            total_chunks: 0,
            chunks: Vec::new(),
            failures: Vec::new(),
            verification: None,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Indices of the failed chunks
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// Files uploaded by successful chunks
    pub fn transferred_files(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_success()).map(|c| c.files).sum()
    }

    /// Bytes uploaded by successful chunks
    pub fn transferred_bytes(&self) -> u64 {
        self.chunks.iter().filter(|c| c.is_success()).map(|c| c.bytes).sum()
    }

    /// Verification ran and found missing or altered files
    pub fn integrity_mismatch(&self) -> bool {
        matches!(&self.verification, Some(VerificationOutcome::Verified(r)) if !r.verified)
    }

    /// Succeeded without an integrity mismatch
    pub fn is_clean(&self) -> bool {
        self.outcome == Outcome::Succeeded && !self.integrity_mismatch()
    }
}

/// Things a caller may want to display while a run is going
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A phase was entered
    Phase(Phase),
    /// The plan is ready; `scheduled` chunks will run
    Planned {
        /// Chunks in the plan
        total_chunks: usize,
        /// Chunks that will run
        scheduled: usize,
        /// Bytes they carry
        bytes: u64,
    },
    /// A chunk finished
    ChunkFinished(ChunkResult),
}

/// Receives [`ProgressEvent`]s
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Sequences one migration
pub struct Orchestrator {
    source: Arc<dyn SourceHub>,
    destination: Arc<dyn DestinationHub>,
    executor: Arc<dyn ChunkExecutor>,
    planner: ChunkPlanner,
    max_concurrency: usize,
    page_size: u32,
    scrubber: Arc<SecretScrubber>,
    progress: Option<ProgressCallback>,
}

impl Orchestrator {
    /// Orchestrator running in-process [`ChunkWorker`]s configured by `settings`
    pub fn new(
        source: Arc<dyn SourceHub>,
        destination: Arc<dyn DestinationHub>,
        settings: &Settings,
    ) -> Result<Self, MigrationError> {
        let scrubber = Arc::new(settings.scrubber());
        let worker = ChunkWorker::new(
            Arc::clone(&source),
            Arc::clone(&destination),
            WorkerOptions::from_settings(settings),
            Arc::clone(&scrubber),
        );
        Ok(Self {
            source,
            destination,
            executor: Arc::new(worker),
            planner: ChunkPlanner::from_settings(&settings.transfer)?,
            max_concurrency: settings.transfer.max_concurrency.max(1),
            page_size: settings.transfer.listing_page_size,
            scrubber,
            progress: None,
        })
    }

    /// Runs chunks through `executor` instead of in-process workers
    pub fn with_executor(mut self, executor: Arc<dyn ChunkExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Reports progress to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Runs at most `limit` chunks at once
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Uses `planner` for chunked runs
    pub fn with_planner(mut self, planner: ChunkPlanner) -> Self {
        self.planner = planner;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    fn enter(&self, report: &mut MigrationReport, phase: Phase) {
        if report.phases.last() != Some(&phase) {
            report.phases.push(phase);
        }
        info!(phase = %phase, "Migration phase");
        self.emit(ProgressEvent::Phase(phase));
    }

    fn fail_early(&self, mut report: MigrationReport, message: String, started: Instant) -> MigrationReport {
        let message = self.scrubber.scrub(&message);
        error!(error = %message, "Migration failed before transfer");
        report.error = Some(message);
        report.outcome = Outcome::Failed;
        self.enter(&mut report, Phase::Failed);
        report.elapsed = started.elapsed();
        report
    }

    /// Builds the manifest of `request.source` and its plan
    pub async fn plan(&self, request: &MigrationRequest) -> Result<(Manifest, Plan), MigrationError> {
        let manifest = ManifestBuilder::new(self.source.as_ref(), &self.scrubber)
            .build(&request.source)
            .await?;

        let plan = match request.mode {
            TransferMode::SinglePass => {
                let chunks = if manifest.is_empty() {
                    Vec::new()
                } else {
                    vec![Chunk::new(0, manifest.files().to_vec())]
                };
                Plan {
                    budget: manifest.total_bytes(),
                    chunks,
                }
            }
            TransferMode::Chunked => match request.budget {
                Some(budget) => ChunkPlanner::new(budget, self.planner.max_chunks())?.plan(&manifest),
                None => self.planner.plan(&manifest),
            },
        };
        Ok((manifest, plan))
    }

    /// Runs `request` to completion
    pub async fn run(&self, request: &MigrationRequest) -> MigrationReport {
        let started = Instant::now();
        let mut report = MigrationReport::new();
        self.enter(&mut report, Phase::Planning);

        let (manifest, plan) = match self.plan(request).await {
            Ok(planned) => planned,
            Err(e) => return self.fail_early(report, e.to_string(), started),
        };
        report.manifest_files = manifest.len();
        report.manifest_bytes = manifest.total_bytes();
        report.budget = plan.budget;
        report.total_chunks = plan.len();

        let total_chunks = plan.len();
        let chunks = match select_chunks(plan.chunks, request.only_chunks.as_ref()) {
            Ok(chunks) => chunks,
            Err(e) => return self.fail_early(report, e.to_string(), started),
        };
        self.emit(ProgressEvent::Planned {
            total_chunks,
            scheduled: chunks.len(),
            bytes: chunks.iter().map(Chunk::total_bytes).sum(),
        });

        self.enter(&mut report, Phase::Transferring);
        if let Err(e) = self.ensure_destination(request).await {
            return self.fail_early(report, e.to_string(), started);
        }

        let jobs = chunks
            .into_iter()
            .map(|chunk| ChunkJob {
                source: request.source.clone(),
                destination: request.destination.clone(),
                chunk,
                total_chunks,
            })
            .collect();
        report.chunks = self.fan_out(jobs).await;
        report.failures = report
            .chunks
            .iter()
            .filter(|c| !c.is_success())
            .map(|c| ChunkFailure {
                index: c.index,
                error: c.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();

        let succeeded = report.chunks.len() - report.failures.len();
        report.outcome = if report.failures.is_empty() {
            Outcome::Succeeded
        } else if succeeded == 0 {
            Outcome::Failed
        } else {
            Outcome::Partial
        };

        if report.outcome != Outcome::Failed && request.verify {
            self.enter(&mut report, Phase::Verifying);
            let verifier = Verifier::new(self.destination.as_ref(), self.page_size, &self.scrubber);
            report.verification = Some(match verifier.verify(&manifest, &request.destination).await {
                Ok(verification) => VerificationOutcome::Verified(verification),
                Err(e) => {
                    warn!(error = %e, "Verification could not run");
                    VerificationOutcome::Unverifiable(e.to_string())
                }
            });
        }

        let finished = Phase::from(report.outcome);
        self.enter(&mut report, finished);
        report.elapsed = started.elapsed();
        info!(
            outcome = ?report.outcome,
            chunks = report.chunks.len(),
            failed = report.failures.len(),
            bytes = report.transferred_bytes(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Migration finished"
        );
        report
    }

    async fn ensure_destination(&self, request: &MigrationRequest) -> Result<(), MigrationError> {
        if !self.destination.repo_exists(&request.destination).await? {
            info!(repo = %request.destination, "Creating destination repository");
            self.destination
                .create_repo(&request.destination, request.visibility)
                .await?;
        }
        Ok(())
    }

    async fn fan_out(&self, jobs: Vec<ChunkJob>) -> Vec<ChunkResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = FuturesUnordered::new();

        for job in jobs {
            let index = job.chunk.index();
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                match semaphore.acquire_owned().await {
                    Ok(_permit) => executor.execute(job).await,
                    Err(e) => ChunkResult::failure(index, e.to_string(), started.elapsed(), 0),
                }
            });
            tasks.push(async move { (index, handle.await) });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some((index, joined)) = tasks.next().await {
            let mut result = match joined {
                Ok(result) => result,
                Err(e) => ChunkResult::failure(index, format!("chunk task failed: {e}"), Duration::ZERO, 0),
            };
            if let Some(message) = result.error.take() {
                result.error = Some(self.scrubber.scrub(&message));
            }
            self.emit(ProgressEvent::ChunkFinished(result.clone()));
            results.push(result);
        }

        results.sort_by_key(|r| r.index);
        results
    }
}

fn select_chunks(chunks: Vec<Chunk>, only: Option<&BTreeSet<usize>>) -> Result<Vec<Chunk>, MigrationError> {
    let Some(only) = only else {
        return Ok(chunks);
    };
    if let Some(&out_of_range) = only.iter().find(|&&i| i >= chunks.len()) {
        return Err(MigrationError::planning(format!(
            "chunk index {} out of range, the plan has {} chunks",
            out_of_range,
            chunks.len()
        )));
    }
    Ok(chunks.into_iter().filter(|c| only.contains(&c.index())).collect())
}
