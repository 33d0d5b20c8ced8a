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

//! Chunked parallel transfer engine for hubport
//!
//! A migration enumerates the source repository into a [`Manifest`], packs it
//! into size-bounded [`Chunk`]s with [`ChunkPlanner`], runs one
//! [`ChunkWorker`] per chunk with bounded parallelism and finally compares
//! the destination with the manifest through [`Verifier`]. The
//! [`Orchestrator`] sequences the phases and produces a [`MigrationReport`];
//! [`MigrationState`] persists enough of it to resume the failed chunks.
//!
//! Chunks are independent: each one checks out the source structure in its
//! own working area, downloads only its large objects and merges its files
//! into the destination, so a failed chunk can be rerun without touching the
//! others.

pub mod error;
pub mod manifest;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod probe;
pub mod retry;
pub mod state;
pub mod verify;
pub mod worker;

pub use error::{MigrationError, MigrationResult};
pub use manifest::ManifestBuilder;
pub use model::{Chunk, ChunkJob, ChunkResult, ChunkStatus, FileDescriptor, Manifest};
pub use orchestrator::{
    ChunkFailure, MigrationReport, MigrationRequest, Orchestrator, Outcome, Phase, ProgressCallback,
    ProgressEvent, TransferMode, VerificationOutcome,
};
pub use planner::{ChunkPlanner, Plan};
pub use probe::{detect_kind, ProbeOutcome};
pub use retry::{retry, RetryFailure, RetryPolicy};
pub use state::{ChunkState, Endpoint, MigrationState, RunStatus, StateManager};
pub use verify::{HashComparison, HashMismatch, VerificationReport, Verifier};
pub use worker::{ChunkExecutor, ChunkWorker, WorkerOptions};
