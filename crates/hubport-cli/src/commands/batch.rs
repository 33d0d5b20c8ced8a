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

//! Batch command - migrate many repositories at once

use crate::args::{endpoints, parse_route, Route};
use crate::hubs::{Access, Hub};
use crate::output;
use crate::progress::ProgressTracker;
use anyhow::{bail, Result};
use clap::Parser;
use console::style;
use futures::stream::{self, StreamExt};
use hubport_config::Settings;
use hubport_hub::{Platform, RepoKind, RepoRef, Visibility};
use hubport_migration::{MigrationReport, MigrationRequest, Orchestrator, TransferMode};
use indicatif::{HumanBytes, HumanDuration};
use std::collections::HashMap;
use std::time::Instant;

/// Migrate several repositories concurrently
///
/// Repositories that already exist on the destination are skipped.
///
/// # Examples
///
/// ```bash
/// hubport batch alice/a,alice/b,alice/c --to ms
/// hubport batch hf:alice/a,ms:bob/b --repo-type dataset --parallel 2
/// ```
#[derive(Parser, Debug)]
pub struct BatchCmd {
    /// Comma-separated repositories (`hf:ID`, `ms:ID`, or bare IDs with --to)
    #[arg(value_name = "SOURCES", value_delimiter = ',', required = true)]
    pub sources: Vec<String>,

    /// Destination hub (hf or ms)
    #[arg(long, value_name = "HUB")]
    pub to: Option<Platform>,

    /// Repository kind applied to every repository
    #[arg(long = "repo-type", value_name = "TYPE", default_value = "model")]
    pub repo_type: RepoKind,

    /// Create destinations as private repositories
    #[arg(long)]
    pub private: bool,

    /// Split each transfer into parallel chunks
    #[arg(long)]
    pub chunked: bool,

    /// Repositories migrated at once
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub parallel: usize,

    /// Skip verification
    #[arg(long)]
    pub no_verify: bool,
}

struct Job {
    route: Route,
    source: RepoRef,
    destination: RepoRef,
}

enum JobResult {
    Done(MigrationReport),
    Skipped,
}

impl BatchCmd {
    fn jobs(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for raw in self.sources.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let route = parse_route(raw, self.to)?;
            let (source, destination) = endpoints(&route, self.repo_type, None)?;
            jobs.push(Job {
                route,
                source,
                destination,
            });
        }
        if jobs.is_empty() {
            bail!("No repositories given; pass a comma-separated list");
        }
        Ok(jobs)
    }

    pub async fn execute(&self, settings: &Settings, quiet: bool) -> Result<()> {
        let jobs = self.jobs()?;

        let mut hubs = HashMap::new();
        for platform in jobs.iter().flat_map(|j| [j.route.source, j.route.destination]) {
            if !hubs.contains_key(&platform) {
                hubs.insert(platform, Hub::connect(platform, settings, Access::Required)?);
            }
        }

        if !quiet {
            output::header(&format!("Batch migration: {} repositories ({})", jobs.len(), self.repo_type));
            for job in &jobs {
                println!(
                    "    {} -> {}  {}",
                    job.route.source.code().to_uppercase(),
                    job.route.destination.code().to_uppercase(),
                    job.source.id
                );
            }
            println!();
        }

        let tracker = ProgressTracker::new(quiet);
        let started = Instant::now();
        let hubs = &hubs;
        let tracker = &tracker;

        let results: Vec<(String, Result<JobResult>)> = stream::iter(jobs)
            .map(|job| async move {
                let label = job.source.id.to_string();
                let result = self.run_one(&job, hubs, settings, tracker).await;
                (label, result)
            })
            .buffer_unordered(self.parallel.max(1))
            .collect()
            .await;

        let mut succeeded = 0;
        let mut skipped = 0;
        let mut failed = Vec::new();
        for (label, result) in &results {
            match result {
                Ok(JobResult::Skipped) => {
                    skipped += 1;
                    println!("  {} {} already exists on destination", style("SKIP").yellow(), label);
                }
                Ok(JobResult::Done(report)) if report.is_clean() => {
                    succeeded += 1;
                    println!(
                        "  {}   {} ({} files, {}, {})",
                        style("OK").green(),
                        label,
                        report.transferred_files(),
                        HumanBytes(report.transferred_bytes()),
                        HumanDuration(report.elapsed)
                    );
                }
                Ok(JobResult::Done(report)) => {
                    let reason = report
                        .error
                        .clone()
                        .or_else(|| report.failures.first().map(|f| f.error.clone()))
                        .unwrap_or_else(|| "destination does not match the source".to_string());
                    println!("  {} {}: {}", style("FAIL").red(), label, reason);
                    failed.push((label.clone(), reason));
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    println!("  {} {}: {}", style("FAIL").red(), label, reason);
                    failed.push((label.clone(), reason));
                }
            }
        }

        println!();
        output::rule();
        println!("  Batch complete in {}", HumanDuration(started.elapsed()));
        println!("  Succeeded: {}/{}", succeeded, results.len() - skipped);
        if skipped > 0 {
            println!("  Skipped:   {} (already exist)", skipped);
        }
        output::rule();

        match failed.first() {
            None => Ok(()),
            Some((label, reason)) => bail!(
                "{} of {} migrations failed ({}: {})",
                failed.len(),
                results.len() - skipped,
                label,
                reason
            ),
        }
    }

    async fn run_one(
        &self,
        job: &Job,
        hubs: &HashMap<Platform, Hub>,
        settings: &Settings,
        tracker: &ProgressTracker,
    ) -> Result<JobResult> {
        let (Some(source_hub), Some(dest_hub)) = (hubs.get(&job.route.source), hubs.get(&job.route.destination)) else {
            bail!("No client for {} -> {}", job.route.source, job.route.destination);
        };

        if dest_hub.destination().repo_exists(&job.destination).await? {
            return Ok(JobResult::Skipped);
        }

        let request = MigrationRequest {
            visibility: if self.private {
                Visibility::Private
            } else {
                Visibility::Public
            },
            mode: if self.chunked {
                TransferMode::Chunked
            } else {
                TransferMode::SinglePass
            },
            verify: !self.no_verify,
            ..MigrationRequest::new(job.source.clone(), job.destination.clone())
        };

        let bar = tracker.chunk_bar(&job.source.id.to_string());
        let orchestrator = Orchestrator::new(source_hub.source(), dest_hub.destination(), settings)?
            .with_progress(ProgressTracker::callback(bar));
        Ok(JobResult::Done(orchestrator.run(&request).await))
    }
}
