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

//! Migrate command - copy one repository to the other hub

use crate::args::{endpoints, parse_route, parse_size, resolve_kind};
use crate::hubs::{Access, Hub};
use crate::output;
use crate::progress::ProgressTracker;
use anyhow::{bail, Context, Result};
use clap::Parser;
use hubport_config::{Settings, Validator};
use hubport_hub::{Platform, RepoKind, RepoRef, Visibility};
use hubport_migration::{
    Endpoint, MigrationReport, MigrationRequest, MigrationState, Orchestrator, Outcome, StateManager,
    TransferMode,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Migrate a repository between HuggingFace and ModelScope
///
/// Without `--chunked` the whole repository moves in one pass. Chunked runs
/// split it into size-bounded chunks transferred in parallel and record a
/// state file, so the chunks that failed can be re-sent with `--resume`.
///
/// # Examples
///
/// ```bash
/// hubport migrate hf:alice/llm
/// hubport migrate alice/llm --to hf --repo-type dataset --dest bob/llm
/// hubport migrate hf:alice/huge --chunked --chunk-size 20GiB --concurrency 8
/// hubport migrate hf:alice/huge --resume state.json
/// ```
#[derive(Parser, Debug)]
pub struct MigrateCmd {
    /// Source repository (`hf:ID`, `ms:ID`, or a bare ID with --to)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Destination hub (hf or ms)
    #[arg(long, value_name = "HUB")]
    pub to: Option<Platform>,

    /// Repository kind (model, dataset or space); detected when omitted
    #[arg(long = "repo-type", value_name = "TYPE")]
    pub repo_type: Option<RepoKind>,

    /// Destination repository ID (defaults to the source ID)
    #[arg(long, value_name = "ID")]
    pub dest: Option<String>,

    /// Create the destination as a private repository
    #[arg(long)]
    pub private: bool,

    /// Split the transfer into parallel chunks
    #[arg(long)]
    pub chunked: bool,

    /// Target size of one chunk (e.g. 20GiB, 500MB)
    #[arg(long, value_name = "BYTES", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Most chunks a plan may have
    #[arg(long, value_name = "N")]
    pub max_chunks: Option<usize>,

    /// Most chunks transferred at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Transfer only these chunk indices (e.g. 1,4,7)
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub only_chunks: Vec<usize>,

    /// Resume from a state file, sending only the chunks that did not succeed
    #[arg(long, value_name = "STATE.json", conflicts_with = "only_chunks")]
    pub resume: Option<PathBuf>,

    /// Where to write the state file of a chunked run
    #[arg(long, value_name = "STATE.json")]
    pub state: Option<PathBuf>,

    /// Skip comparing the destination with the source afterwards
    #[arg(long)]
    pub no_verify: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl MigrateCmd {
    fn mode(&self) -> TransferMode {
        if self.chunked || self.resume.is_some() || !self.only_chunks.is_empty() {
            TransferMode::Chunked
        } else {
            TransferMode::SinglePass
        }
    }

    /// `settings` with the transfer flags applied
    pub fn effective_settings(&self, settings: &Settings) -> Result<Settings> {
        let mut settings = settings.clone();
        if let Some(bytes) = self.chunk_size {
            settings.transfer.chunk_bytes = bytes;
        }
        if let Some(max_chunks) = self.max_chunks {
            settings.transfer.max_chunks = max_chunks;
        }
        if let Some(concurrency) = self.concurrency {
            settings.transfer.max_concurrency = concurrency;
        }
        settings.validate().context("Invalid transfer options")?;
        Ok(settings)
    }

    pub async fn execute(&self, settings: &Settings, quiet: bool) -> Result<()> {
        let settings = self.effective_settings(settings)?;
        let route = parse_route(&self.source, self.to)?;

        let source_hub = Hub::connect(route.source, &settings, Access::Required)?;
        let dest_hub = Hub::connect(route.destination, &settings, Access::Required)?;

        let resumed = match &self.resume {
            Some(path) => Some(
                MigrationState::load(path)
                    .await
                    .with_context(|| format!("Failed to load state file {}", path.display()))?,
            ),
            None => None,
        };

        let (source, destination) = match &resumed {
            Some(state) => {
                if state.source.repo.id != route.id || state.source.platform != route.source {
                    bail!(
                        "State file belongs to {} / {}, not {} / {}",
                        state.source.platform,
                        state.source.repo.id,
                        route.source,
                        route.id
                    );
                }
                (state.source.repo.clone(), state.destination.repo.clone())
            }
            None => {
                if !quiet && self.repo_type.is_none() {
                    output::info(&format!("Auto-detecting repo type for {}...", route.id));
                }
                let kind = resolve_kind(source_hub.source().as_ref(), &route.id, self.repo_type).await?;
                endpoints(&route, kind, self.dest.as_deref())?
            }
        };

        let source_url = source_hub.web_url(&source);
        let dest_url = dest_hub.web_url(&destination);
        if !quiet {
            print_plan(route.source, &source, &source_url, route.destination, &destination, &dest_url);
            if dest_hub.destination().repo_exists(&destination).await? {
                output::warning(&format!(
                    "{} already exists on {}. Files will be updated or overwritten.",
                    destination.id, route.destination
                ));
            }
        }

        let only_chunks = match &resumed {
            Some(state) => {
                let pending = state.pending_chunks();
                if pending.is_empty() {
                    output::success("Nothing left to transfer, every chunk already succeeded");
                    return Ok(());
                }
                if !quiet {
                    output::info(&format!("Resuming {} pending chunk(s)", pending.len()));
                }
                Some(pending)
            }
            None if self.only_chunks.is_empty() => None,
            None => Some(self.only_chunks.iter().copied().collect::<BTreeSet<_>>()),
        };

        let visibility = match &resumed {
            Some(state) => state.visibility,
            None if self.private => Visibility::Private,
            None => Visibility::Public,
        };

        let request = MigrationRequest {
            visibility,
            mode: self.mode(),
            budget: resumed.as_ref().map(|s| s.budget),
            only_chunks,
            verify: !self.no_verify,
            ..MigrationRequest::new(source.clone(), destination.clone())
        };

        let tracker = ProgressTracker::new(quiet || self.json);
        let bar = tracker.chunk_bar(&source.id.to_string());
        let orchestrator = Orchestrator::new(source_hub.source(), dest_hub.destination(), &settings)?
            .with_progress(ProgressTracker::callback(bar));
        info!(source = %source, destination = %destination, mode = ?request.mode, "Starting migration");
        let report = orchestrator.run(&request).await;

        let state_path = if request.mode == TransferMode::Chunked {
            let source_end = Endpoint {
                platform: route.source,
                repo: source,
            };
            let dest_end = Endpoint {
                platform: route.destination,
                repo: destination,
            };
            let path = self
                .state
                .clone()
                .or_else(|| self.resume.clone())
                .unwrap_or_else(|| {
                    StateManager::new(&settings.transfer.work_root()).path_for(&source_end, &dest_end)
                });
            let state = match resumed {
                Some(mut state) => {
                    state.merge(&report)?;
                    state
                }
                None => MigrationState::from_report(source_end, dest_end, visibility, &report),
            };
            state.save(&path).await?;
            debug!(path = %path.display(), status = ?state.status, "Saved migration state");
            Some((path, state.is_complete()))
        } else {
            None
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            output::report(&report, &dest_url);
        }

        if let Some((path, false)) = &state_path {
            output::info(&format!(
                "Resume with: hubport migrate {} --resume {}",
                self.source,
                path.display()
            ));
        }

        outcome_to_result(&report)
    }
}

fn print_plan(
    source_platform: Platform,
    source: &RepoRef,
    source_url: &str,
    dest_platform: Platform,
    destination: &RepoRef,
    dest_url: &str,
) {
    println!();
    output::header("Hub-to-hub migration");
    output::rule();
    output::detail("Source", &format!("{} / {}", source_platform, source));
    println!("          {}", source_url);
    output::detail("Destination", &format!("{} / {}", dest_platform, destination.id));
    println!("          {}", dest_url);
    output::rule();
}

/// Turns a report into the command's result
pub fn outcome_to_result(report: &MigrationReport) -> Result<()> {
    let first_failure = report
        .error
        .clone()
        .or_else(|| report.failures.first().map(|f| f.error.clone()))
        .unwrap_or_default();

    match report.outcome {
        Outcome::Failed => bail!("Migration failed: {}", first_failure),
        Outcome::Partial => bail!(
            "{} of {} chunks failed (first error: {})",
            report.failures.len(),
            report.chunks.len(),
            first_failure
        ),
        Outcome::Succeeded if report.integrity_mismatch() => {
            bail!("Migration finished but the destination does not match the source")
        }
        Outcome::Succeeded => {
            output::success("Migration complete!");
            Ok(())
        }
    }
}
