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

//! Verify command - compare an existing destination with its source

use crate::args::{endpoints, parse_route, resolve_kind};
use crate::hubs::{Access, Hub};
use crate::output;
use anyhow::{bail, Context, Result};
use clap::Parser;
use console::style;
use hubport_config::Settings;
use hubport_hub::{Platform, RepoKind};
use hubport_migration::{ManifestBuilder, Verifier};

/// Verify a destination against its source without transferring
///
/// Every source file must be present on the destination. Files whose
/// hashes are known on both sides must also match.
///
/// # Examples
///
/// ```bash
/// hubport verify hf:alice/llm
/// hubport verify alice/llm --to hf --dest bob/llm
/// ```
#[derive(Parser, Debug)]
pub struct VerifyCmd {
    /// Source repository (`hf:ID`, `ms:ID`, or a bare ID with --to)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Destination hub (hf or ms)
    #[arg(long, value_name = "HUB")]
    pub to: Option<Platform>,

    /// Repository kind; detected when omitted
    #[arg(long = "repo-type", value_name = "TYPE")]
    pub repo_type: Option<RepoKind>,

    /// Destination repository ID (defaults to the source ID)
    #[arg(long, value_name = "ID")]
    pub dest: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyCmd {
    pub async fn execute(&self, settings: &Settings, quiet: bool) -> Result<()> {
        let route = parse_route(&self.source, self.to)?;
        let source_hub = Hub::connect(route.source, settings, Access::Optional)?;
        let dest_hub = Hub::connect(route.destination, settings, Access::Optional)?;

        let kind = resolve_kind(source_hub.source().as_ref(), &route.id, self.repo_type).await?;
        let (source, destination) = endpoints(&route, kind, self.dest.as_deref())?;

        if !quiet && !self.json {
            println!(
                "{} Verifying {} against {}...",
                style("✔").cyan().bold(),
                dest_hub.web_url(&destination),
                source_hub.web_url(&source)
            );
        }

        let scrubber = settings.scrubber();
        let source_side = source_hub.source();
        let manifest = ManifestBuilder::new(source_side.as_ref(), &scrubber)
            .build(&source)
            .await
            .context("Failed to enumerate the source")?;

        let dest_side = dest_hub.destination();
        let report = Verifier::new(dest_side.as_ref(), settings.transfer.listing_page_size, &scrubber)
            .verify(&manifest, &destination)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{}", report.format());
        }

        if !report.verified {
            bail!(
                "Verification failed: {} missing, {} altered",
                report.hashes.missing.len(),
                report.hashes.mismatched.len()
            );
        }
        if !quiet && !self.json {
            output::success("Destination matches the source");
        }
        Ok(())
    }
}
