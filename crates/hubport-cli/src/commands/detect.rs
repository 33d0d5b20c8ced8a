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

//! Detect command - find out what kind of repository an id names

use crate::hubs::{Access, Hub};
use crate::output;
use anyhow::{Context, Result};
use clap::Parser;
use hubport_config::Settings;
use hubport_hub::{Platform, RepoId, RepoRef};
use hubport_migration::detect_kind;

/// Detect whether a repository is a model, dataset or space
///
/// # Examples
///
/// ```bash
/// hubport detect hf:alice/llm
/// hubport detect alice/llm --on ms
/// ```
#[derive(Parser, Debug)]
pub struct DetectCmd {
    /// Repository (`hf:ID`, `ms:ID`, or a bare ID with --on)
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Hub to probe when SOURCE has no prefix
    #[arg(long, value_name = "HUB")]
    pub on: Option<Platform>,
}

impl DetectCmd {
    pub async fn execute(&self, settings: &Settings, quiet: bool) -> Result<()> {
        let (id, prefix) = RepoId::parse_prefixed(&self.source)
            .with_context(|| format!("Invalid repository '{}'", self.source))?;
        let platform = prefix
            .or(self.on)
            .context("Name the hub with a prefix (hf:, ms:) or --on")?;

        let hub = Hub::connect(platform, settings, Access::Optional)?;
        if !quiet {
            output::info(&format!("Probing {} for {}...", platform, id));
        }
        let kind = detect_kind(hub.source().as_ref(), &id).await?;

        output::success(&format!("{} is a {} on {}", id, kind, platform));
        output::detail("URL", &hub.web_url(&RepoRef::new(id, kind)));
        Ok(())
    }
}
