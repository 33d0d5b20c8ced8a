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

//! Check-tokens command - validate both hub tokens

use crate::hubs::{Access, Hub};
use crate::output;
use anyhow::{bail, Result};
use clap::Parser;
use console::style;
use hubport_config::{Settings, HF_TOKEN_URL};
use hubport_hub::Platform;

/// Validate the HuggingFace and ModelScope tokens
///
/// Each configured token is checked against the hub's identity endpoint.
#[derive(Parser, Debug)]
pub struct CheckTokensCmd {}

/// Result of checking one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// The hub accepted it
    Valid(String),
    /// The hub rejected it or could not be asked
    Invalid(String),
    /// No token configured
    Missing,
}

impl CheckTokensCmd {
    pub async fn execute(&self, settings: &Settings) -> Result<()> {
        output::header("Token validation");
        output::rule();

        let mut all_ok = true;
        for (platform, variable, url) in [
            (Platform::HuggingFace, "HF_TOKEN", HF_TOKEN_URL.to_string()),
            (Platform::ModelScope, "MODELSCOPE_TOKEN", settings.hub.ms_token_url()),
        ] {
            match check(platform, settings).await {
                TokenStatus::Valid(user) => {
                    println!("\n[{}] {}: Authenticated as: {}", style("OK").green(), variable, user);
                }
                TokenStatus::Invalid(reason) => {
                    all_ok = false;
                    println!("\n[{}] {}: Invalid token: {}", style("FAIL").red(), variable, reason);
                }
                TokenStatus::Missing => {
                    all_ok = false;
                    println!("\n[{}] {}", style("MISSING").yellow(), variable);
                    println!("  Get it from: {}", url);
                }
            }
        }

        println!();
        output::rule();
        if !all_ok {
            bail!("Some tokens are missing or invalid");
        }
        output::success("All tokens valid. Ready to migrate!");
        Ok(())
    }
}

async fn check(platform: Platform, settings: &Settings) -> TokenStatus {
    let configured = match platform {
        Platform::HuggingFace => settings.tokens.hf.as_ref(),
        Platform::ModelScope => settings.tokens.modelscope.as_ref(),
    };
    if configured.is_none_or(|t| t.is_blank()) {
        return TokenStatus::Missing;
    }

    let hub = match Hub::connect(platform, settings, Access::Required) {
        Ok(hub) => hub,
        Err(e) => return TokenStatus::Invalid(settings.scrubber().scrub(&e.to_string())),
    };
    match hub.destination().whoami().await {
        Ok(user) => TokenStatus::Valid(user),
        Err(e) => TokenStatus::Invalid(settings.scrubber().scrub(&e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unset_tokens_are_missing() {
        let settings = Settings::default();
        assert_eq!(check(Platform::HuggingFace, &settings).await, TokenStatus::Missing);
        assert_eq!(check(Platform::ModelScope, &settings).await, TokenStatus::Missing);
    }
}
