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

//! Hub clients built from the settings

use anyhow::{Context, Result};
use hubport_config::Settings;
use hubport_hub::{DestinationHub, HuggingFaceHub, ModelScopeHub, Platform, RepoRef, SourceHub};
use std::sync::Arc;

/// Whether a client must carry a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Use the token if one is configured
    Optional,
    /// Fail unless a token is configured
    Required,
}

/// A configured client for one hub
#[derive(Debug, Clone)]
pub enum Hub {
    /// huggingface.co or a mirror
    HuggingFace(Arc<HuggingFaceHub>),
    /// modelscope.cn or modelscope.ai
    ModelScope(Arc<ModelScopeHub>),
}

impl Hub {
    /// Builds the client for `platform`
    pub fn connect(platform: Platform, settings: &Settings, access: Access) -> Result<Self> {
        let timeout = settings.timeouts.request_timeout();
        let transfer_timeout = settings.timeouts.fetch_timeout();
        let parallel = settings.transfer.lfs_parallel;

        match platform {
            Platform::HuggingFace => {
                let token = match access {
                    Access::Required => Some(settings.require_hf_token()?),
                    Access::Optional => settings.tokens.hf.as_ref(),
                };
                let hub = HuggingFaceHub::new(
                    &settings.hub.hf_endpoint,
                    token.map(|t| t.expose().to_string()),
                    timeout,
                )
                .context("Failed to build the HuggingFace client")?
                .with_revision(settings.hub.hf_revision.clone())
                .with_transfer_timeout(transfer_timeout)
                .with_parallel_transfers(parallel);
                Ok(Hub::HuggingFace(Arc::new(hub)))
            }
            Platform::ModelScope => {
                let token = match access {
                    Access::Required => Some(settings.require_ms_token()?),
                    Access::Optional => settings.tokens.modelscope.as_ref(),
                };
                let hub = ModelScopeHub::new(
                    &settings.hub.ms_domain,
                    token.map(|t| t.expose().to_string()),
                    timeout,
                )
                .context("Failed to build the ModelScope client")?
                .with_revision(settings.hub.ms_revision.clone())
                .with_transfer_timeout(transfer_timeout)
                .with_parallel_transfers(parallel);
                Ok(Hub::ModelScope(Arc::new(hub)))
            }
        }
    }

    /// Which hub this is
    pub fn platform(&self) -> Platform {
        match self {
            Hub::HuggingFace(_) => Platform::HuggingFace,
            Hub::ModelScope(_) => Platform::ModelScope,
        }
    }

    /// The client as a read side
    pub fn source(&self) -> Arc<dyn SourceHub> {
        match self {
            Hub::HuggingFace(hub) => Arc::clone(hub) as Arc<dyn SourceHub>,
            Hub::ModelScope(hub) => Arc::clone(hub) as Arc<dyn SourceHub>,
        }
    }

    /// The client as a write side
    pub fn destination(&self) -> Arc<dyn DestinationHub> {
        match self {
            Hub::HuggingFace(hub) => Arc::clone(hub) as Arc<dyn DestinationHub>,
            Hub::ModelScope(hub) => Arc::clone(hub) as Arc<dyn DestinationHub>,
        }
    }

    /// Browser URL of `repo` on this hub
    pub fn web_url(&self, repo: &RepoRef) -> String {
        match self {
            Hub::HuggingFace(hub) => hub.web_url(repo),
            Hub::ModelScope(hub) => hub.web_url(repo),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hubport_config::{Secret, TokenSettings};
    use hubport_hub::{RepoId, RepoKind};

    #[test]
    fn test_required_token_is_enforced() {
        let err = Hub::connect(Platform::ModelScope, &Settings::default(), Access::Required).unwrap_err();
        assert!(err.to_string().contains("MODELSCOPE_TOKEN"));
    }

    #[test]
    fn test_web_urls_follow_the_hub() {
        let settings = Settings {
            tokens: TokenSettings {
                hf: Some(Secret::new("hf_x")),
                modelscope: None,
            },
            ..Default::default()
        };
        let repo = RepoRef::new(RepoId::parse("alice/data").unwrap(), RepoKind::Dataset);

        let hf = Hub::connect(Platform::HuggingFace, &settings, Access::Required).unwrap();
        assert_eq!(hf.web_url(&repo), "https://huggingface.co/datasets/alice/data");

        let ms = Hub::connect(Platform::ModelScope, &settings, Access::Optional).unwrap();
        assert_eq!(ms.platform(), Platform::ModelScope);
        assert_eq!(ms.web_url(&repo), "https://modelscope.cn/datasets/alice/data");
    }
}
