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

use crate::error::{ConfigError, ConfigResult};
use crate::secret::{Secret, SecretScrubber};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where HuggingFace access tokens are created
pub const HF_TOKEN_URL: &str = "https://huggingface.co/settings/tokens";

/// One gibibyte
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Top-level configuration structure
///
/// Built once at start-up and passed by reference to everything that needs
/// it. Nothing below the CLI reads the environment on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    /// Hub endpoints and revisions
    pub hub: HubSettings,

    /// Access tokens
    pub tokens: TokenSettings,

    /// Chunking and concurrency
    pub transfer: TransferSettings,

    /// Upload retry policy
    pub retry: RetrySettings,

    /// Per-operation deadlines
    pub timeouts: TimeoutSettings,

    /// Log output
    pub logging: LoggingSettings,
}

impl Settings {
    /// HuggingFace token, or the error that explains how to get one
    pub fn require_hf_token(&self) -> ConfigResult<&Secret> {
        self.tokens
            .hf
            .as_ref()
            .filter(|t| !t.is_blank())
            .ok_or_else(|| ConfigError::MissingToken {
                platform: "HuggingFace".to_string(),
                variable: "HF_TOKEN".to_string(),
                url: HF_TOKEN_URL.to_string(),
            })
    }

    /// ModelScope token, or the error that explains how to get one
    pub fn require_ms_token(&self) -> ConfigResult<&Secret> {
        self.tokens
            .modelscope
            .as_ref()
            .filter(|t| !t.is_blank())
            .ok_or_else(|| ConfigError::MissingToken {
                platform: "ModelScope".to_string(),
                variable: "MODELSCOPE_TOKEN".to_string(),
                url: self.hub.ms_token_url(),
            })
    }

    /// A scrubber that knows every configured token
    pub fn scrubber(&self) -> SecretScrubber {
        SecretScrubber::new(
            [self.tokens.hf.as_ref(), self.tokens.modelscope.as_ref()]
                .into_iter()
                .flatten()
                .map(Secret::expose),
        )
    }
}

/// Hub endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubSettings {
    /// HuggingFace endpoint with scheme
    #[serde(default = "default_hf_endpoint")]
    pub hf_endpoint: String,

    /// ModelScope host name without scheme
    #[serde(default = "default_ms_domain")]
    pub ms_domain: String,

    /// Branch read from and committed to on HuggingFace
    #[serde(default = "default_hf_revision")]
    pub hf_revision: String,

    /// Branch read from and committed to on ModelScope
    #[serde(default = "default_ms_revision")]
    pub ms_revision: String,
}

impl HubSettings {
    /// Where ModelScope access tokens are created on the configured site
    pub fn ms_token_url(&self) -> String {
        format!("https://{}/my/myaccesstoken", self.ms_domain)
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            hf_endpoint: default_hf_endpoint(),
            ms_domain: default_ms_domain(),
            hf_revision: default_hf_revision(),
            ms_revision: default_ms_revision(),
        }
    }
}

/// Access tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TokenSettings {
    /// HuggingFace token (`HF_TOKEN`)
    #[serde(default)]
    pub hf: Option<Secret>,

    /// ModelScope token (`MODELSCOPE_TOKEN`)
    #[serde(default)]
    pub modelscope: Option<Secret>,
}

/// Chunking and concurrency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferSettings {
    /// Target bytes per chunk
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: u64,

    /// Most chunks a plan may have; the budget grows to respect it
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// Most chunk workers running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Parent of every chunk working area; the system temp dir when unset
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Entries requested per destination listing page
    #[serde(default = "default_listing_page_size")]
    pub listing_page_size: u32,

    /// Large objects transferred concurrently inside one chunk
    #[serde(default = "default_lfs_parallel")]
    pub lfs_parallel: usize,
}

impl TransferSettings {
    /// The configured working directory or the system temp dir
    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_bytes: default_chunk_bytes(),
            max_chunks: default_max_chunks(),
            max_concurrency: default_max_concurrency(),
            work_dir: None,
            listing_page_size: default_listing_page_size(),
            lfs_parallel: default_lfs_parallel(),
        }
    }
}

/// Retry policy for uploads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    /// Attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Factor applied to the delay after each failed attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    /// Upper bound of any single delay
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl RetrySettings {
    /// Delay before the second attempt
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    /// Upper bound of any single delay
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            multiplier: default_multiplier(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Deadlines of remote operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSettings {
    /// Structure checkout
    #[serde(default = "default_clone_secs")]
    pub clone_secs: u64,

    /// Large object materialisation of one chunk
    #[serde(default = "default_transfer_secs")]
    pub fetch_secs: u64,

    /// Upload of one chunk
    #[serde(default = "default_transfer_secs")]
    pub upload_secs: u64,

    /// Single metadata request
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
}

impl TimeoutSettings {
    /// Structure checkout deadline
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_secs)
    }

    /// Materialisation deadline
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    /// Upload deadline
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_secs)
    }

    /// Metadata request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            clone_secs: default_clone_secs(),
            fetch_secs: default_transfer_secs(),
            upload_secs: default_transfer_secs(),
            request_secs: default_request_secs(),
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    /// Level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty`, `compact` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_hf_endpoint() -> String {
    "https://huggingface.co".to_string()
}

fn default_ms_domain() -> String {
    "modelscope.cn".to_string()
}

fn default_hf_revision() -> String {
    "main".to_string()
}

fn default_ms_revision() -> String {
    "master".to_string()
}

fn default_chunk_bytes() -> u64 {
    20 * GIB
}

fn default_max_chunks() -> usize {
    100
}

fn default_max_concurrency() -> usize {
    100
}

fn default_listing_page_size() -> u32 {
    100
}

fn default_lfs_parallel() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    5
}

fn default_multiplier() -> u32 {
    3
}

fn default_max_delay_secs() -> u64 {
    300
}

fn default_clone_secs() -> u64 {
    1800
}

fn default_transfer_secs() -> u64 {
    4 * 3600
}

fn default_request_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.transfer.chunk_bytes, 20 * GIB);
        assert_eq!(settings.transfer.max_chunks, 100);
        assert_eq!(settings.transfer.max_concurrency, 100);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.base_delay(), Duration::from_secs(5));
        assert_eq!(settings.retry.multiplier, 3);
        assert_eq!(settings.hub.ms_domain, "modelscope.cn");
    }

    #[test]
    fn test_missing_token_points_to_settings_page() {
        let mut settings = Settings::default();
        settings.hub.ms_domain = "modelscope.ai".to_string();

        let err = settings.require_ms_token().unwrap_err();
        assert!(err.to_string().contains("https://modelscope.ai/my/myaccesstoken"));

        let err = settings.require_hf_token().unwrap_err();
        assert!(err.to_string().contains(HF_TOKEN_URL));

        settings.tokens.hf = Some(Secret::new("  "));
        assert!(settings.require_hf_token().is_err());
    }

    #[test]
    fn test_scrubber_covers_both_tokens() {
        let mut settings = Settings::default();
        settings.tokens.hf = Some(Secret::new("hf_one"));
        settings.tokens.modelscope = Some(Secret::new("ms_two"));
        let scrubber = settings.scrubber();
        assert_eq!(scrubber.scrub("hf_one ms_two"), "*** ***");
    }

    #[test]
    fn test_serialized_settings_hide_tokens() {
        let mut settings = Settings::default();
        settings.tokens.hf = Some(Secret::new("hf_secret"));
        let text = toml::to_string(&settings).unwrap();
        assert!(!text.contains("hf_secret"));
    }
}
