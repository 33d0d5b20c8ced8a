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
use crate::schema::Settings;
use crate::secret::Secret;
use crate::validation::Validator;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Settings loader: optional TOML file, then environment, then validation
pub struct SettingsLoader {
    validate: bool,
}

impl SettingsLoader {
    /// Create a new settings loader
    pub fn new() -> Self {
        SettingsLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        SettingsLoader { validate: false }
    }

    /// Loads `path` (or the defaults), applies the process environment and
    /// validates the result.
    pub async fn load(&self, path: Option<&Path>) -> ConfigResult<Settings> {
        self.load_with(path, |name| std::env::var(name).ok()).await
    }

    /// Like [`load`](Self::load) with an explicit variable lookup
    pub async fn load_with<F>(&self, path: Option<&Path>, lookup: F) -> ConfigResult<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match path {
            Some(path) => self.read_file(path).await?,
            None => Settings::default(),
        };
        apply_overrides(&mut settings, lookup)?;
        normalize(&mut settings);

        if self.validate {
            settings.validate()?;
            debug!("Configuration validated successfully");
        }
        Ok(settings)
    }

    /// Parses TOML text without touching the environment
    pub fn load_from_string(&self, content: &str) -> ConfigResult<Settings> {
        let mut settings: Settings = toml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: "<string>".to_string(),
            source,
        })?;
        normalize(&mut settings);
        if self.validate {
            settings.validate()?;
        }
        Ok(settings)
    }

    async fn read_file(&self, path: &Path) -> ConfigResult<Settings> {
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            origin: path.display().to_string(),
            source,
        })?;
        info!("Loaded configuration file: {}", path.display());
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies overrides from `lookup` to `settings`
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    // Tokens
    if let Some(value) = lookup("HF_TOKEN").filter(|v| !v.trim().is_empty()) {
        settings.tokens.hf = Some(Secret::new(value.trim()));
    }
    if let Some(value) = lookup("MODELSCOPE_TOKEN").filter(|v| !v.trim().is_empty()) {
        settings.tokens.modelscope = Some(Secret::new(value.trim()));
    }

    // Hubs
    if let Some(value) = lookup("HF_ENDPOINT") {
        settings.hub.hf_endpoint = value;
    }
    if let Some(value) = lookup("MODELSCOPE_DOMAIN") {
        settings.hub.ms_domain = value;
    }

    // Transfer
    if let Some(value) = lookup("HUBPORT_CHUNK_BYTES") {
        settings.transfer.chunk_bytes = value.trim().parse().map_err(|_| {
            ConfigError::invalid_env(
                "HUBPORT_CHUNK_BYTES",
                &value,
                "expected a byte count",
            )
        })?;
    }
    if let Some(value) = lookup("HUBPORT_MAX_CONCURRENCY") {
        settings.transfer.max_concurrency = value.trim().parse().map_err(|_| {
            ConfigError::invalid_env(
                "HUBPORT_MAX_CONCURRENCY",
                &value,
                "expected valid integer",
            )
        })?;
    }
    if let Some(value) = lookup("HUBPORT_WORK_DIR") {
        settings.transfer.work_dir = Some(PathBuf::from(value));
    }

    // Logging
    if let Some(value) = lookup("HUBPORT_LOG_LEVEL") {
        settings.logging.level = value;
    }

    Ok(())
}

fn normalize(settings: &mut Settings) {
    let domain = settings.hub.ms_domain.trim();
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    settings.hub.ms_domain = domain.trim_end_matches('/').to_string();
    settings.hub.hf_endpoint = settings.hub.hf_endpoint.trim().trim_end_matches('/').to_string();
}
