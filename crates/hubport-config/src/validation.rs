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
use crate::schema::*;

/// Checked after loading and after environment overrides
pub trait Validator {
    /// Validate, reporting the first offending field
    fn validate(&self) -> ConfigResult<()>;
}

/// Upper bound of concurrently running chunk workers
pub const MAX_CONCURRENCY: usize = 1000;

impl Validator for Settings {
    fn validate(&self) -> ConfigResult<()> {
        self.hub.validate()?;
        self.transfer.validate()?;
        self.retry.validate()?;
        self.timeouts.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

impl Validator for HubSettings {
    fn validate(&self) -> ConfigResult<()> {
        if !(self.hf_endpoint.starts_with("https://") || self.hf_endpoint.starts_with("http://")) {
            return Err(ConfigError::invalid_value(
                "hub.hf_endpoint",
                format!("must start with http:// or https://, got {}", self.hf_endpoint),
            ));
        }

        if self.ms_domain.is_empty() {
            return Err(ConfigError::MissingRequired("hub.ms_domain".to_string()));
        }
        if self.ms_domain.contains('/') || self.ms_domain.contains(char::is_whitespace) {
            return Err(ConfigError::invalid_value(
                "hub.ms_domain",
                format!("must be a bare host name, got {}", self.ms_domain),
            ));
        }

        if self.hf_revision.is_empty() {
            return Err(ConfigError::MissingRequired("hub.hf_revision".to_string()));
        }
        if self.ms_revision.is_empty() {
            return Err(ConfigError::MissingRequired("hub.ms_revision".to_string()));
        }

        Ok(())
    }
}

impl Validator for TransferSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.chunk_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "transfer.chunk_bytes",
                "must be greater than 0",
            ));
        }

        if self.max_chunks == 0 {
            return Err(ConfigError::invalid_value(
                "transfer.max_chunks",
                "must be at least 1",
            ));
        }

        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::invalid_value(
                "transfer.max_concurrency",
                format!(
                    "must be between 1 and {}, got {}",
                    MAX_CONCURRENCY, self.max_concurrency
                ),
            ));
        }

        if self.listing_page_size == 0 {
            return Err(ConfigError::invalid_value(
                "transfer.listing_page_size",
                "must be at least 1",
            ));
        }

        if self.lfs_parallel == 0 {
            return Err(ConfigError::invalid_value(
                "transfer.lfs_parallel",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

impl Validator for RetrySettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }

        if self.multiplier == 0 {
            return Err(ConfigError::invalid_value(
                "retry.multiplier",
                "must be at least 1",
            ));
        }

        if self.base_delay_secs > self.max_delay_secs {
            return Err(ConfigError::invalid_value(
                "retry.base_delay_secs",
                format!(
                    "must not exceed retry.max_delay_secs ({})",
                    self.max_delay_secs
                ),
            ));
        }

        Ok(())
    }
}

impl Validator for TimeoutSettings {
    fn validate(&self) -> ConfigResult<()> {
        let fields = [
            ("timeouts.clone_secs", self.clone_secs),
            ("timeouts.fetch_secs", self.fetch_secs),
            ("timeouts.upload_secs", self.upload_secs),
            ("timeouts.request_secs", self.request_secs),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be greater than 0"));
            }
        }
        Ok(())
    }
}

impl Validator for LoggingSettings {
    fn validate(&self) -> ConfigResult<()> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::MissingRequired("logging.level".to_string()));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}
