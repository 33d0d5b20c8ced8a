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

//! Configuration errors
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating [`Settings`](crate::Settings)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Cannot read configuration file {}: {source}", .path.display())]
    Read {
        /// File that was opened
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The text is not valid TOML or does not match the schema
    #[error("Invalid configuration in {origin}: {source}")]
    Parse {
        /// File path, or `<string>` for in-memory text
        origin: String,
        /// Parser error with line and column
        source: toml::de::Error,
    },

    /// `--config` names a file that does not exist
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// An override variable holds an unusable value
    #[error("{variable}={value} is not usable: {reason}")]
    InvalidEnv {
        /// Variable name
        variable: String,
        /// Offending value
        value: String,
        /// What was expected
        reason: String,
    },

    /// A field is out of range or malformed
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Dotted field path
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A required field is empty
    #[error("Missing required configuration field: {0}")]
    MissingRequired(String),

    /// An access token is needed but not configured
    #[error("{platform} token not set. Set {variable} or add it to the config file. Get a token at: {url}")]
    MissingToken {
        /// Hub the token is for
        platform: String,
        /// Environment variable that provides it
        variable: String,
        /// Where a token can be created
        url: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid_env(
        variable: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidEnv {
            variable: variable.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// A field that failed validation
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The dotted field path this error is about, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { field, .. } => Some(field),
            ConfigError::MissingRequired(field) => Some(field),
            _ => None,
        }
    }
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
