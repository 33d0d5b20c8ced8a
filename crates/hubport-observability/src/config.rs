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

//! What to log, how, and where.
//!
//! A [`LogConfig`] is usually built from the `[logging]` section of the
//! settings and then adjusted by command-line flags.

use hubport_config::{LoggingSettings, SecretScrubber};
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;

/// Environment variable read when no level is configured, before `RUST_LOG`
pub const LOG_ENV: &str = "HUBPORT_LOG";

/// Crates whose per-request chatter drowns out chunk progress.
///
/// They are held at `warn` unless the filter names them.
const NOISY_TARGETS: [&str; 5] = ["hyper", "hyper_util", "h2", "reqwest", "rustls"];

/// Errors raised while setting up logging
#[derive(Error, Debug)]
pub enum LogError {
    /// Unknown format name
    #[error("unknown log format '{0}', expected pretty, compact or json")]
    InvalidFormat(String),

    /// The level or filter directive does not parse
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// Directive as given
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),

    /// Writing log output failed
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, for people watching a migration
    #[default]
    Pretty,

    /// One line per event
    Compact,

    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Name used in config files and on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(s.to_string())),
        }
    }
}

/// Stream the subscriber writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Keeps stdout free for reports and `--json` output
    #[default]
    Stderr,

    /// Standard output
    Stdout,
}

/// Logging setup for one process
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Line layout
    pub format: LogFormat,

    /// Level or `EnvFilter` directive such as `hubport_migration=debug,info`.
    /// `None` defers to [`LOG_ENV`], then `RUST_LOG`.
    pub level: Option<String>,

    /// ANSI colors in pretty and compact output
    pub ansi: bool,

    /// Prefix each event with its time
    pub timestamps: bool,

    /// Show the emitting module
    pub targets: bool,

    /// Stream to write to
    pub output: LogOutput,

    /// Tokens replaced before anything is written
    pub scrubber: SecretScrubber,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::default(),
            level: None,
            ansi: true,
            timestamps: true,
            targets: false,
            output: LogOutput::default(),
            scrubber: SecretScrubber::default(),
        }
    }
}

impl LogConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the configuration described by a `[logging]` section
    pub fn from_settings(settings: &LoggingSettings, scrubber: SecretScrubber) -> Result<Self, LogError> {
        let format = settings.format.parse()?;
        let level = Some(settings.level.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        Ok(LogConfig {
            format,
            level,
            scrubber,
            ..LogConfig::default()
        })
    }

    /// Set the line layout
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the level or filter directive
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Enable or disable colors
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Enable or disable timestamps
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Enable or disable module names
    pub fn with_targets(mut self, targets: bool) -> Self {
        self.targets = targets;
        self
    }

    /// Set the output stream
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Redact the tokens known to `scrubber`
    pub fn with_scrubber(mut self, scrubber: SecretScrubber) -> Self {
        self.scrubber = scrubber;
        self
    }

    /// The filter directive to install, noisy HTTP crates capped at `warn`
    pub fn directive(&self) -> String {
        self.directive_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn directive_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = self
            .level
            .clone()
            .or_else(|| lookup(LOG_ENV))
            .or_else(|| lookup("RUST_LOG"))
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        let mut parts = vec![base.clone()];
        for target in NOISY_TARGETS {
            let named = base
                .split(',')
                .any(|d| d.trim().split('=').next() == Some(target));
            if !named {
                parts.push(format!("{}=warn", target));
            }
        }
        parts.join(",")
    }
}
