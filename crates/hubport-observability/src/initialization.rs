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

//! Global subscriber installation.
//!
//! Every fmt layer writes through [`Redacting`], whatever the format.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use crate::redact::Redacting;
use std::io;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs a subscriber with `format` at `level` (or the environment's level).
///
/// # Example
///
/// ```ignore
/// use hubport_observability::{init_tracing, LogFormat};
///
/// fn main() {
///     init_tracing(LogFormat::Compact, Some("debug")).unwrap();
///     tracing::info!(chunk_index = 2, "Chunk uploaded");
/// }
/// ```
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let mut config = LogConfig::new().with_format(format);
    config.level = level.map(str::to_string);
    init_tracing_with_config(config)
}

/// Installs the subscriber described by `config`.
///
/// Fails with [`LogError::AlreadyInitialized`] on a second call in the same
/// process.
///
/// ```ignore
/// use hubport_config::SecretScrubber;
/// use hubport_observability::{init_tracing_with_config, LogConfig, LogFormat};
///
/// fn main() {
///     let config = LogConfig::new()
///         .with_format(LogFormat::Json)
///         .with_level("hubport_migration=debug,info")
///         .with_scrubber(SecretScrubber::new(["hf_..."]));
///
///     init_tracing_with_config(config).unwrap();
/// }
/// ```
pub fn init_tracing_with_config(config: LogConfig) -> Result<(), LogError> {
    let filter = build_env_filter(&config)?;
    let layer = fmt_layer(config);

    Registry::default()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}

fn fmt_layer(config: LogConfig) -> BoxedLayer {
    let writer = Redacting::new(writer_for(config.output), config.scrubber);

    match (config.format, config.timestamps) {
        (LogFormat::Json, true) => fmt::layer()
            .with_writer(writer)
            .json()
            .with_current_span(true)
            .boxed(),
        (LogFormat::Json, false) => fmt::layer()
            .with_writer(writer)
            .json()
            .with_current_span(true)
            .without_time()
            .boxed(),
        (LogFormat::Compact, timestamps) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(config.targets)
                .with_ansi(config.ansi)
                .compact();
            if timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
        (LogFormat::Pretty, timestamps) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(config.targets)
                .with_ansi(config.ansi)
                .pretty();
            if timestamps {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }
    }
}

fn writer_for(output: LogOutput) -> fn() -> Box<dyn io::Write + Send> {
    match output {
        LogOutput::Stderr => || Box::new(io::stderr()),
        LogOutput::Stdout => || Box::new(io::stdout()),
    }
}

fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let directive = config.directive();
    EnvFilter::try_new(&directive).map_err(|e| LogError::InvalidFilter {
        directive,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process; that
    // path is covered in tests/init_test.rs.

    #[test]
    fn test_env_filter_parsing() {
        assert!(build_env_filter(&LogConfig::new().with_level("debug")).is_ok());
        assert!(build_env_filter(&LogConfig::new().with_level("hubport_migration=trace,warn")).is_ok());
    }

    #[test]
    fn test_bad_filter_rejected() {
        let err = build_env_filter(&LogConfig::new().with_level("info,=[")).unwrap_err();
        assert!(matches!(err, LogError::InvalidFilter { .. }));
    }

    #[test]
    fn test_every_format_builds_a_layer() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            for timestamps in [true, false] {
                let config = LogConfig::new().with_format(format).with_timestamps(timestamps);
                let _layer = fmt_layer(config);
            }
        }
    }
}
