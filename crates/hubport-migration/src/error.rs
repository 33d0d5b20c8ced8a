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

//! Engine error types

use hubport_config::ConfigError;
use hubport_hub::HubError;
use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised by the transfer engine
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The source repository could not be listed at all
    #[error("cannot enumerate {repo}: {message}")]
    Enumeration {
        /// Source repository
        repo: String,
        /// Scrubbed cause
        message: String,
    },

    /// A plan could not be built from the given parameters
    #[error("planning failed: {0}")]
    Planning(String),

    /// One chunk failed to transfer
    #[error("chunk {index} failed ({}): {message}", failure_kind(.transient))]
    Transfer {
        /// Chunk index
        index: usize,
        /// Whether the last failure was retryable
        transient: bool,
        /// Scrubbed cause
        message: String,
    },

    /// The destination listing could not be read
    #[error("verification could not run: {0}")]
    Verification(String),

    /// Two manifest entries share a path
    #[error("duplicate path in manifest: {0}")]
    DuplicatePath(String),

    /// No probe found the repository
    #[error("{repo} not found on {platform} as any of: {kinds}")]
    RepoNotFound {
        /// Repository id
        repo: String,
        /// Hub that was searched
        platform: String,
        /// Kinds that were probed
        kinds: String,
    },

    /// A hub call outside a chunk failed
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Run state could not be read or written
    #[error("state file error: {0}")]
    State(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn failure_kind(transient: &bool) -> &'static str {
    if *transient {
        "transient"
    } else {
        "terminal"
    }
}

impl MigrationError {
    /// Create a Planning error
    pub fn planning<S: Into<String>>(msg: S) -> Self {
        MigrationError::Planning(msg.into())
    }

    /// Create a State error
    pub fn state<S: Into<String>>(msg: S) -> Self {
        MigrationError::State(msg.into())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(err: serde_json::Error) -> Self {
        MigrationError::State(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_display() {
        let err = MigrationError::Transfer {
            index: 3,
            transient: true,
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "chunk 3 failed (transient): connection reset");
    }

    #[test]
    fn test_hub_error_is_transparent() {
        let err = MigrationError::from(HubError::not_found("alice/demo"));
        assert_eq!(err.to_string(), "not found: alice/demo");
    }
}
