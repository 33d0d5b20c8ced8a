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

//! Hub error types and their retry classification

use hubport_git::GitError;
use std::io;
use thiserror::Error;

/// Result type alias for hub operations
pub type HubResult<T> = Result<T, HubError>;

/// Errors that can occur while talking to a hub
#[derive(Error, Debug)]
pub enum HubError {
    /// Repository or file does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Token missing, expired or rejected
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Token valid but lacks access to the resource
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The hub rejected the request itself (bad id, conflicting state, too large)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Operation exceeded its deadline
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Connection could not be established or was reset
    #[error("connection error: {0}")]
    Connection(String),

    /// Hub answered with a status that may succeed on retry (5xx, 429, 408)
    #[error("hub returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Response did not have the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Downloaded content disagrees with its pointer
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Git clone or pointer failure
    #[error(transparent)]
    Git(#[from] GitError),
}

impl HubError {
    /// Create a NotFound error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        HubError::NotFound(what.into())
    }

    /// Create a Protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        HubError::Protocol(msg.into())
    }

    /// Create a Timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        HubError::Timeout(msg.into())
    }

    /// Maps an unsuccessful HTTP status to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => HubError::Unauthorized(message),
            403 => HubError::PermissionDenied(message),
            404 => HubError::NotFound(message),
            408 => HubError::Timeout(message),
            400 | 405 | 409 | 411 | 413 | 415 | 422 => HubError::InvalidRequest(message),
            _ => HubError::Http { status, message },
        }
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, HubError::NotFound(_))
    }

    /// True for failures that a later attempt may not hit: connection
    /// problems, timeouts, local I/O and 5xx/429 answers.
    pub fn is_transient(&self) -> bool {
        match self {
            HubError::Timeout(_) | HubError::Connection(_) | HubError::Io(_) => true,
            HubError::Http { status, .. } => *status == 429 || *status >= 500,
            HubError::Git(e) => e.is_network() && !e.is_auth(),
            HubError::NotFound(_)
            | HubError::Unauthorized(_)
            | HubError::PermissionDenied(_)
            | HubError::InvalidRequest(_)
            | HubError::Protocol(_)
            | HubError::Integrity(_) => false,
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the URL in its message; strip it so tokens in
        // query strings or userinfo never reach logs
        let err = err.without_url();
        if err.is_timeout() {
            HubError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            HubError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            HubError::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            HubError::Protocol(err.to_string())
        } else {
            HubError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(HubError::from_status(401, "x"), HubError::Unauthorized(_)));
        assert!(matches!(HubError::from_status(403, "x"), HubError::PermissionDenied(_)));
        assert!(HubError::from_status(404, "x").is_not_found());
        assert!(matches!(HubError::from_status(422, "x"), HubError::InvalidRequest(_)));
        assert!(matches!(
            HubError::from_status(502, "x"),
            HubError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(HubError::timeout("clone").is_transient());
        assert!(HubError::Connection("reset".into()).is_transient());
        assert!(HubError::from(io::Error::other("broken pipe")).is_transient());
        assert!(HubError::from_status(503, "busy").is_transient());
        assert!(HubError::from_status(429, "slow down").is_transient());
        assert!(HubError::from_status(408, "slow").is_transient());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!HubError::from_status(401, "bad token").is_transient());
        assert!(!HubError::from_status(403, "no write access").is_transient());
        assert!(!HubError::from_status(400, "malformed").is_transient());
        assert!(!HubError::not_found("repo").is_transient());
        assert!(!HubError::Integrity("sha mismatch".into()).is_transient());
    }
}
