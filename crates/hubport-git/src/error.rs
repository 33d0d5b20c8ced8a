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

//! Error types for the git layer

use thiserror::Error;

/// Result type for git operations
pub type GitResult<T> = Result<T, GitError>;

/// Error types for pointer parsing and checkouts
#[derive(Debug, Error)]
pub enum GitError {
    /// Error parsing pointer file
    #[error("Failed to parse pointer file: {0}")]
    PointerParse(String),

    /// Content is too large or shaped wrong to be a pointer file
    #[error("Invalid pointer file format: {0}")]
    InvalidPointerFormat(String),

    /// Missing required field in pointer file
    #[error("Missing required field in pointer file: {0}")]
    MissingPointerField(String),

    /// Invalid OID format
    #[error("Invalid OID format: {0}")]
    InvalidOid(String),

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Clone target is not usable (exists and is not empty, or is not a directory)
    #[error("Invalid checkout target: {0}")]
    InvalidTarget(String),

    /// Blocking checkout task panicked or was cancelled
    #[error("Checkout task failed: {0}")]
    TaskFailed(String),
}

impl GitError {
    /// True when the failure came from the network side of a clone
    /// (as opposed to a local filesystem or parse problem).
    pub fn is_network(&self) -> bool {
        match self {
            GitError::Git2(e) => matches!(
                e.class(),
                git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssl
            ),
            _ => false,
        }
    }

    /// True when the remote rejected our credentials
    pub fn is_auth(&self) -> bool {
        match self {
            GitError::Git2(e) => e.code() == git2::ErrorCode::Auth,
            _ => false,
        }
    }
}
