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

//! Pointer-only checkouts
//!
//! libgit2 has no support for external filter drivers, so a clone made
//! through it leaves every LFS-tracked path as its pointer stub. That is
//! exactly the "structure without payload" view a chunk worker starts from.

use crate::error::{GitError, GitResult};
use git2::build::RepoBuilder;
use git2::{Cred, FetchOptions, RemoteCallbacks};
use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// HTTPS credentials for a clone
#[derive(Clone)]
pub struct CloneCredentials {
    /// Username sent with the token (hubs accept any non-empty value)
    pub username: String,

    /// Access token used as the password
    pub token: String,
}

impl fmt::Debug for CloneCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneCredentials")
            .field("username", &self.username)
            .field("token", &"***")
            .finish()
    }
}

/// What to clone and how
#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    /// HTTPS clone URL
    pub url: String,

    /// Branch to check out; the remote default when `None`
    pub branch: Option<String>,

    /// History depth; 1 fetches only the tip commit
    pub depth: i32,

    /// Credentials for private repositories
    pub credentials: Option<CloneCredentials>,
}

impl CheckoutOptions {
    /// Depth-1 clone of the default branch without credentials
    pub fn shallow(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            depth: 1,
            credentials: None,
        }
    }

    /// Check out `branch` instead of the remote default
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Authenticate with `username`/`token`
    pub fn with_credentials(mut self, username: impl Into<String>, token: impl Into<String>) -> Self {
        self.credentials = Some(CloneCredentials {
            username: username.into(),
            token: token.into(),
        });
        self
    }
}

/// Clones `options.url` into `target`, leaving large objects as pointers.
///
/// `target` must be missing or an empty directory. The blocking libgit2 work
/// runs on tokio's blocking pool.
pub async fn checkout_pointers(options: CheckoutOptions, target: &Path) -> GitResult<()> {
    let target: PathBuf = target.to_path_buf();
    tokio::task::spawn_blocking(move || clone_blocking(&options, &target))
        .await
        .map_err(|e| GitError::TaskFailed(e.to_string()))?
}

fn clone_blocking(options: &CheckoutOptions, target: &Path) -> GitResult<()> {
    ensure_empty_target(target)?;

    let mut callbacks = RemoteCallbacks::new();
    if let Some(credentials) = &options.credentials {
        // libgit2 keeps asking while the server keeps answering 401
        let offered = Cell::new(false);
        callbacks.credentials(move |_url, _username, _allowed| {
            if offered.replace(true) {
                return Err(git2::Error::new(
                    git2::ErrorCode::Auth,
                    git2::ErrorClass::Http,
                    "credentials rejected by remote",
                ));
            }
            Cred::userpass_plaintext(&credentials.username, &credentials.token)
        });
    }

    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);
    if options.depth > 0 {
        fetch.depth(options.depth);
    }

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch);
    if let Some(branch) = &options.branch {
        builder.branch(branch);
    }

    debug!(target = %target.display(), depth = options.depth, "Cloning repository structure");
    let repo = builder.clone(&options.url, target)?;
    let head = repo
        .head()
        .ok()
        .and_then(|h| h.target())
        .map(|oid| oid.to_string())
        .unwrap_or_default();
    info!(target = %target.display(), head = %head, "Checked out repository structure");

    Ok(())
}

fn ensure_empty_target(target: &Path) -> GitResult<()> {
    if !target.exists() {
        return Ok(());
    }
    if !target.is_dir() {
        return Err(GitError::InvalidTarget(format!(
            "{} is not a directory",
            target.display()
        )));
    }
    if std::fs::read_dir(target)?.next().is_some() {
        return Err(GitError::InvalidTarget(format!(
            "{} is not empty",
            target.display()
        )));
    }
    Ok(())
}
