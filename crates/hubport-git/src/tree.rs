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

//! Working tree enumeration

use crate::error::{GitError, GitResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the git metadata directory, never part of a repository's files
pub const GIT_DIR: &str = ".git";

/// A regular file found in a working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingFile {
    /// Path relative to the tree root, `/`-separated
    pub relative: String,

    /// Absolute location on disk
    pub absolute: PathBuf,

    /// Size on disk in bytes
    pub size: u64,
}

/// Lists every regular file under `root`, sorted by relative path.
///
/// The `.git` directory is skipped. Symlinks are not followed.
pub fn working_files(root: &Path) -> GitResult<Vec<WorkingFile>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != GIT_DIR);

    for entry in walker {
        let entry = entry.map_err(|e| GitError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = relative_slash_path(root, entry.path())?;
        let size = entry
            .metadata()
            .map_err(|e| GitError::Io(std::io::Error::other(e.to_string())))?
            .len();
        files.push(WorkingFile {
            relative,
            absolute: entry.path().to_path_buf(),
            size,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// `path` relative to `root`, joined with `/` on every platform
pub fn relative_slash_path(root: &Path, path: &Path) -> GitResult<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        GitError::InvalidTarget(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Resolves a `/`-separated relative path under `root`.
///
/// Rejects absolute paths and `..` segments so a hostile listing cannot
/// write outside the working area.
pub fn resolve_relative(root: &Path, relative: &str) -> GitResult<PathBuf> {
    let mut out = root.to_path_buf();
    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(GitError::InvalidTarget(format!(
                    "path escapes working area: {}",
                    relative
                )))
            }
            s => out.push(s),
        }
    }
    if relative.starts_with('/') || out == root {
        return Err(GitError::InvalidTarget(format!(
            "not a relative file path: {}",
            relative
        )));
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_working_files_skips_git_dir() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), b"ref").unwrap();
        std::fs::create_dir_all(dir.path().join("unet")).unwrap();
        std::fs::write(dir.path().join("unet/weights.bin"), b"1234").unwrap();
        std::fs::write(dir.path().join(".gitattributes"), b"*.bin filter=lfs").unwrap();

        let files = working_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(names, vec![".gitattributes", "unet/weights.bin"]);
        assert_eq!(files[1].size, 4);
    }

    #[test]
    fn test_resolve_relative_rejects_escape() {
        let dir = tempdir().unwrap();
        assert!(resolve_relative(dir.path(), "../etc/passwd").is_err());
        assert!(resolve_relative(dir.path(), "/etc/passwd").is_err());
        assert!(resolve_relative(dir.path(), "").is_err());
        assert_eq!(
            resolve_relative(dir.path(), "a/b.txt").unwrap(),
            dir.path().join("a").join("b.txt")
        );
    }
}
