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

//! Folders staged for upload

use crate::error::{HubError, HubResult};
use hubport_git::{working_files, LfsPointer};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A file found in an upload folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Path relative to the folder root, `/`-separated
    pub relative: String,

    /// Location on disk
    pub absolute: PathBuf,

    /// Content size in bytes
    pub size: u64,

    /// Lowercase hex SHA-256 of the content
    pub sha256: String,
}

impl StagedFile {
    /// The LFS pointer that would stand in for this file
    pub fn pointer(&self) -> LfsPointer {
        LfsPointer::new(self.sha256.clone(), self.size)
    }

    /// Whether the content is itself an LFS pointer stub.
    ///
    /// Uploading a stub would replace the real object with its pointer text.
    pub fn is_pointer_stub(&self) -> HubResult<bool> {
        if self.size as usize > hubport_git::pointer::MAX_POINTER_SIZE {
            return Ok(false);
        }
        let content = std::fs::read(&self.absolute)?;
        Ok(LfsPointer::is_pointer(&content))
    }
}

/// Lists and hashes every file under `folder`, skipping `.git`.
///
/// Runs on the blocking pool; hashing a chunk reads every byte of it.
pub async fn stage_folder(folder: &Path) -> HubResult<Vec<StagedFile>> {
    let folder = folder.to_path_buf();
    tokio::task::spawn_blocking(move || stage_blocking(&folder))
        .await
        .map_err(|e| HubError::Io(io::Error::other(e.to_string())))?
}

fn stage_blocking(folder: &Path) -> HubResult<Vec<StagedFile>> {
    let mut staged = Vec::new();
    for file in working_files(folder)? {
        let sha256 = hash_file(&file.absolute)?;
        staged.push(StagedFile {
            relative: file.relative,
            absolute: file.absolute,
            size: file.size,
            sha256,
        });
    }
    Ok(staged)
}

/// Streams `path` through SHA-256
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1 << 20];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
