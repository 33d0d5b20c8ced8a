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

//! Git LFS pointer files
//!
//! A pointer file is the small text stub git stores in place of a large
//! object. Both hubs keep model weights and dataset shards this way, and a
//! checkout made without the LFS filter leaves these stubs in the working
//! tree.
//!
//! ## Format
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393
//! size 12345
//! ```
//!
//! `ext-N-name` extension lines are accepted and ignored.

use crate::error::{GitError, GitResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current Git LFS pointer format version
pub const POINTER_VERSION: &str = "https://git-lfs.github.com/spec/v1";

/// Pre-release spec URL still found in old repositories
pub const LEGACY_POINTER_VERSION: &str = "https://hawser.github.com/spec/v1";

/// Git LFS refuses to treat anything larger than this as a pointer
pub const MAX_POINTER_SIZE: usize = 1024;

/// A parsed Git LFS pointer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LfsPointer {
    /// Spec version URL
    pub version: String,

    /// SHA-256 of the object content, lowercase hex without the `sha256:` prefix
    pub oid: String,

    /// Size of the object content in bytes
    pub size: u64,
}

impl LfsPointer {
    /// Creates a pointer for an object with the given hash and size
    ///
    /// ```rust
    /// use hubport_git::LfsPointer;
    ///
    /// let pointer = LfsPointer::new(
    ///     "4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393".to_string(),
    ///     12345,
    /// );
    /// assert_eq!(pointer.size, 12345);
    /// ```
    pub fn new(oid: String, size: u64) -> Self {
        Self {
            version: POINTER_VERSION.to_string(),
            oid: oid.to_ascii_lowercase(),
            size,
        }
    }

    /// Builds the pointer that describes `content`
    pub fn for_content(content: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(content);
        Self::new(hex::encode(digest), content.len() as u64)
    }

    /// Parses a pointer from its text representation
    ///
    /// # Errors
    ///
    /// Returns a parse error when the text is too large, a required field is
    /// missing, the oid is not a sha256 digest or the size is not a number.
    pub fn parse(content: &str) -> GitResult<Self> {
        if content.len() > MAX_POINTER_SIZE {
            return Err(GitError::InvalidPointerFormat(
                "Pointer file too large".to_string(),
            ));
        }

        let mut version: Option<String> = None;
        let mut oid: Option<String> = None;
        let mut size: Option<u64> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line.split_once(' ').ok_or_else(|| {
                GitError::PointerParse(format!("Invalid line format: {}", line))
            })?;

            match key {
                "version" => {
                    if value != POINTER_VERSION && value != LEGACY_POINTER_VERSION {
                        return Err(GitError::InvalidPointerFormat(format!(
                            "Unsupported pointer version: {}",
                            value
                        )));
                    }
                    version = Some(value.to_string());
                }
                "oid" => {
                    let (algo, hash) = value.split_once(':').ok_or_else(|| {
                        GitError::InvalidOid(format!(
                            "OID must be in format 'sha256:hash', got: {}",
                            value
                        ))
                    })?;
                    if algo != "sha256" {
                        return Err(GitError::InvalidOid(format!(
                            "Only sha256 hashing is supported, got: {}",
                            algo
                        )));
                    }
                    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(GitError::InvalidOid(format!(
                            "Invalid SHA-256 hash: {}",
                            hash
                        )));
                    }
                    oid = Some(hash.to_ascii_lowercase());
                }
                "size" => {
                    size = Some(value.parse::<u64>().map_err(|e| {
                        GitError::PointerParse(format!("Invalid size value: {}", e))
                    })?);
                }
                ext if ext.starts_with("ext-") => {}
                other => {
                    return Err(GitError::PointerParse(format!("Unknown field: {}", other)));
                }
            }
        }

        let version =
            version.ok_or_else(|| GitError::MissingPointerField("version".to_string()))?;
        let oid = oid.ok_or_else(|| GitError::MissingPointerField("oid".to_string()))?;
        let size = size.ok_or_else(|| GitError::MissingPointerField("size".to_string()))?;

        Ok(Self { version, oid, size })
    }

    /// Parses raw bytes, rejecting anything that is not UTF-8
    pub fn parse_bytes(content: &[u8]) -> GitResult<Self> {
        let text = std::str::from_utf8(content)
            .map_err(|e| GitError::InvalidPointerFormat(format!("not UTF-8: {}", e)))?;
        Self::parse(text)
    }

    /// Fast check that doesn't do full parsing
    ///
    /// ```rust
    /// use hubport_git::LfsPointer;
    ///
    /// let content = b"version https://git-lfs.github.com/spec/v1\noid sha256:abc\nsize 1\n";
    /// assert!(LfsPointer::is_pointer(content));
    /// assert!(!LfsPointer::is_pointer(b"{\"architectures\": []}"));
    /// ```
    pub fn is_pointer(content: &[u8]) -> bool {
        if content.len() > MAX_POINTER_SIZE {
            return false;
        }
        let Ok(text) = std::str::from_utf8(content) else {
            return false;
        };

        (text.starts_with("version https://git-lfs.github.com/spec/")
            || text.starts_with("version https://hawser.github.com/spec/"))
            && text.contains("oid sha256:")
            && text.contains("size ")
    }

    /// Returns the OID with sha256 prefix
    pub fn oid_with_prefix(&self) -> String {
        format!("sha256:{}", self.oid)
    }
}

impl fmt::Display for LfsPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {}\noid {}\nsize {}\n",
            self.version,
            self.oid_with_prefix(),
            self.size
        )
    }
}
