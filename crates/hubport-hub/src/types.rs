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

//! Repository identifiers and listing records shared by every backend

use hubport_git::LfsPointer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing user-supplied identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Repository id is not `namespace/name`
    #[error("Invalid repo ID: '{0}'. Expected format: 'username/repo-name'")]
    InvalidRepoId(String),

    /// Unknown platform name
    #[error("Unknown platform: '{0}'. Expected one of: hf, ms")]
    UnknownPlatform(String),

    /// Unknown repository kind
    #[error("Unknown repo type: '{0}'. Expected one of: model, dataset, space")]
    UnknownKind(String),

    /// Neither a `--to` flag nor a source prefix says where to go
    #[error("Cannot determine migration direction. Use --to hf|ms or prefix repo with hf:/ms:")]
    AmbiguousDirection,
}

/// A hosting hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// huggingface.co
    #[serde(rename = "hf")]
    HuggingFace,

    /// modelscope.cn / modelscope.ai
    #[serde(rename = "ms")]
    ModelScope,
}

impl Platform {
    /// Short code used on the command line
    pub fn code(&self) -> &'static str {
        match self {
            Platform::HuggingFace => "hf",
            Platform::ModelScope => "ms",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::HuggingFace => "HuggingFace",
            Platform::ModelScope => "ModelScope",
        }
    }

    /// The other hub
    pub fn other(&self) -> Platform {
        match self {
            Platform::HuggingFace => Platform::ModelScope,
            Platform::ModelScope => Platform::HuggingFace,
        }
    }

    /// Kinds the hub hosts, in the order they are probed during detection
    pub fn probe_order(&self) -> &'static [RepoKind] {
        match self {
            Platform::HuggingFace => &[RepoKind::Model, RepoKind::Dataset, RepoKind::Space],
            Platform::ModelScope => &[RepoKind::Model, RepoKind::Dataset],
        }
    }

    /// Whether the hub can host repositories of `kind`
    pub fn supports(&self, kind: RepoKind) -> bool {
        self.probe_order().contains(&kind)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hf" | "huggingface" => Ok(Platform::HuggingFace),
            "ms" | "modelscope" => Ok(Platform::ModelScope),
            other => Err(ParseError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Repository classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    /// Model weights and configs
    #[default]
    Model,
    /// Dataset files
    Dataset,
    /// Application space (HuggingFace only)
    Space,
}

impl RepoKind {
    /// Singular name
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Model => "model",
            RepoKind::Dataset => "dataset",
            RepoKind::Space => "space",
        }
    }

    /// Plural name used in REST paths (`models`, `datasets`, `spaces`)
    pub fn plural(&self) -> &'static str {
        match self {
            RepoKind::Model => "models",
            RepoKind::Dataset => "datasets",
            RepoKind::Space => "spaces",
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "model" => Ok(RepoKind::Model),
            "dataset" => Ok(RepoKind::Dataset),
            "space" => Ok(RepoKind::Space),
            other => Err(ParseError::UnknownKind(other.to_string())),
        }
    }
}

/// A validated `namespace/name` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    namespace: String,
    name: String,
}

impl RepoId {
    /// Parses `namespace/name`
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();
        let (namespace, name) = input
            .split_once('/')
            .ok_or_else(|| ParseError::InvalidRepoId(input.to_string()))?;

        if !valid_segment(namespace) || !valid_segment(name) {
            return Err(ParseError::InvalidRepoId(input.to_string()));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Parses an id that may carry a platform prefix such as `hf:` or `modelscope:`.
    ///
    /// ```rust
    /// use hubport_hub::{Platform, RepoId};
    ///
    /// let (id, platform) = RepoId::parse_prefixed("hf:Linaqruf/animagine-xl-3.1").unwrap();
    /// assert_eq!(id.to_string(), "Linaqruf/animagine-xl-3.1");
    /// assert_eq!(platform, Some(Platform::HuggingFace));
    /// ```
    pub fn parse_prefixed(input: &str) -> Result<(Self, Option<Platform>), ParseError> {
        let input = input.trim();
        const PREFIXES: [(&str, Platform); 4] = [
            ("hf:", Platform::HuggingFace),
            ("huggingface:", Platform::HuggingFace),
            ("ms:", Platform::ModelScope),
            ("modelscope:", Platform::ModelScope),
        ];

        let lowered = input.to_ascii_lowercase();
        for (prefix, platform) in PREFIXES {
            if lowered.starts_with(prefix) {
                return Ok((Self::parse(&input[prefix.len()..])?, Some(platform)));
            }
        }
        Ok((Self::parse(input)?, None))
    }

    /// Owner segment
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Repository name segment
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl TryFrom<String> for RepoId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RepoId::parse(&value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.to_string()
    }
}

/// Figures out which way a migration goes.
///
/// An explicit destination wins; otherwise the source prefix decides.
pub fn resolve_direction(
    source_prefix: Option<Platform>,
    to: Option<Platform>,
) -> Result<(Platform, Platform), ParseError> {
    match (to, source_prefix) {
        (Some(dest), _) => Ok((dest.other(), dest)),
        (None, Some(source)) => Ok((source, source.other())),
        (None, None) => Err(ParseError::AmbiguousDirection),
    }
}

/// A repository on some hub
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    /// `namespace/name`
    pub id: RepoId,

    /// Model, dataset or space
    pub kind: RepoKind,
}

impl RepoRef {
    /// Pairs an id with its kind
    pub fn new(id: RepoId, kind: RepoKind) -> Self {
        Self { id, kind }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.kind)
    }
}

/// Visibility of a newly created repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Anyone can read
    #[default]
    Public,
    /// Only the owner can read
    Private,
}

/// One file of a source repository as its hub lists it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Relative `/`-separated path
    pub path: String,

    /// Size in bytes as listed; for large objects this may be the pointer size
    pub size: u64,

    /// Content lives out-of-band behind an LFS pointer
    pub large_object: bool,

    /// Pointer data when the listing already carries it
    pub pointer: Option<LfsPointer>,
}

/// One file of a destination repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Relative `/`-separated path
    pub path: String,

    /// Size in bytes of the stored content
    pub size: u64,

    /// SHA-256 of the content when the hub exposes one
    pub sha256: Option<String>,
}

/// One page of a destination listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Files on the page, directories left out
    pub files: Vec<RemoteFile>,

    /// No page follows this one
    pub last: bool,
}

impl ListingPage {
    /// Page `page` (from 1) of a listing already held in full
    pub fn from_slice(all: &[RemoteFile], page: u32, page_size: u32) -> Self {
        let size = page_size as usize;
        let start = (page.saturating_sub(1) as usize).saturating_mul(size);
        let files: Vec<RemoteFile> = all.iter().skip(start).take(size).cloned().collect();
        Self {
            last: start.saturating_add(size) >= all.len(),
            files,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_id() {
        let id = RepoId::parse("  damo/text-to-video_ms.v2 ").unwrap();
        assert_eq!(id.namespace(), "damo");
        assert_eq!(id.name(), "text-to-video_ms.v2");
        assert_eq!(id.to_string(), "damo/text-to-video_ms.v2");
    }

    #[test]
    fn test_parse_repo_id_rejects_bad_shapes() {
        for bad in ["gpt2", "a/b/c", "/b", "a/", "a b/c", "a/b?x=1"] {
            assert!(RepoId::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_parse_prefixed() {
        let (id, p) = RepoId::parse_prefixed("ModelScope:damo/cv").unwrap();
        assert_eq!(id.to_string(), "damo/cv");
        assert_eq!(p, Some(Platform::ModelScope));

        let (_, p) = RepoId::parse_prefixed("user/repo").unwrap();
        assert_eq!(p, None);
    }

    #[test]
    fn test_resolve_direction() {
        assert_eq!(
            resolve_direction(None, Some(Platform::ModelScope)).unwrap(),
            (Platform::HuggingFace, Platform::ModelScope)
        );
        assert_eq!(
            resolve_direction(Some(Platform::ModelScope), None).unwrap(),
            (Platform::ModelScope, Platform::HuggingFace)
        );
        // explicit flag wins over the prefix
        assert_eq!(
            resolve_direction(Some(Platform::HuggingFace), Some(Platform::HuggingFace)).unwrap(),
            (Platform::ModelScope, Platform::HuggingFace)
        );
        assert_eq!(
            resolve_direction(None, None).unwrap_err(),
            ParseError::AmbiguousDirection
        );
    }

    #[test]
    fn test_platform_kinds() {
        assert!(Platform::HuggingFace.supports(RepoKind::Space));
        assert!(!Platform::ModelScope.supports(RepoKind::Space));
        assert_eq!("Modelscope".parse::<Platform>().unwrap(), Platform::ModelScope);
        assert_eq!(RepoKind::Dataset.plural(), "datasets");
    }

    #[test]
    fn test_repo_id_serde_roundtrip_validates() {
        let id: RepoId = serde_json::from_str("\"a/b\"").unwrap();
        assert_eq!(id.to_string(), "a/b");
        assert!(serde_json::from_str::<RepoId>("\"nope\"").is_err());
    }

    #[test]
    fn test_listing_page_from_slice() {
        let all: Vec<RemoteFile> = (0..4)
            .map(|i| RemoteFile {
                path: format!("f{i}"),
                size: 1,
                sha256: None,
            })
            .collect();

        let first = ListingPage::from_slice(&all, 1, 3);
        assert_eq!(first.files.len(), 3);
        assert!(!first.last);

        let second = ListingPage::from_slice(&all, 2, 3);
        assert_eq!(second.files[0].path, "f3");
        assert!(second.last);

        let exact = ListingPage::from_slice(&all, 2, 2);
        assert_eq!(exact.files.len(), 2);
        assert!(exact.last);

        assert!(ListingPage::from_slice(&[], 1, 10).last);
    }
}
