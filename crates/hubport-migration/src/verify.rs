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

//! Destination verification
//!
//! Compares a destination listing with the manifest on two levels:
//! totals (file count and bytes) and per-file SHA-256. The files each hub
//! generates on creation are left out of the per-file comparison on both
//! sides.

use crate::error::{MigrationError, MigrationResult};
use crate::model::Manifest;
use hubport_config::SecretScrubber;
use hubport_hub::{is_generated_file, DestinationHub, HubResult, RemoteFile, RepoRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A file whose destination hash differs from the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMismatch {
    /// Relative path
    pub path: String,

    /// Hash from the manifest
    pub expected: String,

    /// Hash the destination reports
    pub actual: String,
}

/// Per-file comparison buckets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashComparison {
    /// Present with the expected hash
    pub matched: Vec<String>,

    /// Present, but one side has no hash
    pub skipped: Vec<String>,

    /// Present with a different hash
    pub mismatched: Vec<HashMismatch>,

    /// Absent from the destination
    pub missing: Vec<String>,
}

/// Outcome of comparing a destination with a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Files in the manifest
    pub source_files: usize,

    /// Bytes in the manifest
    pub source_bytes: u64,

    /// Files the destination lists, generated ones included
    pub destination_files: usize,

    /// Bytes the destination lists
    pub destination_bytes: u64,

    /// `destination_files >= source_files`
    pub files_match: bool,

    /// Per-file buckets
    pub hashes: HashComparison,

    /// No file is missing and no hash differs
    pub verified: bool,
}

impl VerificationReport {
    /// Compares `listing` with `manifest`
    pub fn compare(manifest: &Manifest, listing: &BTreeMap<String, RemoteFile>) -> Self {
        let mut hashes = HashComparison::default();

        for file in manifest.files() {
            if is_generated_file(&file.path) {
                continue;
            }
            // unhashed entries only count towards files_match and the totals
            let Some(expected) = &file.content_hash else {
                continue;
            };
            let Some(remote) = listing.get(&file.path) else {
                hashes.missing.push(file.path.clone());
                continue;
            };
            match &remote.sha256 {
                Some(actual) if expected.eq_ignore_ascii_case(actual) => {
                    hashes.matched.push(file.path.clone());
                }
                Some(actual) => hashes.mismatched.push(HashMismatch {
                    path: file.path.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                }),
                None => hashes.skipped.push(file.path.clone()),
            }
        }

        let destination_files = listing.len();
        let destination_bytes = listing.values().map(|f| f.size).sum();
        let verified = hashes.mismatched.is_empty() && hashes.missing.is_empty();

        Self {
            source_files: manifest.len(),
            source_bytes: manifest.total_bytes(),
            destination_files,
            destination_bytes,
            files_match: destination_files >= manifest.len(),
            hashes,
            verified,
        }
    }

    /// Format the report as a string
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Verification Report\n\
             Files: {} source, {} destination ({})\n\
             Bytes: {} source, {} destination\n\
             Hashes: {} matched, {} skipped, {} mismatched, {} missing\n",
            self.source_files,
            self.destination_files,
            if self.files_match { "ok" } else { "fewer than source" },
            self.source_bytes,
            self.destination_bytes,
            self.hashes.matched.len(),
            self.hashes.skipped.len(),
            self.hashes.mismatched.len(),
            self.hashes.missing.len(),
        ));

        if !self.hashes.missing.is_empty() {
            output.push_str("\nMissing:\n");
            for path in &self.hashes.missing {
                output.push_str(&format!("  - {}\n", path));
            }
        }

        if !self.hashes.mismatched.is_empty() {
            output.push_str("\nMismatched:\n");
            for mismatch in &self.hashes.mismatched {
                output.push_str(&format!("  - {}\n", mismatch.path));
                output.push_str(&format!("    Source sha256: {}\n", mismatch.expected));
                output.push_str(&format!("    Destination sha256: {}\n", mismatch.actual));
            }
        }

        output
    }
}

/// Reads every page of a destination listing.
///
/// Pages are requested from 1 until the hub marks one as the last. A page
/// whose files are all known already also ends the loop.
pub async fn list_destination(
    destination: &dyn DestinationHub,
    repo: &RepoRef,
    page_size: u32,
) -> HubResult<BTreeMap<String, RemoteFile>> {
    let mut files = BTreeMap::new();
    let mut page = 1u32;
    loop {
        let listing = destination.list_files(repo, page, page_size).await?;
        let count = listing.files.len();
        let mut added = 0usize;
        for entry in listing.files {
            if files.insert(entry.path.clone(), entry).is_none() {
                added += 1;
            }
        }
        debug!(page, count, added, last = listing.last, "Listed destination page");

        if listing.last {
            break;
        }
        if count > 0 && added == 0 {
            warn!(page, "Destination listing repeats itself, stopping");
            break;
        }
        page += 1;
    }
    Ok(files)
}

/// Verifies destinations against manifests
pub struct Verifier<'a> {
    destination: &'a dyn DestinationHub,
    page_size: u32,
    scrubber: &'a SecretScrubber,
}

impl<'a> Verifier<'a> {
    /// Creates a verifier listing `page_size` entries per request
    pub fn new(destination: &'a dyn DestinationHub, page_size: u32, scrubber: &'a SecretScrubber) -> Self {
        Self {
            destination,
            page_size: page_size.max(1),
            scrubber,
        }
    }

    /// Lists `repo` and compares it with `manifest`
    ///
    /// # Errors
    ///
    /// [`MigrationError::Verification`] when the listing fails. A completed
    /// comparison that finds problems is not an error; see
    /// [`VerificationReport::verified`].
    pub async fn verify(&self, manifest: &Manifest, repo: &RepoRef) -> MigrationResult<VerificationReport> {
        let listing = list_destination(self.destination, repo, self.page_size)
            .await
            .map_err(|e| MigrationError::Verification(self.scrubber.scrub(&e.to_string())))?;

        let report = VerificationReport::compare(manifest, &listing);
        if report.verified {
            info!(
                matched = report.hashes.matched.len(),
                skipped = report.hashes.skipped.len(),
                destination_files = report.destination_files,
                "Destination verified"
            );
        } else {
            warn!(
                missing = report.hashes.missing.len(),
                mismatched = report.hashes.mismatched.len(),
                "Destination does not match manifest"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::FileDescriptor;
    use hubport_hub::mock::{MockFile, MockHub};
    use hubport_hub::{HubError, LfsPointer, Platform, RepoId, RepoKind, Visibility};

    fn remote(path: &str, size: u64, sha256: Option<&str>) -> (String, RemoteFile) {
        (
            path.to_string(),
            RemoteFile {
                path: path.to_string(),
                size,
                sha256: sha256.map(str::to_string),
            },
        )
    }

    fn hash(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn manifest() -> Manifest {
        Manifest::new(vec![
            FileDescriptor::small("README.md", 10),
            FileDescriptor::small("config.json", 20),
            FileDescriptor::large("a.bin", 300, Some(hash('a'))),
            FileDescriptor::large("b.bin", 400, Some(hash('b'))),
        ])
        .unwrap()
    }

    #[test]
    fn test_exact_mirror_verifies() {
        let listing = BTreeMap::from([
            remote("README.md", 99, Some(&hash('f'))),
            remote(".gitattributes", 50, Some(&hash('e'))),
            remote("config.json", 20, Some(&hash('c'))),
            remote("a.bin", 300, Some(&hash('a'))),
            remote("b.bin", 400, Some(&hash('b'))),
        ]);

        let report = VerificationReport::compare(&manifest(), &listing);
        assert!(report.verified);
        assert!(report.files_match);
        assert_eq!(report.hashes.matched, vec!["a.bin", "b.bin"]);
        assert!(report.hashes.skipped.is_empty());
        assert!(report.hashes.mismatched.is_empty());
        assert!(report.hashes.missing.is_empty());
    }

    #[test]
    fn test_missing_hashed_file_fails() {
        let listing = BTreeMap::from([
            remote("README.md", 10, None),
            remote("config.json", 20, None),
            remote("a.bin", 300, Some(&hash('a'))),
        ]);

        let report = VerificationReport::compare(&manifest(), &listing);
        assert!(!report.verified);
        assert!(!report.files_match);
        assert_eq!(report.hashes.missing, vec!["b.bin"]);
    }

    #[test]
    fn test_absent_unhashed_file_only_affects_counts() {
        let manifest = Manifest::new(vec![
            FileDescriptor::small("config.json", 20),
            FileDescriptor::large("a.bin", 300, Some(hash('a'))),
        ])
        .unwrap();
        let listing = BTreeMap::from([remote("a.bin", 300, Some(&hash('a')))]);

        let report = VerificationReport::compare(&manifest, &listing);
        assert!(report.verified);
        assert!(!report.files_match);
        assert!(report.hashes.missing.is_empty());
        assert_eq!(report.hashes.matched, vec!["a.bin"]);
        assert_eq!(report.destination_bytes, 300);
        assert_eq!(report.source_bytes, 320);
    }

    #[test]
    fn test_hashless_destination_entry_is_skipped() {
        let listing = BTreeMap::from([
            remote("config.json", 20, None),
            remote("a.bin", 300, None),
            remote("b.bin", 400, Some(&hash('b'))),
        ]);

        let report = VerificationReport::compare(&manifest(), &listing);
        assert!(report.verified);
        assert_eq!(report.hashes.skipped, vec!["a.bin"]);
        assert_eq!(report.hashes.matched, vec!["b.bin"]);
    }

    #[test]
    fn test_mismatch_is_reported() {
        let listing = BTreeMap::from([
            remote("config.json", 20, None),
            remote("a.bin", 300, Some(&hash('a'))),
            remote("b.bin", 400, Some(&hash('0'))),
        ]);

        let report = VerificationReport::compare(&manifest(), &listing);
        assert!(!report.verified);
        assert_eq!(report.hashes.mismatched.len(), 1);
        assert_eq!(report.hashes.mismatched[0].path, "b.bin");
        assert!(report.format().contains("Destination sha256: 0000"));
    }

    #[test]
    fn test_generated_files_are_not_compared() {
        let manifest = Manifest::new(vec![FileDescriptor::large(
            ".gitattributes",
            10,
            Some(hash('a')),
        )])
        .unwrap();
        let report = VerificationReport::compare(&manifest, &BTreeMap::new());
        assert!(report.verified);
        assert!(!report.files_match);
    }

    #[tokio::test]
    async fn test_listing_is_paged_until_last_page() {
        let hub = MockHub::default();
        let repo = RepoRef::new(RepoId::parse("alice/pages").unwrap(), RepoKind::Dataset);
        let files: Vec<(String, MockFile)> = (0..7)
            .map(|i| (format!("part-{i}.txt"), MockFile::small(vec![i as u8; 4])))
            .collect();
        hub.add_repo(&repo, files).await;

        let listing = list_destination(&hub, &repo, 3).await.unwrap();
        assert_eq!(listing.len(), 7);
        assert_eq!(hub.calls().await.listings, 3);
    }

    #[tokio::test]
    async fn test_full_last_page_ends_listing() {
        let hub = MockHub::default();
        let repo = RepoRef::new(RepoId::parse("alice/even").unwrap(), RepoKind::Model);
        let files: Vec<(String, MockFile)> = (0..4)
            .map(|i| (format!("f{i}"), MockFile::small(vec![0u8; 1])))
            .collect();
        hub.add_repo(&repo, files).await;

        let listing = list_destination(&hub, &repo, 2).await.unwrap();
        assert_eq!(listing.len(), 4);
        assert_eq!(hub.calls().await.listings, 2);
    }

    #[tokio::test]
    async fn test_directory_rows_do_not_end_listing() {
        let hub = MockHub::new(Platform::ModelScope);
        let repo = RepoRef::new(RepoId::parse("alice/nested").unwrap(), RepoKind::Model);
        hub.add_repo(
            &repo,
            [
                ("f0", MockFile::small(vec![0u8; 1])),
                ("f1", MockFile::small(vec![1u8; 1])),
                ("shards/f2", MockFile::small(vec![2u8; 1])),
                ("shards/f3", MockFile::small(vec![3u8; 1])),
                ("shards/f4", MockFile::small(vec![4u8; 1])),
            ],
        )
        .await;
        hub.list_directories(true).await;

        // the first page holds f0, f1 and the shards directory row
        let listing = list_destination(&hub, &repo, 3).await.unwrap();
        let paths: Vec<&str> = listing.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["f0", "f1", "shards/f2", "shards/f3", "shards/f4"]);
        assert_eq!(hub.calls().await.listings, 2);
    }

    #[tokio::test]
    async fn test_nested_destination_verifies() {
        let hub = MockHub::new(Platform::ModelScope);
        let repo = RepoRef::new(RepoId::parse("alice/sharded").unwrap(), RepoKind::Model);
        let shards: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 2048]).collect();
        let files: Vec<(String, MockFile)> = shards
            .iter()
            .enumerate()
            .map(|(i, content)| (format!("shards/{i}/model.bin"), MockFile::large(content.clone())))
            .collect();
        hub.add_repo(&repo, files).await;
        hub.list_directories(true).await;

        let descriptors = shards
            .iter()
            .enumerate()
            .map(|(i, content)| {
                let oid = LfsPointer::for_content(content).oid;
                FileDescriptor::large(format!("shards/{i}/model.bin"), 2048, Some(oid))
            })
            .collect();
        let manifest = Manifest::new(descriptors).unwrap();

        let scrubber = SecretScrubber::default();
        let report = Verifier::new(&hub, 2, &scrubber).verify(&manifest, &repo).await.unwrap();
        assert!(report.verified);
        assert!(report.hashes.missing.is_empty());
        assert_eq!(report.hashes.matched.len(), 4);
    }

    #[tokio::test]
    async fn test_listing_failure_is_unverifiable() {
        let hub = MockHub::default();
        let repo = RepoRef::new(RepoId::parse("alice/down").unwrap(), RepoKind::Model);
        hub.create_repo(&repo, Visibility::Public).await.unwrap();
        hub.fail_next_listing(HubError::from_status(503, "maintenance")).await;

        let scrubber = SecretScrubber::default();
        let err = Verifier::new(&hub, 100, &scrubber)
            .verify(&manifest(), &repo)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Verification(_)));
    }

    #[tokio::test]
    async fn test_verify_against_mock_upload() {
        let hub = MockHub::default();
        let repo = RepoRef::new(RepoId::parse("alice/live").unwrap(), RepoKind::Model);
        let content = vec![9u8; 5000];
        hub.add_repo(&repo, [("w.bin", MockFile::large(content.clone()))]).await;

        let oid = LfsPointer::for_content(&content).oid;
        let manifest = Manifest::new(vec![FileDescriptor::large("w.bin", 5000, Some(oid))]).unwrap();
        let scrubber = SecretScrubber::default();
        let report = Verifier::new(&hub, 100, &scrubber).verify(&manifest, &repo).await.unwrap();
        assert!(report.verified);
        assert_eq!(report.hashes.matched, vec!["w.bin"]);
    }
}
