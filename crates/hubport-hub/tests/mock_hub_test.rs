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

//! Hub contract tests driven through trait objects
//!
//! The engine only sees `dyn SourceHub` and `dyn DestinationHub`, so these
//! tests do the same.

#![allow(clippy::unwrap_used)]

use hubport_hub::mock::{MockFile, MockHub};
use hubport_hub::{
    DestinationHub, HubError, LfsPointer, Platform, RemoteFile, RepoId, RepoKind, RepoRef, SourceHub,
    Visibility,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

fn repo(id: &str) -> RepoRef {
    RepoRef::new(RepoId::parse(id).unwrap(), RepoKind::Model)
}

async fn seeded_source() -> (MockHub, RepoRef) {
    let hub = MockHub::new(Platform::HuggingFace);
    let r = repo("alice/llm");
    hub.add_repo(
        &r,
        [
            ("config.json", MockFile::small(br#"{"layers": 2}"#.to_vec())),
            ("tokenizer/vocab.txt", MockFile::small(b"a\nb\nc\n".to_vec())),
            ("model-00001.safetensors", MockFile::large(vec![1u8; 3000])),
            ("model-00002.safetensors", MockFile::large(vec![2u8; 2000])),
        ],
    )
    .await;
    (hub, r)
}

async fn all_files(hub: &dyn DestinationHub, r: &RepoRef, page_size: u32) -> Vec<RemoteFile> {
    let mut out = Vec::new();
    let mut page = 1;
    loop {
        let listing = hub.list_files(r, page, page_size).await.unwrap();
        out.extend(listing.files);
        if listing.last {
            return out;
        }
        page += 1;
    }
}

#[tokio::test]
async fn test_copy_through_trait_objects() {
    let (source_hub, source_repo) = seeded_source().await;
    let dest_hub = MockHub::new(Platform::ModelScope);
    let dest_repo = repo("bob/llm");

    let source: Arc<dyn SourceHub> = Arc::new(source_hub.clone());
    let destination: Arc<dyn DestinationHub> = Arc::new(dest_hub.clone());

    let tree = source.list_tree(&source_repo).await.unwrap();
    let large: BTreeSet<String> = tree
        .iter()
        .filter(|e| e.large_object)
        .map(|e| e.path.clone())
        .collect();
    assert_eq!(large.len(), 2);

    let work = TempDir::new().unwrap();
    source.fetch_structure(&source_repo, work.path()).await.unwrap();
    let written = source.fetch_objects(&source_repo, work.path(), &large).await.unwrap();
    assert_eq!(written, 5000);

    destination.create_repo(&dest_repo, Visibility::Private).await.unwrap();
    let summary = destination
        .upload_folder(&dest_repo, work.path(), "Upload alice/llm")
        .await
        .unwrap();
    assert_eq!(summary.files, 4);
    assert_eq!(summary.large_objects, 2);

    let listed = all_files(destination.as_ref(), &dest_repo, 2).await;
    let paths: Vec<&str> = listed.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            ".gitattributes",
            "README.md",
            "config.json",
            "model-00001.safetensors",
            "model-00002.safetensors",
            "tokenizer/vocab.txt",
        ]
    );

    let weights = listed.iter().find(|f| f.path == "model-00001.safetensors").unwrap();
    assert_eq!(weights.sha256.as_deref(), Some(hex::encode(Sha256::digest(vec![1u8; 3000])).as_str()));
    let pointer = tree
        .iter()
        .find(|e| e.path == "model-00001.safetensors")
        .and_then(|e| e.pointer.clone())
        .unwrap();
    assert_eq!(weights.sha256.as_deref(), Some(pointer.oid.as_str()));
}

#[tokio::test]
async fn test_upload_refuses_pointer_stubs() {
    let (source_hub, source_repo) = seeded_source().await;
    let dest_hub = MockHub::new(Platform::ModelScope);
    let dest_repo = repo("bob/llm");

    let work = TempDir::new().unwrap();
    source_hub.fetch_structure(&source_repo, work.path()).await.unwrap();
    dest_hub.create_repo(&dest_repo, Visibility::Public).await.unwrap();

    let err = dest_hub
        .upload_folder(&dest_repo, work.path(), "stubs only")
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Integrity(_)));

    let files = dest_hub.files(&dest_repo).await.unwrap();
    assert_eq!(files.len(), 2);
}

#[tokio::test]
async fn test_read_pointer_only_for_large_objects() {
    let (hub, r) = seeded_source().await;

    let pointer = hub.read_pointer(&r, "model-00002.safetensors").await.unwrap().unwrap();
    assert_eq!(pointer, LfsPointer::for_content(&[2u8; 2000]));
    assert!(hub.read_pointer(&r, "config.json").await.unwrap().is_none());

    hub.break_pointer(&r, "model-00002.safetensors").await;
    assert!(hub.read_pointer(&r, "model-00002.safetensors").await.unwrap().is_none());
}

#[tokio::test]
async fn test_clones_share_state() {
    let hub = MockHub::new(Platform::ModelScope);
    let other = hub.clone();
    let r = repo("bob/llm");

    assert!(!other.repo_exists(&r).await.unwrap());
    hub.create_repo(&r, Visibility::Public).await.unwrap();
    assert!(other.repo_exists(&r).await.unwrap());
    assert_eq!(DestinationHub::platform(&other), Platform::ModelScope);
}

#[tokio::test]
async fn test_missing_repo_is_not_found() {
    let hub = MockHub::new(Platform::HuggingFace);
    let err = hub.repo_info(&repo("nobody/nothing")).await.unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
}
