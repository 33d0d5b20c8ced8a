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

//! HuggingFace Hub backend
//!
//! Metadata goes through the REST API under `/api`, file content through
//! git (structure) and the repository's Git LFS endpoint (large objects).
//! Uploads follow the hub's own three-step protocol: `preupload` decides
//! which files must go through LFS, the LFS objects are pushed, and a single
//! NDJSON commit adds every file.

use crate::error::{HubError, HubResult};
use crate::http::{build_client, check, encode_path, next_link};
use crate::lfs::{pending_objects, LfsClient, LocalObject};
use crate::staging::{stage_folder, StagedFile};
use crate::types::{ListingPage, Platform, RemoteFile, RepoKind, RepoRef, TreeEntry, Visibility};
use crate::{DestinationHub, SourceHub, UploadSummary};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hubport_git::pointer::MAX_POINTER_SIZE;
use hubport_git::{checkout_pointers, CheckoutOptions, LfsPointer};
use reqwest::header::{CONTENT_TYPE, LINK};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Public HuggingFace endpoint
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Default branch of every HuggingFace repository
pub const DEFAULT_REVISION: &str = "main";

/// Files classified per `preupload` request
const PREUPLOAD_BATCH: usize = 256;

/// Bytes of each file sent to `preupload` as a sample
const SAMPLE_SIZE: usize = 512;

#[derive(Debug, Deserialize)]
struct TreeItem {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    lfs: Option<LfsInfo>,
}

#[derive(Debug, Deserialize)]
struct LfsInfo {
    oid: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct PreuploadFile<'a> {
    path: &'a str,
    size: u64,
    sample: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadAnswer {
    path: String,
    upload_mode: String,
    #[serde(default)]
    should_ignore: bool,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadAnswer>,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

/// Client for one HuggingFace endpoint
pub struct HuggingFaceHub {
    http: Client,
    endpoint: String,
    token: Option<String>,
    revision: String,
    transfer_timeout: Duration,
    parallel_transfers: usize,
    // full listing per repo, fetched on page 1 and sliced for later pages
    listings: Mutex<HashMap<String, Arc<Vec<RemoteFile>>>>,
}

impl fmt::Debug for HuggingFaceHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingFaceHub")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("revision", &self.revision)
            .finish()
    }
}

impl HuggingFaceHub {
    /// Creates a client for `endpoint` (e.g. `https://huggingface.co`)
    pub fn new(endpoint: &str, token: Option<String>, request_timeout: Duration) -> HubResult<Self> {
        Ok(Self {
            http: build_client(request_timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            revision: DEFAULT_REVISION.to_string(),
            transfer_timeout: Duration::from_secs(4 * 3600),
            parallel_transfers: 4,
            listings: Mutex::new(HashMap::new()),
        })
    }

    /// Read from and commit to `revision` instead of `main`
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Deadline for a single large object transfer
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Large objects moved concurrently by one worker
    pub fn with_parallel_transfers(mut self, parallel: usize) -> Self {
        self.parallel_transfers = parallel.max(1);
        self
    }

    /// URL path prefix of a repository kind (`""`, `datasets/`, `spaces/`)
    pub fn kind_prefix(kind: RepoKind) -> &'static str {
        match kind {
            RepoKind::Model => "",
            RepoKind::Dataset => "datasets/",
            RepoKind::Space => "spaces/",
        }
    }

    /// Browser URL of `repo`
    pub fn web_url(&self, repo: &RepoRef) -> String {
        format!("{}/{}{}", self.endpoint, Self::kind_prefix(repo.kind), repo.id)
    }

    fn git_url(&self, repo: &RepoRef) -> String {
        format!("{}.git", self.web_url(repo))
    }

    fn api_url(&self, repo: &RepoRef, suffix: &str) -> String {
        format!("{}/api/{}/{}{}", self.endpoint, repo.kind.plural(), repo.id, suffix)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn lfs(&self, repo: &RepoRef) -> LfsClient {
        LfsClient::new(self.http.clone(), &self.git_url(repo))
            .with_credentials("hubport", self.token.clone())
            .with_ref(self.revision.clone())
            .with_transfer_timeout(self.transfer_timeout)
            .with_parallel_transfers(self.parallel_transfers)
    }

    async fn list_items(&self, repo: &RepoRef) -> HubResult<Vec<TreeItem>> {
        let mut items = Vec::new();
        let mut next = Some(self.api_url(
            repo,
            &format!("/tree/{}?recursive=true", encode_path(&self.revision)),
        ));

        while let Some(url) = next {
            let response = check(self.authed(self.http.get(&url)).send().await?, "tree listing").await?;
            next = next_link(response.headers().get(LINK).and_then(|v| v.to_str().ok()));
            let page: Vec<TreeItem> = response.json().await?;
            debug!(repo = %repo.id, entries = page.len(), "Fetched tree page");
            items.extend(page.into_iter().filter(|item| item.kind == "file"));
        }

        Ok(items)
    }

    async fn preupload(&self, repo: &RepoRef, staged: &[StagedFile]) -> HubResult<HashMap<String, PreuploadAnswer>> {
        let mut answers = HashMap::new();
        let url = self.api_url(repo, &format!("/preupload/{}", encode_path(&self.revision)));

        for group in staged.chunks(PREUPLOAD_BATCH) {
            let mut files = Vec::with_capacity(group.len());
            for file in group {
                files.push(PreuploadFile {
                    path: &file.relative,
                    size: file.size,
                    sample: BASE64.encode(read_sample(&file.absolute)?),
                });
            }
            let request = self.authed(self.http.post(&url)).json(&json!({ "files": files }));
            let response = check(request.send().await?, "preupload").await?;
            let parsed: PreuploadResponse = response.json().await?;
            for answer in parsed.files {
                answers.insert(answer.path.clone(), answer);
            }
        }

        Ok(answers)
    }
}

fn read_sample(path: &Path) -> HubResult<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    file.take(SAMPLE_SIZE as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

fn tree_entry(item: TreeItem) -> TreeEntry {
    match item.lfs {
        Some(lfs) => TreeEntry {
            path: item.path,
            size: lfs.size,
            large_object: true,
            pointer: Some(LfsPointer::new(lfs.oid, lfs.size)),
        },
        None => TreeEntry {
            path: item.path,
            size: item.size,
            large_object: false,
            pointer: None,
        },
    }
}

fn remote_file(item: TreeItem) -> RemoteFile {
    // regular files only carry a git blob id, which is not a content hash
    match item.lfs {
        Some(lfs) => RemoteFile {
            path: item.path,
            size: lfs.size,
            sha256: Some(lfs.oid.to_ascii_lowercase()),
        },
        None => RemoteFile {
            path: item.path,
            size: item.size,
            sha256: None,
        },
    }
}

/// Builds the NDJSON body of a commit.
fn commit_body(message: &str, regular: &[(&StagedFile, Vec<u8>)], large: &[&StagedFile]) -> HubResult<String> {
    let mut lines = Vec::with_capacity(1 + regular.len() + large.len());
    lines.push(json!({
        "key": "header",
        "value": { "summary": message, "description": "" }
    }));
    for (file, content) in regular {
        lines.push(json!({
            "key": "file",
            "value": {
                "path": file.relative,
                "content": BASE64.encode(content),
                "encoding": "base64"
            }
        }));
    }
    for file in large {
        lines.push(json!({
            "key": "lfsFile",
            "value": {
                "path": file.relative,
                "algo": "sha256",
                "oid": file.sha256,
                "size": file.size
            }
        }));
    }

    let mut body = String::new();
    for line in lines {
        body.push_str(&serde_json::to_string(&line)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl SourceHub for HuggingFaceHub {
    fn platform(&self) -> Platform {
        Platform::HuggingFace
    }

    async fn repo_info(&self, repo: &RepoRef) -> HubResult<()> {
        let response = self.authed(self.http.get(self.api_url(repo, ""))).send().await?;
        check(response, &format!("{} {}", repo.kind, repo.id)).await?;
        Ok(())
    }

    async fn list_tree(&self, repo: &RepoRef) -> HubResult<Vec<TreeEntry>> {
        Ok(self.list_items(repo).await?.into_iter().map(tree_entry).collect())
    }

    async fn read_pointer(&self, repo: &RepoRef, path: &str) -> HubResult<Option<LfsPointer>> {
        let url = format!(
            "{}/raw/{}/{}",
            self.web_url(repo),
            encode_path(&self.revision),
            encode_path(path)
        );
        let response = check(self.authed(self.http.get(&url)).send().await?, path).await?;
        let content = response.bytes().await?;
        if content.len() > MAX_POINTER_SIZE {
            return Ok(None);
        }
        Ok(LfsPointer::parse_bytes(&content).ok())
    }

    async fn fetch_structure(&self, repo: &RepoRef, dest: &Path) -> HubResult<()> {
        let mut options = CheckoutOptions::shallow(self.git_url(repo)).with_branch(self.revision.clone());
        if let Some(token) = &self.token {
            options = options.with_credentials("hubport", token.clone());
        }
        checkout_pointers(options, dest).await?;
        Ok(())
    }

    async fn fetch_objects(&self, repo: &RepoRef, root: &Path, paths: &BTreeSet<String>) -> HubResult<u64> {
        let pending = pending_objects(root, paths).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        self.lfs(repo).download(&pending).await
    }
}

#[async_trait]
impl DestinationHub for HuggingFaceHub {
    fn platform(&self) -> Platform {
        Platform::HuggingFace
    }

    async fn whoami(&self) -> HubResult<String> {
        if self.token.is_none() {
            return Err(HubError::Unauthorized("no HuggingFace token configured".to_string()));
        }
        let url = format!("{}/api/whoami-v2", self.endpoint);
        let response = check(self.authed(self.http.get(&url)).send().await?, "whoami").await?;
        let me: WhoAmI = response.json().await?;
        Ok(me.name)
    }

    async fn repo_exists(&self, repo: &RepoRef) -> HubResult<bool> {
        match SourceHub::repo_info(self, repo).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_repo(&self, repo: &RepoRef, visibility: Visibility) -> HubResult<()> {
        let url = format!("{}/api/repos/create", self.endpoint);
        let body = json!({
            "name": repo.id.name(),
            "organization": repo.id.namespace(),
            "type": repo.kind.as_str(),
            "private": visibility == Visibility::Private,
        });
        let response = self.authed(self.http.post(&url)).json(&body).send().await?;
        if response.status() == StatusCode::CONFLICT {
            debug!(repo = %repo.id, "Repository already exists");
            return Ok(());
        }
        check(response, "create repo").await?;
        info!(repo = %repo.id, kind = %repo.kind, "Created HuggingFace repository");
        Ok(())
    }

    async fn upload_folder(&self, repo: &RepoRef, folder: &Path, message: &str) -> HubResult<UploadSummary> {
        let staged = stage_folder(folder).await?;
        if staged.is_empty() {
            return Ok(UploadSummary::default());
        }
        for file in &staged {
            if file.is_pointer_stub()? {
                return Err(HubError::Integrity(format!(
                    "{} is still an LFS pointer stub",
                    file.relative
                )));
            }
        }

        let modes = self.preupload(repo, &staged).await?;
        let mut regular = Vec::new();
        let mut large = Vec::new();
        for file in &staged {
            match modes.get(&file.relative) {
                Some(answer) if answer.should_ignore => {
                    debug!(path = %file.relative, "Hub ignores file, skipping");
                }
                Some(answer) if answer.upload_mode == "lfs" => large.push(file),
                _ => regular.push((file, tokio::fs::read(&file.absolute).await?)),
            }
        }

        let objects: Vec<LocalObject> = large
            .iter()
            .map(|f| LocalObject {
                oid: f.sha256.clone(),
                size: f.size,
                path: f.absolute.clone(),
            })
            .collect();
        if !objects.is_empty() {
            self.lfs(repo).upload(&objects).await?;
        }

        let body = commit_body(message, &regular, &large)?;
        let url = self.api_url(repo, &format!("/commit/{}", encode_path(&self.revision)));
        let request = self
            .authed(self.http.post(&url))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .timeout(self.transfer_timeout)
            .body(body);
        check(request.send().await?, "commit").await?;

        let summary = UploadSummary {
            files: regular.len() + large.len(),
            bytes: regular.iter().map(|(f, _)| f.size).sum::<u64>() + large.iter().map(|f| f.size).sum::<u64>(),
            large_objects: large.len(),
        };
        info!(
            repo = %repo.id,
            files = summary.files,
            large_objects = summary.large_objects,
            bytes = summary.bytes,
            "Committed folder to HuggingFace"
        );

        // the cached listing is stale now
        self.listings.lock().await.remove(&repo.to_string());
        Ok(summary)
    }

    async fn list_files(&self, repo: &RepoRef, page: u32, page_size: u32) -> HubResult<ListingPage> {
        if page == 0 || page_size == 0 {
            return Err(HubError::InvalidRequest(format!(
                "page {} of size {} is not a listing page",
                page, page_size
            )));
        }

        // the tree endpoint pages by cursor; page 1 refreshes the whole listing
        let key = repo.to_string();
        let cached = match page {
            1 => None,
            _ => self.listings.lock().await.get(&key).map(Arc::clone),
        };
        let files = match cached {
            Some(files) => files,
            None => {
                let fetched: Vec<RemoteFile> = self.list_items(repo).await?.into_iter().map(remote_file).collect();
                let fetched = Arc::new(fetched);
                self.listings.lock().await.insert(key, Arc::clone(&fetched));
                fetched
            }
        };

        Ok(ListingPage::from_slice(&files, page, page_size))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RepoId;

    fn hub() -> HuggingFaceHub {
        HuggingFaceHub::new("https://huggingface.co/", Some("hf_secret".into()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_urls_per_kind() {
        let hub = hub();
        let id = RepoId::parse("alice/demo").unwrap();
        let model = RepoRef::new(id.clone(), RepoKind::Model);
        let dataset = RepoRef::new(id.clone(), RepoKind::Dataset);
        let space = RepoRef::new(id, RepoKind::Space);

        assert_eq!(hub.web_url(&model), "https://huggingface.co/alice/demo");
        assert_eq!(hub.git_url(&dataset), "https://huggingface.co/datasets/alice/demo.git");
        assert_eq!(hub.web_url(&space), "https://huggingface.co/spaces/alice/demo");
        assert_eq!(
            hub.api_url(&dataset, "/tree/main"),
            "https://huggingface.co/api/datasets/alice/demo/tree/main"
        );
    }

    #[test]
    fn test_tree_items_map_lfs_pointer() {
        let body = r#"[
            {"type":"file","oid":"9b1c","size":1200,"path":"config.json"},
            {"type":"directory","oid":"aa","size":0,"path":"unet"},
            {"type":"file","oid":"77de","size":134,"path":"unet/model.safetensors",
             "lfs":{"oid":"ABCDEF","size":5000000000,"pointerSize":134}}
        ]"#;
        let items: Vec<TreeItem> = serde_json::from_str(body).unwrap();
        let entries: Vec<TreeEntry> = items
            .into_iter()
            .filter(|i| i.kind == "file")
            .map(tree_entry)
            .collect();

        assert_eq!(entries.len(), 2);
        assert!(!entries[0].large_object);
        assert_eq!(entries[1].size, 5_000_000_000);
        assert_eq!(entries[1].pointer.as_ref().unwrap().oid, "abcdef");
    }

    #[test]
    fn test_remote_file_hash_only_for_lfs() {
        let regular = TreeItem {
            kind: "file".into(),
            path: "a.txt".into(),
            size: 3,
            lfs: None,
        };
        let large = TreeItem {
            kind: "file".into(),
            path: "b.bin".into(),
            size: 134,
            lfs: Some(LfsInfo {
                oid: "FF00".into(),
                size: 99,
            }),
        };
        assert_eq!(remote_file(regular).sha256, None);
        let large = remote_file(large);
        assert_eq!(large.sha256.as_deref(), Some("ff00"));
        assert_eq!(large.size, 99);
    }

    #[test]
    fn test_commit_body_is_ndjson() {
        let small = StagedFile {
            relative: "config.json".into(),
            absolute: "/w/config.json".into(),
            size: 2,
            sha256: "00".into(),
        };
        let big = StagedFile {
            relative: "model.bin".into(),
            absolute: "/w/model.bin".into(),
            size: 10,
            sha256: "ab".into(),
        };
        let body = commit_body("Upload chunk 1/2", &[(&small, b"{}".to_vec())], &[&big]).unwrap();
        let lines: Vec<serde_json::Value> = body.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["key"], "header");
        assert_eq!(lines[0]["value"]["summary"], "Upload chunk 1/2");
        assert_eq!(lines[1]["value"]["content"], "e30=");
        assert_eq!(lines[2]["key"], "lfsFile");
        assert_eq!(lines[2]["value"]["oid"], "ab");
    }

    #[test]
    fn test_debug_hides_token() {
        assert!(!format!("{:?}", hub()).contains("hf_secret"));
    }

    #[tokio::test]
    async fn test_later_pages_come_from_cached_listing() {
        let offline = HuggingFaceHub::new("http://127.0.0.1:1", None, Duration::from_millis(200)).unwrap();
        let repo = RepoRef::new(RepoId::parse("a/b").unwrap(), RepoKind::Model);
        let cached: Vec<RemoteFile> = ["a.txt", "b.txt", "c.txt"]
            .iter()
            .map(|p| RemoteFile {
                path: p.to_string(),
                size: 1,
                sha256: None,
            })
            .collect();
        offline.listings.lock().await.insert(repo.to_string(), Arc::new(cached));

        let (second, third) = tokio::join!(offline.list_files(&repo, 2, 1), offline.list_files(&repo, 3, 1));
        assert_eq!(second.unwrap().files[0].path, "b.txt");
        let third = third.unwrap();
        assert_eq!(third.files[0].path, "c.txt");
        assert!(third.last);

        // page 1 always refreshes, and a failed fetch leaves the cache alone
        assert!(offline.list_files(&repo, 1, 1).await.is_err());
        assert!(offline.listings.lock().await.contains_key(&repo.to_string()));
    }

    #[tokio::test]
    async fn test_list_files_rejects_page_zero() {
        let repo = RepoRef::new(RepoId::parse("a/b").unwrap(), RepoKind::Model);
        let err = hub().list_files(&repo, 0, 100).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidRequest(_)));
    }
}
