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

//! ModelScope backend
//!
//! ModelScope wraps every API answer in an envelope
//! (`{"Code", "Message", "Success", "Data"}`) and may report a failure
//! inside an HTTP 200, so every response is unwrapped through [`envelope`].

use crate::error::{HubError, HubResult};
use crate::http::{build_client, check};
use crate::lfs::{pending_objects, LfsClient, LocalObject};
use crate::staging::stage_folder;
use crate::types::{ListingPage, Platform, RemoteFile, RepoKind, RepoRef, TreeEntry, Visibility};
use crate::{DestinationHub, SourceHub, UploadSummary};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hubport_git::{checkout_pointers, CheckoutOptions, LfsPointer};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Mainland China site
pub const DEFAULT_DOMAIN: &str = "modelscope.cn";

/// Default branch of every ModelScope repository
pub const DEFAULT_REVISION: &str = "master";

/// Username ModelScope expects next to an access token over git
pub const GIT_USERNAME: &str = "oauth2";

/// Files larger than this are pushed through LFS instead of inline
pub const INLINE_LIMIT: u64 = 10 * 1024 * 1024;

/// `Visibility` code of a public repository
const VISIBILITY_PUBLIC: u8 = 5;

/// `Visibility` code of a private repository
const VISIBILITY_PRIVATE: u8 = 1;

/// Page size used when the whole listing is needed
const LISTING_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<T> {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FilePage {
    #[serde(default)]
    files: Vec<FileItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileItem {
    path: String,
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(rename = "IsLFS", default)]
    is_lfs: bool,
}

impl FileItem {
    fn is_file(&self) -> bool {
        self.kind != "tree"
    }

    fn sha256(&self) -> Option<String> {
        self.sha256
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoginData {
    username: String,
}

/// Unwraps a ModelScope envelope, mapping in-band failures to [`HubError`]
async fn envelope<T: DeserializeOwned>(response: Response, what: &str) -> HubResult<Option<T>> {
    let response = check(response, what).await?;
    let parsed: Envelope<T> = response.json().await?;

    let code_ok = parsed.code.is_none_or(|c| c == 200 || c == 0);
    if parsed.success == Some(false) || !code_ok {
        let message = format!("{}: {}", what, parsed.message.unwrap_or_default());
        let status = parsed
            .code
            .and_then(|c| u16::try_from(c).ok())
            .filter(|c| (400..600).contains(c));
        return Err(match status {
            Some(status) => HubError::from_status(status, message),
            None if message.to_ascii_lowercase().contains("not exist")
                || message.to_ascii_lowercase().contains("not found") =>
            {
                HubError::NotFound(message)
            }
            None => HubError::InvalidRequest(message),
        });
    }
    Ok(parsed.data)
}

/// Strips scheme and trailing slashes from a configured domain
pub fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim();
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    domain.trim_end_matches('/').to_string()
}

/// Client for one ModelScope site
#[derive(Clone)]
pub struct ModelScopeHub {
    http: Client,
    domain: String,
    token: Option<String>,
    revision: String,
    transfer_timeout: Duration,
    parallel_transfers: usize,
}

impl fmt::Debug for ModelScopeHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelScopeHub")
            .field("domain", &self.domain)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("revision", &self.revision)
            .finish()
    }
}

impl ModelScopeHub {
    /// Creates a client for `domain` (`modelscope.cn`, `modelscope.ai`, ...)
    pub fn new(domain: &str, token: Option<String>, request_timeout: Duration) -> HubResult<Self> {
        Ok(Self {
            http: build_client(request_timeout)?,
            domain: normalize_domain(domain),
            token: token.filter(|t| !t.is_empty()),
            revision: DEFAULT_REVISION.to_string(),
            transfer_timeout: Duration::from_secs(4 * 3600),
            parallel_transfers: 4,
        })
    }

    /// Read from and commit to `revision` instead of `master`
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

    /// Host name without scheme
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Browser URL of `repo`
    pub fn web_url(&self, repo: &RepoRef) -> String {
        format!("https://{}/{}/{}", self.domain, repo.kind.plural(), repo.id)
    }

    fn git_url(&self, repo: &RepoRef) -> String {
        match repo.kind {
            RepoKind::Dataset => format!("https://{}/datasets/{}.git", self.domain, repo.id),
            _ => format!("https://{}/{}.git", self.domain, repo.id),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("https://{}/api/v1{}", self.domain, path)
    }

    fn ensure_supported(repo: &RepoRef) -> HubResult<()> {
        if Platform::ModelScope.supports(repo.kind) {
            Ok(())
        } else {
            Err(HubError::InvalidRequest(format!(
                "ModelScope does not host {} repositories",
                repo.kind
            )))
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn list_page(&self, repo: &RepoRef, page: u32, page_size: u32) -> HubResult<Vec<FileItem>> {
        Self::ensure_supported(repo)?;
        let page_param = page.to_string();
        let size_param = page_size.to_string();
        let request = match repo.kind {
            RepoKind::Dataset => self.http.get(self.api(&format!("/datasets/{}/repo/tree", repo.id))).query(&[
                ("Revision", self.revision.as_str()),
                ("Root", "/"),
                ("Recursive", "True"),
                ("PageNumber", page_param.as_str()),
                ("PageSize", size_param.as_str()),
            ]),
            _ => self.http.get(self.api(&format!("/models/{}/repo/files", repo.id))).query(&[
                ("Revision", self.revision.as_str()),
                ("Recursive", "true"),
                ("PageNumber", page_param.as_str()),
                ("PageSize", size_param.as_str()),
            ]),
        };

        let page: Option<FilePage> = envelope(self.authed(request).send().await?, "file listing").await?;
        Ok(page.map(|p| p.files).unwrap_or_default())
    }

    /// Every file of `repo`, paging until a short page
    async fn list_all(&self, repo: &RepoRef) -> HubResult<Vec<FileItem>> {
        let mut files = Vec::new();
        for page in 1.. {
            let batch = self.list_page(repo, page, LISTING_PAGE).await?;
            let last = batch.len() < LISTING_PAGE as usize;
            debug!(repo = %repo.id, page, entries = batch.len(), "Fetched file page");
            files.extend(batch.into_iter().filter(FileItem::is_file));
            if last {
                break;
            }
        }
        Ok(files)
    }

    fn lfs_download(&self, repo: &RepoRef) -> LfsClient {
        LfsClient::new(self.http.clone(), &self.git_url(repo))
            .with_credentials(GIT_USERNAME, self.token.clone())
            .with_ref(self.revision.clone())
            .with_transfer_timeout(self.transfer_timeout)
            .with_parallel_transfers(self.parallel_transfers)
    }

    fn lfs_upload(&self, repo: &RepoRef) -> LfsClient {
        let base = self.api(&format!("/repos/{}/{}", repo.kind.plural(), repo.id));
        LfsClient::new(self.http.clone(), &base)
            .with_credentials(GIT_USERNAME, self.token.clone())
            .with_ref(self.revision.clone())
            .with_transfer_timeout(self.transfer_timeout)
            .with_parallel_transfers(self.parallel_transfers)
    }
}

/// Directory rows count towards the server's page size, so the end of the
/// listing is decided before they are dropped.
fn listing_page(items: Vec<FileItem>, page_size: u32) -> ListingPage {
    let last = items.len() < page_size as usize;
    ListingPage {
        files: items.into_iter().filter(FileItem::is_file).map(remote_file).collect(),
        last,
    }
}

fn tree_entry(item: FileItem) -> TreeEntry {
    let sha256 = item.sha256();
    let pointer = match (&sha256, item.is_lfs) {
        (Some(oid), true) => Some(LfsPointer::new(oid.clone(), item.size)),
        _ => None,
    };
    TreeEntry {
        path: item.path,
        size: item.size,
        large_object: item.is_lfs,
        pointer,
    }
}

fn remote_file(item: FileItem) -> RemoteFile {
    let sha256 = item.sha256();
    RemoteFile {
        path: item.path,
        size: item.size,
        sha256,
    }
}

#[async_trait]
impl SourceHub for ModelScopeHub {
    fn platform(&self) -> Platform {
        Platform::ModelScope
    }

    async fn repo_info(&self, repo: &RepoRef) -> HubResult<()> {
        Self::ensure_supported(repo)?;
        let url = self.api(&format!("/{}/{}", repo.kind.plural(), repo.id));
        let data: Option<Value> = envelope(
            self.authed(self.http.get(&url)).send().await?,
            &format!("{} {}", repo.kind, repo.id),
        )
        .await?;
        match data {
            Some(Value::Null) | None => Err(HubError::not_found(format!("{} {}", repo.kind, repo.id))),
            Some(_) => Ok(()),
        }
    }

    async fn list_tree(&self, repo: &RepoRef) -> HubResult<Vec<TreeEntry>> {
        Ok(self.list_all(repo).await?.into_iter().map(tree_entry).collect())
    }

    async fn read_pointer(&self, repo: &RepoRef, path: &str) -> HubResult<Option<LfsPointer>> {
        // the raw endpoint serves resolved content, and list_tree already
        // carries every pointer the listing knows of
        debug!(repo = %repo.id, path, "Listing has no pointer fields for this object");
        Ok(None)
    }

    async fn fetch_structure(&self, repo: &RepoRef, dest: &Path) -> HubResult<()> {
        Self::ensure_supported(repo)?;
        let mut options = CheckoutOptions::shallow(self.git_url(repo)).with_branch(self.revision.clone());
        if let Some(token) = &self.token {
            options = options.with_credentials(GIT_USERNAME, token.clone());
        }
        checkout_pointers(options, dest).await?;
        Ok(())
    }

    async fn fetch_objects(&self, repo: &RepoRef, root: &Path, paths: &BTreeSet<String>) -> HubResult<u64> {
        let pending = pending_objects(root, paths).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        self.lfs_download(repo).download(&pending).await
    }
}

#[async_trait]
impl DestinationHub for ModelScopeHub {
    fn platform(&self) -> Platform {
        Platform::ModelScope
    }

    async fn whoami(&self) -> HubResult<String> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| HubError::Unauthorized("no ModelScope token configured".to_string()))?;
        let response = self
            .http
            .post(self.api("/login"))
            .json(&json!({ "AccessToken": token }))
            .send()
            .await?;
        let data: Option<LoginData> = envelope(response, "login").await?;
        data.map(|d| d.username)
            .ok_or_else(|| HubError::protocol("login answered without a username"))
    }

    async fn repo_exists(&self, repo: &RepoRef) -> HubResult<bool> {
        match SourceHub::repo_info(self, repo).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_repo(&self, repo: &RepoRef, visibility: Visibility) -> HubResult<()> {
        Self::ensure_supported(repo)?;
        if self.repo_exists(repo).await? {
            debug!(repo = %repo.id, "Repository already exists");
            return Ok(());
        }

        let visibility = match visibility {
            Visibility::Public => VISIBILITY_PUBLIC,
            Visibility::Private => VISIBILITY_PRIVATE,
        };
        let (url, body) = match repo.kind {
            RepoKind::Dataset => (
                self.api("/datasets"),
                json!({
                    "Name": repo.id.name(),
                    "Owner": repo.id.namespace(),
                    "ChineseName": repo.id.name(),
                    "Visibility": visibility,
                    "License": "Apache License 2.0",
                }),
            ),
            _ => (
                self.api("/models"),
                json!({
                    "Path": repo.id.namespace(),
                    "Name": repo.id.name(),
                    "ChineseName": repo.id.name(),
                    "Visibility": visibility,
                    "License": "Apache License 2.0",
                }),
            ),
        };

        let response = self.authed(self.http.post(&url)).json(&body).send().await?;
        let _: Option<Value> = envelope(response, "create repo").await?;
        info!(repo = %repo.id, kind = %repo.kind, "Created ModelScope repository");
        Ok(())
    }

    async fn upload_folder(&self, repo: &RepoRef, folder: &Path, message: &str) -> HubResult<UploadSummary> {
        Self::ensure_supported(repo)?;
        let staged = stage_folder(folder).await?;
        if staged.is_empty() {
            return Ok(UploadSummary::default());
        }

        let mut actions = Vec::with_capacity(staged.len());
        let mut objects = Vec::new();
        for file in &staged {
            if file.is_pointer_stub()? {
                return Err(HubError::Integrity(format!(
                    "{} is still an LFS pointer stub",
                    file.relative
                )));
            }
            if file.size > INLINE_LIMIT {
                objects.push(LocalObject {
                    oid: file.sha256.clone(),
                    size: file.size,
                    path: file.absolute.clone(),
                });
                actions.push(json!({
                    "action": "create",
                    "path": file.relative,
                    "type": "lfs",
                    "size": file.size,
                    "sha256": file.sha256,
                    "content": "",
                    "encoding": "",
                }));
            } else {
                let content = tokio::fs::read(&file.absolute).await?;
                actions.push(json!({
                    "action": "create",
                    "path": file.relative,
                    "type": "normal",
                    "size": file.size,
                    "sha256": file.sha256,
                    "content": BASE64.encode(&content),
                    "encoding": "base64",
                }));
            }
        }

        if !objects.is_empty() {
            self.lfs_upload(repo).upload(&objects).await?;
        }

        let url = self.api(&format!(
            "/repos/{}/{}/commit/{}",
            repo.kind.plural(),
            repo.id,
            self.revision
        ));
        let body = json!({ "commit_message": message, "actions": actions });
        let request = self
            .authed(self.http.post(&url))
            .timeout(self.transfer_timeout)
            .json(&body);
        let _: Option<Value> = envelope(request.send().await?, "commit").await?;

        let summary = UploadSummary {
            files: staged.len(),
            bytes: staged.iter().map(|f| f.size).sum(),
            large_objects: objects.len(),
        };
        info!(
            repo = %repo.id,
            files = summary.files,
            large_objects = summary.large_objects,
            bytes = summary.bytes,
            "Committed folder to ModelScope"
        );
        Ok(summary)
    }

    async fn list_files(&self, repo: &RepoRef, page: u32, page_size: u32) -> HubResult<ListingPage> {
        if page == 0 || page_size == 0 {
            return Err(HubError::InvalidRequest(format!(
                "page {} of size {} is not a listing page",
                page, page_size
            )));
        }
        let items = self.list_page(repo, page, page_size).await?;
        Ok(listing_page(items, page_size))
    }
}
