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

//! Git LFS batch API client
//!
//! Both hubs expose the standard batch endpoint at
//! `<clone url>/info/lfs/objects/batch`. Downloads are used to materialise
//! the large objects of one chunk; uploads push large objects before the
//! commit that references them.
//!
//! # Features
//!
//! - Streaming transfers, objects are never buffered whole in memory
//! - SHA-256 verification of every downloaded object against its pointer
//! - Basic `PUT` uploads and the part-numbered multipart variant the
//!   HuggingFace Hub answers with for large objects
//! - Bounded parallelism within one batch

use crate::error::{HubError, HubResult};
use crate::http::check;
use futures::stream::{self, StreamExt, TryStreamExt};
use hubport_git::pointer::MAX_POINTER_SIZE;
use hubport_git::{resolve_relative, LfsPointer};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::{Body, Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Media type of every batch API request and response
pub const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Objects per batch request; the reference client uses the same bound
const BATCH_SIZE: usize = 100;

/// Header key the HuggingFace Hub uses to announce a multipart upload
const MULTIPART_CHUNK_SIZE: &str = "chunk_size";

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    operation: &'a str,
    transfers: Vec<&'a str>,
    objects: Vec<ObjectSpec>,
    hash_algo: &'a str,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    git_ref: Option<RefSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct RefSpec<'a> {
    name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ObjectSpec {
    oid: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    objects: Vec<BatchObject>,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    oid: String,
    #[serde(default)]
    actions: Option<Actions>,
    #[serde(default)]
    error: Option<ObjectError>,
}

#[derive(Debug, Default, Deserialize)]
struct Actions {
    download: Option<Action>,
    upload: Option<Action>,
    verify: Option<Action>,
}

#[derive(Debug, Clone, Deserialize)]
struct Action {
    href: String,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ObjectError {
    code: u16,
    message: String,
}

#[derive(Debug, Serialize)]
struct CompletionPart {
    #[serde(rename = "partNumber")]
    part_number: usize,
    etag: String,
}

#[derive(Debug, Serialize)]
struct Completion<'a> {
    oid: &'a str,
    parts: Vec<CompletionPart>,
}

/// A local file to be pushed as an LFS object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalObject {
    /// SHA-256 of the file content
    pub oid: String,

    /// File size in bytes
    pub size: u64,

    /// File location
    pub path: PathBuf,
}

/// A pointer stub to be replaced by its object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingObject {
    /// Pointer read from the stub
    pub pointer: LfsPointer,

    /// Where the object content belongs
    pub path: PathBuf,
}

/// Client for one repository's LFS endpoint
#[derive(Clone)]
pub struct LfsClient {
    http: Client,
    batch_url: String,
    username: String,
    token: Option<String>,
    git_ref: Option<String>,
    transfer_timeout: Duration,
    parallel_transfers: usize,
}

impl fmt::Debug for LfsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LfsClient")
            .field("batch_url", &self.batch_url)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("parallel_transfers", &self.parallel_transfers)
            .finish()
    }
}

impl LfsClient {
    /// Client for the repository cloned from `git_url` (ending in `.git`)
    pub fn new(http: Client, git_url: &str) -> Self {
        Self {
            http,
            batch_url: format!("{}/info/lfs/objects/batch", git_url.trim_end_matches('/')),
            username: "hubport".to_string(),
            token: None,
            git_ref: None,
            transfer_timeout: Duration::from_secs(4 * 3600),
            parallel_transfers: 4,
        }
    }

    /// Authenticate batch requests with `username`/`token`
    pub fn with_credentials(mut self, username: impl Into<String>, token: Option<String>) -> Self {
        self.username = username.into();
        self.token = token;
        self
    }

    /// Tell the server which branch the objects are for
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(format!("refs/heads/{}", git_ref.into()));
        self
    }

    /// Deadline of a single object transfer
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Objects moved concurrently within one batch
    pub fn with_parallel_transfers(mut self, parallel: usize) -> Self {
        self.parallel_transfers = parallel.max(1);
        self
    }

    async fn batch(&self, operation: &str, objects: Vec<ObjectSpec>) -> HubResult<Vec<BatchObject>> {
        let request = BatchRequest {
            operation,
            transfers: vec!["basic", "multipart"],
            objects,
            hash_algo: "sha256",
            git_ref: self.git_ref.as_deref().map(|name| RefSpec { name }),
        };

        let mut builder = self
            .http
            .post(&self.batch_url)
            .header(ACCEPT, LFS_MEDIA_TYPE)
            .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
            .json(&request);
        if let Some(token) = &self.token {
            builder = builder.basic_auth(&self.username, Some(token));
        }

        debug!(operation, objects = request.objects.len(), "LFS batch request");
        let response = check(builder.send().await?, "LFS batch").await?;
        let parsed: BatchResponse = response.json().await?;
        Ok(parsed.objects)
    }

    /// Replaces each pending stub with its object content.
    ///
    /// Content is streamed to a sibling temporary file, hashed on the way,
    /// and renamed over the stub only when both hash and size match.
    /// Returns the number of bytes written.
    pub async fn download(&self, pending: &[PendingObject]) -> HubResult<u64> {
        let mut total = 0u64;

        for group in pending.chunks(BATCH_SIZE) {
            let specs = group
                .iter()
                .map(|p| ObjectSpec {
                    oid: p.pointer.oid.clone(),
                    size: p.pointer.size,
                })
                .collect();
            let answers = self.batch("download", specs).await?;
            let mut actions: HashMap<String, Action> = HashMap::new();
            for object in answers {
                if let Some(err) = object.error {
                    return Err(HubError::from_status(
                        err.code,
                        format!("LFS object {}: {}", object.oid, err.message),
                    ));
                }
                if let Some(action) = object.actions.and_then(|a| a.download) {
                    actions.insert(object.oid, action);
                }
            }

            let jobs: Vec<_> = group
                .iter()
                .map(|item| {
                    let action = actions.get(&item.pointer.oid).cloned();
                    async move {
                        let action = action.ok_or_else(|| {
                            HubError::protocol(format!(
                                "no download action for {}",
                                item.pointer.oid
                            ))
                        })?;
                        self.download_one(&action, item).await
                    }
                })
                .collect();
            let written: Vec<u64> = stream::iter(jobs)
            .buffer_unordered(self.parallel_transfers)
            .try_collect()
            .await?;
            total += written.iter().sum::<u64>();
        }

        Ok(total)
    }

    async fn download_one(&self, action: &Action, item: &PendingObject) -> HubResult<u64> {
        let request = with_action_headers(self.http.get(&action.href), &action.header)?
            .timeout(self.transfer_timeout);
        let response = check(request.send().await?, "LFS download").await?;

        let part_path = partial_path(&item.path);
        let mut file = File::create(&part_path).await?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        let digest = hex::encode(hasher.finalize());
        if digest != item.pointer.oid || written != item.pointer.size {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(HubError::Integrity(format!(
                "{}: expected sha256 {} ({} bytes), got {} ({} bytes)",
                item.path.display(),
                item.pointer.oid,
                item.pointer.size,
                digest,
                written
            )));
        }

        tokio::fs::rename(&part_path, &item.path).await?;
        debug!(path = %item.path.display(), bytes = written, "Materialized LFS object");
        Ok(written)
    }

    /// Pushes objects the server does not have yet
    pub async fn upload(&self, objects: &[LocalObject]) -> HubResult<()> {
        for group in objects.chunks(BATCH_SIZE) {
            let specs = group
                .iter()
                .map(|o| ObjectSpec {
                    oid: o.oid.clone(),
                    size: o.size,
                })
                .collect();
            let answers = self.batch("upload", specs).await?;
            let by_oid: HashMap<&str, &LocalObject> =
                group.iter().map(|o| (o.oid.as_str(), o)).collect();

            let mut work = Vec::new();
            for answer in answers {
                if let Some(err) = answer.error {
                    return Err(HubError::from_status(
                        err.code,
                        format!("LFS object {}: {}", answer.oid, err.message),
                    ));
                }
                let local = *by_oid.get(answer.oid.as_str()).ok_or_else(|| {
                    HubError::protocol(format!("server answered for unknown oid {}", answer.oid))
                })?;
                let actions = answer.actions.unwrap_or_default();
                match actions.upload {
                    Some(upload) => work.push((local, upload, actions.verify)),
                    None => debug!(oid = %local.oid, "LFS object already present"),
                }
            }

            let jobs: Vec<_> = work
                .into_iter()
                .map(|(local, upload, verify)| async move {
                    self.upload_one(local, &upload).await?;
                    if let Some(verify) = verify {
                        self.verify_one(local, &verify).await?;
                    }
                    Ok::<(), HubError>(())
                })
                .collect();
            stream::iter(jobs)
            .buffer_unordered(self.parallel_transfers)
            .try_collect::<Vec<()>>()
            .await?;
        }
        Ok(())
    }

    async fn upload_one(&self, object: &LocalObject, action: &Action) -> HubResult<()> {
        if let Some(chunk_size) = action.header.get(MULTIPART_CHUNK_SIZE) {
            let chunk_size: u64 = chunk_size.parse().map_err(|_| {
                HubError::protocol(format!("invalid multipart chunk_size: {}", chunk_size))
            })?;
            return self.upload_multipart(object, action, chunk_size).await;
        }

        let body = file_range_body(&object.path, 0, object.size).await?;
        let request = with_action_headers(self.http.put(&action.href), &action.header)?
            .header(CONTENT_LENGTH, object.size)
            .timeout(self.transfer_timeout)
            .body(body);
        check(request.send().await?, "LFS upload").await?;
        info!(oid = %object.oid, bytes = object.size, "Uploaded LFS object");
        Ok(())
    }

    async fn upload_multipart(&self, object: &LocalObject, action: &Action, chunk_size: u64) -> HubResult<()> {
        if chunk_size == 0 {
            return Err(HubError::protocol("multipart chunk_size of 0"));
        }

        let mut part_urls: Vec<(usize, &String)> = action
            .header
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|n| (n, v)))
            .collect();
        part_urls.sort_by_key(|(n, _)| *n);

        let expected = object.size.div_ceil(chunk_size) as usize;
        if part_urls.len() != expected {
            return Err(HubError::protocol(format!(
                "multipart upload of {} bytes needs {} parts, server offered {}",
                object.size,
                expected,
                part_urls.len()
            )));
        }

        let mut parts = Vec::with_capacity(part_urls.len());
        for (index, (number, url)) in part_urls.into_iter().enumerate() {
            let offset = index as u64 * chunk_size;
            let len = chunk_size.min(object.size - offset);
            let body = file_range_body(&object.path, offset, len).await?;
            let response = self
                .http
                .put(url.as_str())
                .header(CONTENT_LENGTH, len)
                .timeout(self.transfer_timeout)
                .body(body)
                .send()
                .await?;
            let response = check(response, "LFS multipart part").await?;
            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim_matches('"').to_string())
                .ok_or_else(|| HubError::protocol(format!("part {} returned no ETag", number)))?;
            debug!(oid = %object.oid, part = number, bytes = len, "Uploaded multipart part");
            parts.push(CompletionPart {
                part_number: number,
                etag,
            });
        }

        let completion = Completion {
            oid: &object.oid,
            parts,
        };
        let mut request = self
            .http
            .post(&action.href)
            .header(ACCEPT, LFS_MEDIA_TYPE)
            .json(&completion);
        if let Some(token) = &self.token {
            request = request.basic_auth(&self.username, Some(token));
        }
        check(request.send().await?, "LFS multipart completion").await?;
        info!(oid = %object.oid, bytes = object.size, "Uploaded LFS object (multipart)");
        Ok(())
    }

    async fn verify_one(&self, object: &LocalObject, action: &Action) -> HubResult<()> {
        let spec = ObjectSpec {
            oid: object.oid.clone(),
            size: object.size,
        };
        let mut request = with_action_headers(self.http.post(&action.href), &action.header)?
            .header(ACCEPT, LFS_MEDIA_TYPE)
            .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
            .json(&spec);
        if !action.header.keys().any(|k| k.eq_ignore_ascii_case("authorization")) {
            if let Some(token) = &self.token {
                request = request.basic_auth(&self.username, Some(token));
            }
        }
        match check(request.send().await?, "LFS verify").await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(oid = %object.oid, error = %e, "LFS verify rejected object");
                Err(e)
            }
        }
    }
}

/// Reads the pointer stubs at `paths` under `root`.
///
/// A path whose file already holds real content is skipped.
pub async fn pending_objects(root: &Path, paths: &BTreeSet<String>) -> HubResult<Vec<PendingObject>> {
    let mut pending = Vec::with_capacity(paths.len());
    for relative in paths {
        let path = resolve_relative(root, relative)?;
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HubError::not_found(format!("{} is not in the checkout", relative)));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.len() as usize > MAX_POINTER_SIZE {
            debug!(path = %relative, "Already materialized, skipping");
            continue;
        }
        let content = tokio::fs::read(&path).await?;
        if !LfsPointer::is_pointer(&content) {
            debug!(path = %relative, "Not a pointer stub, skipping");
            continue;
        }
        let pointer = LfsPointer::parse_bytes(&content)?;
        pending.push(PendingObject { pointer, path });
    }
    Ok(pending)
}

fn with_action_headers(builder: RequestBuilder, headers: &HashMap<String, String>) -> HubResult<RequestBuilder> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        if key == MULTIPART_CHUNK_SIZE || key.parse::<usize>().is_ok() {
            continue;
        }
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| HubError::protocol(format!("bad action header {}: {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HubError::protocol(format!("bad action header value for {}: {}", key, e)))?;
        map.insert(name, value);
    }
    Ok(builder.headers(map))
}

async fn file_range_body(path: &Path, offset: u64, len: u64) -> HubResult<Body> {
    let mut file = File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    Ok(Body::wrap_stream(ReaderStream::new(file.take(len))))
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.hubport-part", name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_request_shape() {
        let request = BatchRequest {
            operation: "download",
            transfers: vec!["basic"],
            objects: vec![ObjectSpec {
                oid: "ab".repeat(32),
                size: 10,
            }],
            hash_algo: "sha256",
            git_ref: Some(RefSpec { name: "refs/heads/main" }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["operation"], "download");
        assert_eq!(json["ref"]["name"], "refs/heads/main");
        assert_eq!(json["objects"][0]["size"], 10);
    }

    #[test]
    fn test_parse_multipart_answer() {
        let body = r#"{
            "transfer": "basic",
            "objects": [{
                "oid": "aa",
                "size": 12,
                "actions": {
                    "upload": {
                        "href": "https://hub/complete",
                        "header": {"chunk_size": "5", "00001": "https://s3/1", "00002": "https://s3/2", "00003": "https://s3/3"}
                    },
                    "verify": {"href": "https://hub/verify"}
                }
            }]
        }"#;
        let parsed: BatchResponse = serde_json::from_str(body).unwrap();
        let actions = parsed.objects[0].actions.as_ref().unwrap();
        let upload = actions.upload.as_ref().unwrap();
        assert_eq!(upload.header.get("chunk_size").unwrap(), "5");
        assert!(actions.verify.is_some());
        assert!(actions.download.is_none());
    }

    #[test]
    fn test_parse_object_error() {
        let body = r#"{"objects":[{"oid":"aa","size":1,"error":{"code":404,"message":"Object does not exist"}}]}"#;
        let parsed: BatchResponse = serde_json::from_str(body).unwrap();
        let err = parsed.objects[0].error.as_ref().unwrap();
        assert_eq!(err.code, 404);
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let p = partial_path(Path::new("/w/unet/model.safetensors"));
        assert_eq!(p, Path::new("/w/unet/.model.safetensors.hubport-part"));
    }

    #[tokio::test]
    async fn test_pending_objects_skips_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let pointer = LfsPointer::for_content(b"payload");
        std::fs::write(dir.path().join("a.bin"), pointer.to_string()).unwrap();
        std::fs::write(dir.path().join("b.bin"), b"payload").unwrap();

        let paths: BTreeSet<String> = ["a.bin", "b.bin"].iter().map(|s| s.to_string()).collect();
        let pending = pending_objects(dir.path(), &paths).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pointer, pointer);
        assert_eq!(pending[0].path, dir.path().join("a.bin"));

        let missing: BTreeSet<String> = ["c.bin".to_string()].into_iter().collect();
        let err = pending_objects(dir.path(), &missing).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_debug_masks_token() {
        let client = LfsClient::new(Client::new(), "https://huggingface.co/a/b.git")
            .with_credentials("user", Some("hf_secret".to_string()));
        let debug = format!("{:?}", client);
        assert!(debug.contains("info/lfs/objects/batch"));
        assert!(!debug.contains("hf_secret"));
    }
}
