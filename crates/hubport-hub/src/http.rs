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

//! HTTP plumbing shared by the hub clients

use crate::error::{HubError, HubResult};
use reqwest::{Client, Response};
use std::time::Duration;

/// Longest response body excerpt kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// Builds the client every hub backend uses.
///
/// `request_timeout` bounds metadata calls; transfers of large bodies set
/// their own per-request timeout.
pub fn build_client(request_timeout: Duration) -> HubResult<Client> {
    Client::builder()
        .user_agent(concat!("hubport/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .timeout(request_timeout)
        .build()
        .map_err(HubError::from)
}

/// Passes successful responses through and turns the rest into [`HubError`]
pub async fn check(response: Response, what: &str) -> HubResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let mut excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    if excerpt.trim().is_empty() {
        excerpt = status.canonical_reason().unwrap_or("no reason").to_string();
    }
    Err(HubError::from_status(
        status.as_u16(),
        format!("{}: {}", what, excerpt.trim()),
    ))
}

/// Percent-encodes each segment of a repository file path for use in a URL
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header
pub fn next_link(header: Option<&str>) -> Option<String> {
    header?.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().eq_ignore_ascii_case("rel=\"next\""));
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_keeps_slashes() {
        assert_eq!(encode_path("unet/diffusion model.bin"), "unet/diffusion%20model.bin");
        assert_eq!(encode_path("a#b/c?d"), "a%23b/c%3Fd");
    }

    #[test]
    fn test_next_link() {
        let header = r#"<https://huggingface.co/api/models/a/b/tree/main?cursor=abc>; rel="next""#;
        assert_eq!(
            next_link(Some(header)).as_deref(),
            Some("https://huggingface.co/api/models/a/b/tree/main?cursor=abc")
        );
        assert_eq!(next_link(Some(r#"<https://x>; rel="prev""#)), None);
        assert_eq!(next_link(None), None);
    }
}
