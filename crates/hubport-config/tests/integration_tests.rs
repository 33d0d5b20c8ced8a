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

#![allow(clippy::unwrap_used)]

use hubport_config::{ConfigError, SettingsLoader, GIB};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[tokio::test]
async fn test_file_then_environment() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hubport.toml");
    std::fs::write(
        &path,
        r#"
[hub]
ms_domain = "modelscope.ai"

[tokens]
hf = "hf_from_file"

[transfer]
chunk_bytes = 10737418240
work_dir = "/scratch/hubport"
"#,
    )
    .unwrap();

    let settings = SettingsLoader::new()
        .load_with(
            Some(&path),
            lookup(&[("HF_TOKEN", "hf_from_env"), ("HUBPORT_MAX_CONCURRENCY", "16")]),
        )
        .await
        .unwrap();

    assert_eq!(settings.hub.ms_domain, "modelscope.ai");
    assert_eq!(settings.transfer.chunk_bytes, 10 * GIB);
    assert_eq!(settings.transfer.max_concurrency, 16);
    assert_eq!(settings.transfer.work_root(), PathBuf::from("/scratch/hubport"));
    assert_eq!(settings.require_hf_token().unwrap().expose(), "hf_from_env");
    assert!(settings.require_ms_token().is_err());
}

#[tokio::test]
async fn test_missing_file() {
    let err = SettingsLoader::new()
        .load_with(Some(std::path::Path::new("/nonexistent/hubport.toml")), lookup(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[tokio::test]
async fn test_defaults_without_file() {
    let settings = SettingsLoader::new().load_with(None, lookup(&[])).await.unwrap();
    assert_eq!(settings.transfer.chunk_bytes, 20 * GIB);
    assert_eq!(settings.hub.hf_endpoint, "https://huggingface.co");
    assert!(settings.scrubber().is_empty());
}

#[tokio::test]
async fn test_environment_is_validated() {
    let err = SettingsLoader::new()
        .load_with(None, lookup(&[("HUBPORT_MAX_CONCURRENCY", "5000")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}

#[tokio::test]
async fn test_debug_output_hides_tokens() {
    let settings = SettingsLoader::new()
        .load_with(None, lookup(&[("MODELSCOPE_TOKEN", "ms-very-secret")]))
        .await
        .unwrap();
    assert!(!format!("{:?}", settings).contains("ms-very-secret"));
}
