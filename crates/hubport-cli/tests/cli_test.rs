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

//! CLI argument and start-up tests
//!
//! Everything here fails or finishes before the first network request.

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const ENV: [&str; 8] = [
    "HF_TOKEN",
    "MODELSCOPE_TOKEN",
    "HF_ENDPOINT",
    "MODELSCOPE_DOMAIN",
    "HUBPORT_CHUNK_BYTES",
    "HUBPORT_MAX_CONCURRENCY",
    "HUBPORT_WORK_DIR",
    "HUBPORT_LOG_LEVEL",
];

/// Helper to create a hubport command with a clean environment
#[allow(deprecated)]
fn hubport() -> Command {
    let mut cmd = Command::cargo_bin("hubport").unwrap();
    for var in ENV {
        cmd.env_remove(var);
    }
    cmd.arg("--color").arg("never");
    cmd
}

#[test]
fn test_help_lists_commands() {
    hubport()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("check-tokens"));
}

#[test]
fn test_version() {
    hubport()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hubport"));
}

#[test]
fn test_migrate_help_shows_chunk_options() {
    hubport()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--chunk-size"))
        .stdout(predicate::str::contains("--only-chunks"))
        .stdout(predicate::str::contains("--resume"));
}

#[test]
fn test_migrate_needs_a_direction() {
    hubport()
        .args(["migrate", "alice/llm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot tell where"));
}

#[test]
fn test_migrate_without_tokens_explains_where_to_get_one() {
    hubport()
        .args(["migrate", "hf:alice/llm", "--repo-type", "model"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HF_TOKEN"))
        .stderr(predicate::str::contains("https://huggingface.co/settings/tokens"))
        .stderr(predicate::str::contains("hubport check-tokens"));
}

#[test]
fn test_bad_chunk_size_is_rejected() {
    hubport()
        .args(["migrate", "hf:alice/llm", "--chunk-size", "lots"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a size"));
}

#[test]
fn test_resume_conflicts_with_only_chunks() {
    hubport()
        .args(["migrate", "hf:alice/llm", "--resume", "state.json", "--only-chunks", "1,2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_unknown_hub_is_rejected() {
    hubport()
        .args(["migrate", "alice/llm", "--to", "github"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_config_file_fails_early() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("hubport.toml");
    fs::write(&config, "[transfer]\nmax_concurrency = 0\n").unwrap();

    hubport()
        .arg("--config")
        .arg(&config)
        .arg("check-tokens")
        .assert()
        .failure()
        .stderr(predicate::str::contains("transfer.max_concurrency"));
}

#[test]
fn test_missing_config_file() {
    hubport()
        .args(["--config", "/nonexistent/hubport.toml", "check-tokens"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_check_tokens_reports_missing() {
    hubport()
        .arg("check-tokens")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[MISSING] HF_TOKEN"))
        .stdout(predicate::str::contains("[MISSING] MODELSCOPE_TOKEN"))
        .stdout(predicate::str::contains("https://modelscope.cn/my/myaccesstoken"));
}

#[test]
fn test_detect_needs_a_hub() {
    hubport()
        .args(["detect", "alice/llm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--on"));
}

#[test]
fn test_batch_needs_repositories() {
    hubport()
        .args(["batch", ",", "--to", "ms"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No repositories given"));
}

#[test]
fn test_batch_rejects_spaces_to_modelscope() {
    hubport()
        .args(["batch", "alice/demo", "--to", "ms", "--repo-type", "space"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not host space repositories"));
}
