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

//! Repository kind detection
//!
//! Each kind the source hub hosts is probed in order. The first hit wins, a
//! not-found moves on to the next kind, any other error stops the sequence.

use crate::error::{MigrationError, MigrationResult};
use hubport_hub::{HubError, RepoId, RepoKind, RepoRef, SourceHub};
use tracing::debug;

/// Result of one probe
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The repository exists as this kind
    Found,
    /// The hub has no repository of this kind under the id
    NotFound,
    /// The question could not be answered
    Error(HubError),
}

impl From<Result<(), HubError>> for ProbeOutcome {
    fn from(result: Result<(), HubError>) -> Self {
        match result {
            Ok(()) => ProbeOutcome::Found,
            Err(e) if e.is_not_found() => ProbeOutcome::NotFound,
            Err(e) => ProbeOutcome::Error(e),
        }
    }
}

/// Probes `kind` for `id`
pub async fn probe(source: &dyn SourceHub, id: &RepoId, kind: RepoKind) -> ProbeOutcome {
    let repo = RepoRef::new(id.clone(), kind);
    source.repo_info(&repo).await.into()
}

/// Finds out whether `id` is a model, dataset or space on `source`
///
/// # Errors
///
/// The first probe error other than not-found, or
/// [`MigrationError::RepoNotFound`] when no kind matches.
pub async fn detect_kind(source: &dyn SourceHub, id: &RepoId) -> MigrationResult<RepoKind> {
    let order = source.platform().probe_order();
    for &kind in order {
        match probe(source, id, kind).await {
            ProbeOutcome::Found => {
                debug!(repo = %id, kind = %kind, "Repository kind detected");
                return Ok(kind);
            }
            ProbeOutcome::NotFound => debug!(repo = %id, kind = %kind, "Not a {}", kind),
            ProbeOutcome::Error(e) => return Err(MigrationError::Hub(e)),
        }
    }

    Err(MigrationError::RepoNotFound {
        repo: id.to_string(),
        platform: source.platform().to_string(),
        kinds: order
            .iter()
            .map(RepoKind::as_str)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use hubport_hub::mock::{MockFile, MockHub};
    use hubport_hub::Platform;

    fn id() -> RepoId {
        RepoId::parse("alice/thing").unwrap()
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let hub = MockHub::new(Platform::HuggingFace);
        hub.add_repo(
            &RepoRef::new(id(), RepoKind::Dataset),
            [("data.csv", MockFile::small(b"a,b".to_vec()))],
        )
        .await;
        hub.add_repo(
            &RepoRef::new(id(), RepoKind::Space),
            [("app.py", MockFile::small(b"print()".to_vec()))],
        )
        .await;

        assert_eq!(detect_kind(&hub, &id()).await.unwrap(), RepoKind::Dataset);
    }

    #[tokio::test]
    async fn test_error_aborts_sequence() {
        let hub = MockHub::new(Platform::HuggingFace);
        hub.add_repo(&RepoRef::new(id(), RepoKind::Dataset), Vec::<(String, MockFile)>::new())
            .await;
        hub.fail_repo_info(
            &RepoRef::new(id(), RepoKind::Model),
            HubError::Unauthorized("bad token".into()),
        )
        .await;

        let err = detect_kind(&hub, &id()).await.unwrap_err();
        assert!(matches!(err, MigrationError::Hub(HubError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_exhaustion_is_not_found() {
        let hub = MockHub::new(Platform::ModelScope);
        hub.add_repo(&RepoRef::new(id(), RepoKind::Space), Vec::<(String, MockFile)>::new())
            .await;

        let err = detect_kind(&hub, &id()).await.unwrap_err();
        match err {
            MigrationError::RepoNotFound { kinds, .. } => assert_eq!(kinds, "model, dataset"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
