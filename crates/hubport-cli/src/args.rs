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

//! Repository arguments shared by the commands

use anyhow::{bail, Context, Result};
use hubport_hub::{resolve_direction, Platform, RepoId, RepoKind, RepoRef, SourceHub};
use hubport_migration::detect_kind;

/// A source argument with the hubs it moves between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Repository id on the source hub
    pub id: RepoId,
    /// Hub read from
    pub source: Platform,
    /// Hub written to
    pub destination: Platform,
}

/// Parses `hf:alice/llm`, `ms:alice/llm` or a bare id together with `--to`
pub fn parse_route(input: &str, to: Option<Platform>) -> Result<Route> {
    let (id, prefix) =
        RepoId::parse_prefixed(input).with_context(|| format!("Invalid repository '{}'", input))?;

    if let (Some(prefix), Some(to)) = (prefix, to) {
        if prefix == to {
            bail!("'{}' is already on {}; --to must name the other hub", input, to);
        }
    }

    let (source, destination) = resolve_direction(prefix, to)
        .with_context(|| format!("Cannot tell where '{}' should go", input))?;
    Ok(Route {
        id,
        source,
        destination,
    })
}

/// The kind given on the command line, or the one the source hub reports
pub async fn resolve_kind(source: &dyn SourceHub, id: &RepoId, given: Option<RepoKind>) -> Result<RepoKind> {
    match given {
        Some(kind) => Ok(kind),
        None => Ok(detect_kind(source, id).await?),
    }
}

/// Source and destination references for `route` and `kind`
pub fn endpoints(route: &Route, kind: RepoKind, dest: Option<&str>) -> Result<(RepoRef, RepoRef)> {
    if !route.source.supports(kind) {
        bail!("{} does not host {} repositories", route.source, kind);
    }
    if !route.destination.supports(kind) {
        bail!("{} does not host {} repositories", route.destination, kind);
    }

    let dest_id = match dest {
        Some(dest) => RepoId::parse(dest).with_context(|| format!("Invalid destination '{}'", dest))?,
        None => route.id.clone(),
    };
    Ok((RepoRef::new(route.id.clone(), kind), RepoRef::new(dest_id, kind)))
}

/// Parses a byte count such as `500MB`, `20GiB` or `1048576`
///
/// Suffixes `K`, `M`, `G` and `T` are decimal; `KiB`, `MiB`, `GiB` and
/// `TiB` are binary. A trailing `B` is optional.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("'{}' is not a size", input))?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1000,
        "m" | "mb" => 1000_u64.pow(2),
        "g" | "gb" => 1000_u64.pow(3),
        "t" | "tb" => 1000_u64.pow(4),
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        "tib" => 1 << 40,
        other => return Err(format!("unknown size unit '{}'", other)),
    };

    match value.checked_mul(multiplier) {
        Some(0) => Err("size must be positive".to_string()),
        Some(bytes) => Ok(bytes),
        None => Err(format!("'{}' is too large", input)),
    }
}
