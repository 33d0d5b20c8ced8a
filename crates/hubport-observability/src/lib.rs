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

//! Structured logging for hubport
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and one of
//! three fmt layers (pretty, compact, json). Every line passes through a
//! [`Redacting`] writer so configured tokens never reach the terminal or a
//! log file.
//!
//! ```ignore
//! use hubport_observability::{init_tracing, LogFormat};
//!
//! init_tracing(LogFormat::Pretty, None)?;
//! tracing::info!(chunk_index = 0, total_chunks = 3, "Chunk complete");
//! ```

pub mod config;
pub mod initialization;
pub mod redact;

pub use config::{LogConfig, LogError, LogFormat, LogOutput};
pub use initialization::{init_tracing, init_tracing_with_config};
pub use redact::{Redacting, RedactingWriter};
