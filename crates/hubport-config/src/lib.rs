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

//! Runtime configuration for hubport
//!
//! One [`Settings`] value is built at process start and handed by reference
//! to the hubs and the migration engine.
//!
//! # Features
//!
//! - Optional TOML file, every field defaulted
//! - Environment overrides (`HF_TOKEN`, `MODELSCOPE_TOKEN`,
//!   `MODELSCOPE_DOMAIN`, `HF_ENDPOINT`, `HUBPORT_*`)
//! - Validation with the offending field named in the error
//! - [`Secret`] tokens that never print, and a [`SecretScrubber`] that
//!   removes them from error text and logs
//!
//! # Example
//!
//! ```no_run
//! use hubport_config::SettingsLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SettingsLoader::new().load(None).await?;
//!     println!("chunk budget: {} bytes", settings.transfer.chunk_bytes);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod secret;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, SettingsLoader};
pub use schema::*;
pub use secret::{Secret, SecretScrubber, REDACTED};
pub use validation::Validator;
