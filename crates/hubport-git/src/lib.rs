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

//! # Hubport git layer
//!
//! Repositories on both hubs are git repositories whose large objects live
//! out-of-band behind Git LFS. This crate covers the git side of a transfer:
//!
//! - **Pointer files**: parsing the stubs that stand in for large objects
//! - **Pointer-only checkouts**: a shallow clone that never downloads LFS
//!   payloads
//! - **Working trees**: enumerating and addressing files in a checkout
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hubport_git::{checkout_pointers, working_files, CheckoutOptions, LfsPointer};
//!
//! # async fn example() -> hubport_git::GitResult<()> {
//! let target = std::path::Path::new("/tmp/structure");
//! checkout_pointers(CheckoutOptions::shallow("https://huggingface.co/gpt2.git"), target).await?;
//!
//! for file in working_files(target)? {
//!     let content = std::fs::read(&file.absolute)?;
//!     if LfsPointer::is_pointer(&content) {
//!         let pointer = LfsPointer::parse_bytes(&content)?;
//!         println!("{} -> {} bytes", file.relative, pointer.size);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod checkout;
pub mod error;
pub mod pointer;
pub mod tree;

pub use checkout::{checkout_pointers, CheckoutOptions, CloneCredentials};
pub use error::{GitError, GitResult};
pub use pointer::LfsPointer;
pub use tree::{relative_slash_path, resolve_relative, working_files, WorkingFile, GIT_DIR};
