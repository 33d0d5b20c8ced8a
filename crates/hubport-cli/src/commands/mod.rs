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

pub mod batch;
pub mod check_tokens;
pub mod detect;
pub mod migrate;
pub mod verify;

pub use batch::BatchCmd;
pub use check_tokens::CheckTokensCmd;
pub use detect::DetectCmd;
pub use migrate::MigrateCmd;
pub use verify::VerifyCmd;
