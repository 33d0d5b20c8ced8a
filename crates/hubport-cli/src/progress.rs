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

use hubport_migration::{Phase, ProgressCallback, ProgressEvent};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Progress bars for one or many concurrent migrations
///
/// Draws to stderr so stdout stays clean for piping.
pub struct ProgressTracker {
    multi: Arc<MultiProgress>,
    quiet: bool,
}

impl ProgressTracker {
    /// Create new progress tracker
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: Arc::new(if quiet {
                MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
            } else {
                MultiProgress::with_draw_target(ProgressDrawTarget::stderr())
            }),
            quiet,
        }
    }

    /// Bar counting finished chunks of the migration labelled `msg`
    pub fn chunk_bar(&self, msg: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {prefix} [{bar:40.cyan/blue}] {pos}/{len} chunks ({elapsed}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        pb.set_prefix(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Callback feeding orchestrator events into `bar`
    pub fn callback(bar: ProgressBar) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::Phase(phase) => match phase {
                Phase::Planning => bar.set_message("planning"),
                Phase::Transferring => bar.set_message("transferring"),
                Phase::Verifying => bar.set_message("verifying"),
                Phase::Succeeded | Phase::Partial | Phase::Failed => {
                    bar.finish_with_message(phase.to_string().to_lowercase());
                }
            },
            ProgressEvent::Planned { scheduled, bytes, .. } => {
                bar.set_length(scheduled as u64);
                bar.set_message(format!("transferring {}", HumanBytes(bytes)));
            }
            ProgressEvent::ChunkFinished(result) => {
                if !result.is_success() {
                    bar.println(format!(
                        "  chunk {} failed: {}",
                        result.index,
                        result.error.as_deref().unwrap_or("unknown error")
                    ));
                }
                bar.inc(1);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubport_migration::ChunkResult;

    #[test]
    fn test_quiet_bars_are_hidden() {
        let tracker = ProgressTracker::new(true);
        assert!(tracker.chunk_bar("alice/llm").is_hidden());
    }

    #[test]
    fn test_callback_counts_chunks() {
        let bar = ProgressBar::hidden();
        let callback = ProgressTracker::callback(bar.clone());

        callback(ProgressEvent::Planned {
            total_chunks: 4,
            scheduled: 2,
            bytes: 10,
        });
        callback(ProgressEvent::ChunkFinished(ChunkResult::success(0, 1, 5, Duration::ZERO, 1)));
        callback(ProgressEvent::ChunkFinished(ChunkResult::failure(
            3,
            "upload failed".into(),
            Duration::ZERO,
            3,
        )));

        assert_eq!(bar.length(), Some(2));
        assert_eq!(bar.position(), 2);
    }
}
