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

//! Shared output formatting for the commands.
//!
//! Status lines go to stdout, errors to stderr, both colored through
//! `console` so `--color never` and non-terminals get plain text.
//!
//! # Examples
//!
//! ```rust
//! use hubport_cli::output;
//!
//! output::success("Migration complete");
//! output::detail("Files", "42");
//! ```

use console::style;
use hubport_migration::{MigrationReport, Outcome, VerificationOutcome};
use indicatif::{HumanBytes, HumanDuration};

/// Print a success message with a green checkmark.
pub fn success(msg: &str) {
    println!("{} {}", style("✅").green().bold(), msg);
}

/// Print an error message to stderr with a red cross.
pub fn error(msg: &str) {
    eprintln!("{} {}", style("❌").red().bold(), msg);
}

/// Print an informational message.
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ️").cyan(), msg);
}

/// Print a warning message.
pub fn warning(msg: &str) {
    println!("{} {}", style("⚠️").yellow(), msg);
}

/// Print a detail line with key-value formatting.
///
/// ```rust
/// hubport_cli::output::detail("Source", "HuggingFace / alice/llm (model)");
/// // Output:   Source: HuggingFace / alice/llm (model)
/// ```
pub fn detail(key: &str, value: &str) {
    println!("  {}: {}", key, style(value).cyan());
}

/// Print a header message.
pub fn header(msg: &str) {
    println!("{} {}", style("🚚").green().bold(), msg);
}

/// Print a horizontal rule
pub fn rule() {
    println!("{}", style("─".repeat(50)).dim());
}

/// Troubleshooting suggestions for an error message
pub fn hints(error: &str) -> Vec<&'static str> {
    let lowered = error.to_lowercase();
    if lowered.contains("token") || lowered.contains("auth") || lowered.contains("401") {
        vec!["Check your tokens: hubport check-tokens"]
    } else if lowered.contains("not found") || lowered.contains("404") {
        vec!["Verify the repo ID exists on the source platform"]
    } else if lowered.contains("timeout") || lowered.contains("timed out") || lowered.contains("exceeded") {
        vec![
            "The repository may be too large for one pass: try --chunked",
            "Pass --repo-type to skip auto-detection",
        ]
    } else {
        vec![
            "Re-run with -v for detailed logs",
            "Validate your tokens: hubport check-tokens",
        ]
    }
}

/// Print [`hints`] for `error` under a heading
pub fn print_hints(error: &str) {
    eprintln!();
    eprintln!("  {}", style("Troubleshooting:").bold());
    for hint in hints(error) {
        eprintln!("  - {}", hint);
    }
}

/// Print the summary of a finished migration
pub fn report(report: &MigrationReport, destination_url: &str) {
    let outcome = match report.outcome {
        Outcome::Succeeded => style("SUCCEEDED").green().bold(),
        Outcome::Partial => style("PARTIAL").yellow().bold(),
        Outcome::Failed => style("FAILED").red().bold(),
    };

    println!();
    rule();
    println!("  Migration {}", outcome);
    detail("URL", destination_url);
    detail(
        "Files",
        &format!("{} of {}", report.transferred_files(), report.manifest_files),
    );
    detail(
        "Size",
        &format!(
            "{} of {}",
            HumanBytes(report.transferred_bytes()),
            HumanBytes(report.manifest_bytes)
        ),
    );
    if report.total_chunks > 1 {
        detail(
            "Chunks",
            &format!(
                "{} run, {} failed, budget {}",
                report.chunks.len(),
                report.failures.len(),
                HumanBytes(report.budget)
            ),
        );
    }
    detail("Duration", &HumanDuration(report.elapsed).to_string());

    for failure in &report.failures {
        println!(
            "  {} chunk {}: {}",
            style("✗").red(),
            failure.index,
            failure.error
        );
    }
    if let Some(error) = &report.error {
        println!("  {} {}", style("Error:").red(), error);
    }

    match &report.verification {
        Some(VerificationOutcome::Verified(v)) if v.verified => {
            println!(
                "  {} Verified {} files ({} hashed)",
                style("✓").green(),
                v.source_files,
                v.hashes.matched.len()
            );
        }
        Some(VerificationOutcome::Verified(v)) => {
            println!("  {} Integrity mismatch", style("✗").red().bold());
            for path in &v.hashes.missing {
                println!("    missing: {}", path);
            }
            for mismatch in &v.hashes.mismatched {
                println!(
                    "    altered: {} (expected {}, got {})",
                    mismatch.path, mismatch.expected, mismatch.actual
                );
            }
        }
        Some(VerificationOutcome::Unverifiable(reason)) => {
            println!("  {} Could not verify: {}", style("?").yellow(), reason);
        }
        None => {}
    }
    rule();
}
