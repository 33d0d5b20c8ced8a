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

//! `hubport` binary

use anyhow::Result;
use clap::{Parser, Subcommand};
use hubport_cli::commands::*;
use hubport_cli::output;
use hubport_config::{Settings, SettingsLoader};
use hubport_observability::{init_tracing_with_config, LogConfig, LogFormat, LogOutput};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hubport")]
#[command(version, about = "Migrate repositories between HuggingFace and ModelScope")]
#[command(
    long_about = "hubport copies model, dataset and space repositories between HuggingFace and
ModelScope, large objects included. Big repositories can be split into chunks that
transfer in parallel and resume individually."
)]
#[command(propagate_version = true)]
#[command(author = "Hubport Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format (pretty|compact|json)
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Colored output (always|auto|never)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate one repository to the other hub
    Migrate(MigrateCmd),

    /// Migrate several repositories concurrently
    Batch(BatchCmd),

    /// Detect whether a repository is a model, dataset or space
    Detect(DetectCmd),

    /// Compare an existing destination with its source
    Verify(VerifyCmd),

    /// Validate the configured hub tokens
    #[command(name = "check-tokens")]
    CheckTokens(CheckTokensCmd),
}

fn init_logging(cli: &Cli, settings: &Settings) {
    let mut config = match LogConfig::from_settings(&settings.logging, settings.scrubber()) {
        Ok(config) => config,
        Err(e) => {
            output::warning(&format!("{}; falling back to pretty logs", e));
            LogConfig::new()
                .with_level(settings.logging.level.clone())
                .with_scrubber(settings.scrubber())
        }
    };
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    if cli.verbose {
        config = config.with_level("debug");
    } else if cli.quiet {
        config = config.with_level("error");
    }

    let config = config
        .with_output(LogOutput::Stderr)
        .with_ansi(console::colors_enabled_stderr());
    if let Err(e) = init_tracing_with_config(config) {
        output::warning(&format!("Logging disabled: {}", e));
    }
}

async fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    match &cli.command {
        Commands::Migrate(cmd) => cmd.execute(settings, cli.quiet).await,
        Commands::Batch(cmd) => cmd.execute(settings, cli.quiet).await,
        Commands::Detect(cmd) => cmd.execute(settings, cli.quiet).await,
        Commands::Verify(cmd) => cmd.execute(settings, cli.quiet).await,
        Commands::CheckTokens(cmd) => cmd.execute(settings).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.color.as_str() {
        "never" => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        "always" => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        "auto" => {}
        other => {
            output::error(&format!("Invalid color option: {}", other));
            return ExitCode::FAILURE;
        }
    }

    let settings = match SettingsLoader::new().load(cli.config.as_deref()).await {
        Ok(settings) => settings,
        Err(e) => {
            output::error(&format!("Error: {}", e));
            return ExitCode::FAILURE;
        }
    };
    init_logging(&cli, &settings);

    match run(&cli, &settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = settings.scrubber().scrub(&format!("{:#}", e));
            output::error(&format!("Error: {}", message));
            output::print_hints(&message);
            ExitCode::FAILURE
        }
    }
}
