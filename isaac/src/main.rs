//! Isaac - safety-tiered interactive shell
//!
//! Every command passes a tier gate before it reaches the local shell or a
//! remote machine. Without a subcommand Isaac runs its interactive loop.

#![forbid(unsafe_code)]

mod config;
mod error;
mod prompt;
mod repl;
mod shell;
mod ssh;
mod translate;

use clap::{Parser, Subcommand};
use config::CliOverrides;
use isaac_common::config::{LayeredConfig, example_config};
use isaac_common::{LogConfig, classify, init_logging, validate_layered};
use repl::{Backends, Shell};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "isaac")]
#[command(
    author,
    version,
    about = "Isaac - safety-tiered command routing for your shell",
    after_help = r#"EXAMPLES:
    # Start the interactive shell
    isaac

    # Run one command through the tier gate
    isaac run -- ls -la

    # Show which tier a command falls in
    isaac classify rm -rf build

    # Show where config values come from
    isaac config show --sources

ENVIRONMENT VARIABLES:
    ISAAC_SHELL                     Shell family: bash, zsh, sh, powershell, pwsh, cmd
    ISAAC_SESSION_LOG               Path of the JSONL session log
    ISAAC_NL_KEYWORD                Prefix word for natural-language queries (default: isaac)
    ISAAC_UNKNOWN_TIER              Tier for unlisted commands, 3 or 4 (default: 3)
    ISAAC_LOCKDOWN_OVERRIDE         Allow tier 4 commands behind an unlock token
    ISAAC_AUTO_CORRECT_EXECUTE      Run high-confidence corrections without asking
    ISAAC_COMMAND_TIMEOUT_SECS      Per-command execution timeout
    ISAAC_MAX_PARALLEL_REMOTE       Concurrent remote dispatches per group
    ISAAC_DISPATCH_STRATEGY         Group dispatch: broadcast, round_robin, least_load, random
    ISAAC_LOG_LEVEL                 Logging level: trace, debug, info, warn, error, off
    ISAAC_LOG_FORMAT                Log format: pretty, json, compact
    ISAAC_LOG_FILE                  Also write JSON logs to this file

CONFIG PRECEDENCE (highest to lowest):
    1. Command-line arguments
    2. Environment variables
    3. --config file
    4. Project config (.isaac/config.toml)
    5. User config (~/.config/isaac/config.toml)
    6. Built-in defaults"#
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Extra config file, applied after user and project config
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Shell family to execute commands with
    #[arg(long, global = true)]
    shell: Option<String>,

    /// Append a JSONL record for every routed command
    #[arg(long, global = true, value_name = "PATH")]
    session_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a single input line and exit with its status
    Run {
        /// The input line; words are joined with spaces
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        input: Vec<String>,
    },

    /// Print the tier of a command without running it
    Classify {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Annotate each value with the layer it came from
        #[arg(long)]
        sources: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the effective configuration and report problems
    Validate,
    /// Print a commented example config file
    Example,
}

#[tokio::main]
async fn main() -> miette::Result<ExitCode> {
    let cli = Cli::parse();

    if let Some(Commands::Config {
        action: ConfigAction::Example,
    }) = &cli.command
    {
        print!("{}", example_config());
        return Ok(ExitCode::SUCCESS);
    }

    let overrides = CliOverrides {
        shell: cli.shell.clone(),
        session_log: cli.session_log.clone(),
        config_file: cli.config.clone(),
    };
    let layered = config::load_config(&overrides)?;

    let mut log_config = LogConfig::from_env(&layered.config.general.log_level);
    if cli.verbose {
        log_config = log_config.with_level("debug");
    } else if cli.quiet {
        log_config = log_config.with_level("error");
    }
    let _logging_guards =
        init_logging(&log_config).map_err(|e| miette::miette!("failed to initialize logging: {e:#}"))?;

    match cli.command {
        None => {
            let mut shell = Shell::build(&layered, Backends::default())?;
            shell
                .run_interactive()
                .await
                .map_err(|e| miette::miette!("{e:#}"))?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run { input }) => {
            let mut shell = Shell::build(&layered, Backends::default())?;
            let result = shell.run_line(&input.join(" ")).await;
            repl::print_result(&result);
            Ok(exit_code_for(result.success, result.exit_code))
        }
        Some(Commands::Classify { command, json }) => {
            let session = layered.config.session().map_err(error::ConfigError::from)?;
            let line = command.join(" ");
            let classification = classify(&session, &line);
            if json {
                let text = serde_json::to_string_pretty(&classification)
                    .map_err(|e| miette::miette!("{e}"))?;
                println!("{text}");
            } else {
                println!(
                    "{}: tier {} ({}, {})",
                    classification.name,
                    classification.tier.label(),
                    classification.tier.name(),
                    source_label(classification.source),
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config { action }) => config_command(action, &layered),
    }
}

fn config_command(action: ConfigAction, layered: &LayeredConfig) -> miette::Result<ExitCode> {
    match action {
        ConfigAction::Show { sources, json } => {
            let value = toml::Value::try_from(&layered.config)
                .map_err(|e| miette::miette!("failed to serialize config: {e}"))?;
            if json {
                let text = serde_json::to_string_pretty(&value)
                    .map_err(|e| miette::miette!("{e}"))?;
                println!("{text}");
            } else if sources {
                let mut leaves = Vec::new();
                flatten("", &value, &mut leaves);
                for (key, rendered) in leaves {
                    println!("{key} = {rendered}  # {}", layered.sources.describe(&key));
                }
            } else {
                let text = layered
                    .config
                    .to_toml()
                    .map_err(|e| miette::miette!("failed to serialize config: {e}"))?;
                print!("{text}");
            }
            Ok(ExitCode::SUCCESS)
        }
        ConfigAction::Validate => {
            let warnings = validate_layered(layered);
            if warnings.is_empty() {
                println!("Configuration OK");
                return Ok(ExitCode::SUCCESS);
            }
            for w in &warnings {
                println!("[{}] {}: {}", w.severity, w.key, w.message);
            }
            let errors: Vec<_> = warnings
                .iter()
                .filter(|w| w.severity == isaac_common::Severity::Error)
                .collect();
            if errors.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Err(error::ConfigError::from_warnings(&errors).into())
            }
        }
        ConfigAction::Example => {
            print!("{}", example_config());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Collect `dotted.key = value` pairs for every leaf.
fn flatten(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn source_label(source: isaac_common::TierSource) -> &'static str {
    match source {
        isaac_common::TierSource::Override => "override",
        isaac_common::TierSource::Base => "built-in table",
        isaac_common::TierSource::Default => "unknown command default",
    }
}

/// 0 on success, the command's own code when it has one, otherwise 1.
fn exit_code_for(success: bool, exit_code: i32) -> ExitCode {
    if success {
        return ExitCode::SUCCESS;
    }
    match u8::try_from(exit_code) {
        Ok(code) if code > 0 => ExitCode::from(code),
        _ => ExitCode::FAILURE,
    }
}
