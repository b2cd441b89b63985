//! Shell assembly and the interactive loop.

use crate::error::ConfigError;
use crate::prompt::TerminalPrompter;
use crate::shell::ProcessShell;
use crate::ssh::SshRemote;
use crate::translate::UnavailableTranslator;
use isaac_common::config::{LayeredConfig, Severity, validate_layered};
use isaac_common::{
    BypassGuard, CommandResult, CommandRouter, ConfirmationGate, HeuristicCorrector,
    HeuristicValidator, JsonlSessionLogger, NaturalLanguageTranslationAdapter, NullSessionLogger,
    Prompter, SessionContext, SessionLogger,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A routed session: router plus its mutable session state.
pub struct Shell {
    router: CommandRouter,
    session: SessionContext,
}

/// Adapters that differ between the real binary and tests.
pub struct Backends {
    pub prompter: Arc<dyn Prompter>,
    pub translator: Arc<dyn NaturalLanguageTranslationAdapter>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            prompter: Arc::new(TerminalPrompter),
            translator: Arc::new(UnavailableTranslator),
        }
    }
}

impl Shell {
    /// Validate the loaded layers and wire the adapters behind a guard.
    pub fn build(layered: &LayeredConfig, backends: Backends) -> Result<Self, ConfigError> {
        let warnings = validate_layered(layered);
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.severity == Severity::Error)
            .collect();
        if !errors.is_empty() {
            return Err(ConfigError::from_warnings(&errors));
        }
        for w in warnings.iter().filter(|w| w.severity == Severity::Warning) {
            warn!(key = %w.key, "{}", w.message);
        }

        let config = &layered.config;
        let session = config.session()?;
        let machines = config.machine_registry()?;
        let logger: Arc<dyn SessionLogger> = match &config.general.session_log {
            Some(path) => {
                let path = expand_home(path);
                let logger = JsonlSessionLogger::open(&path).map_err(|e| ConfigError::SessionLog {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                info!(path = %path.display(), "Session log enabled");
                Arc::new(logger)
            }
            None => Arc::new(NullSessionLogger),
        };

        let gate = ConfirmationGate::new(
            Arc::new(HeuristicCorrector::new(&session.tiers)),
            Arc::new(HeuristicValidator),
            backends.prompter,
        );
        let guard = BypassGuard::new(
            gate,
            Arc::new(ProcessShell::new(&config.general.shell)),
            Arc::new(SshRemote::new(machines)),
            logger,
        );
        Ok(Self {
            router: CommandRouter::new(guard, backends.translator),
            session,
        })
    }

    pub async fn run_line(&mut self, line: &str) -> CommandResult {
        self.router.route(&mut self.session, line).await
    }

    /// Read lines until EOF or `/exit`.
    pub async fn run_interactive(&mut self) -> anyhow::Result<()> {
        eprintln!("isaac {} - /help for commands, /exit to leave", env!("CARGO_PKG_VERSION"));
        loop {
            let Some(line) = read_line(&self.session.preferences.shell_name).await? else {
                debug!("stdin closed");
                break;
            };
            let result = self.run_line(&line).await;
            print_result(&result);
            if result.exit_requested {
                break;
            }
        }
        Ok(())
    }
}

/// Print output to stdout and failures to stderr.
pub fn print_result(result: &CommandResult) {
    match &result.failure {
        None => {
            if !result.output.is_empty() {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(result.output.as_bytes());
                if !result.output.ends_with('\n') {
                    let _ = stdout.write_all(b"\n");
                }
                let _ = stdout.flush();
            }
        }
        Some(failure) => {
            // Command output for failed executions is still worth showing.
            let message = failure.to_string();
            if !result.output.is_empty() && result.output != message {
                eprint!("{}", result.output);
                if !result.output.ends_with('\n') {
                    eprintln!();
                }
            }
            eprintln!("isaac: {message}");
        }
    }
}

async fn read_line(shell_name: &str) -> anyhow::Result<Option<String>> {
    eprint!("isaac ({shell_name})> ");
    std::io::stderr().flush()?;
    let line = tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        std::io::stdin().lock().read_line(&mut buf).map(|n| (n, buf))
    })
    .await??;
    match line {
        (0, _) => Ok(None),
        (_, buf) => Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string())),
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isaac_common::mock::{MockTranslator, ScriptedPrompter};
    use isaac_common::audit::read_entries;
    use isaac_common::config::{ConfigSource, IsaacConfig};
    use isaac_common::{Failure, Tier};
    use tempfile::TempDir;

    fn backends() -> Backends {
        Backends {
            prompter: Arc::new(ScriptedPrompter::closed()),
            translator: Arc::new(MockTranslator::new()),
        }
    }

    fn layered(config: IsaacConfig) -> LayeredConfig {
        LayeredConfig {
            config,
            ..LayeredConfig::default()
        }
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = IsaacConfig::default();
        config.gate.command_timeout_secs = 0;
        assert!(matches!(
            Shell::build(&layered(config), backends()),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_build_rejects_project_lockdown_weakening() {
        let project: toml::Value = toml::from_str("[tier_overrides]\nrm = \"1\"").unwrap();
        let from_project = IsaacConfig::from_layers([(
            ConfigSource::ProjectConfig,
            "project".to_string(),
            project.clone(),
        )])
        .unwrap();
        assert!(matches!(
            Shell::build(&from_project, backends()),
            Err(ConfigError::ValidationFailed { .. })
        ));

        let from_user =
            IsaacConfig::from_layers([(ConfigSource::UserConfig, "user".to_string(), project)])
                .unwrap();
        assert!(Shell::build(&from_user, backends()).is_ok());
    }

    #[test]
    fn test_expand_home() {
        let plain = std::path::Path::new("/var/log/isaac.jsonl");
        assert_eq!(expand_home(plain), plain.to_path_buf());
        let expanded = expand_home(std::path::Path::new("~/isaac.jsonl"));
        assert!(!expanded.starts_with("~") || directories::BaseDirs::new().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_routes_and_logs() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("session.jsonl");
        let mut config = IsaacConfig::default();
        config.general.shell = "sh".to_string();
        config.general.session_log = Some(log.clone());

        let mut shell = Shell::build(&layered(config), backends()).unwrap();
        let ok = shell.run_line("echo hi").await;
        assert!(ok.success);
        assert_eq!(ok.output, "hi\n");

        // No terminal to answer: tier 3 is declined, tier 4 is blocked.
        let declined = shell.run_line("cp a b").await;
        assert!(matches!(declined.failure, Some(Failure::ConfirmationDeclined { .. })));
        let blocked = shell.run_line("rm -rf /").await;
        assert_eq!(blocked.tier, Some(Tier::Lockdown));
        assert!(blocked.was_blocked());

        let entries = read_entries(&log).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].record.command, "rm -rf /");
    }
}
