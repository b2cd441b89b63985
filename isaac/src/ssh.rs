//! Remote execution over the system `ssh` client.
//!
//! Uses the raw `ssh` binary so existing SSH configuration, agents and known
//! hosts apply unchanged. Commands reach this module only after the guard has
//! approved them for each target.

use async_trait::async_trait;
use isaac_common::{
    CommandResult, DispatchStrategy, Failure, Machine, MachineId, MachineRegistry,
    RemoteRoutingAdapter, RoutingError,
};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Why an ssh invocation failed, judged from its stderr.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SshFailure {
    #[error("authentication failed for {user}@{host}")]
    AuthenticationFailed { host: String, user: String },

    #[error("host key verification failed for {host}")]
    HostKeyVerificationFailed { host: String },

    #[error("{host} is unreachable: {reason}")]
    HostUnreachable { host: String, reason: String },
}

impl SshFailure {
    /// Classify ssh's own errors. `None` means the remote command itself failed.
    pub fn from_stderr(machine: &Machine, stderr: &str, exit_code: i32) -> Option<Self> {
        // ssh reserves 255 for its own failures.
        if exit_code != 255 {
            return None;
        }
        let lower = stderr.to_lowercase();
        if lower.contains("permission denied") {
            return Some(SshFailure::AuthenticationFailed {
                host: machine.host.clone(),
                user: machine.user.clone(),
            });
        }
        if lower.contains("host key verification failed") {
            return Some(SshFailure::HostKeyVerificationFailed {
                host: machine.host.clone(),
            });
        }
        Some(SshFailure::HostUnreachable {
            host: machine.host.clone(),
            reason: stderr.trim().to_string(),
        })
    }
}

/// [`RemoteRoutingAdapter`] backed by a [`MachineRegistry`] and `ssh`.
pub struct SshRemote {
    registry: MachineRegistry,
    connect_timeout: Duration,
}

impl SshRemote {
    pub fn new(registry: MachineRegistry) -> Self {
        Self {
            registry,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    fn build_command(&self, machine: &Machine, command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        if let Some(identity) = &machine.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(format!("{}@{}", machine.user, machine.host));
        cmd.arg("--").arg(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn routing_failure(machine: &MachineId, reason: impl Into<String>) -> CommandResult {
        CommandResult::failed(Failure::RoutingFailure {
            target: machine.to_string(),
            reason: reason.into(),
        })
    }
}

#[async_trait]
impl RemoteRoutingAdapter for SshRemote {
    fn resolve(
        &self,
        alias: &str,
        strategy: Option<DispatchStrategy>,
    ) -> Result<Vec<MachineId>, RoutingError> {
        self.registry.resolve(alias, strategy)
    }

    async fn execute_on_machine(
        &self,
        machine: &MachineId,
        command: &str,
        timeout: Duration,
    ) -> CommandResult {
        let Some(entry) = self.registry.machine(machine) else {
            return Self::routing_failure(machine, "not registered");
        };

        let start = Instant::now();
        debug!(machine = %machine, host = %entry.host, command, "Running over ssh");
        let output = match tokio::time::timeout(timeout, self.build_command(entry, command).output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(machine = %machine, error = %e, "Failed to spawn ssh");
                return Self::routing_failure(machine, format!("failed to spawn ssh: {e}"));
            }
            Err(_) => {
                warn!(machine = %machine, timeout_secs = timeout.as_secs(), "Remote command timed out");
                return CommandResult::failed(Failure::ExecutionTimeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(failure) = SshFailure::from_stderr(entry, &stderr, exit_code) {
            warn!(machine = %machine, error = %failure, "ssh failed");
            return Self::routing_failure(machine, failure.to_string());
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&stderr);
        debug!(
            machine = %machine,
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Remote command finished"
        );
        if output.status.success() {
            CommandResult::ok(text)
        } else {
            let mut result = CommandResult::failed(Failure::ExecutionFailure { exit_code });
            if !text.is_empty() {
                result.output = text;
            }
            result
        }
    }
}
