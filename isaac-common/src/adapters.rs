//! External capability boundaries.
//!
//! The core only talks to the outside world through these traits. Concrete
//! implementations live in the `isaac` binary and in [`crate::mock`].

use crate::gate::ConfirmationRequest;
use crate::remote::{DispatchStrategy, MachineId, RoutingError};
use crate::tier::Tier;
use crate::types::{CommandResult, SessionSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Shell execution
// ============================================================================

/// Raw output of one shell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub success: bool,
    pub output: Vec<u8>,
    pub exit_code: i32,
}

impl ShellOutput {
    /// Lossy UTF-8 view of the output.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Failures of the execution adapter itself (not of the command).
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to spawn shell: {0}")]
    Spawn(String),
}

/// Runs native commands for one shell family.
#[async_trait]
pub trait ShellExecutionAdapter: Send + Sync {
    /// Shell family name, e.g. `bash`.
    fn name(&self) -> &str;

    /// Run `command`, feeding `stdin` when given. Must not outlive `timeout`.
    async fn execute(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<ShellOutput, ShellError>;
}

// ============================================================================
// Remote routing
// ============================================================================

/// Resolves device aliases and runs already-approved commands remotely.
#[async_trait]
pub trait RemoteRoutingAdapter: Send + Sync {
    /// Expand an alias (and optional group strategy) into targets.
    fn resolve(
        &self,
        alias: &str,
        strategy: Option<DispatchStrategy>,
    ) -> Result<Vec<MachineId>, RoutingError>;

    /// Run one command on one machine.
    async fn execute_on_machine(
        &self,
        machine: &MachineId,
        command: &str,
        timeout: Duration,
    ) -> CommandResult;

    /// Fan out to approved targets with at most `max_parallel` in flight.
    ///
    /// Results keep the order of `targets`.
    async fn execute_with_strategy(
        &self,
        targets: &[MachineId],
        command: &str,
        timeout: Duration,
        max_parallel: usize,
    ) -> Vec<CommandResult> {
        stream::iter(targets.iter().cloned())
            .map(|machine| async move {
                self.execute_on_machine(&machine, command, timeout).await
            })
            .buffered(max_parallel.max(1))
            .collect()
            .await
    }
}

// ============================================================================
// Natural-language translation
// ============================================================================

/// Outcome of a translation request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Translation {
    pub success: bool,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Translation {
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            success: true,
            command: Some(command.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Turns a natural-language query into a shell command.
#[async_trait]
pub trait NaturalLanguageTranslationAdapter: Send + Sync {
    async fn translate(&self, query: &str, shell_name: &str, session: &SessionSnapshot)
    -> Translation;
}

// ============================================================================
// Gate capabilities
// ============================================================================

/// A proposed spelling correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
    /// 0.0 to 1.0.
    pub confidence: f64,
}

/// Lightweight typo correction used by tiers 2 and 2.5.
#[async_trait]
pub trait Corrector: Send + Sync {
    async fn correct(&self, command: &str, shell_name: &str) -> Option<Correction>;
}

/// Advisory risk annotation for tier 3.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub safe: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    /// Report used when the validator could not be consulted.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            warnings: vec![format!("validation unavailable: {}", reason.into())],
            suggestions: Vec::new(),
        }
    }
}

/// Advisory validator (AI or heuristic). Never decides on its own.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, command: &str, shell_name: &str) -> anyhow::Result<ValidationReport>;
}

/// Prompt failures. Every one of them is treated as a decline.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("no interactive terminal available")]
    NotInteractive,

    #[error("input closed")]
    Closed,

    #[error("prompt I/O failed: {0}")]
    Io(String),
}

/// Reads a real answer from the user.
pub trait Prompter: Send + Sync {
    /// Show the request and return the raw response text.
    fn ask(&self, request: &ConfirmationRequest) -> Result<String, PromptError>;
}

// ============================================================================
// Session logging
// ============================================================================

/// One session log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    /// Exact command or input text.
    pub command: String,
    pub tier: Option<Tier>,
    pub forced: bool,
    pub result: CommandResult,
    /// Remote machine, for device-routed commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
}

/// Records every routed command, including blocked and failed ones.
pub trait SessionLogger: Send + Sync {
    fn record(&self, record: &SessionRecord);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRemote;
    use crate::remote::{Machine, MachineRegistry};

    #[tokio::test]
    async fn test_fan_out_keeps_target_order() {
        let mut registry = MachineRegistry::new();
        for (name, host) in [("a", "10.0.0.1"), ("b", "10.0.0.2"), ("c", "10.0.0.3")] {
            registry.register(Machine::new(name, host));
        }
        let remote = MockRemote::new(registry);
        remote.fail_on("b");
        let targets = vec![MachineId::new("a"), MachineId::new("b"), MachineId::new("c")];

        let results = remote
            .execute_with_strategy(&targets, "uptime", Duration::from_secs(5), 2)
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].output, "uptime: ok on a");
        assert!(!results[1].success);
        assert_eq!(results[2].output, "uptime: ok on c");
    }

    #[tokio::test]
    async fn test_fan_out_with_zero_parallelism_still_runs() {
        let mut registry = MachineRegistry::new();
        registry.register(Machine::new("a", "10.0.0.1"));
        let remote = MockRemote::new(registry);
        let results = remote
            .execute_with_strategy(&[MachineId::new("a")], "pwd", Duration::from_secs(5), 0)
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }
}
