//! Shared per-invocation and per-session types.

use crate::error::Failure;
use crate::tier::{Tier, TierAssignment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Default timeout for one native command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for an advisory validation call.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a translation call.
pub const DEFAULT_TRANSLATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Informational notes attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Note {
    /// The leading token was not in any table; the default tier applied.
    ClassificationUnknown { command: String, applied: Tier },
    /// The gate substituted a corrected command.
    Corrected { original: String, corrected: String },
    /// Advisory validation output shown to the user.
    Advisory { safe: bool, warnings: Vec<String> },
    /// The command was produced by natural-language translation.
    Translated { query: String, command: String },
    /// The command ran on a remote machine.
    Remote { machine: String },
}

/// Outcome of one routing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// True only when execution happened and succeeded.
    pub success: bool,
    /// Captured output (stdout, then stderr when non-empty).
    pub output: String,
    /// Exit code; -1 when nothing ran.
    pub exit_code: i32,
    /// Tier that gated the command, if it reached the gate.
    pub tier: Option<Tier>,
    /// Force prefix or high-friction unlock was used.
    pub forced: bool,
    /// Typed failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
    /// Set by `/exit` and `/quit`.
    #[serde(default)]
    pub exit_requested: bool,
}

impl CommandResult {
    /// Successful result with output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            exit_code: 0,
            tier: None,
            forced: false,
            failure: None,
            notes: Vec::new(),
            exit_requested: false,
        }
    }

    /// Failed result. The output carries the failure's display text.
    pub fn failed(failure: Failure) -> Self {
        let exit_code = match &failure {
            Failure::ExecutionFailure { exit_code } => *exit_code,
            _ => -1,
        };
        Self {
            success: false,
            output: failure.to_string(),
            exit_code,
            tier: None,
            forced: false,
            failure: Some(failure),
            notes: Vec::new(),
            exit_requested: false,
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_notes(mut self, notes: impl IntoIterator<Item = Note>) -> Self {
        self.notes.extend(notes);
        self
    }

    /// True when a gate stopped the command before execution.
    pub fn was_blocked(&self) -> bool {
        self.failure.as_ref().is_some_and(Failure::is_gate_denial)
    }
}

/// Session-level gate preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Name of the target shell family (bash, zsh, powershell…).
    pub shell_name: String,
    /// Execute high-confidence tier-2 corrections without a prompt.
    pub auto_correct_execute: bool,
    /// Enable the token-based tier-4 unlock. Off by default.
    pub lockdown_override: bool,
    /// Tier applied to unclassified commands. Never below `Validate`.
    pub unknown_tier: Tier,
    /// Minimum corrector confidence for tier 2.
    pub auto_correct_threshold: f64,
    /// Minimum corrector confidence for tier 2.5.
    pub confirm_correct_threshold: f64,
    /// Budget for one native command.
    pub command_timeout: Duration,
    /// Budget for advisory validation.
    pub validation_timeout: Duration,
    /// Budget for natural-language translation.
    pub translation_timeout: Duration,
    /// How many times translated output may re-enter the router.
    pub max_translation_hops: u8,
    /// Keyword that must precede natural-language queries.
    pub nl_keyword: String,
    /// Concurrency bound for remote fan-out.
    pub max_parallel_remote: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            shell_name: "bash".to_string(),
            auto_correct_execute: false,
            lockdown_override: false,
            unknown_tier: Tier::Validate,
            auto_correct_threshold: 0.8,
            confirm_correct_threshold: 0.7,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            translation_timeout: DEFAULT_TRANSLATION_TIMEOUT,
            max_translation_hops: 1,
            nl_keyword: "isaac".to_string(),
            max_parallel_remote: 4,
        }
    }
}

/// Explicit per-session state passed into the classifier, gate and router.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub tiers: TierAssignment,
    pub preferences: Preferences,
}

impl SessionContext {
    pub fn new(tiers: TierAssignment, preferences: Preferences) -> Self {
        let mut preferences = preferences;
        // Unclassified commands are never treated more leniently than tier 3.
        preferences.unknown_tier = preferences.unknown_tier.max(Tier::Validate);
        Self {
            session_id: Uuid::new_v4(),
            tiers,
            preferences,
        }
    }

    /// Read-only view handed to external capabilities.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            shell_name: self.preferences.shell_name.clone(),
            cwd: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(TierAssignment::default(), Preferences::default())
    }
}

/// Context given to translation and validation capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub shell_name: String,
    pub cwd: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tier_is_clamped_to_validate() {
        let prefs = Preferences {
            unknown_tier: Tier::Instant,
            ..Preferences::default()
        };
        let session = SessionContext::new(TierAssignment::default(), prefs);
        assert_eq!(session.preferences.unknown_tier, Tier::Validate);
    }

    #[test]
    fn test_failed_result_carries_message() {
        let result = CommandResult::failed(Failure::blocked("too dangerous"));
        assert!(!result.success);
        assert!(result.was_blocked());
        assert_eq!(result.exit_code, -1);
        assert!(result.output.contains("too dangerous"));
    }

    #[test]
    fn test_execution_failure_keeps_exit_code() {
        let result = CommandResult::failed(Failure::ExecutionFailure { exit_code: 2 });
        assert_eq!(result.exit_code, 2);
        assert!(!result.was_blocked());
    }
}
