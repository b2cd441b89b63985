//! Terminal, user-visible routing outcomes.
//!
//! Every variant ends the current routing call. Nothing here is retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a routing call did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    /// The user (or policy) answered a prompt with anything but approval.
    #[error("Aborted: {reason}")]
    ConfirmationDeclined { reason: String },

    /// Tier 4 without a completed unlock, or a hard policy block.
    #[error("Blocked: {reason}")]
    ValidationBlocked { reason: String },

    /// The execution adapter exceeded its time budget and was cancelled.
    #[error("Timed out after {timeout_secs}s")]
    ExecutionTimeout { timeout_secs: u64 },

    /// The command ran and exited non-zero, or could not be spawned.
    #[error("Command failed with exit code {exit_code}")]
    ExecutionFailure { exit_code: i32 },

    /// Natural-language translation failed or was refused.
    #[error("Translation failed: {reason}")]
    TranslationFailure { reason: String },

    /// A remote target could not be resolved or reached.
    #[error("Routing to '{target}' failed: {reason}")]
    RoutingFailure { target: String, reason: String },

    /// A pipeline segment failed or was blocked.
    #[error("Pipeline aborted at segment {} ('{segment}'): {cause}", .segment_index + 1)]
    PipelineAborted {
        segment_index: usize,
        segment: String,
        cause: Box<Failure>,
    },

    /// Input syntax could not be routed.
    #[error("{reason} ({suggestion})")]
    Malformed { reason: String, suggestion: String },

    /// An internal command that is not in the registry.
    #[error("Unknown command '/{name}' ({suggestion})")]
    UnknownCommand { name: String, suggestion: String },
}

impl Failure {
    /// Shorthand for a routing-layer syntax failure.
    pub fn malformed(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Failure::Malformed {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Shorthand for a declined confirmation.
    pub fn declined(reason: impl Into<String>) -> Self {
        Failure::ConfirmationDeclined {
            reason: reason.into(),
        }
    }

    /// Shorthand for a hard block.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Failure::ValidationBlocked {
            reason: reason.into(),
        }
    }

    /// Stable snake_case code, used in session logs.
    pub fn code(&self) -> &'static str {
        match self {
            Failure::ConfirmationDeclined { .. } => "confirmation_declined",
            Failure::ValidationBlocked { .. } => "validation_blocked",
            Failure::ExecutionTimeout { .. } => "execution_timeout",
            Failure::ExecutionFailure { .. } => "execution_failure",
            Failure::TranslationFailure { .. } => "translation_failure",
            Failure::RoutingFailure { .. } => "routing_failure",
            Failure::PipelineAborted { .. } => "pipeline_aborted",
            Failure::Malformed { .. } => "malformed",
            Failure::UnknownCommand { .. } => "unknown_command",
        }
    }

    /// True when the command was stopped by policy before execution.
    pub fn is_gate_denial(&self) -> bool {
        match self {
            Failure::ConfirmationDeclined { .. } | Failure::ValidationBlocked { .. } => true,
            Failure::PipelineAborted { cause, .. } => cause.is_gate_denial(),
            _ => false,
        }
    }

    /// Innermost cause, unwrapping pipeline aborts.
    pub fn root_cause(&self) -> &Failure {
        match self {
            Failure::PipelineAborted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
