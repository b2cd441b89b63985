//! Per-tier confirmation state machine.
//!
//! | Tier | Behaviour |
//! |------|-----------|
//! | 1    | approve |
//! | 2    | correct, then auto-execute or one y/n prompt |
//! | 2.5  | correct, then a y/n prompt that is never skipped |
//! | 3    | advisory validation, then a y/n prompt that is never skipped |
//! | 4    | deny, or the token unlock when enabled by configuration |
//!
//! Prompts go through [`Prompter`]; nothing in here answers on the user's
//! behalf.

use crate::adapters::{Corrector, Prompter, ValidationReport, Validator};
use crate::classify::classify;
use crate::error::Failure;
use crate::tier::Tier;
use crate::types::{Note, SessionContext};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of the literal response for the tier-4 unlock.
pub const UNLOCK_PREFIX: &str = "UNLOCK-";

/// Hex chars of the command hash shown in the unlock token.
const TOKEN_HASH_LEN: usize = 8;

/// What a prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptKind {
    /// Plain "execute? y/n".
    Execute,
    /// Execute a corrected command instead of the original.
    ExecuteCorrected { original: String },
    /// Execute after advisory validation.
    ExecuteAnyway { advisory: ValidationReport },
    /// Tier-4 unlock: type the exact token.
    Unlock,
}

/// A single confirmation request. Lives for one `evaluate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub tier: Tier,
    /// Exact command that will run if approved.
    pub command: String,
    pub kind: PromptKind,
    /// Text to show the user.
    pub message: String,
    /// Short command hash for the unlock flow.
    pub token: Option<String>,
    /// Literal response required by the unlock flow.
    pub required_response: Option<String>,
    /// Remote machine the command will run on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ConfirmationRequest {
    fn yes_no(tier: Tier, command: &str, kind: PromptKind, message: String) -> Self {
        Self {
            tier,
            command: command.to_string(),
            kind,
            message,
            token: None,
            required_response: None,
            target: None,
        }
    }

    /// Build a one-time unlock challenge for `command`.
    ///
    /// The token is a short blake3 hash of the exact command text mixed with
    /// a fresh nonce, so a previous answer never unlocks a later request.
    pub fn unlock(command: &str) -> Self {
        let nonce: u64 = rand::thread_rng().r#gen();
        let mut hasher = blake3::Hasher::new();
        hasher.update(command.as_bytes());
        hasher.update(&nonce.to_le_bytes());
        let hex = hasher.finalize().to_hex();
        let token = hex.as_str()[..TOKEN_HASH_LEN].to_string();
        let required = format!("{UNLOCK_PREFIX}{token}");
        Self {
            tier: Tier::Lockdown,
            command: command.to_string(),
            kind: PromptKind::Unlock,
            message: format!(
                "Tier 4 lockdown: '{command}' [{token}]. Type {required} to execute anyway"
            ),
            token: Some(token),
            required_response: Some(required),
            target: None,
        }
    }

    fn for_target(mut self, target: Option<&str>) -> Self {
        if let Some(target) = target {
            self.message = format!("[{target}] {}", self.message);
            self.target = Some(target.to_string());
        }
        self
    }

    /// Judge a raw response against this request.
    pub fn accepts(&self, response: &str) -> bool {
        match &self.required_response {
            Some(required) => response.trim() == required,
            None => is_affirmative(response),
        }
    }
}

/// Only an explicit `y` or `yes` approves a y/n prompt.
pub fn is_affirmative(response: &str) -> bool {
    matches!(response.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Per-call gate options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateOptions {
    /// Force prefix: skips the correction step only.
    pub forced: bool,
    /// Remote machine the command is headed for; shown in prompts.
    pub target: Option<String>,
}

impl GateOptions {
    pub fn forced() -> Self {
        Self {
            forced: true,
            target: None,
        }
    }

    pub fn on_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Details of an approved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clearance {
    /// Command to execute (may be a correction of the input).
    pub command: String,
    pub tier: Tier,
    /// Force prefix was used.
    pub forced: bool,
    /// The tier-4 token unlock completed.
    pub unlocked: bool,
    pub notes: Vec<Note>,
}

/// Gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved(Clearance),
    Denied {
        tier: Tier,
        failure: Failure,
        notes: Vec<Note>,
    },
}

impl Verdict {
    pub fn tier(&self) -> Tier {
        match self {
            Verdict::Approved(c) => c.tier,
            Verdict::Denied { tier, .. } => *tier,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved(_))
    }
}

/// The confirmation state machine and its capabilities.
#[derive(Clone)]
pub struct ConfirmationGate {
    corrector: Arc<dyn Corrector>,
    validator: Arc<dyn Validator>,
    prompter: Arc<dyn Prompter>,
}

impl ConfirmationGate {
    pub fn new(
        corrector: Arc<dyn Corrector>,
        validator: Arc<dyn Validator>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            corrector,
            validator,
            prompter,
        }
    }

    /// Classify `command` and run its tier's confirmation flow.
    pub async fn evaluate(
        &self,
        session: &SessionContext,
        command: &str,
        options: &GateOptions,
    ) -> Verdict {
        self.evaluate_inner(session, command, options, true).await
    }

    async fn evaluate_inner(
        &self,
        session: &SessionContext,
        command: &str,
        options: &GateOptions,
        allow_correction: bool,
    ) -> Verdict {
        let classification = classify(session, command);
        let tier = classification.tier;
        let mut notes = Vec::new();
        if classification.is_unknown() {
            debug!(command = %classification.name, %tier, "Unclassified command, default tier applied");
            notes.push(Note::ClassificationUnknown {
                command: classification.name.clone(),
                applied: tier,
            });
        }

        let correct = allow_correction && !options.forced;
        let prefs = &session.preferences;

        match tier {
            Tier::Instant => self.approve(command, tier, options, notes),

            Tier::AutoCorrect => {
                if correct
                    && let Some(corrected) = self
                        .try_correct(session, command, prefs.auto_correct_threshold)
                        .await
                {
                    notes.push(Note::Corrected {
                        original: command.to_string(),
                        corrected: corrected.clone(),
                    });
                    return self
                        .confirm_correction(session, command, &corrected, tier, options, notes)
                        .await;
                }
                self.approve(command, tier, options, notes)
            }

            Tier::AlwaysConfirm => {
                if correct
                    && let Some(corrected) = self
                        .try_correct(session, command, prefs.confirm_correct_threshold)
                        .await
                {
                    notes.push(Note::Corrected {
                        original: command.to_string(),
                        corrected: corrected.clone(),
                    });
                    return self
                        .confirm_correction(session, command, &corrected, tier, options, notes)
                        .await;
                }
                let request = ConfirmationRequest::yes_no(
                    tier,
                    command,
                    PromptKind::Execute,
                    format!("Execute: {command}?"),
                );
                self.prompt(request, options, notes)
            }

            Tier::Validate => {
                let report = self.advise(session, command).await;
                notes.push(Note::Advisory {
                    safe: report.safe,
                    warnings: report.warnings.clone(),
                });
                let message = if report.safe {
                    format!("Execute: {command}?")
                } else {
                    format!("POTENTIALLY UNSAFE - Execute anyway: {command}?")
                };
                let request = ConfirmationRequest::yes_no(
                    tier,
                    command,
                    PromptKind::ExecuteAnyway { advisory: report },
                    message,
                );
                self.prompt(request, options, notes)
            }

            Tier::Lockdown => self.lockdown(session, command, options, notes),
        }
    }

    fn approve(&self, command: &str, tier: Tier, options: &GateOptions, notes: Vec<Note>) -> Verdict {
        Verdict::Approved(Clearance {
            command: command.to_string(),
            tier,
            forced: options.forced,
            unlocked: false,
            notes,
        })
    }

    /// Ask the corrector; returns a correction above `threshold` that differs
    /// from the input.
    async fn try_correct(
        &self,
        session: &SessionContext,
        command: &str,
        threshold: f64,
    ) -> Option<String> {
        let correction = self
            .corrector
            .correct(command, &session.preferences.shell_name)
            .await?;
        let corrected = correction.corrected.trim();
        if corrected.is_empty() || corrected == command.trim() {
            return None;
        }
        if correction.confidence < threshold {
            debug!(
                original = %command,
                corrected = %corrected,
                confidence = correction.confidence,
                threshold,
                "Correction below threshold, ignored"
            );
            return None;
        }
        Some(corrected.to_string())
    }

    /// Handle a correction for tiers 2 and 2.5.
    ///
    /// A correction that lands in a stricter tier is gated at that tier.
    async fn confirm_correction(
        &self,
        session: &SessionContext,
        original: &str,
        corrected: &str,
        tier: Tier,
        options: &GateOptions,
        notes: Vec<Note>,
    ) -> Verdict {
        let corrected_tier = classify(session, corrected).tier;
        if corrected_tier > tier {
            info!(
                original = %original,
                corrected = %corrected,
                %corrected_tier,
                "Correction is stricter than the original, re-gating"
            );
            let verdict = Box::pin(self.evaluate_inner(session, corrected, options, false)).await;
            return with_notes(verdict, notes);
        }

        if tier == Tier::AutoCorrect && session.preferences.auto_correct_execute {
            info!(original = %original, corrected = %corrected, "Auto-correcting");
            return self.approve(corrected, tier, options, notes);
        }

        let request = ConfirmationRequest::yes_no(
            tier,
            corrected,
            PromptKind::ExecuteCorrected {
                original: original.to_string(),
            },
            format!("Execute corrected version? {corrected} (was: {original})"),
        );
        self.prompt(request, options, notes)
    }

    /// Consult the validator. Every failure produces an unsafe advisory.
    async fn advise(&self, session: &SessionContext, command: &str) -> ValidationReport {
        let call = self
            .validator
            .validate(command, &session.preferences.shell_name);
        match tokio::time::timeout(session.preferences.validation_timeout, call).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(command = %command, error = %e, "Validation failed, requiring manual confirmation");
                ValidationReport::unavailable(e.to_string())
            }
            Err(_) => {
                warn!(
                    command = %command,
                    timeout_ms = %session.preferences.validation_timeout.as_millis(),
                    "Validation timed out, requiring manual confirmation"
                );
                ValidationReport::unavailable("timed out")
            }
        }
    }

    fn lockdown(
        &self,
        session: &SessionContext,
        command: &str,
        options: &GateOptions,
        notes: Vec<Note>,
    ) -> Verdict {
        if !session.preferences.lockdown_override {
            warn!(command = %command, "Tier 4 command blocked");
            return Verdict::Denied {
                tier: Tier::Lockdown,
                failure: Failure::blocked("Command too dangerous (tier 4 lockdown)"),
                notes,
            };
        }

        let request = ConfirmationRequest::unlock(command).for_target(options.target.as_deref());
        match self.prompter.ask(&request) {
            Ok(response) if request.accepts(&response) => {
                warn!(
                    session_id = %session.session_id,
                    command = %command,
                    target = ?options.target,
                    timestamp = %Utc::now().to_rfc3339(),
                    "Tier 4 unlock completed"
                );
                Verdict::Approved(Clearance {
                    command: command.to_string(),
                    tier: Tier::Lockdown,
                    forced: true,
                    unlocked: true,
                    notes,
                })
            }
            Ok(_) => {
                warn!(command = %command, "Tier 4 unlock token mismatch");
                Verdict::Denied {
                    tier: Tier::Lockdown,
                    failure: Failure::declined("unlock token did not match"),
                    notes,
                }
            }
            Err(e) => Verdict::Denied {
                tier: Tier::Lockdown,
                failure: Failure::declined(format!("no confirmation ({e})")),
                notes,
            },
        }
    }

    /// Ask the prompter and turn the answer into a verdict.
    fn prompt(
        &self,
        request: ConfirmationRequest,
        options: &GateOptions,
        notes: Vec<Note>,
    ) -> Verdict {
        let request = request.for_target(options.target.as_deref());
        let tier = request.tier;
        match self.prompter.ask(&request) {
            Ok(response) if request.accepts(&response) => {
                debug!(command = %request.command, %tier, "Confirmed");
                self.approve(&request.command, tier, options, notes)
            }
            Ok(response) => {
                debug!(command = %request.command, response = %response.trim(), "Declined");
                Verdict::Denied {
                    tier,
                    failure: Failure::declined("user declined"),
                    notes,
                }
            }
            Err(e) => {
                warn!(command = %request.command, error = %e, "Prompt failed, treating as decline");
                Verdict::Denied {
                    tier,
                    failure: Failure::declined(format!("no confirmation ({e})")),
                    notes,
                }
            }
        }
    }
}

fn with_notes(verdict: Verdict, mut prefix: Vec<Note>) -> Verdict {
    match verdict {
        Verdict::Approved(mut c) => {
            prefix.append(&mut c.notes);
            c.notes = prefix;
            Verdict::Approved(c)
        }
        Verdict::Denied {
            tier,
            failure,
            mut notes,
        } => {
            prefix.append(&mut notes);
            Verdict::Denied {
                tier,
                failure,
                notes: prefix,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailingValidator, MockCorrector, MockValidator, ScriptedPrompter};
    use crate::types::Preferences;
    use std::time::Duration;

    fn gate_with(prompter: Arc<ScriptedPrompter>) -> ConfirmationGate {
        ConfirmationGate::new(
            Arc::new(MockCorrector::default()),
            Arc::new(MockValidator::safe()),
            prompter,
        )
    }

    fn session() -> SessionContext {
        SessionContext::default()
    }

    #[test]
    fn test_affirmative_parsing() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES\n"));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("yep"));
    }

    #[test]
    fn test_unlock_token_is_one_time() {
        let a = ConfirmationRequest::unlock("rm -rf /");
        let b = ConfirmationRequest::unlock("rm -rf /");
        let token = a.token.as_deref().unwrap();
        assert_eq!(token.len(), TOKEN_HASH_LEN);
        assert!(a.message.contains(token));
        assert_ne!(a.required_response, b.required_response);
        assert!(!a.accepts("yes"));
        assert!(a.accepts(a.required_response.as_deref().unwrap()));
        assert!(!b.accepts(a.required_response.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn test_instant_never_prompts() {
        let prompter = Arc::new(ScriptedPrompter::new(Vec::<&str>::new()));
        let gate = gate_with(prompter.clone());
        let verdict = gate.evaluate(&session(), "ls -la", &GateOptions::default()).await;
        assert!(verdict.is_approved());
        assert_eq!(prompter.asked(), 0);
    }

    #[tokio::test]
    async fn test_validate_declined_on_n() {
        let prompter = Arc::new(ScriptedPrompter::new(["n"]));
        let gate = gate_with(prompter.clone());
        let verdict = gate.evaluate(&session(), "git push", &GateOptions::default()).await;
        match verdict {
            Verdict::Denied { tier, failure, .. } => {
                assert_eq!(tier, Tier::Validate);
                assert!(matches!(failure, Failure::ConfirmationDeclined { .. }));
            }
            other => panic!("expected denial, got {other:?}"),
        }
        assert_eq!(prompter.asked(), 1);
    }

    #[tokio::test]
    async fn test_validate_approved_on_y() {
        let prompter = Arc::new(ScriptedPrompter::new(["y"]));
        let gate = gate_with(prompter.clone());
        let verdict = gate.evaluate(&session(), "git status", &GateOptions::default()).await;
        assert!(verdict.is_approved());
    }

    #[tokio::test]
    async fn test_validate_prompt_shown_even_when_forced() {
        let prompter = Arc::new(ScriptedPrompter::new(["n"]));
        let gate = gate_with(prompter.clone());
        let verdict = gate
            .evaluate(&session(), "git push", &GateOptions::forced())
            .await;
        assert!(!verdict.is_approved());
        assert_eq!(prompter.asked(), 1);
    }

    #[tokio::test]
    async fn test_validator_failure_fails_closed() {
        let prompter = Arc::new(ScriptedPrompter::new(["n"]));
        let gate = ConfirmationGate::new(
            Arc::new(MockCorrector::default()),
            Arc::new(FailingValidator),
            prompter.clone(),
        );
        let verdict = gate.evaluate(&session(), "cp a b", &GateOptions::default()).await;
        assert!(!verdict.is_approved());
        let requests = prompter.requests();
        match &requests[0].kind {
            PromptKind::ExecuteAnyway { advisory } => {
                assert!(!advisory.safe);
                assert!(advisory.warnings[0].contains("unavailable"));
            }
            other => panic!("unexpected prompt {other:?}"),
        }
        assert!(requests[0].message.contains("POTENTIALLY UNSAFE"));
    }

    #[tokio::test]
    async fn test_validator_timeout_fails_closed() {
        let prompter = Arc::new(ScriptedPrompter::new(["y"]));
        let gate = ConfirmationGate::new(
            Arc::new(MockCorrector::default()),
            Arc::new(MockValidator::safe().with_delay(Duration::from_millis(200))),
            prompter.clone(),
        );
        let mut s = session();
        s.preferences.validation_timeout = Duration::from_millis(10);
        let verdict = gate.evaluate(&s, "cp a b", &GateOptions::default()).await;
        // Still a real prompt; the answer decides.
        assert!(verdict.is_approved());
        let requests = prompter.requests();
        assert!(matches!(
            &requests[0].kind,
            PromptKind::ExecuteAnyway { advisory } if !advisory.safe
        ));
    }

    #[tokio::test]
    async fn test_lockdown_blocks_without_prompt() {
        let prompter = Arc::new(ScriptedPrompter::new(["y"]));
        let gate = gate_with(prompter.clone());
        let verdict = gate.evaluate(&session(), "rm -rf /", &GateOptions::default()).await;
        assert!(matches!(
            verdict,
            Verdict::Denied {
                failure: Failure::ValidationBlocked { .. },
                ..
            }
        ));
        assert_eq!(prompter.asked(), 0);
    }

    #[tokio::test]
    async fn test_lockdown_unlock_requires_exact_token() {
        let mut s = session();
        s.preferences.lockdown_override = true;

        let prompter = Arc::new(ScriptedPrompter::new(["yes"]));
        let gate = gate_with(prompter.clone());
        let verdict = gate.evaluate(&s, "rm -rf /tmp/x", &GateOptions::default()).await;
        assert!(matches!(
            verdict,
            Verdict::Denied {
                failure: Failure::ConfirmationDeclined { .. },
                ..
            }
        ));

        let prompter = Arc::new(ScriptedPrompter::echo_unlock_token());
        let gate = gate_with(prompter.clone());
        match gate.evaluate(&s, "rm -rf /tmp/x", &GateOptions::default()).await {
            Verdict::Approved(c) => {
                assert!(c.unlocked);
                assert!(c.forced);
                assert_eq!(c.tier, Tier::Lockdown);
            }
            other => panic!("expected unlock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auto_correct_prompts_by_default() {
        let prompter = Arc::new(ScriptedPrompter::new(["y"]));
        let gate = ConfirmationGate::new(
            Arc::new(MockCorrector::default().with("grp", "grep", 0.95)),
            Arc::new(MockValidator::safe()),
            prompter.clone(),
        );
        let mut s = session();
        s.tiers = crate::tier::TierAssignment::from_table(vec![(
            Tier::AutoCorrect,
            vec!["grp".to_string(), "grep".to_string()],
        )]);
        match gate.evaluate(&s, "grp foo", &GateOptions::default()).await {
            Verdict::Approved(c) => assert_eq!(c.command, "grep foo"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(prompter.asked(), 1);
    }

    #[tokio::test]
    async fn test_auto_correct_executes_when_preferred() {
        let prompter = Arc::new(ScriptedPrompter::new(Vec::<&str>::new()));
        let gate = ConfirmationGate::new(
            Arc::new(MockCorrector::default().with("grp", "grep", 0.95)),
            Arc::new(MockValidator::safe()),
            prompter.clone(),
        );
        let prefs = Preferences {
            auto_correct_execute: true,
            ..Preferences::default()
        };
        let tiers = crate::tier::TierAssignment::from_table(vec![(
            Tier::AutoCorrect,
            vec!["grp".to_string(), "grep".to_string()],
        )]);
        let s = SessionContext::new(tiers, prefs);
        match gate.evaluate(&s, "grp foo", &GateOptions::default()).await {
            Verdict::Approved(c) => assert_eq!(c.command, "grep foo"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(prompter.asked(), 0);
    }

    #[tokio::test]
    async fn test_force_skips_correction() {
        let prompter = Arc::new(ScriptedPrompter::new(Vec::<&str>::new()));
        let gate = ConfirmationGate::new(
            Arc::new(MockCorrector::default().with("sort", "sort -u", 0.99)),
            Arc::new(MockValidator::safe()),
            prompter.clone(),
        );
        match gate
            .evaluate(&session(), "sort names.txt", &GateOptions::forced())
            .await
        {
            Verdict::Approved(c) => {
                assert_eq!(c.command, "sort names.txt");
                assert!(c.forced);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_correction_into_stricter_tier_is_regated() {
        let prompter = Arc::new(ScriptedPrompter::new(["y"]));
        // A hostile corrector turns a tier-2 command into a tier-4 one.
        let gate = ConfirmationGate::new(
            Arc::new(MockCorrector::default().with("head", "rm", 0.99)),
            Arc::new(MockValidator::safe()),
            prompter.clone(),
        );
        let verdict = gate.evaluate(&session(), "head -rf /", &GateOptions::default()).await;
        match verdict {
            Verdict::Denied { tier, failure, .. } => {
                assert_eq!(tier, Tier::Lockdown);
                assert!(matches!(failure, Failure::ValidationBlocked { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(prompter.asked(), 0);
    }

    #[tokio::test]
    async fn test_always_confirm_prompt_never_skipped() {
        let prompter = Arc::new(ScriptedPrompter::new(["n"]));
        let gate = gate_with(prompter.clone());
        let prefs = Preferences {
            auto_correct_execute: true,
            ..Preferences::default()
        };
        let s = SessionContext::new(crate::tier::TierAssignment::default(), prefs);
        let verdict = gate.evaluate(&s, "find . -name x", &GateOptions::default()).await;
        assert!(!verdict.is_approved());
        assert_eq!(prompter.asked(), 1);
    }

    #[tokio::test]
    async fn test_prompt_error_is_decline() {
        let prompter = Arc::new(ScriptedPrompter::closed());
        let gate = gate_with(prompter);
        let verdict = gate.evaluate(&session(), "sed -i s/a/b/ f", &GateOptions::default()).await;
        assert!(matches!(
            verdict,
            Verdict::Denied {
                failure: Failure::ConfirmationDeclined { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_command_noted() {
        let prompter = Arc::new(ScriptedPrompter::new(["y"]));
        let gate = gate_with(prompter);
        match gate.evaluate(&session(), "frobnicate", &GateOptions::default()).await {
            Verdict::Approved(c) => {
                assert_eq!(c.tier, Tier::Validate);
                assert!(c.notes.iter().any(|n| matches!(n, Note::ClassificationUnknown { .. })));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
