//! Deterministic adapters for tests.
//!
//! Every mock records what it was asked to do so tests can assert that a
//! blocked command never reached an adapter.

use crate::adapters::{
    Correction, Corrector, NaturalLanguageTranslationAdapter, PromptError, Prompter,
    RemoteRoutingAdapter, SessionLogger, SessionRecord, ShellError, ShellExecutionAdapter,
    ShellOutput, Translation, ValidationReport, Validator,
};
use crate::classify::leading_token;
use crate::error::Failure;
use crate::gate::ConfirmationRequest;
use crate::remote::{DispatchStrategy, MachineId, MachineRegistry, RoutingError};
use crate::types::{CommandResult, SessionSnapshot};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Shell
// ============================================================================

/// A recorded shell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    pub command: String,
    pub stdin: Option<Vec<u8>>,
}

/// In-memory shell.
///
/// Responses are looked up by exact command, then by leading token. Without
/// a scripted response `echo` prints its arguments, `cat` copies stdin and
/// everything else succeeds silently.
#[derive(Debug, Default)]
pub struct MockShell {
    responses: Mutex<HashMap<String, (Vec<u8>, i32)>>,
    hanging: Mutex<HashSet<String>>,
    invocations: Mutex<Vec<ShellInvocation>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for an exact command or a leading token.
    pub fn respond(&self, key: &str, output: impl Into<Vec<u8>>, exit_code: i32) {
        lock(&self.responses).insert(key.to_string(), (output.into(), exit_code));
    }

    /// Make a command (or leading token) never finish.
    pub fn hang(&self, key: &str) {
        lock(&self.hanging).insert(key.to_string());
    }

    pub fn invocations(&self) -> Vec<ShellInvocation> {
        lock(&self.invocations).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.command).collect()
    }

    fn lookup(&self, command: &str) -> Option<(Vec<u8>, i32)> {
        let responses = lock(&self.responses);
        if let Some(hit) = responses.get(command.trim()) {
            return Some(hit.clone());
        }
        let token = leading_token(command)?;
        responses.get(&token).cloned()
    }

    fn hangs(&self, command: &str) -> bool {
        let hanging = lock(&self.hanging);
        hanging.contains(command.trim())
            || leading_token(command).is_some_and(|t| hanging.contains(&t))
    }
}

#[async_trait]
impl ShellExecutionAdapter for MockShell {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<ShellOutput, ShellError> {
        debug!(command, "MockShell: execute");
        lock(&self.invocations).push(ShellInvocation {
            command: command.to_string(),
            stdin: stdin.clone(),
        });

        if self.hangs(command) {
            tokio::time::sleep(timeout).await;
            return Err(ShellError::Timeout(timeout));
        }

        let (output, exit_code) = match self.lookup(command) {
            Some(hit) => hit,
            None => match leading_token(command).as_deref() {
                Some("echo") => {
                    let args = command.trim_start()[4..].trim();
                    (format!("{args}\n").into_bytes(), 0)
                }
                Some("cat") if stdin.is_some() => (stdin.unwrap_or_default(), 0),
                _ => (Vec::new(), 0),
            },
        };
        Ok(ShellOutput {
            success: exit_code == 0,
            output,
            exit_code,
        })
    }
}

// ============================================================================
// Remote
// ============================================================================

/// Remote adapter over an in-memory [`MachineRegistry`].
#[derive(Debug)]
pub struct MockRemote {
    registry: MachineRegistry,
    failing: Mutex<HashSet<String>>,
    invocations: Mutex<Vec<(MachineId, String)>>,
}

impl MockRemote {
    pub fn new(registry: MachineRegistry) -> Self {
        Self {
            registry,
            failing: Mutex::new(HashSet::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Make every command on `machine` exit with code 255.
    pub fn fail_on(&self, machine: &str) {
        lock(&self.failing).insert(machine.to_string());
    }

    pub fn invocations(&self) -> Vec<(MachineId, String)> {
        lock(&self.invocations).clone()
    }
}

#[async_trait]
impl RemoteRoutingAdapter for MockRemote {
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
        _timeout: Duration,
    ) -> CommandResult {
        lock(&self.invocations).push((machine.clone(), command.to_string()));
        if lock(&self.failing).contains(machine.as_str()) {
            return CommandResult::failed(Failure::ExecutionFailure { exit_code: 255 });
        }
        CommandResult::ok(format!("{command}: ok on {machine}"))
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Translator with a fixed query table.
#[derive(Debug, Default)]
pub struct MockTranslator {
    table: HashMap<String, Translation>,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, translation: Translation) -> Self {
        self.table.insert(query.trim().to_lowercase(), translation);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl NaturalLanguageTranslationAdapter for MockTranslator {
    async fn translate(
        &self,
        query: &str,
        _shell_name: &str,
        _session: &SessionSnapshot,
    ) -> Translation {
        lock(&self.queries).push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.table
            .get(&query.trim().to_lowercase())
            .cloned()
            .unwrap_or_else(|| Translation::failed(format!("no translation for '{query}'")))
    }
}

// ============================================================================
// Gate capabilities
// ============================================================================

/// Corrector that rewrites leading tokens from a fixed table.
#[derive(Debug, Default)]
pub struct MockCorrector {
    table: Vec<(String, String, f64)>,
}

impl MockCorrector {
    pub fn with(mut self, from: &str, to: &str, confidence: f64) -> Self {
        self.table
            .push((from.to_lowercase(), to.to_string(), confidence));
        self
    }
}

#[async_trait]
impl Corrector for MockCorrector {
    async fn correct(&self, command: &str, _shell_name: &str) -> Option<Correction> {
        let token = leading_token(command)?;
        let (_, to, confidence) = self.table.iter().find(|(from, _, _)| *from == token)?;
        let trimmed = command.trim_start();
        let rest = &trimmed[trimmed.find(char::is_whitespace).unwrap_or(trimmed.len())..];
        Some(Correction {
            original: command.to_string(),
            corrected: format!("{to}{rest}"),
            confidence: *confidence,
        })
    }
}

/// Validator returning a fixed report, optionally after a delay.
#[derive(Debug, Clone)]
pub struct MockValidator {
    report: ValidationReport,
    delay: Option<Duration>,
}

impl MockValidator {
    pub fn safe() -> Self {
        Self {
            report: ValidationReport {
                safe: true,
                ..ValidationReport::default()
            },
            delay: None,
        }
    }

    pub fn unsafe_with(warnings: &[&str]) -> Self {
        Self {
            report: ValidationReport {
                safe: false,
                warnings: warnings.iter().map(|w| w.to_string()).collect(),
                suggestions: Vec::new(),
            },
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Validator for MockValidator {
    async fn validate(&self, _command: &str, _shell_name: &str) -> anyhow::Result<ValidationReport> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.report.clone())
    }
}

/// Validator that is always offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingValidator;

#[async_trait]
impl Validator for FailingValidator {
    async fn validate(&self, _command: &str, _shell_name: &str) -> anyhow::Result<ValidationReport> {
        anyhow::bail!("validator offline")
    }
}

#[derive(Debug, Clone)]
enum Answer {
    Text(String),
    /// Reply with the required unlock response, or `y`.
    EchoToken,
}

/// Prompter that replays scripted answers and records every request.
///
/// Once the script runs out it behaves like a closed terminal.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Answer>>,
    repeat: Option<Answer>,
    requests: Mutex<Vec<ConfirmationRequest>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| Answer::Text(a.into())).collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `response`.
    pub fn always(response: &str) -> Self {
        Self {
            repeat: Some(Answer::Text(response.to_string())),
            ..Self::default()
        }
    }

    /// Always types the displayed unlock token (or `y` for y/n prompts).
    pub fn echo_unlock_token() -> Self {
        Self {
            repeat: Some(Answer::EchoToken),
            ..Self::default()
        }
    }

    /// No terminal at all.
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn asked(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        lock(&self.requests).clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, request: &ConfirmationRequest) -> Result<String, PromptError> {
        lock(&self.requests).push(request.clone());
        let answer = lock(&self.answers)
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or(PromptError::Closed)?;
        Ok(match answer {
            Answer::Text(text) => text,
            Answer::EchoToken => request
                .required_response
                .clone()
                .unwrap_or_else(|| "y".to_string()),
        })
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Session logger that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemoryLogger {
    pub fn records(&self) -> Vec<SessionRecord> {
        lock(&self.records).clone()
    }
}

impl SessionLogger for MemoryLogger {
    fn record(&self, record: &SessionRecord) {
        lock(&self.records).push(record.clone());
    }
}
