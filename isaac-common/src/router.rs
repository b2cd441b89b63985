//! Input dispatch.
//!
//! Order of checks:
//! 0. empty input, bare `exit`/`quit`
//! 1. pipelines (unquoted `|`)
//! 2. force prefix (`/f`, `/force`)
//! 3. device routing (`!alias`)
//! 4. internal commands (`/name`)
//! 5. natural language (`isaac <query>`)
//! 6. direct shell commands
//!
//! Every branch that executes something ends in the [`BypassGuard`].
//! Translated commands re-enter at step 0 but may not run internal commands.

use crate::adapters::NaturalLanguageTranslationAdapter;
use crate::error::Failure;
use crate::gate::GateOptions;
use crate::guard::BypassGuard;
use crate::input::{
    DEVICE_PREFIX, DeviceRoute, INTERNAL_PREFIX, has_unquoted_pipe, parse_device_route,
    parse_internal, strip_force_prefix,
};
use crate::nl::{TranslationOutcome, looks_like_natural_language, strip_keyword, translate};
use crate::pipe::{PipeEngine, SegmentKind, plan};
use crate::registry::CommandRegistry;
use crate::types::{CommandResult, Note, SessionContext};
use std::sync::Arc;
use tracing::{debug, info};

/// Routes raw input to the pipe engine, the registry, the translator or the
/// guard.
pub struct CommandRouter {
    guard: BypassGuard,
    registry: CommandRegistry,
    translator: Arc<dyn NaturalLanguageTranslationAdapter>,
}

impl CommandRouter {
    pub fn new(guard: BypassGuard, translator: Arc<dyn NaturalLanguageTranslationAdapter>) -> Self {
        Self {
            guard,
            registry: CommandRegistry::builtin(),
            translator,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Route one line of user input.
    pub async fn route(&self, session: &mut SessionContext, input: &str) -> CommandResult {
        self.route_at(session, input, 0).await
    }

    async fn route_at(&self, session: &mut SessionContext, input: &str, depth: u8) -> CommandResult {
        let input = input.trim();
        if input.is_empty() {
            return CommandResult::ok("");
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            return self.finish(
                session,
                input,
                CommandResult::failed(Failure::malformed(
                    format!("'{input}' is not sent to the shell"),
                    "use /exit to end the session",
                )),
            );
        }

        if depth > 0 && invokes_internal(input) {
            let failure = Failure::TranslationFailure {
                reason: format!("translated command '{input}' may not run internal commands"),
            };
            return self.finish(session, input, CommandResult::failed(failure));
        }

        if has_unquoted_pipe(input) {
            debug!(input, "Routing as pipeline");
            let result = PipeEngine::new(&self.guard, &self.registry)
                .run(session, input)
                .await;
            return self.finish(session, input, result);
        }

        if let Some(stripped) = strip_force_prefix(input) {
            let command = match stripped {
                Ok(command) => command,
                Err(failure) => return self.finish(session, input, CommandResult::failed(failure)),
            };
            debug!(command, "Routing forced command");
            return self.route_forced(session, input, command).await;
        }

        if let Some(parsed) = parse_device_route(input) {
            return match parsed {
                Ok(route) => self.route_device(session, route, false).await,
                Err(failure) => self.finish(session, input, CommandResult::failed(failure)),
            };
        }

        if let Some(invocation) = parse_internal(input) {
            let result = match self.registry.dispatch(session, &invocation, None) {
                Ok(out) => {
                    let mut result = CommandResult::ok(out.blob.render());
                    result.exit_requested = out.exit_requested;
                    result
                }
                Err(failure) => CommandResult::failed(failure),
            };
            return self.finish(session, input, result);
        }

        let keyword = session.preferences.nl_keyword.clone();
        if let Some(query) = strip_keyword(input, &keyword) {
            return self.route_natural_language(session, input, query, depth).await;
        }
        if depth == 0 && looks_like_natural_language(input, session) {
            return self.finish(
                session,
                input,
                CommandResult::failed(Failure::malformed(
                    "This looks like a question, not a command",
                    format!("prefix it with '{keyword}', e.g. '{keyword} {input}'"),
                )),
            );
        }

        self.guard
            .gated_execute(session, input, &GateOptions::default(), None)
            .await
            .result
    }

    async fn route_forced(
        &self,
        session: &mut SessionContext,
        input: &str,
        command: &str,
    ) -> CommandResult {
        if let Some(parsed) = parse_device_route(command) {
            return match parsed {
                Ok(route) => self.route_device(session, route, true).await,
                Err(failure) => self.finish(session, input, CommandResult::failed(failure)),
            };
        }
        if command.starts_with(INTERNAL_PREFIX) {
            return self.finish(
                session,
                input,
                CommandResult::failed(Failure::malformed(
                    "The force prefix only applies to shell commands",
                    "drop /f for internal commands",
                )),
            );
        }
        self.guard
            .gated_execute(session, command, &GateOptions::forced(), None)
            .await
            .result
    }

    /// Resolve targets, gate per target, dispatch the approved ones.
    async fn route_device(
        &self,
        session: &mut SessionContext,
        route: DeviceRoute,
        forced: bool,
    ) -> CommandResult {
        let label = match route.strategy {
            Some(strategy) => format!("!{}:{strategy}", route.alias),
            None => format!("!{}", route.alias),
        };
        let input = format!("{label} {}", route.command);

        if route.command.starts_with(DEVICE_PREFIX) || route.command.starts_with(INTERNAL_PREFIX) {
            return self.finish(
                session,
                &input,
                CommandResult::failed(Failure::malformed(
                    "Remote commands must be shell commands",
                    "usage: !<alias>[:<strategy>] <command>",
                )),
            );
        }

        let targets = match self.guard.resolve_targets(&route.alias, route.strategy) {
            Ok(targets) => targets,
            Err(e) => {
                let failure = Failure::RoutingFailure {
                    target: route.alias.clone(),
                    reason: e.to_string(),
                };
                return self.finish(session, &input, CommandResult::failed(failure));
            }
        };

        info!(alias = %route.alias, targets = targets.len(), command = %route.command, "Device route");
        let options = GateOptions {
            forced,
            target: None,
        };
        self.guard
            .gated_remote(session, &route.command, &options, &targets)
            .await
    }

    async fn route_natural_language(
        &self,
        session: &mut SessionContext,
        input: &str,
        query: &str,
        depth: u8,
    ) -> CommandResult {
        if query.is_empty() {
            let keyword = &session.preferences.nl_keyword;
            let failure = Failure::malformed(
                "Nothing to translate",
                format!("usage: {keyword} <what you want to do>"),
            );
            return self.finish(session, input, CommandResult::failed(failure));
        }
        if depth >= session.preferences.max_translation_hops {
            let failure = Failure::TranslationFailure {
                reason: format!(
                    "translated output may not be translated again (limit {} hop(s))",
                    session.preferences.max_translation_hops
                ),
            };
            return self.finish(session, input, CommandResult::failed(failure));
        }

        match translate(self.translator.as_ref(), session, query).await {
            Ok(TranslationOutcome::Command { command, .. }) => {
                info!(query, command = %command, "Routing translated command");
                let mut result = Box::pin(self.route_at(session, &command, depth + 1)).await;
                result.notes.insert(
                    0,
                    Note::Translated {
                        query: query.to_string(),
                        command,
                    },
                );
                result
            }
            Ok(TranslationOutcome::ExplanationOnly(explanation)) => {
                self.finish(session, input, CommandResult::ok(explanation))
            }
            Err(failure) => self.finish(session, input, CommandResult::failed(failure)),
        }
    }

    /// Record a result that did not go through the guard's own logging.
    fn finish(&self, session: &SessionContext, input: &str, result: CommandResult) -> CommandResult {
        self.guard.record(session, input, &result);
        result
    }
}

/// Whether `input` runs a `/name` command, alone or as a pipeline segment.
fn invokes_internal(input: &str) -> bool {
    if has_unquoted_pipe(input) {
        return plan(input).is_ok_and(|segments| {
            segments
                .iter()
                .any(|segment| matches!(segment.kind, SegmentKind::Internal(_)))
        });
    }
    strip_force_prefix(input).is_none() && parse_internal(input).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Translation;
    use crate::gate::ConfirmationGate;
    use crate::mock::{
        MemoryLogger, MockCorrector, MockRemote, MockShell, MockTranslator, MockValidator,
        ScriptedPrompter,
    };
    use crate::remote::{Machine, MachineId, MachineRegistry};
    use crate::tier::Tier;

    struct Fixture {
        router: CommandRouter,
        shell: Arc<MockShell>,
        remote: Arc<MockRemote>,
        logger: Arc<MemoryLogger>,
        translator: Arc<MockTranslator>,
    }

    fn fixture(answers: &[&str], translator: MockTranslator) -> Fixture {
        let shell = Arc::new(MockShell::new());
        let mut registry = MachineRegistry::new();
        registry.register(Machine::new("prod", "10.0.0.9"));
        registry.register(Machine::new("web1", "10.0.1.1"));
        registry.register(Machine::new("web2", "10.0.1.2"));
        registry.define_group("web", vec![MachineId::new("web1"), MachineId::new("web2")]);
        let remote = Arc::new(MockRemote::new(registry));
        let logger = Arc::new(MemoryLogger::default());
        let translator = Arc::new(translator);
        let gate = ConfirmationGate::new(
            Arc::new(MockCorrector::default()),
            Arc::new(MockValidator::safe()),
            Arc::new(ScriptedPrompter::new(answers.iter().copied())),
        );
        let guard = BypassGuard::new(gate, shell.clone(), remote.clone(), logger.clone());
        Fixture {
            router: CommandRouter::new(guard, translator.clone()),
            shell,
            remote,
            logger,
            translator,
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "   ").await;
        assert!(result.success);
        assert!(f.shell.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_bare_exit_suggests_internal_command() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "EXIT").await;
        match result.failure {
            Some(Failure::Malformed { suggestion, .. }) => assert!(suggestion.contains("/exit")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!result.exit_requested);
        let result = f.router.route(&mut s, "/exit").await;
        assert!(result.exit_requested);
    }

    #[tokio::test]
    async fn test_direct_instant_command_runs() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "echo hello").await;
        assert!(result.success);
        assert_eq!(result.output, "hello\n");
        assert_eq!(result.tier, Some(Tier::Instant));
    }

    #[tokio::test]
    async fn test_force_prefix_marks_result() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "/f ls").await;
        assert!(result.success);
        assert!(result.forced);
        assert_eq!(f.shell.commands(), vec!["ls"]);

        let result = f.router.route(&mut s, "/force /help").await;
        assert!(matches!(result.failure, Some(Failure::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_device_route_unknown_target() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "!nowhere ls").await;
        assert!(matches!(result.failure, Some(Failure::RoutingFailure { .. })));
        assert!(f.remote.invocations().is_empty());
        assert_eq!(f.logger.records().len(), 1);
    }

    #[tokio::test]
    async fn test_device_route_group_broadcast() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "!web ls /var/log").await;
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(f.remote.invocations().len(), 2);
        assert!(result.output.contains("[web1]"));
        assert!(result.output.contains("[web2]"));
    }

    #[tokio::test]
    async fn test_device_route_strategy_selects_one() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "!web:round_robin pwd").await;
        assert!(result.success);
        assert_eq!(f.remote.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_internal_unknown_command() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "/frobnicate").await;
        assert!(matches!(result.failure, Some(Failure::UnknownCommand { .. })));
        assert!(f.shell.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_question_without_keyword_is_refused() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "show me the biggest files").await;
        match result.failure {
            Some(Failure::Malformed { suggestion, .. }) => assert!(suggestion.contains("isaac")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.translator.queries().is_empty());
        assert!(f.shell.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_translation_reenters_router() {
        let translator =
            MockTranslator::new().with("list files", Translation::command("ls -la"));
        let f = fixture(&[], translator);
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "isaac list files").await;
        assert!(result.success);
        assert_eq!(f.shell.commands(), vec!["ls -la"]);
        assert!(matches!(result.notes[0], Note::Translated { .. }));
    }

    #[tokio::test]
    async fn test_translation_hops_are_bounded() {
        let translator = MockTranslator::new()
            .with("loop", Translation::command("isaac loop again"))
            .with("loop again", Translation::command("ls"));
        let f = fixture(&[], translator);
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "isaac loop").await;
        assert!(matches!(
            result.failure,
            Some(Failure::TranslationFailure { .. })
        ));
        assert_eq!(f.translator.queries(), vec!["loop"]);
        assert!(f.shell.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_explanation_only_is_not_executed() {
        let translator = MockTranslator::new().with(
            "what does ls do",
            Translation {
                success: true,
                explanation: Some("ls lists directory contents".to_string()),
                ..Translation::default()
            },
        );
        let f = fixture(&[], translator);
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "isaac what does ls do").await;
        assert!(result.success);
        assert!(result.output.contains("lists directory"));
        assert!(f.shell.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_summary_is_logged() {
        let f = fixture(&[], MockTranslator::new());
        let mut s = SessionContext::default();
        let result = f.router.route(&mut s, "echo a | cat").await;
        assert!(result.success);
        let records = f.logger.records();
        // Two segments plus the pipeline summary.
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].command, "echo a | cat");
    }

    #[tokio::test]
    async fn test_quoted_and_escaped_rm_stays_locked_down() {
        let f = fixture(&["y", "y", "y", "y", "y", "y"], MockTranslator::new());
        let mut s = SessionContext::default();
        for input in [r"\rm -rf /", "\"rm\" -rf /", "'rm' -rf /"] {
            let result = f.router.route(&mut s, input).await;
            assert_eq!(result.tier, Some(Tier::Lockdown), "{input}");
            assert!(result.was_blocked(), "{input}");
        }
        assert!(f.shell.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_translation_may_not_change_tiers() {
        let translator = MockTranslator::new()
            .with("make copying easy", Translation::command("/tier set cp 1"))
            .with("count files", Translation::command("ls | /count"));
        let f = fixture(&["n"], translator);
        let mut s = SessionContext::default();

        let result = f.router.route(&mut s, "isaac make copying easy").await;
        assert!(matches!(
            result.failure,
            Some(Failure::TranslationFailure { .. })
        ));
        let result = f.router.route(&mut s, "isaac count files").await;
        assert!(matches!(
            result.failure,
            Some(Failure::TranslationFailure { .. })
        ));
        assert!(f.shell.invocations().is_empty());

        let result = f.router.route(&mut s, "cp -r /etc /tmp/x").await;
        assert_eq!(result.tier, Some(Tier::Validate));
        assert!(matches!(
            result.failure,
            Some(Failure::ConfirmationDeclined { .. })
        ));
        assert!(f.shell.invocations().is_empty());
    }
}
