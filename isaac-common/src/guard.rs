//! The only path from user input to an execution adapter.
//!
//! [`BypassGuard`] owns the shell adapter, the remote adapter and the session
//! logger. Nothing else in the crate holds them, so every entry path (direct,
//! forced, device, translated, pipeline segment) has to come through
//! [`BypassGuard::gated_execute`] or [`BypassGuard::gated_remote`], and both
//! run the confirmation gate first.

use crate::adapters::{
    RemoteRoutingAdapter, SessionLogger, SessionRecord, ShellError, ShellExecutionAdapter,
};
use crate::error::Failure;
use crate::gate::{Clearance, ConfirmationGate, GateOptions, Verdict};
use crate::remote::{DispatchStrategy, MachineId, RoutingError};
use crate::tier::Tier;
use crate::types::{CommandResult, Note, SessionContext};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Proof that the gate approved a command.
///
/// Only [`BypassGuard::authorize`] can build one; the adapters are only
/// reachable through methods that take it.
struct Approval {
    clearance: Clearance,
}

impl Approval {
    fn command(&self) -> &str {
        &self.clearance.command
    }
}

/// Result of a gated local execution.
#[derive(Debug, Clone)]
pub struct GatedOutput {
    pub result: CommandResult,
    /// Raw bytes produced by the command (empty when nothing ran).
    pub raw: Vec<u8>,
}

/// Gate plus the adapters it protects.
pub struct BypassGuard {
    gate: ConfirmationGate,
    shell: Arc<dyn ShellExecutionAdapter>,
    remote: Arc<dyn RemoteRoutingAdapter>,
    logger: Arc<dyn SessionLogger>,
}

impl BypassGuard {
    pub fn new(
        gate: ConfirmationGate,
        shell: Arc<dyn ShellExecutionAdapter>,
        remote: Arc<dyn RemoteRoutingAdapter>,
        logger: Arc<dyn SessionLogger>,
    ) -> Self {
        Self {
            gate,
            shell,
            remote,
            logger,
        }
    }

    /// Name of the local shell family.
    pub fn shell_name(&self) -> &str {
        self.shell.name()
    }

    /// Expand a device alias. Resolution never executes anything.
    pub fn resolve_targets(
        &self,
        alias: &str,
        strategy: Option<DispatchStrategy>,
    ) -> Result<Vec<MachineId>, RoutingError> {
        self.remote.resolve(alias, strategy)
    }

    /// Record an outcome that never reached the gate.
    pub fn record(&self, session: &SessionContext, input: &str, result: &CommandResult) {
        self.log(session, input, result, None);
    }

    /// Gate `command`, then run it locally.
    pub async fn gated_execute(
        &self,
        session: &SessionContext,
        command: &str,
        options: &GateOptions,
        stdin: Option<Vec<u8>>,
    ) -> GatedOutput {
        let approval = match self.authorize(session, command, options).await {
            Ok(approval) => approval,
            Err(denied) => {
                self.log(session, command, &denied, None);
                return GatedOutput {
                    result: denied,
                    raw: Vec::new(),
                };
            }
        };

        let output = self
            .run_local(&approval, stdin, session.preferences.command_timeout)
            .await;
        self.log(session, command, &output.result, None);
        output
    }

    /// Gate `command` once per target, then fan out to the approved targets.
    ///
    /// Every target gets its own verdict; a denial on one target never stops
    /// the gate from asking about the others, and never runs anything there.
    pub async fn gated_remote(
        &self,
        session: &SessionContext,
        command: &str,
        options: &GateOptions,
        targets: &[MachineId],
    ) -> CommandResult {
        if targets.is_empty() {
            let result = CommandResult::failed(Failure::RoutingFailure {
                target: String::new(),
                reason: "no targets to run on".to_string(),
            });
            self.log(session, command, &result, None);
            return result;
        }
        let mut slots: Vec<Option<CommandResult>> = vec![None; targets.len()];
        let mut approved: Vec<(usize, Approval)> = Vec::new();

        for (idx, target) in targets.iter().enumerate() {
            let per_target = options.clone().on_target(target.as_str());
            match self.authorize(session, command, &per_target).await {
                Ok(approval) => approved.push((idx, approval)),
                Err(denied) => {
                    let denied = denied.with_note(Note::Remote {
                        machine: target.to_string(),
                    });
                    self.log(session, command, &denied, Some(target));
                    slots[idx] = Some(denied);
                }
            }
        }

        // Corrections may differ per target; dispatch each distinct command once.
        let mut by_command: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (pos, (_, approval)) in approved.iter().enumerate() {
            by_command
                .entry(approval.command().to_string())
                .or_default()
                .push(pos);
        }

        for (approved_command, positions) in by_command {
            let ids: Vec<MachineId> = positions
                .iter()
                .map(|&pos| targets[approved[pos].0].clone())
                .collect();
            info!(
                command = %approved_command,
                targets = ids.len(),
                "Dispatching to remote targets"
            );
            let results = self
                .remote
                .execute_with_strategy(
                    &ids,
                    &approved_command,
                    session.preferences.command_timeout,
                    session.preferences.max_parallel_remote,
                )
                .await;

            let mut results = results.into_iter();
            for pos in positions {
                let (idx, approval) = &approved[pos];
                let target = &targets[*idx];
                let result = results.next().unwrap_or_else(|| {
                    warn!(machine = %target, "Remote adapter returned no result");
                    CommandResult::failed(Failure::RoutingFailure {
                        target: target.to_string(),
                        reason: "no result from remote adapter".to_string(),
                    })
                });
                let result = annotate(result, &approval.clearance).with_note(Note::Remote {
                    machine: target.to_string(),
                });
                self.log(session, command, &result, Some(target));
                slots[*idx] = Some(result);
            }
        }

        aggregate(slots.into_iter().flatten().collect())
    }

    /// Run the gate. Denials come back as a finished result.
    async fn authorize(
        &self,
        session: &SessionContext,
        command: &str,
        options: &GateOptions,
    ) -> Result<Approval, CommandResult> {
        match self.gate.evaluate(session, command, options).await {
            Verdict::Approved(clearance) => {
                debug!(command = %clearance.command, tier = %clearance.tier, "Approved");
                Ok(Approval { clearance })
            }
            Verdict::Denied {
                tier,
                failure,
                notes,
            } => {
                warn!(command = %command, %tier, reason = %failure, "Denied");
                Err(CommandResult::failed(failure)
                    .with_tier(tier)
                    .with_forced(options.forced)
                    .with_notes(notes))
            }
        }
    }

    async fn run_local(
        &self,
        approval: &Approval,
        stdin: Option<Vec<u8>>,
        timeout: std::time::Duration,
    ) -> GatedOutput {
        info!(
            command = %approval.command(),
            tier = %approval.clearance.tier,
            shell = %self.shell.name(),
            "Executing"
        );
        let (result, raw) = match self.shell.execute(approval.command(), stdin, timeout).await {
            Ok(out) if out.success => {
                let mut result = CommandResult::ok(out.text());
                result.exit_code = out.exit_code;
                (result, out.output)
            }
            Ok(out) => {
                let mut result = CommandResult::failed(Failure::ExecutionFailure {
                    exit_code: out.exit_code,
                });
                let text = out.text();
                if !text.trim().is_empty() {
                    result.output = text;
                }
                (result, out.output)
            }
            Err(ShellError::Timeout(after)) => {
                warn!(command = %approval.command(), "Execution timed out");
                (
                    CommandResult::failed(Failure::ExecutionTimeout {
                        timeout_secs: after.as_secs(),
                    }),
                    Vec::new(),
                )
            }
            Err(e @ ShellError::Spawn(_)) => {
                let mut result = CommandResult::failed(Failure::ExecutionFailure { exit_code: -1 });
                result.output = e.to_string();
                (result, Vec::new())
            }
        };
        GatedOutput {
            result: annotate(result, &approval.clearance),
            raw,
        }
    }

    fn log(
        &self,
        session: &SessionContext,
        command: &str,
        result: &CommandResult,
        machine: Option<&MachineId>,
    ) {
        self.logger.record(&SessionRecord {
            timestamp: Utc::now(),
            session_id: session.session_id,
            command: command.to_string(),
            tier: result.tier,
            forced: result.forced,
            result: result.clone(),
            machine: machine.map(ToString::to_string),
        });
    }
}

fn annotate(result: CommandResult, clearance: &Clearance) -> CommandResult {
    result
        .with_tier(clearance.tier)
        .with_forced(clearance.forced)
        .with_notes(clearance.notes.iter().cloned())
}

/// Fold per-target results into one. Succeeds only when every target did.
fn aggregate(mut results: Vec<CommandResult>) -> CommandResult {
    if results.len() == 1 {
        return results.remove(0);
    }
    let Some(first_failure) = results.iter().find_map(|r| r.failure.clone()) else {
        let mut combined = CommandResult::ok(join_outputs(&results));
        combined.tier = strictest_tier(&results);
        combined.forced = results.iter().any(|r| r.forced);
        combined.notes = results.iter().flat_map(|r| r.notes.clone()).collect();
        return combined;
    };

    let mut combined = CommandResult::failed(first_failure);
    combined.output = join_outputs(&results);
    combined.tier = strictest_tier(&results);
    combined.forced = results.iter().any(|r| r.forced);
    combined.notes = results.iter().flat_map(|r| r.notes.clone()).collect();
    combined
}

fn join_outputs(results: &[CommandResult]) -> String {
    results
        .iter()
        .map(|r| {
            let machine = r
                .notes
                .iter()
                .find_map(|n| match n {
                    Note::Remote { machine } => Some(machine.as_str()),
                    _ => None,
                })
                .unwrap_or("?");
            format!("[{machine}] {}", r.output.trim_end())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Highest tier among results, for summaries.
pub fn strictest_tier(results: &[CommandResult]) -> Option<Tier> {
    results.iter().filter_map(|r| r.tier).max()
}
