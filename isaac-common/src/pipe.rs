//! Hybrid pipelines: internal commands and native commands joined by `|`.
//!
//! Native segments go through the guard one at a time, left to right, with
//! the previous blob on stdin. Internal segments transform blobs in-process.
//! The first denial, failure or error blob aborts the rest.

use crate::blob::{Blob, BlobContent};
use crate::classify::classify;
use crate::error::Failure;
use crate::gate::GateOptions;
use crate::guard::BypassGuard;
use crate::input::{
    DEVICE_PREFIX, InternalInvocation, parse_internal, split_pipeline, strip_force_prefix,
};
use crate::registry::CommandRegistry;
use crate::tier::Tier;
use crate::types::{CommandResult, Note, SessionContext};
use tracing::{debug, info, warn};

/// What runs a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    Internal(InternalInvocation),
    Native { command: String, forced: bool },
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSegment {
    pub index: usize,
    pub raw: String,
    pub kind: SegmentKind,
    /// Every segment after the first reads the previous output.
    pub takes_input: bool,
}

impl PipelineSegment {
    fn abort(&self, cause: Failure) -> Failure {
        Failure::PipelineAborted {
            segment_index: self.index,
            segment: self.raw.clone(),
            cause: Box::new(cause),
        }
    }
}

/// Split and parse a pipeline.
pub fn plan(input: &str) -> Result<Vec<PipelineSegment>, Failure> {
    let parts = split_pipeline(input)?;
    parts
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let kind = segment_kind(&raw)?;
            Ok(PipelineSegment {
                index,
                raw,
                kind,
                takes_input: index > 0,
            })
        })
        .collect()
}

fn segment_kind(raw: &str) -> Result<SegmentKind, Failure> {
    if raw.starts_with(DEVICE_PREFIX) {
        return Err(Failure::malformed(
            "Device routing is not supported inside a pipeline",
            "run the whole pipeline remotely: !<alias> sh -c '<pipeline>'",
        ));
    }
    if let Some(stripped) = strip_force_prefix(raw) {
        return Ok(SegmentKind::Native {
            command: stripped?.to_string(),
            forced: true,
        });
    }
    if let Some(invocation) = parse_internal(raw) {
        return Ok(SegmentKind::Internal(invocation));
    }
    Ok(SegmentKind::Native {
        command: raw.to_string(),
        forced: false,
    })
}

/// Runs planned pipelines against a guard and a command registry.
pub struct PipeEngine<'a> {
    guard: &'a BypassGuard,
    registry: &'a CommandRegistry,
}

impl<'a> PipeEngine<'a> {
    pub fn new(guard: &'a BypassGuard, registry: &'a CommandRegistry) -> Self {
        Self { guard, registry }
    }

    /// Parse and run `input`.
    pub async fn run(&self, session: &mut SessionContext, input: &str) -> CommandResult {
        match plan(input) {
            Ok(segments) => self.execute(session, &segments).await,
            Err(failure) => CommandResult::failed(failure),
        }
    }

    /// Reject the pipeline up front when a native segment is tier 4 and the
    /// unlock is disabled, so no earlier segment runs for nothing.
    fn preflight(&self, session: &SessionContext, segments: &[PipelineSegment]) -> Option<Failure> {
        if session.preferences.lockdown_override {
            return None;
        }
        segments.iter().find_map(|segment| match &segment.kind {
            SegmentKind::Native { command, .. }
                if classify(session, command).tier == Tier::Lockdown =>
            {
                warn!(segment = %segment.raw, index = segment.index, "Pipeline preflight blocked");
                Some(segment.abort(Failure::blocked("Command too dangerous (tier 4 lockdown)")))
            }
            _ => None,
        })
    }

    pub async fn execute(
        &self,
        session: &mut SessionContext,
        segments: &[PipelineSegment],
    ) -> CommandResult {
        if let Some(failure) = self.preflight(session, segments) {
            return CommandResult::failed(failure).with_tier(Tier::Lockdown);
        }

        debug!(segments = segments.len(), "Running pipeline");
        let mut blob: Option<Blob> = None;
        let mut notes: Vec<Note> = Vec::new();
        let mut tier: Option<Tier> = None;
        let mut forced = false;
        let mut exit_requested = false;

        for segment in segments {
            let input = if segment.takes_input { blob.take() } else { None };
            let produced = match &segment.kind {
                SegmentKind::Internal(invocation) => {
                    match self.registry.dispatch(session, invocation, input) {
                        Ok(out) => {
                            exit_requested |= out.exit_requested;
                            out.blob.with_source(segment.index)
                        }
                        Err(failure) => {
                            return aborted(segment.abort(failure), tier, forced, notes);
                        }
                    }
                }
                SegmentKind::Native {
                    command,
                    forced: segment_forced,
                } => {
                    let options = GateOptions {
                        forced: *segment_forced,
                        target: None,
                    };
                    let stdin = input.map(|b| b.to_stdin());
                    let out = self
                        .guard
                        .gated_execute(session, command, &options, stdin)
                        .await;
                    tier = tier.max(out.result.tier);
                    forced |= out.result.forced;
                    notes.extend(out.result.notes.iter().cloned());
                    if !out.result.success {
                        let cause = out
                            .result
                            .failure
                            .clone()
                            .unwrap_or(Failure::ExecutionFailure {
                                exit_code: out.result.exit_code,
                            });
                        return aborted(segment.abort(cause), tier, forced, notes);
                    }
                    Blob::from_output(out.raw)
                        .with_source(segment.index)
                        .with_exit_code(out.result.exit_code)
                        .with_shell(self.guard.shell_name())
                }
            };

            if let BlobContent::Error(message) = &produced.content {
                let cause = Failure::malformed(
                    message.clone(),
                    "check the data produced by the previous segment",
                );
                return aborted(segment.abort(cause), tier, forced, notes);
            }
            blob = Some(produced);
        }

        info!(segments = segments.len(), "Pipeline completed");
        let output = blob.map(|b| b.render()).unwrap_or_default();
        let mut result = CommandResult::ok(output).with_forced(forced).with_notes(notes);
        result.tier = tier;
        result.exit_requested = exit_requested;
        result
    }
}

fn aborted(failure: Failure, tier: Option<Tier>, forced: bool, notes: Vec<Note>) -> CommandResult {
    warn!(reason = %failure, "Pipeline aborted");
    let mut result = CommandResult::failed(failure).with_forced(forced).with_notes(notes);
    result.tier = tier;
    result
}
