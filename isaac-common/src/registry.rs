//! Closed table of built-in `/` commands.
//!
//! Internal commands never reach a shell adapter. The transformers (`/grep`,
//! `/head`, `/count`, `/json`) take the previous pipeline blob as input.

use crate::blob::{Blob, BlobContent};
use crate::classify::classify;
use crate::error::Failure;
use crate::heuristics::closest;
use crate::input::InternalInvocation;
use crate::tier::{OverrideSource, Tier};
use crate::types::SessionContext;
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Default line count for `/head`.
pub const DEFAULT_HEAD_LINES: usize = 10;

/// What an internal command produced.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalOutput {
    pub blob: Blob,
    /// `/exit` and `/quit` end the session.
    pub exit_requested: bool,
}

impl InternalOutput {
    fn blob(blob: Blob) -> Self {
        Self {
            blob,
            exit_requested: false,
        }
    }

    fn text(s: impl Into<String>) -> Self {
        Self::blob(Blob::text(s))
    }
}

/// Arguments handed to a handler.
pub struct Invocation<'a> {
    pub session: &'a mut SessionContext,
    pub args: &'a [String],
    /// Previous pipeline output, if any.
    pub input: Option<Blob>,
    pub registry: &'a CommandRegistry,
}

type Handler = fn(Invocation<'_>) -> Result<InternalOutput, Failure>;

/// One registered command.
#[derive(Clone)]
pub struct InternalCommand {
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    /// Reads the previous pipeline blob.
    pub takes_input: bool,
    handler: Handler,
}

impl std::fmt::Debug for InternalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalCommand")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .finish()
    }
}

/// The built-in command table.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, InternalCommand>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CommandRegistry {
    pub fn builtin() -> Self {
        let table = [
            InternalCommand {
                name: "help",
                usage: "/help",
                summary: "show this help",
                takes_input: false,
                handler: help,
            },
            InternalCommand {
                name: "list",
                usage: "/list",
                summary: "list classified commands by tier",
                takes_input: false,
                handler: list,
            },
            InternalCommand {
                name: "tier",
                usage: "/tier <command> | /tier set <command> <tier>",
                summary: "show or raise a command's tier for this session",
                takes_input: false,
                handler: tier,
            },
            InternalCommand {
                name: "config",
                usage: "/config",
                summary: "show session preferences",
                takes_input: false,
                handler: config,
            },
            InternalCommand {
                name: "exit",
                usage: "/exit",
                summary: "end the session",
                takes_input: false,
                handler: exit,
            },
            InternalCommand {
                name: "quit",
                usage: "/quit",
                summary: "end the session",
                takes_input: false,
                handler: exit,
            },
            InternalCommand {
                name: "grep",
                usage: "/grep <regex>",
                summary: "keep input lines matching a regex",
                takes_input: true,
                handler: grep,
            },
            InternalCommand {
                name: "head",
                usage: "/head [n]",
                summary: "keep the first n input lines",
                takes_input: true,
                handler: head,
            },
            InternalCommand {
                name: "count",
                usage: "/count",
                summary: "count input lines, words and bytes",
                takes_input: true,
                handler: count,
            },
            InternalCommand {
                name: "json",
                usage: "/json",
                summary: "parse input as JSON",
                takes_input: true,
                handler: json_parse,
            },
        ];
        Self {
            commands: table.into_iter().map(|c| (c.name, c)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&InternalCommand> {
        self.commands.get(name)
    }

    pub fn commands(&self) -> impl Iterator<Item = &InternalCommand> {
        self.commands.values()
    }

    /// Suggestion text for an unknown name.
    pub fn suggest(&self, name: &str) -> String {
        match closest(name, self.commands.keys().copied(), 2) {
            Some(hit) => format!("did you mean /{hit}?"),
            None => "type /help for available commands".to_string(),
        }
    }

    /// Run an internal command.
    pub fn dispatch(
        &self,
        session: &mut SessionContext,
        invocation: &InternalInvocation,
        input: Option<Blob>,
    ) -> Result<InternalOutput, Failure> {
        let Some(command) = self.get(&invocation.name) else {
            return Err(Failure::UnknownCommand {
                name: invocation.name.clone(),
                suggestion: self.suggest(&invocation.name),
            });
        };
        debug!(name = command.name, args = ?invocation.args, "Internal command");
        (command.handler)(Invocation {
            session,
            args: &invocation.args,
            input,
            registry: self,
        })
    }
}

fn help(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let width = inv
        .registry
        .commands()
        .map(|c| c.usage.len())
        .max()
        .unwrap_or(0);
    let mut out = String::from("Internal commands:\n");
    for c in inv.registry.commands() {
        out.push_str(&format!("  {:<width$}  {}\n", c.usage, c.summary));
    }
    out.push_str(
        "\nPrefixes:\n  /f, /force <cmd>        skip typo correction\n  !<alias>[:<strategy>] <cmd>  run on a remote machine or group\n",
    );
    out.push_str(&format!(
        "  {} <question>           translate natural language into a command\n",
        inv.session.preferences.nl_keyword
    ));
    Ok(InternalOutput::text(out))
}

fn list(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let mut by_tier: BTreeMap<Tier, Vec<String>> = BTreeMap::new();
    for (name, tier) in inv.session.tiers.base_entries() {
        if inv.session.tiers.override_for(name).is_none() {
            by_tier.entry(tier).or_default().push(name.to_string());
        }
    }
    for (name, entry) in inv.session.tiers.overrides() {
        by_tier.entry(entry.tier).or_default().push(format!("{name}*"));
    }

    let mut out = String::new();
    for (tier, mut names) in by_tier {
        names.sort();
        out.push_str(&format!("Tier {tier}: {}\n", names.join(", ")));
    }
    out.push_str(&format!(
        "Unlisted commands: tier {}\n(* = override)\n",
        inv.session.preferences.unknown_tier.max(Tier::Validate)
    ));
    Ok(InternalOutput::text(out))
}

fn tier(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let usage = "usage: /tier <command> | /tier set <command> <tier>";
    match inv.args {
        [set, name, level] if set.eq_ignore_ascii_case("set") => {
            let level: Tier = level
                .parse()
                .map_err(|e: crate::tier::ParseTierError| Failure::malformed(e.to_string(), usage))?;
            inv.session
                .tiers
                .set_override(name, level, OverrideSource::Session)
                .map_err(|e| Failure::blocked(e.to_string()))?;
            Ok(InternalOutput::text(format!(
                "{} is now tier {level} for this session\n",
                name.to_lowercase()
            )))
        }
        [name] => {
            let c = classify(inv.session, name);
            let source = match c.source {
                crate::classify::TierSource::Override => "override",
                crate::classify::TierSource::Base => "table",
                crate::classify::TierSource::Default => "unlisted",
            };
            Ok(InternalOutput::text(format!("{}: tier {} [{source}]\n", c.name, c.tier)))
        }
        _ => Err(Failure::malformed("Wrong arguments for /tier", usage)),
    }
}

fn config(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let prefs = &inv.session.preferences;
    Ok(InternalOutput::blob(Blob::structured(json!({
        "session_id": inv.session.session_id.to_string(),
        "shell": prefs.shell_name,
        "auto_correct_execute": prefs.auto_correct_execute,
        "lockdown_override": prefs.lockdown_override,
        "unknown_tier": prefs.unknown_tier.label(),
        "auto_correct_threshold": prefs.auto_correct_threshold,
        "confirm_correct_threshold": prefs.confirm_correct_threshold,
        "command_timeout_secs": prefs.command_timeout.as_secs(),
        "validation_timeout_secs": prefs.validation_timeout.as_secs(),
        "translation_timeout_secs": prefs.translation_timeout.as_secs(),
        "max_translation_hops": prefs.max_translation_hops,
        "nl_keyword": prefs.nl_keyword,
        "max_parallel_remote": prefs.max_parallel_remote,
    }))))
}

fn exit(_inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    Ok(InternalOutput {
        blob: Blob::text("Goodbye.\n"),
        exit_requested: true,
    })
}

/// Text of the input blob, or a malformed failure naming the command.
fn input_text(name: &str, input: Option<&Blob>) -> Result<String, Failure> {
    let Some(blob) = input else {
        return Err(Failure::malformed(
            format!("/{name} needs piped input"),
            format!("usage: <command> | /{name}"),
        ));
    };
    blob.as_text().ok_or_else(|| {
        Failure::malformed(
            format!("/{name} cannot read {} input", blob.kind()),
            "only text and structured data are line-oriented",
        )
    })
}

fn grep(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let [pattern] = inv.args else {
        return Err(Failure::malformed("/grep takes one pattern", "usage: /grep <regex>"));
    };
    let re = Regex::new(pattern)
        .map_err(|e| Failure::malformed(format!("invalid regex: {e}"), "usage: /grep <regex>"))?;
    let text = input_text("grep", inv.input.as_ref())?;
    let mut out: String = text
        .lines()
        .filter(|line| re.is_match(line))
        .collect::<Vec<_>>()
        .join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(InternalOutput::text(out))
}

fn head(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let n = match inv.args {
        [] => DEFAULT_HEAD_LINES,
        [n] => n
            .parse::<usize>()
            .map_err(|_| Failure::malformed(format!("'{n}' is not a line count"), "usage: /head [n]"))?,
        _ => return Err(Failure::malformed("/head takes at most one argument", "usage: /head [n]")),
    };
    let text = input_text("head", inv.input.as_ref())?;
    let mut out = text.lines().take(n).collect::<Vec<_>>().join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(InternalOutput::text(out))
}

fn count(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let text = input_text("count", inv.input.as_ref())?;
    Ok(InternalOutput::blob(Blob::structured(json!({
        "lines": text.lines().count(),
        "words": text.split_whitespace().count(),
        "bytes": text.len(),
    }))))
}

fn json_parse(inv: Invocation<'_>) -> Result<InternalOutput, Failure> {
    let Some(input) = inv.input else {
        return Err(Failure::malformed("/json needs piped input", "usage: <command> | /json"));
    };
    if let BlobContent::Structured(_) = input.content {
        return Ok(InternalOutput::blob(input));
    }
    let text = input_text("json", Some(&input))?;
    let blob = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => Blob::structured(value),
        Err(e) => Blob::error(format!("input is not valid JSON: {e}")),
    };
    Ok(InternalOutput::blob(blob))
}
