//! Startup checks for a loaded configuration.

use super::{ConfigSource, IsaacConfig, LayeredConfig};
use crate::remote::DispatchStrategy;
use crate::tier::{DEFAULT_TIERS, Tier, TierAssignment};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Issue found in the effective configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWarning {
    /// Dotted config key.
    pub key: String,
    pub message: String,
    pub severity: Severity,
}

impl ConfigWarning {
    pub fn warning(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_severity(key, message, Severity::Warning)
    }

    pub fn error(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_severity(key, message, Severity::Error)
    }

    pub fn info(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_severity(key, message, Severity::Info)
    }

    fn with_severity(key: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            severity,
        }
    }
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.key, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    /// The configuration cannot be used as-is.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Check a configuration. Errors should stop startup; warnings are shown.
pub fn validate_config(config: &IsaacConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    validate_general(config, &mut warnings);
    validate_gate(config, &mut warnings);
    validate_tiers(config, &mut warnings);
    validate_remote(config, &mut warnings);
    warnings
}

/// [`validate_config`] plus checks that depend on which layer set a key.
///
/// A project config (`.isaac/config.toml` in the working directory) may only
/// make the gate stricter. Enabling the lockdown override or lowering a
/// command's tier has to come from the user config, `--config` or the
/// environment.
pub fn validate_layered(layered: &LayeredConfig) -> Vec<ConfigWarning> {
    let mut warnings = validate_config(&layered.config);
    validate_project_layer(layered, &mut warnings);
    warnings
}

fn validate_project_layer(layered: &LayeredConfig, warnings: &mut Vec<ConfigWarning>) {
    let config = &layered.config;
    let from_project = |key: &str| layered.sources.source_of(key) == ConfigSource::ProjectConfig;

    if config.gate.lockdown_override && from_project("gate.lockdown_override") {
        warnings.push(ConfigWarning::error(
            "gate.lockdown_override",
            "a project config may not enable the lockdown override; \
             set it in the user config, --config or ISAAC_LOCKDOWN_OVERRIDE",
        ));
    }

    let builtin = TierAssignment::default();
    let floor = |command: &str| builtin.base_tier(command).unwrap_or(Tier::Validate);

    for (command, label) in &config.tier_overrides {
        let key = format!("tier_overrides.{command}");
        if !from_project(&key) {
            continue;
        }
        if let Ok(tier) = label.parse::<Tier>()
            && tier < floor(command)
        {
            warnings.push(ConfigWarning::error(
                key,
                format!(
                    "a project config may only raise tiers; '{command}' stays at tier {}",
                    floor(command).label()
                ),
            ));
        }
    }

    for (label, names) in &config.tiers {
        let key = format!("tiers.{label}");
        let Ok(tier) = label.parse::<Tier>() else {
            continue;
        };
        if !from_project(&key) {
            continue;
        }
        for name in names.iter().filter(|name| tier < floor(name)) {
            warnings.push(ConfigWarning::error(
                key.clone(),
                format!(
                    "a project config may only raise tiers; '{name}' stays at tier {}",
                    floor(name).label()
                ),
            ));
        }
    }
}

fn validate_general(config: &IsaacConfig, warnings: &mut Vec<ConfigWarning>) {
    let keyword = config.general.nl_keyword.trim();
    if keyword.is_empty() || keyword.contains(char::is_whitespace) {
        warnings.push(ConfigWarning::error(
            "general.nl_keyword",
            "keyword must be a single non-empty word",
        ));
    } else if keyword.starts_with(['/', '!']) {
        warnings.push(ConfigWarning::error(
            "general.nl_keyword",
            "keyword cannot start with '/' or '!'",
        ));
    }
    if config.general.shell.trim().is_empty() {
        warnings.push(ConfigWarning::error("general.shell", "shell name is empty"));
    }
    let level = config.general.log_level.trim().to_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error" | "off") {
        warnings.push(ConfigWarning::warning(
            "general.log_level",
            format!("unknown level '{level}', expected trace, debug, info, warn, error or off"),
        ));
    }
}

fn validate_gate(config: &IsaacConfig, warnings: &mut Vec<ConfigWarning>) {
    let gate = &config.gate;

    if gate.lockdown_override {
        warnings.push(ConfigWarning::warning(
            "gate.lockdown_override",
            "tier-4 commands can be unlocked with a typed token",
        ));
    }
    if gate.auto_correct_execute {
        warnings.push(ConfigWarning::info(
            "gate.auto_correct_execute",
            "high-confidence tier-2 corrections run without a prompt",
        ));
    }

    match gate.unknown_tier.parse::<Tier>() {
        Ok(tier) if tier < Tier::Validate => warnings.push(ConfigWarning::warning(
            "gate.unknown_tier",
            format!(
                "tier {} is below 3; unclassified commands will still be gated at tier 3",
                tier.label()
            ),
        )),
        Ok(_) => {}
        Err(e) => warnings.push(ConfigWarning::error("gate.unknown_tier", e.to_string())),
    }

    for (key, value) in [
        ("gate.command_timeout_secs", gate.command_timeout_secs),
        ("gate.validation_timeout_secs", gate.validation_timeout_secs),
        ("gate.translation_timeout_secs", gate.translation_timeout_secs),
    ] {
        if value == 0 {
            warnings.push(ConfigWarning::error(key, "timeout must be at least 1 second"));
        }
    }

    for (key, value) in [
        ("gate.auto_correct_threshold", gate.auto_correct_threshold),
        ("gate.confirm_correct_threshold", gate.confirm_correct_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            warnings.push(ConfigWarning::error(key, "confidence must be within 0.0..=1.0"));
        }
    }

    match gate.max_translation_hops {
        0 => warnings.push(ConfigWarning::info(
            "gate.max_translation_hops",
            "natural-language translation is disabled",
        )),
        n if n > 3 => warnings.push(ConfigWarning::warning(
            "gate.max_translation_hops",
            format!("{n} hops lets translated output re-enter the router repeatedly"),
        )),
        _ => {}
    }
}

fn validate_tiers(config: &IsaacConfig, warnings: &mut Vec<ConfigWarning>) {
    for label in config.tiers.keys() {
        if let Err(e) = label.parse::<Tier>() {
            warnings.push(ConfigWarning::error(format!("tiers.{label}"), e.to_string()));
        }
    }

    let lockdown: HashSet<String> = DEFAULT_TIERS
        .iter()
        .filter(|(tier, _)| *tier == Tier::Lockdown)
        .flat_map(|(_, names)| names.iter().map(|n| n.to_lowercase()))
        .collect();

    for (command, label) in &config.tier_overrides {
        let key = format!("tier_overrides.{command}");
        match label.parse::<Tier>() {
            Ok(tier) if tier < Tier::Lockdown && lockdown.contains(&command.to_lowercase()) => {
                warnings.push(ConfigWarning::warning(
                    key,
                    format!("lowers a tier-4 command to tier {}", tier.label()),
                ));
            }
            Ok(_) => {}
            Err(e) => warnings.push(ConfigWarning::error(key, e.to_string())),
        }
    }
}

fn validate_remote(config: &IsaacConfig, warnings: &mut Vec<ConfigWarning>) {
    let remote = &config.remote;

    if remote.max_parallel == 0 {
        warnings.push(ConfigWarning::warning(
            "remote.max_parallel",
            "0 is treated as 1",
        ));
    }
    if let Err(e) = remote.default_strategy.parse::<DispatchStrategy>() {
        warnings.push(ConfigWarning::error("remote.default_strategy", e));
    }

    let mut ids = HashSet::new();
    for machine in &remote.machines {
        if !ids.insert(machine.id.as_str()) {
            warnings.push(ConfigWarning::error(
                "remote.machines",
                format!("duplicate machine id '{}'", machine.id),
            ));
        }
        if machine.host.trim().is_empty() {
            warnings.push(ConfigWarning::error(
                "remote.machines",
                format!("machine '{}' has no host", machine.id),
            ));
        }
    }

    for (group, members) in &remote.groups {
        let key = format!("remote.groups.{group}");
        if ids.contains(group.as_str()) {
            warnings.push(ConfigWarning::warning(
                key.clone(),
                "group name shadows a machine id; the machine wins",
            ));
        }
        if members.is_empty() {
            warnings.push(ConfigWarning::warning(key.clone(), "group has no members"));
        }
        for member in members {
            if !ids.contains(member.as_str()) {
                warnings.push(ConfigWarning::warning(
                    key.clone(),
                    format!("unknown member '{member}'"),
                ));
            }
        }
    }
}
