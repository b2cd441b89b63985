//! Configuration model, layering and validation.
//!
//! Files are merged as raw TOML tables (user config, then project config),
//! deserialized once into [`IsaacConfig`], and then overridden by `ISAAC_*`
//! environment variables. Every leaf key's origin is kept in a [`SourceMap`].

pub mod env;
pub mod source;
pub mod validate;

pub use env::{ENV_PREFIX, EnvError, EnvParser};
pub use source::{ConfigSource, SourceMap, Sourced};
pub use validate::{ConfigWarning, Severity, validate_config, validate_layered};

use crate::remote::{DispatchStrategy, Machine, MachineId, MachineRegistry};
use crate::tier::{
    DEFAULT_TIERS, OverrideSource, ParseTierError, Tier, TierAssignment, TierOverrideError,
};
use crate::types::{Preferences, SessionContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse {source_name}: {message}")]
    Parse { source_name: String, message: String },

    #[error("invalid tier '{value}' for {key}: {source}")]
    InvalidTier {
        key: String,
        value: String,
        #[source]
        source: ParseTierError,
    },

    #[error("invalid remote.default_strategy: {0}")]
    InvalidStrategy(String),

    #[error(transparent)]
    Override(#[from] TierOverrideError),
}

/// Effective configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsaacConfig {
    pub general: GeneralConfig,
    pub gate: GateConfig,
    /// Extra entries added to the built-in table, keyed by tier label.
    pub tiers: BTreeMap<String, Vec<String>>,
    /// Administrative overrides: command name to tier label.
    pub tier_overrides: BTreeMap<String, String>,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Target shell family.
    pub shell: String,
    /// JSONL session log. Disabled when unset.
    pub session_log: Option<PathBuf>,
    /// Keyword that introduces a natural-language query.
    pub nl_keyword: String,
    /// Base log level; `ISAAC_LOG_LEVEL` and `-v`/`-q` take precedence.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            session_log: None,
            nl_keyword: "isaac".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub auto_correct_execute: bool,
    pub lockdown_override: bool,
    /// Tier label applied to unclassified commands.
    pub unknown_tier: String,
    pub auto_correct_threshold: f64,
    pub confirm_correct_threshold: f64,
    pub command_timeout_secs: u64,
    pub validation_timeout_secs: u64,
    pub translation_timeout_secs: u64,
    pub max_translation_hops: u8,
}

impl Default for GateConfig {
    fn default() -> Self {
        let prefs = Preferences::default();
        Self {
            auto_correct_execute: prefs.auto_correct_execute,
            lockdown_override: prefs.lockdown_override,
            unknown_tier: prefs.unknown_tier.label().to_string(),
            auto_correct_threshold: prefs.auto_correct_threshold,
            confirm_correct_threshold: prefs.confirm_correct_threshold,
            command_timeout_secs: prefs.command_timeout.as_secs(),
            validation_timeout_secs: prefs.validation_timeout.as_secs(),
            translation_timeout_secs: prefs.translation_timeout.as_secs(),
            max_translation_hops: prefs.max_translation_hops,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub max_parallel: usize,
    /// Strategy for group routes that name none.
    pub default_strategy: String,
    pub machines: Vec<Machine>,
    /// Group name to member machine ids.
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            default_strategy: DispatchStrategy::default().to_string(),
            machines: Vec::new(),
            groups: BTreeMap::new(),
        }
    }
}

/// Config plus the origin of each key.
#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
    pub config: IsaacConfig,
    pub sources: SourceMap,
}

impl IsaacConfig {
    /// Parse one TOML document.
    pub fn from_toml_str(content: &str, source_name: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }

    /// Merge file layers (lowest precedence first) and deserialize the result.
    pub fn from_layers<I>(layers: I) -> Result<LayeredConfig, ConfigError>
    where
        I: IntoIterator<Item = (ConfigSource, String, toml::Value)>,
    {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut sources = SourceMap::new();
        let mut names = Vec::new();
        for (source, name, value) in layers {
            sources.record_toml(&value, source);
            merge_tables(&mut merged, value);
            names.push(name);
        }
        let config = merged.try_into().map_err(|e: toml::de::Error| ConfigError::Parse {
            source_name: names.join(" + "),
            message: e.to_string(),
        })?;
        Ok(LayeredConfig { config, sources })
    }

    /// Apply `ISAAC_*` overrides. Invalid values are left in `parser.errors()`.
    pub fn apply_env(&mut self, parser: &mut EnvParser, sources: &mut SourceMap) {
        fn track<T>(sources: &mut SourceMap, key: &str, value: &Sourced<T>) {
            if let Some(var) = &value.env_var {
                sources.set_env(key, var.clone());
            }
        }

        if let Some(v) = parser.get_string("SHELL") {
            track(sources, "general.shell", &v);
            self.general.shell = v.value;
        }
        if let Some(v) = parser.get_path("SESSION_LOG") {
            track(sources, "general.session_log", &v);
            self.general.session_log = Some(v.value);
        }
        if let Some(v) = parser.get_string("NL_KEYWORD") {
            track(sources, "general.nl_keyword", &v);
            self.general.nl_keyword = v.value;
        }
        if let Some(v) = parser.get_bool("AUTO_CORRECT_EXECUTE") {
            track(sources, "gate.auto_correct_execute", &v);
            self.gate.auto_correct_execute = v.value;
        }
        if let Some(v) = parser.get_bool("LOCKDOWN_OVERRIDE") {
            track(sources, "gate.lockdown_override", &v);
            self.gate.lockdown_override = v.value;
        }
        if let Some(v) = parser.get_tier("UNKNOWN_TIER") {
            track(sources, "gate.unknown_tier", &v);
            self.gate.unknown_tier = v.value.label().to_string();
        }
        if let Some(v) = parser.get_f64_range("AUTO_CORRECT_THRESHOLD", 0.0, 1.0) {
            track(sources, "gate.auto_correct_threshold", &v);
            self.gate.auto_correct_threshold = v.value;
        }
        if let Some(v) = parser.get_f64_range("CONFIRM_CORRECT_THRESHOLD", 0.0, 1.0) {
            track(sources, "gate.confirm_correct_threshold", &v);
            self.gate.confirm_correct_threshold = v.value;
        }
        if let Some(v) = parser.get_u64_range("COMMAND_TIMEOUT_SECS", 1, 86_400) {
            track(sources, "gate.command_timeout_secs", &v);
            self.gate.command_timeout_secs = v.value;
        }
        if let Some(v) = parser.get_u64_range("VALIDATION_TIMEOUT_SECS", 1, 3600) {
            track(sources, "gate.validation_timeout_secs", &v);
            self.gate.validation_timeout_secs = v.value;
        }
        if let Some(v) = parser.get_u64_range("TRANSLATION_TIMEOUT_SECS", 1, 3600) {
            track(sources, "gate.translation_timeout_secs", &v);
            self.gate.translation_timeout_secs = v.value;
        }
        if let Some(v) = parser.get_u64_range("MAX_TRANSLATION_HOPS", 0, 3) {
            track(sources, "gate.max_translation_hops", &v);
            self.gate.max_translation_hops = v.value as u8;
        }
        if let Some(v) = parser.get_u64_range("MAX_PARALLEL_REMOTE", 1, 256) {
            track(sources, "remote.max_parallel", &v);
            self.remote.max_parallel = v.value as usize;
        }
        if let Some(v) = parser.get_parsed::<DispatchStrategy>(
            "DISPATCH_STRATEGY",
            "broadcast, round_robin, least_load or random",
        ) {
            track(sources, "remote.default_strategy", &v);
            self.remote.default_strategy = v.value.to_string();
        }
    }

    /// Gate preferences derived from `[general]` and `[gate]`.
    pub fn preferences(&self) -> Result<Preferences, ConfigError> {
        let unknown_tier = parse_tier("gate.unknown_tier", &self.gate.unknown_tier)?;
        Ok(Preferences {
            shell_name: self.general.shell.clone(),
            auto_correct_execute: self.gate.auto_correct_execute,
            lockdown_override: self.gate.lockdown_override,
            unknown_tier,
            auto_correct_threshold: self.gate.auto_correct_threshold,
            confirm_correct_threshold: self.gate.confirm_correct_threshold,
            command_timeout: Duration::from_secs(self.gate.command_timeout_secs),
            validation_timeout: Duration::from_secs(self.gate.validation_timeout_secs),
            translation_timeout: Duration::from_secs(self.gate.translation_timeout_secs),
            max_translation_hops: self.gate.max_translation_hops,
            nl_keyword: self.general.nl_keyword.clone(),
            max_parallel_remote: self.remote.max_parallel.max(1),
        })
    }

    /// Built-in table plus `[tiers]`, with `[tier_overrides]` applied.
    ///
    /// A name listed in several places keeps the strictest base tier.
    pub fn tier_assignment(&self) -> Result<TierAssignment, ConfigError> {
        let mut groups: Vec<(Tier, Vec<String>)> = DEFAULT_TIERS
            .iter()
            .map(|(tier, names)| (*tier, names.iter().map(|n| n.to_string()).collect()))
            .collect();
        for (label, names) in &self.tiers {
            let tier = parse_tier(&format!("tiers.{label}"), label)?;
            groups.push((tier, names.clone()));
        }

        let mut assignment = TierAssignment::from_table(groups);
        for (command, label) in &self.tier_overrides {
            let tier = parse_tier(&format!("tier_overrides.{command}"), label)?;
            assignment.set_override(command, tier, OverrideSource::Administrative)?;
        }
        Ok(assignment)
    }

    pub fn machine_registry(&self) -> Result<MachineRegistry, ConfigError> {
        let strategy = self
            .remote
            .default_strategy
            .parse::<DispatchStrategy>()
            .map_err(ConfigError::InvalidStrategy)?;
        let mut registry = MachineRegistry::new();
        registry.set_default_strategy(strategy);
        for machine in &self.remote.machines {
            registry.register(machine.clone());
        }
        for (name, members) in &self.remote.groups {
            registry.define_group(name.clone(), members.iter().map(MachineId::new).collect());
        }
        Ok(registry)
    }

    /// Fresh session seeded from this configuration.
    pub fn session(&self) -> Result<SessionContext, ConfigError> {
        Ok(SessionContext::new(self.tier_assignment()?, self.preferences()?))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn parse_tier(key: &str, value: &str) -> Result<Tier, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidTier {
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}

/// Deep-merge `overlay` into `base`. Tables merge key by key; anything else
/// in `overlay` replaces the value in `base`.
pub fn merge_tables(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_tables(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Commented template for `isaac config init`-style bootstrapping.
pub fn example_config() -> &'static str {
    r#"# Isaac configuration
# Place in .isaac/config.toml (project) or the user config directory.

[general]
shell = "bash"
# session_log = "~/.local/share/isaac/session.jsonl"
nl_keyword = "isaac"

[gate]
auto_correct_execute = false
# Enables the typed-token unlock for tier-4 commands. Leave off unless needed.
lockdown_override = false
unknown_tier = "3"
command_timeout_secs = 30

[tiers]
# "1" = ["mytool"]

[tier_overrides]
# terraform = "3"

[remote]
max_parallel = 4
default_strategy = "broadcast"

# [[remote.machines]]
# id = "web1"
# host = "10.0.0.11"
# user = "deploy"

# [remote.groups]
# web = ["web1", "web2"]
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_defaults_match_preferences() {
        let prefs = IsaacConfig::default().preferences().unwrap();
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn test_example_config_parses() {
        let config = IsaacConfig::from_toml_str(example_config(), "example").unwrap();
        assert!(!config.gate.lockdown_override);
        assert!(config.machine_registry().is_ok());
    }

    #[test]
    fn test_project_layer_overrides_user_layer() {
        let layered = IsaacConfig::from_layers([
            (
                ConfigSource::UserConfig,
                "user".to_string(),
                doc("[general]\nshell = \"zsh\"\n[gate]\ncommand_timeout_secs = 60"),
            ),
            (
                ConfigSource::ProjectConfig,
                "project".to_string(),
                doc("[general]\nshell = \"fish\""),
            ),
        ])
        .unwrap();
        assert_eq!(layered.config.general.shell, "fish");
        assert_eq!(layered.config.gate.command_timeout_secs, 60);
        assert_eq!(layered.sources.source_of("general.shell"), ConfigSource::ProjectConfig);
        assert_eq!(
            layered.sources.source_of("gate.command_timeout_secs"),
            ConfigSource::UserConfig
        );
    }

    #[test]
    fn test_env_overrides_files() {
        let mut layered = IsaacConfig::from_layers([(
            ConfigSource::ProjectConfig,
            "project".to_string(),
            doc("[gate]\nlockdown_override = true"),
        )])
        .unwrap();
        let mut parser = EnvParser::from_pairs([
            ("ISAAC_LOCKDOWN_OVERRIDE", "false"),
            ("ISAAC_DISPATCH_STRATEGY", "least_load"),
        ]);
        layered.config.apply_env(&mut parser, &mut layered.sources);
        assert!(!parser.has_errors());
        assert!(!layered.config.gate.lockdown_override);
        assert_eq!(layered.config.remote.default_strategy, "least_load");
        assert_eq!(
            layered.sources.describe("gate.lockdown_override"),
            "environment (ISAAC_LOCKDOWN_OVERRIDE)"
        );
    }

    #[test]
    fn test_tier_tables_and_overrides() {
        let config = IsaacConfig::from_toml_str(
            r#"
            [tiers]
            "1" = ["mytool"]
            "4" = ["ls"]
            [tier_overrides]
            terraform = "2.5"
            "#,
            "test",
        )
        .unwrap();
        let tiers = config.tier_assignment().unwrap();
        assert_eq!(tiers.base_tier("mytool"), Some(Tier::Instant));
        // Stricter entry wins over the built-in Instant.
        assert_eq!(tiers.base_tier("ls"), Some(Tier::Lockdown));
        let o = tiers.override_for("terraform").unwrap();
        assert_eq!(o.tier, Tier::AlwaysConfirm);
        assert_eq!(o.source, OverrideSource::Administrative);
    }

    #[test]
    fn test_administrative_override_may_lower_lockdown() {
        let config =
            IsaacConfig::from_toml_str("[tier_overrides]\nformat = \"3\"", "test").unwrap();
        let tiers = config.tier_assignment().unwrap();
        assert_eq!(tiers.override_for("format").unwrap().tier, Tier::Validate);
    }

    #[test]
    fn test_invalid_tier_label_is_an_error() {
        let config = IsaacConfig::from_toml_str("[tiers]\n\"9\" = [\"x\"]", "test").unwrap();
        assert!(matches!(
            config.tier_assignment(),
            Err(ConfigError::InvalidTier { .. })
        ));
    }

    #[test]
    fn test_machine_registry_from_config() {
        let config = IsaacConfig::from_toml_str(
            r#"
            [remote]
            default_strategy = "round_robin"
            [[remote.machines]]
            id = "web1"
            host = "10.0.0.1"
            [[remote.machines]]
            id = "web2"
            host = "10.0.0.2"
            [remote.groups]
            web = ["web1", "web2"]
            "#,
            "test",
        )
        .unwrap();
        let registry = config.machine_registry().unwrap();
        assert_eq!(registry.default_strategy(), DispatchStrategy::RoundRobin);
        assert_eq!(registry.resolve("web", None).unwrap().len(), 1);
        assert_eq!(registry.resolve("web1", None).unwrap(), vec![MachineId::new("web1")]);
    }

    #[test]
    fn test_merge_tables_replaces_scalars_and_merges_tables() {
        let mut base = doc("[a]\nx = 1\ny = 2\n[b]\nz = [1]");
        merge_tables(&mut base, doc("[a]\ny = 3\n[b]\nz = [2, 3]"));
        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_array().map(|a| a.len()), Some(2));
    }
}
