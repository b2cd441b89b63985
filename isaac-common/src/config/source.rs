//! Where each effective configuration value came from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Configuration layer, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// User config file in the platform config directory.
    UserConfig,
    /// `.isaac/config.toml` in the working directory.
    ProjectConfig,
    /// `ISAAC_*` environment variable.
    Environment,
    /// Command-line flag.
    CommandLine,
}

impl ConfigSource {
    pub fn display_name(&self) -> &'static str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::UserConfig => "user config",
            ConfigSource::ProjectConfig => "project config",
            ConfigSource::Environment => "environment",
            ConfigSource::CommandLine => "command line",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A value tagged with its layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Variable name when the value came from the environment.
    pub env_var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self {
            value,
            source,
            env_var: None,
        }
    }

    pub fn from_env(value: T, var_name: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            env_var: Some(var_name.into()),
        }
    }

    pub fn default_value(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }

    pub fn is_default(&self) -> bool {
        self.source == ConfigSource::Default
    }
}

/// Layer per dotted config key (`gate.lockdown_override`).
///
/// Keys not present were never set and use the built-in default.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    entries: BTreeMap<String, Sourced<()>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` was set by `source`. Later layers replace earlier.
    pub fn set(&mut self, key: impl Into<String>, source: ConfigSource) {
        self.entries.insert(key.into(), Sourced::new((), source));
    }

    pub fn set_env(&mut self, key: impl Into<String>, var_name: impl Into<String>) {
        self.entries.insert(key.into(), Sourced::from_env((), var_name));
    }

    /// Record every leaf key of a TOML document.
    pub fn record_toml(&mut self, value: &toml::Value, source: ConfigSource) {
        fn walk(map: &mut SourceMap, prefix: &str, value: &toml::Value, source: ConfigSource) {
            match value {
                toml::Value::Table(table) => {
                    for (k, v) in table {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(map, &key, v, source);
                    }
                }
                _ if !prefix.is_empty() => map.set(prefix, source),
                _ => {}
            }
        }
        walk(self, "", value, source);
    }

    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.entries
            .get(key)
            .map(|s| s.source)
            .unwrap_or(ConfigSource::Default)
    }

    /// Display text for a key, e.g. `environment (ISAAC_SHELL)`.
    pub fn describe(&self, key: &str) -> String {
        match self.entries.get(key) {
            Some(Sourced {
                source,
                env_var: Some(var),
                ..
            }) => format!("{source} ({var})"),
            Some(s) => s.source.to_string(),
            None => ConfigSource::Default.to_string(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ConfigSource)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_order() {
        assert!(ConfigSource::Environment > ConfigSource::ProjectConfig);
        assert!(ConfigSource::CommandLine > ConfigSource::Environment);
        assert!(ConfigSource::Default < ConfigSource::UserConfig);
    }

    #[test]
    fn test_record_toml_leaf_keys() {
        let doc: toml::Value = toml::from_str(
            r#"
            [gate]
            lockdown_override = true
            [general]
            shell = "zsh"
            "#,
        )
        .unwrap();
        let mut map = SourceMap::new();
        map.record_toml(&doc, ConfigSource::ProjectConfig);
        assert_eq!(map.source_of("gate.lockdown_override"), ConfigSource::ProjectConfig);
        assert_eq!(map.source_of("general.shell"), ConfigSource::ProjectConfig);
        assert_eq!(map.source_of("gate.unknown_tier"), ConfigSource::Default);
    }

    #[test]
    fn test_env_description() {
        let mut map = SourceMap::new();
        map.set("general.shell", ConfigSource::UserConfig);
        map.set_env("general.shell", "ISAAC_SHELL");
        assert_eq!(map.describe("general.shell"), "environment (ISAAC_SHELL)");
        assert_eq!(map.describe("gate.lockdown_override"), "default");
    }
}
