//! `ISAAC_*` environment variable parsing.
//!
//! Values read here override file configuration, so every getter returns
//! `None` when the variable is unset rather than falling back to a default.
//! Parse errors are collected so they can all be reported at once.

use super::source::Sourced;
use crate::tier::Tier;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Prefix of every variable the parser reads.
pub const ENV_PREFIX: &str = "ISAAC_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    #[error("Value out of range for {var}: {value} (valid: {min}..={max})")]
    OutOfRange {
        var: String,
        value: String,
        min: String,
        max: String,
    },
}

enum Lookup {
    Process,
    Map(HashMap<String, String>),
}

/// Type-safe reader over the process environment (or a fixed map in tests).
pub struct EnvParser {
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvParser {
    /// Parser over the process environment.
    pub fn new() -> Self {
        Self {
            lookup: Lookup::Process,
            errors: Vec::new(),
        }
    }

    /// Parser over explicit `(full name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            lookup: Lookup::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    pub fn var_name(name: &str) -> String {
        format!("{ENV_PREFIX}{name}")
    }

    fn raw(&self, var_name: &str) -> Option<String> {
        match &self.lookup {
            Lookup::Process => std::env::var(var_name).ok(),
            Lookup::Map(map) => map.get(var_name).cloned(),
        }
    }

    fn parse_as<T: FromStr>(&mut self, name: &str, expected: &str) -> Option<Sourced<T>> {
        let var_name = Self::var_name(name);
        let value = self.raw(&var_name)?;
        match value.trim().parse::<T>() {
            Ok(parsed) => Some(Sourced::from_env(parsed, var_name)),
            Err(_) => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: expected.to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Non-empty string value.
    pub fn get_string(&mut self, name: &str) -> Option<Sourced<String>> {
        let var_name = Self::var_name(name);
        self.raw(&var_name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| Sourced::from_env(v, var_name))
    }

    /// Accepts 1/true/yes/on and 0/false/no/off.
    pub fn get_bool(&mut self, name: &str) -> Option<Sourced<bool>> {
        let var_name = Self::var_name(name);
        let value = self.raw(&var_name)?;
        let parsed = match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                self.errors.push(EnvError::InvalidValue {
                    var: var_name,
                    expected: "boolean (true/false/1/0/yes/no)".to_string(),
                    value,
                });
                return None;
            }
        };
        Some(Sourced::from_env(parsed, var_name))
    }

    pub fn get_u64_range(&mut self, name: &str, min: u64, max: u64) -> Option<Sourced<u64>> {
        let parsed = self.parse_as::<u64>(name, "unsigned integer")?;
        if parsed.value < min || parsed.value > max {
            self.errors.push(EnvError::OutOfRange {
                var: Self::var_name(name),
                value: parsed.value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
            return None;
        }
        Some(parsed)
    }

    pub fn get_f64_range(&mut self, name: &str, min: f64, max: f64) -> Option<Sourced<f64>> {
        let parsed = self.parse_as::<f64>(name, "number")?;
        if !(min..=max).contains(&parsed.value) {
            self.errors.push(EnvError::OutOfRange {
                var: Self::var_name(name),
                value: parsed.value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
            return None;
        }
        Some(parsed)
    }

    pub fn get_tier(&mut self, name: &str) -> Option<Sourced<Tier>> {
        self.parse_as::<Tier>(name, "tier (1, 2, 2.5, 3, 4)")
    }

    pub fn get_path(&mut self, name: &str) -> Option<Sourced<PathBuf>> {
        self.get_string(name).map(|s| Sourced {
            value: PathBuf::from(s.value),
            source: s.source,
            env_var: s.env_var,
        })
    }

    /// Value parsed through `FromStr`, e.g. a dispatch strategy.
    pub fn get_parsed<T: FromStr>(&mut self, name: &str, expected: &str) -> Option<Sourced<T>> {
        self.parse_as(name, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::ConfigSource;

    #[test]
    fn test_unset_is_none() {
        let mut p = EnvParser::from_pairs(Vec::<(String, String)>::new());
        assert!(p.get_string("SHELL").is_none());
        assert!(p.get_bool("LOCKDOWN_OVERRIDE").is_none());
        assert!(!p.has_errors());
    }

    #[test]
    fn test_typed_values() {
        let mut p = EnvParser::from_pairs([
            ("ISAAC_SHELL", "zsh"),
            ("ISAAC_LOCKDOWN_OVERRIDE", "yes"),
            ("ISAAC_COMMAND_TIMEOUT_SECS", "45"),
            ("ISAAC_UNKNOWN_TIER", "4"),
            ("ISAAC_AUTO_CORRECT_THRESHOLD", "0.9"),
        ]);
        let shell = p.get_string("SHELL").unwrap();
        assert_eq!(shell.value, "zsh");
        assert_eq!(shell.source, ConfigSource::Environment);
        assert_eq!(shell.env_var.as_deref(), Some("ISAAC_SHELL"));
        assert!(p.get_bool("LOCKDOWN_OVERRIDE").unwrap().value);
        assert_eq!(p.get_u64_range("COMMAND_TIMEOUT_SECS", 1, 3600).unwrap().value, 45);
        assert_eq!(p.get_tier("UNKNOWN_TIER").unwrap().value, Tier::Lockdown);
        assert_eq!(
            p.get_f64_range("AUTO_CORRECT_THRESHOLD", 0.0, 1.0).unwrap().value,
            0.9
        );
        assert!(!p.has_errors());
    }

    #[test]
    fn test_errors_are_collected() {
        let mut p = EnvParser::from_pairs([
            ("ISAAC_LOCKDOWN_OVERRIDE", "maybe"),
            ("ISAAC_COMMAND_TIMEOUT_SECS", "0"),
            ("ISAAC_UNKNOWN_TIER", "7"),
        ]);
        assert!(p.get_bool("LOCKDOWN_OVERRIDE").is_none());
        assert!(p.get_u64_range("COMMAND_TIMEOUT_SECS", 1, 3600).is_none());
        assert!(p.get_tier("UNKNOWN_TIER").is_none());
        let errors = p.take_errors();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[1], EnvError::OutOfRange { .. }));
        assert!(!p.has_errors());
    }
}
