//! Startup diagnostics.
//!
//! Error codes follow the `ISAAC-Exxx` convention.

#![allow(unused_assignments)]

use isaac_common::config::{ConfigWarning, EnvError};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration problems that stop the shell from starting.
///
/// Error code range: ISAAC-E001 to ISAAC-E006
#[allow(unused_assignments)]
#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {path}")]
    #[diagnostic(
        code("ISAAC-E001"),
        help("Check that the file exists and you have read permissions")
    )]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML syntax in config")]
    #[diagnostic(code("ISAAC-E002"))]
    ParseError {
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
        message: String,
    },

    #[error("Invalid value for '{field}': {reason}")]
    #[diagnostic(code("ISAAC-E003"), help("{suggestion}"))]
    InvalidValue {
        field: String,
        reason: String,
        suggestion: String,
    },

    #[error("Invalid ISAAC_* environment variables")]
    #[diagnostic(code("ISAAC-E004"), help("{details}"))]
    InvalidEnvironment { details: String },

    #[error("Configuration has {count} error(s)")]
    #[diagnostic(
        code("ISAAC-E005"),
        help("{details}\nRun 'isaac config validate' for the full report")
    )]
    ValidationFailed { count: usize, details: String },

    #[error("Failed to open session log {path}: {reason}")]
    #[diagnostic(
        code("ISAAC-E006"),
        help("Set general.session_log to a writable path or remove it")
    )]
    SessionLog { path: PathBuf, reason: String },
}

impl ConfigError {
    pub fn from_toml_error(path: &Path, content: String, err: toml::de::Error) -> Self {
        let span: SourceSpan = err
            .span()
            .map(|s| (s.start, s.end.saturating_sub(s.start)).into())
            .unwrap_or_else(|| (0, 0).into());
        ConfigError::ParseError {
            src: NamedSource::new(path.display().to_string(), content),
            span,
            message: err.message().to_string(),
        }
    }

    pub fn from_env_errors(errors: &[EnvError]) -> Self {
        ConfigError::InvalidEnvironment {
            details: errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn from_warnings(errors: &[&ConfigWarning]) -> Self {
        ConfigError::ValidationFailed {
            count: errors.len(),
            details: errors
                .iter()
                .map(|w| format!("{}: {}", w.key, w.message))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<isaac_common::ConfigError> for ConfigError {
    fn from(err: isaac_common::ConfigError) -> Self {
        use isaac_common::ConfigError as Inner;
        match err {
            Inner::InvalidTier { key, value, source } => ConfigError::InvalidValue {
                field: key,
                reason: format!("'{value}' is not a tier"),
                suggestion: source.to_string(),
            },
            Inner::InvalidStrategy(reason) => ConfigError::InvalidValue {
                field: "remote.default_strategy".to_string(),
                reason,
                suggestion: "use broadcast, round_robin, least_load or random".to_string(),
            },
            Inner::Override(e) => ConfigError::InvalidValue {
                field: "tier_overrides".to_string(),
                reason: e.to_string(),
                suggestion: "check the command names in [tier_overrides]".to_string(),
            },
            Inner::Parse {
                source_name,
                message,
            } => ConfigError::InvalidValue {
                field: source_name,
                reason: message,
                suggestion: "check the types of the values in your config files".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_error_keeps_span() {
        let content = "[gate]\nlockdown_override = maybe\n".to_string();
        let err = toml::from_str::<toml::Value>(&content).unwrap_err();
        let diag = ConfigError::from_toml_error(Path::new("config.toml"), content, err);
        match diag {
            ConfigError::ParseError { span, .. } => assert!(span.offset() > 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_codes() {
        let err = ConfigError::InvalidEnvironment {
            details: String::new(),
        };
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("ISAAC-E004")
        );
    }
}
