//! Tracing setup for the `isaac` binary and tests.
//!
//! Console logs always go to stderr: stdout belongs to command output.
//! An optional daily-rotated file receives JSON lines.

use crate::config::EnvParser;
use anyhow::Result;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    /// Single-line output. Default for the interactive shell.
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level (trace, debug, info, warn, error, off).
    pub level: String,
    pub format: LogFormat,
    /// Rotating JSON log file.
    pub file_path: Option<PathBuf>,
    /// Per-target level overrides.
    pub targets: BTreeMap<String, String>,
    pub with_target: bool,
    pub with_file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            file_path: None,
            targets: BTreeMap::new(),
            with_target: false,
            with_file_line: false,
        }
    }
}

impl LogConfig {
    /// Read `ISAAC_LOG_LEVEL`, `ISAAC_LOG_FORMAT`, `ISAAC_LOG_FILE` and
    /// `ISAAC_LOG_TARGETS` (comma-separated `target=level`).
    pub fn from_env(default_level: &str) -> Self {
        Self::from_parser(&mut EnvParser::new(), default_level)
    }

    pub fn from_parser(parser: &mut EnvParser, default_level: &str) -> Self {
        let mut config = Self {
            level: parser
                .get_string("LOG_LEVEL")
                .map(|s| s.value)
                .unwrap_or_else(|| default_level.to_string()),
            ..Self::default()
        };
        if let Some(format) = parser.get_parsed::<LogFormat>("LOG_FORMAT", "pretty, json or compact")
        {
            config.format = format.value;
        }
        if let Some(path) = parser.get_path("LOG_FILE") {
            config.file_path = Some(path.value);
        }
        if let Some(targets) = parser.get_string("LOG_TARGETS") {
            config.targets = parse_target_overrides(&targets.value);
        }
        if config.level == "debug" || config.level == "trace" {
            config.with_target = true;
            config.with_file_line = true;
        }
        config
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Effective filter. `RUST_LOG` wins when set and valid.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some()
            && let Ok(filter) = EnvFilter::try_from_default_env()
        {
            return filter;
        }
        EnvFilter::new(self.directives())
    }

    /// Filter directive string built from the level and target overrides.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (target, level) in &self.targets {
            directives.push_str(&format!(",{target}={level}"));
        }
        directives
    }

    fn layer<W>(&self, format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.with_target)
            .with_file(self.with_file_line)
            .with_line_number(self.with_file_line)
            .with_ansi(ansi);
        match format {
            LogFormat::Pretty => base.pretty().with_filter(self.env_filter()).boxed(),
            LogFormat::Json => base.json().with_filter(self.env_filter()).boxed(),
            LogFormat::Compact => base.compact().with_filter(self.env_filter()).boxed(),
        }
    }
}

/// Keeps the file writer's worker alive.
pub struct LoggingGuards {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards> {
    let ansi = std::io::stderr().is_terminal() && config.format != LogFormat::Json;
    let mut layers: Vec<BoxedLayer> = vec![config.layer(config.format, std::io::stderr, ansi)];

    let mut file_guard = None;
    if let Some(path) = config.file_path.as_ref() {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let file_name = path.file_name().unwrap_or_else(|| OsStr::new("isaac.log"));
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(config.layer(LogFormat::Json, writer, false));
        file_guard = Some(guard);
    }

    if let Err(err) = tracing_subscriber::registry().with(layers).try_init()
        && !err.to_string().contains("already")
    {
        return Err(err.into());
    }
    Ok(LoggingGuards {
        _file_guard: file_guard,
    })
}

fn parse_target_overrides(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .filter_map(|(target, level)| {
            let target = target.trim();
            let level = level.trim().to_lowercase();
            (!target.is_empty() && !level.is_empty()).then(|| (target.to_string(), level))
        })
        .collect()
}
